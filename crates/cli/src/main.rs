use anyhow::Result;
use clap::{Parser, Subcommand};
use schemars::schema_for;
use std::fs;
use std::path::{Path, PathBuf};

use councilmatic_core::cache::MemoryCache;
use councilmatic_core::db;
use councilmatic_core::search::{FtsHitSource, ResultSet, SearchMatch};
use legistar::{HttpSource, ScrapeConfig, SiteAdapter};

#[derive(Parser)]
#[command(name = "councilmatic")]
#[command(about = "City council legislation tracker", long_about = None)]
struct Cli {
    /// SQLite database path
    #[arg(long, global = true, default_value = "councilmatic.db")]
    db: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pull legislation records from the hosted site into the store
    Scrape {
        /// TOML settings for the source; built-in defaults apply when absent
        #[arg(long)]
        config: Option<PathBuf>,
        /// Stop after this many records
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Recent interesting legislation and topic activity
    Dashboard,
    /// Council members grouped by seat
    Members,
    /// One council member with their legislation and topics
    Member {
        /// The member's name as shown on legislation, e.g. "Jane Smith"
        real_name: String,
    },
    /// One piece of legislation with its attachments and action history
    Legislation { key: String },
    /// Full-text search over legislation and council members
    Search {
        query: String,
        #[arg(long, default_value_t = 1)]
        page: usize,
    },
    /// Print an RSS feed
    Feed {
        #[command(subcommand)]
        kind: FeedKind,
    },
    /// Export canonical JSON Schemas to the ./schemas directory
    Schema {
        #[command(subcommand)]
        command: SchemaCommands,
    },
}

#[derive(Subcommand)]
enum FeedKind {
    /// Newly introduced legislation
    NewLegislation,
    /// Actions recorded for one piece of legislation
    Updates { key: String },
    /// Top hits for a search query
    Search { query: String },
    /// A subscription's saved query, titled by its label
    Subscription { id: i64 },
}

#[derive(Subcommand)]
enum SchemaCommands {
    /// Export JSON Schema files for canonical types
    Export {
        /// Output directory (default: ./schemas)
        #[arg(long, default_value = "schemas")]
        out_dir: PathBuf,
    },
}

/// Link prefix for rendered feeds; the web front end owns real routing.
const BASE_URL: &str = "http://localhost:8000";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scrape { config, limit } => scrape(&cli.db, config.as_deref(), limit),
        Commands::Dashboard => dashboard(&cli.db),
        Commands::Members => members(&cli.db),
        Commands::Member { real_name } => member(&cli.db, &real_name),
        Commands::Legislation { key } => legislation(&cli.db, &key),
        Commands::Search { query, page } => search(&cli.db, &query, page),
        Commands::Feed { kind } => feed(&cli.db, kind),
        Commands::Schema { command } => match command {
            SchemaCommands::Export { out_dir } => schema_export(out_dir),
        },
    }
}

fn scrape(db_path: &str, config: Option<&Path>, limit: Option<usize>) -> Result<()> {
    let config = match config {
        Some(path) => ScrapeConfig::load(path)?,
        None => ScrapeConfig::default(),
    };
    let mut conn = db::open(db_path)?;
    let mut adapter = SiteAdapter::new(HttpSource::new(&config)?);

    let mut scraped = 0usize;
    while limit.is_none_or(|max| scraped < max) {
        let Some((_, summary)) = adapter.check_for_new_content("")? else {
            break;
        };
        let record = adapter.scrape_legis_file("", summary)?;
        db::store_scrape(&mut conn, &record)?;
        scraped += 1;
    }

    println!("Scraped {scraped} legislation records into {db_path}");
    Ok(())
}

fn dashboard(db_path: &str) -> Result<()> {
    let conn = db::open(db_path)?;
    let page = views::pages::dashboard(&conn)?;

    println!("Recent legislation:");
    for f in &page.legfiles {
        let bookmarks = page.bookmark_counts.get(&f.file.key).copied().unwrap_or(0);
        println!(
            "  {} {} [{}] {} ({} bookmarks)",
            f.file.file_type, f.file.id, f.file.status, f.file.title, bookmarks
        );
        if !f.topics.is_empty() {
            println!("    topics: {}", f.topics.join(", "));
        }
    }

    println!();
    println!("Active topics, last month:");
    for bar in &page.recent_topics {
        let width = (bar.percent_width / 10.0).round() as usize;
        println!("  {:<24} {:>4}  {}", bar.topic, bar.leg_count, "#".repeat(width));
    }

    if !page.recent_locations.is_empty() {
        println!();
        println!("Recently mentioned locations:");
        for location in &page.recent_locations {
            println!("  {}", location.name);
        }
    }
    Ok(())
}

fn members(db_path: &str) -> Result<()> {
    let conn = db::open(db_path)?;
    for group in views::pages::council_member_groups(&conn)? {
        println!("{}:", group.label);
        for m in &group.members {
            match &m.district {
                Some(district) => println!("  {} ({district})", m.real_name),
                None => println!("  {}", m.real_name),
            }
        }
    }
    Ok(())
}

fn member(db_path: &str, real_name: &str) -> Result<()> {
    let conn = db::open(db_path)?;
    let Some(detail) = views::pages::member_detail(&conn, real_name)? else {
        anyhow::bail!("no council member named {real_name:?}");
    };

    println!("{}", detail.member.real_name);
    if let Some(district) = &detail.district {
        println!("District: {district}");
    }

    println!("Recent legislation:");
    for f in &detail.recent_legislation {
        println!("  {} {} - {}", f.file.file_type, f.file.id, f.file.title);
    }

    println!("Topics:");
    for bar in &detail.topics {
        println!("  {:<24} {:>4}", bar.topic, bar.leg_count);
    }
    Ok(())
}

fn legislation(db_path: &str, key: &str) -> Result<()> {
    let conn = db::open(db_path)?;
    let Some(detail) = db::leg_file_detail(&conn, key)? else {
        anyhow::bail!("no legislation with key {key:?}");
    };

    let f = &detail.file;
    println!("{} {} [{}]", f.file_type, f.id, f.status);
    println!("{}", f.title);
    println!("Controlling body: {}", f.controlling_body);
    println!("Introduced: {}", f.intro_date);
    if !f.final_date.is_empty() {
        println!("Final action: {}", f.final_date);
    }
    if !f.sponsors.is_empty() {
        println!("Sponsors: {}", f.sponsors.join(", "));
    }
    if !detail.topics.is_empty() {
        println!("Topics: {}", detail.topics.join(", "));
    }

    if !detail.attachments.is_empty() {
        println!("Attachments:");
        for a in &detail.attachments {
            println!("  {}", a.file);
        }
    }

    if !detail.actions.is_empty() {
        println!("History:");
        for action in &detail.actions {
            println!(
                "  {} {}: {} ({})",
                action.date_taken, action.acting_body, action.motion, action.description
            );
        }
    }
    Ok(())
}

fn search(db_path: &str, query: &str, page_number: usize) -> Result<()> {
    let conn = db::open(db_path)?;
    let cache = MemoryCache::new();
    let results = ResultSet::new(&conn, FtsHitSource::new(&conn, query));

    let query_params = vec![("q".to_string(), query.to_string())];
    let page =
        views::pages::search_page(&conn, &cache, &results, "/search", &query_params, page_number)?;

    println!("{} results for {query:?}", page.total);
    for m in &page.results {
        match m {
            SearchMatch::LegFile(f) => {
                println!("  {} {} [{}] {}", f.file.file_type, f.file.id, f.file.status, f.file.title)
            }
            SearchMatch::Member(member) => println!("  Council member {}", member.real_name),
        }
    }

    let pages: Vec<String> = page
        .window
        .pages
        .iter()
        .map(|p| {
            if p.url.is_none() {
                format!("[{}]", p.number)
            } else {
                p.number.to_string()
            }
        })
        .collect();
    println!("Pages: {}", pages.join(" "));
    Ok(())
}

fn feed(db_path: &str, kind: FeedKind) -> Result<()> {
    let conn = db::open(db_path)?;
    let feed = match kind {
        FeedKind::NewLegislation => Some(views::feeds::new_legislation(&conn, BASE_URL)?),
        FeedKind::Updates { key } => views::feeds::legislation_updates(&conn, &key, BASE_URL)?,
        FeedKind::Search { query } => Some(views::feeds::search_results(&conn, &query, BASE_URL)?),
        FeedKind::Subscription { id } => views::feeds::subscription_content(&conn, id, BASE_URL)?,
    };

    match feed {
        Some(feed) => {
            print!("{}", feed.to_rss());
            Ok(())
        }
        None => anyhow::bail!("no such record"),
    }
}

fn schema_export(out_dir: PathBuf) -> Result<()> {
    fs::create_dir_all(&out_dir)?;

    write_schema(&out_dir, "LegFile", schema_for!(councilmatic_core::schema::LegFile))?;
    write_schema(&out_dir, "Attachment", schema_for!(councilmatic_core::schema::Attachment))?;
    write_schema(&out_dir, "Action", schema_for!(councilmatic_core::schema::Action))?;
    write_schema(&out_dir, "ScrapedFile", schema_for!(councilmatic_core::schema::ScrapedFile))?;
    write_schema(
        &out_dir,
        "CouncilMember",
        schema_for!(councilmatic_core::schema::CouncilMember),
    )?;

    println!("Exported schemas to {}", out_dir.display());
    Ok(())
}

fn write_schema(out_dir: &Path, name: &str, schema: schemars::schema::RootSchema) -> Result<()> {
    let json = serde_json::to_string_pretty(&schema)?;
    fs::write(out_dir.join(format!("{name}.schema.json")), json)?;
    Ok(())
}
