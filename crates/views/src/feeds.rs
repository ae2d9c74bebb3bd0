use anyhow::Result;
use rusqlite::Connection;
use time::Date;
use time::format_description::well_known::Rfc2822;

use councilmatic_core::db::{self, LegFileWithTopics};
use councilmatic_core::search::{FtsHitSource, ResultSet, SearchMatch};

const MAX_ITEMS: usize = 100;

#[derive(Debug, Clone)]
pub struct Feed {
    pub title: String,
    pub link: String,
    pub description: String,
    pub items: Vec<FeedItem>,
}

#[derive(Debug, Clone)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub description: String,
    pub pubdate: Option<String>, // RFC 2822
}

/// Newly introduced legislation, newest first, untitled rows skipped.
pub fn new_legislation(conn: &Connection, base_url: &str) -> Result<Feed> {
    let files = db::recent_leg_files(conn, MAX_ITEMS, None)?;
    Ok(Feed {
        title: "New Legislation".to_string(),
        link: base_url.to_string(),
        description: "Newly introduced legislation".to_string(),
        items: files.iter().map(|f| leg_file_item(f, base_url)).collect(),
    })
}

/// One item per recorded action of a single piece of legislation, or
/// `None` when the key is unknown.
pub fn legislation_updates(conn: &Connection, key: &str, base_url: &str) -> Result<Option<Feed>> {
    let Some(detail) = db::leg_file_detail(conn, key)? else {
        return Ok(None);
    };

    let link = format!("{base_url}/legislation/{key}");
    let items = detail
        .actions
        .iter()
        .map(|action| FeedItem {
            title: format!("{}: {}", action.acting_body, action.motion),
            link: link.clone(),
            description: action.description.clone(),
            pubdate: action.date_taken.as_date().map(rfc2822_midnight),
        })
        .collect();

    Ok(Some(Feed {
        title: format!("Updates to {} {}", detail.file.file_type, detail.file.id),
        link,
        description: detail.file.title,
        items,
    }))
}

/// The top search hits for a free-text query, reconciled to their records.
pub fn search_results(conn: &Connection, query: &str, base_url: &str) -> Result<Feed> {
    let results = ResultSet::new(conn, FtsHitSource::new(conn, query));
    let total = results.count()?;
    let matches = results.slice(0..total.min(MAX_ITEMS))?;

    let items = matches
        .iter()
        .map(|m| match m {
            SearchMatch::LegFile(f) => leg_file_item(f, base_url),
            SearchMatch::Member(member) => FeedItem {
                title: member.real_name.clone(),
                link: format!("{base_url}/councilmembers/{}", member.id),
                description: member.district.clone().unwrap_or_default(),
                pubdate: None,
            },
        })
        .collect();

    Ok(Feed {
        title: format!("Search: {query}"),
        link: base_url.to_string(),
        description: format!("Legislation matching \"{query}\""),
        items,
    })
}

/// A subscription's saved query, re-run and titled by its label, or `None`
/// when the subscription is unknown.
pub fn subscription_content(
    conn: &Connection,
    subscription_id: i64,
    base_url: &str,
) -> Result<Option<Feed>> {
    let Some(sub) = db::subscription(conn, subscription_id)? else {
        return Ok(None);
    };
    let mut feed = search_results(conn, &sub.query, base_url)?;
    feed.title = sub.label.clone();
    feed.description = sub.label;
    Ok(Some(feed))
}

fn leg_file_item(f: &LegFileWithTopics, base_url: &str) -> FeedItem {
    FeedItem {
        title: format!("{} {}", f.file.file_type, f.file.id),
        link: format!("{base_url}/legislation/{}", f.file.key),
        description: f.file.title.clone(),
        pubdate: f.file.intro_date.as_date().map(rfc2822_midnight),
    }
}

fn rfc2822_midnight(date: Date) -> String {
    date.midnight()
        .assume_utc()
        .format(&Rfc2822)
        .unwrap_or_default()
}

impl Feed {
    /// Render as an RSS 2.0 document.
    pub fn to_rss(&self) -> String {
        let mut xml = String::new();
        xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        xml.push_str("<rss version=\"2.0\">\n");
        xml.push_str("<channel>\n");
        push_tag(&mut xml, "title", &self.title);
        push_tag(&mut xml, "link", &self.link);
        push_tag(&mut xml, "description", &self.description);

        for item in &self.items {
            xml.push_str("<item>\n");
            push_tag(&mut xml, "title", &item.title);
            push_tag(&mut xml, "link", &item.link);
            push_tag(&mut xml, "description", &item.description);
            if let Some(pubdate) = &item.pubdate {
                push_tag(&mut xml, "pubDate", pubdate);
            }
            xml.push_str("</item>\n");
        }

        xml.push_str("</channel>\n");
        xml.push_str("</rss>\n");
        xml
    }
}

fn push_tag(xml: &mut String, tag: &str, value: &str) {
    xml.push_str("  <");
    xml.push_str(tag);
    xml.push('>');
    xml.push_str(&xml_escape(value));
    xml.push_str("</");
    xml.push_str(tag);
    xml.push_str(">\n");
}

fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}
