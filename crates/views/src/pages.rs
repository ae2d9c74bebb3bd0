use std::collections::HashMap;

use anyhow::Result;
use rusqlite::Connection;
use time::{Duration, OffsetDateTime};

use councilmatic_core::cache::{Cache, get_or_cache};
use councilmatic_core::db::{self, LegFileField, LegFileWithTopics, TopicCount};
use councilmatic_core::schema::{CouncilMember, Location};
use councilmatic_core::search::{HitSource, ResultSet, SearchMatch};

use crate::pagination::{PageWindow, page_window};

/// Topic used for procedural housekeeping files; excluded from every
/// "interesting recent activity" aggregation.
pub const ROUTINE_TOPIC: &str = "Routine";

pub const SEARCH_PAGE_SIZE: usize = 20;
const DASHBOARD_FILES: usize = 6;
const RECENT_LOCATIONS: usize = 10;
const TOPIC_WINDOW_DAYS: i64 = 31;

/// One row of the dashboard's topic bar chart. Widths are relative to the
/// busiest topic, so ties at the top all render full width.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicBar {
    pub topic: String,
    pub leg_count: i64,
    pub percent_width: f64,
}

pub fn topic_bars(counts: &[TopicCount]) -> Vec<TopicBar> {
    // counts arrive sorted by descending count, so the first row is the max
    let max = counts.first().map(|c| c.leg_count).unwrap_or(0);
    if max == 0 {
        return Vec::new();
    }
    counts
        .iter()
        .map(|c| TopicBar {
            topic: c.topic.clone(),
            leg_count: c.leg_count,
            percent_width: 100.0 * c.leg_count as f64 / max as f64,
        })
        .collect()
}

#[derive(Debug)]
pub struct Dashboard {
    pub legfiles: Vec<LegFileWithTopics>,
    pub recent_topics: Vec<TopicBar>,
    pub recent_locations: Vec<Location>,
    pub bookmark_counts: HashMap<String, i64>,
}

pub fn dashboard(conn: &Connection) -> Result<Dashboard> {
    let legfiles = db::recent_leg_files(conn, DASHBOARD_FILES, Some(ROUTINE_TOPIC))?;
    let keys: Vec<String> = legfiles.iter().map(|f| f.file.key.clone()).collect();

    let since = OffsetDateTime::now_utc().date() - Duration::days(TOPIC_WINDOW_DAYS);
    let counts = db::topic_counts_since(conn, since, ROUTINE_TOPIC)?;

    Ok(Dashboard {
        recent_topics: topic_bars(&counts),
        recent_locations: db::recent_locations(conn, RECENT_LOCATIONS)?,
        bookmark_counts: db::bookmarks_for_keys(conn, &keys)?,
        legfiles,
    })
}

#[derive(Debug)]
pub struct MemberGroup {
    pub label: &'static str,
    pub slug: &'static str,
    pub members: Vec<CouncilMember>,
}

/// Council members split into district / at-large / former, each group in
/// name order.
pub fn council_member_groups(conn: &Connection) -> Result<Vec<MemberGroup>> {
    let members = db::all_members(conn)?;

    let mut district = Vec::new();
    let mut at_large = Vec::new();
    let mut former = Vec::new();
    for member in members {
        if !member.active {
            former.push(member);
        } else if member.at_large {
            at_large.push(member);
        } else {
            district.push(member);
        }
    }

    Ok(vec![
        MemberGroup {
            label: "District",
            slug: "district",
            members: district,
        },
        MemberGroup {
            label: "At Large",
            slug: "at-large",
            members: at_large,
        },
        MemberGroup {
            label: "Former",
            slug: "former",
            members: former,
        },
    ])
}

#[derive(Debug)]
pub struct MemberDetail {
    pub member: CouncilMember,
    pub district: Option<String>,
    pub recent_legislation: Vec<LegFileWithTopics>,
    pub topics: Vec<TopicBar>,
}

pub fn member_detail(conn: &Connection, real_name: &str) -> Result<Option<MemberDetail>> {
    let Some(member) = db::member_by_name(conn, real_name)? else {
        return Ok(None);
    };
    let recent_legislation = db::leg_files_sponsored_by(conn, member.id, DASHBOARD_FILES)?;
    let counts = db::member_topic_counts(conn, member.id, ROUTINE_TOPIC)?;

    Ok(Some(MemberDetail {
        district: member.district.clone(),
        recent_legislation,
        topics: topic_bars(&counts),
        member,
    }))
}

/// Option lists for the search form's filter dropdowns. Slow-changing, so
/// each list is read through the cache under a `search:` key.
#[derive(Debug, PartialEq, Eq)]
pub struct SearchFacets {
    pub topics: Vec<String>,
    pub statuses: Vec<String>,
    pub controlling_bodies: Vec<String>,
    pub file_types: Vec<String>,
    pub sponsors: Vec<String>,
}

pub fn search_facets(conn: &Connection, cache: &dyn Cache) -> Result<SearchFacets> {
    Ok(SearchFacets {
        topics: get_or_cache(cache, "search:topics", || {
            Ok(db::all_topics(conn)?.into_iter().map(|t| t.topic).collect())
        })?,
        statuses: get_or_cache(cache, "search:statuses", || {
            Ok(db::legfile_choices(conn, LegFileField::Status)?)
        })?,
        controlling_bodies: get_or_cache(cache, "search:controlling_bodies", || {
            Ok(db::legfile_choices(conn, LegFileField::ControllingBody)?)
        })?,
        file_types: get_or_cache(cache, "search:file_types", || {
            Ok(db::legfile_choices(conn, LegFileField::FileType)?)
        })?,
        sponsors: get_or_cache(cache, "search:sponsors", || {
            Ok(db::all_members(conn)?
                .into_iter()
                .map(|m| m.real_name)
                .collect())
        })?,
    })
}

#[derive(Debug)]
pub struct SearchPage {
    pub results: Vec<SearchMatch>,
    pub total: usize,
    pub window: PageWindow,
    pub facets: SearchFacets,
    pub bookmark_counts: HashMap<String, i64>,
}

/// One page of reconciled search results with its pagination window and
/// the filter facets.
pub fn search_page<S: HitSource>(
    conn: &Connection,
    cache: &dyn Cache,
    results: &ResultSet<'_, S>,
    path: &str,
    query_params: &[(String, String)],
    page: usize,
) -> Result<SearchPage> {
    let total = results.count()?;
    let total_pages = total.div_ceil(SEARCH_PAGE_SIZE).max(1);
    let page = page.clamp(1, total_pages);

    let start = (page - 1) * SEARCH_PAGE_SIZE;
    let end = (start + SEARCH_PAGE_SIZE).min(total);
    let matches = results.slice(start..end.max(start))?;

    let keys: Vec<String> = matches
        .iter()
        .filter_map(|m| match m {
            SearchMatch::LegFile(f) => Some(f.file.key.clone()),
            SearchMatch::Member(_) => None,
        })
        .collect();

    Ok(SearchPage {
        window: page_window(path, query_params, page, total_pages),
        facets: search_facets(conn, cache)?,
        bookmark_counts: db::bookmarks_for_keys(conn, &keys)?,
        total,
        results: matches,
    })
}
