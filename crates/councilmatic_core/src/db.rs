use std::collections::HashMap;

use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use time::Date;

use crate::error::Result;
use crate::schema::{
    Action, Attachment, Bookmark, CouncilMember, FileDate, LegFile, Location, ScrapedFile,
    Subscription, Topic,
};
use crate::search::ModelKind;

const LEG_FILE_COLUMNS: &str = "key, id, url, file_type, status, title, controlling_body, \
     intro_date, final_date, version, sponsors_json, minutes_url";

pub fn open(db_path: &str) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    init(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init(&conn)?;
    Ok(conn)
}

fn init(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS leg_files (
          key TEXT PRIMARY KEY,
          id TEXT NOT NULL,
          url TEXT NOT NULL,
          file_type TEXT NOT NULL,
          status TEXT NOT NULL,
          title TEXT NOT NULL,
          controlling_body TEXT NOT NULL,
          intro_date TEXT NOT NULL,
          final_date TEXT NOT NULL,
          version TEXT NOT NULL,
          sponsors_json TEXT NOT NULL,
          minutes_url TEXT,
          updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
        );

        CREATE INDEX IF NOT EXISTS idx_leg_files_intro_date ON leg_files(intro_date);

        CREATE TABLE IF NOT EXISTS attachments (
          id INTEGER PRIMARY KEY,
          legfile_key TEXT NOT NULL REFERENCES leg_files(key),
          file TEXT NOT NULL,
          url TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_attachments_key ON attachments(legfile_key);

        CREATE TABLE IF NOT EXISTS actions (
          id INTEGER PRIMARY KEY,
          legfile_key TEXT NOT NULL REFERENCES leg_files(key),
          seq INTEGER NOT NULL,
          date_taken TEXT NOT NULL,
          acting_body TEXT NOT NULL,
          motion TEXT NOT NULL,
          description TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_actions_key ON actions(legfile_key, seq);

        CREATE TABLE IF NOT EXISTS council_members (
          id INTEGER PRIMARY KEY,
          real_name TEXT NOT NULL UNIQUE,
          district TEXT,
          at_large INTEGER NOT NULL DEFAULT 0,
          active INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS topics (
          id INTEGER PRIMARY KEY,
          topic TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS leg_file_topics (
          legfile_key TEXT NOT NULL REFERENCES leg_files(key),
          topic_id INTEGER NOT NULL REFERENCES topics(id),
          UNIQUE (legfile_key, topic_id)
        );

        CREATE TABLE IF NOT EXISTS leg_file_sponsors (
          legfile_key TEXT NOT NULL REFERENCES leg_files(key),
          member_id INTEGER NOT NULL REFERENCES council_members(id),
          UNIQUE (legfile_key, member_id)
        );

        CREATE TABLE IF NOT EXISTS locations (
          id INTEGER PRIMARY KEY,
          name TEXT NOT NULL UNIQUE,
          valid INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS leg_file_locations (
          legfile_key TEXT NOT NULL REFERENCES leg_files(key),
          location_id INTEGER NOT NULL REFERENCES locations(id),
          UNIQUE (legfile_key, location_id)
        );

        CREATE TABLE IF NOT EXISTS subscriptions (
          id INTEGER PRIMARY KEY,
          label TEXT NOT NULL,
          query TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS bookmarks (
          id INTEGER PRIMARY KEY,
          user TEXT NOT NULL,
          legfile_key TEXT NOT NULL REFERENCES leg_files(key),
          UNIQUE (user, legfile_key)
        );

        CREATE VIRTUAL TABLE IF NOT EXISTS search_index USING fts5(
          kind UNINDEXED,
          ref_key UNINDEXED,
          body
        );
        "#,
    )?;
    Ok(())
}

/// A legislation record with its topic tags attached, the shape most list
/// pages want.
#[derive(Debug, Clone)]
pub struct LegFileWithTopics {
    pub file: LegFile,
    pub topics: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct LegFileDetail {
    pub file: LegFile,
    pub topics: Vec<String>,
    pub attachments: Vec<Attachment>,
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicCount {
    pub id: i64,
    pub topic: String,
    pub leg_count: i64,
}

/// Persist one adapter result in a single transaction so attachments and
/// actions never become visible without their record. Re-running a scrape
/// replaces the dependent rows rather than appending duplicates.
pub fn store_scrape(conn: &mut Connection, scrape: &ScrapedFile) -> Result<()> {
    let tx = conn.transaction()?;
    upsert_leg_file(&tx, &scrape.file)?;
    replace_attachments(&tx, &scrape.file.key, &scrape.attachments)?;
    replace_actions(&tx, &scrape.file.key, &scrape.actions)?;
    tx.commit()?;
    Ok(())
}

pub fn upsert_leg_file(conn: &Connection, file: &LegFile) -> Result<()> {
    let sponsors_json = serde_json::to_string(&file.sponsors)?;

    conn.execute(
        r#"
        INSERT INTO leg_files (
          key, id, url, file_type, status, title, controlling_body,
          intro_date, final_date, version, sponsors_json, minutes_url
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        ON CONFLICT(key) DO UPDATE SET
          id=excluded.id,
          url=excluded.url,
          file_type=excluded.file_type,
          status=excluded.status,
          title=excluded.title,
          controlling_body=excluded.controlling_body,
          intro_date=excluded.intro_date,
          final_date=excluded.final_date,
          version=excluded.version,
          sponsors_json=excluded.sponsors_json,
          minutes_url=excluded.minutes_url,
          updated_at=strftime('%Y-%m-%dT%H:%M:%fZ','now')
        "#,
        params![
            file.key,
            file.id,
            file.url,
            file.file_type,
            file.status,
            file.title,
            file.controlling_body,
            file.intro_date.to_string(),
            file.final_date.to_string(),
            file.version,
            sponsors_json,
            file.minutes_url,
        ],
    )?;

    index_document(conn, ModelKind::LegFile, &file.key, &leg_file_body(file))?;
    Ok(())
}

fn leg_file_body(file: &LegFile) -> String {
    format!(
        "{} {} {} {} {}",
        file.id,
        file.title,
        file.file_type,
        file.status,
        file.sponsors.join(" ")
    )
}

pub fn replace_attachments(conn: &Connection, key: &str, attachments: &[Attachment]) -> Result<()> {
    conn.execute("DELETE FROM attachments WHERE legfile_key = ?1", params![key])?;
    for a in attachments {
        conn.execute(
            "INSERT INTO attachments (legfile_key, file, url) VALUES (?1, ?2, ?3)",
            params![a.key, a.file, a.url],
        )?;
    }
    Ok(())
}

pub fn replace_actions(conn: &Connection, key: &str, actions: &[Action]) -> Result<()> {
    conn.execute("DELETE FROM actions WHERE legfile_key = ?1", params![key])?;
    for (seq, act) in actions.iter().enumerate() {
        conn.execute(
            r#"
            INSERT INTO actions (legfile_key, seq, date_taken, acting_body, motion, description)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                act.key,
                seq as i64,
                act.date_taken.to_string(),
                act.acting_body,
                act.motion,
                act.description,
            ],
        )?;
    }
    Ok(())
}

pub fn upsert_member(conn: &Connection, member: &CouncilMember) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO council_members (id, real_name, district, at_large, active)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(id) DO UPDATE SET
          real_name=excluded.real_name,
          district=excluded.district,
          at_large=excluded.at_large,
          active=excluded.active
        "#,
        params![
            member.id,
            member.real_name,
            member.district,
            member.at_large,
            member.active,
        ],
    )?;

    let body = match &member.district {
        Some(district) => format!("{} {district}", member.real_name),
        None => member.real_name.clone(),
    };
    index_document(conn, ModelKind::CouncilMember, &member.id.to_string(), &body)?;
    Ok(())
}

fn index_document(conn: &Connection, kind: ModelKind, ref_key: &str, body: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM search_index WHERE kind = ?1 AND ref_key = ?2",
        params![kind.as_str(), ref_key],
    )?;
    conn.execute(
        "INSERT INTO search_index (kind, ref_key, body) VALUES (?1, ?2, ?3)",
        params![kind.as_str(), ref_key, body],
    )?;
    Ok(())
}

/// Drop a record's search document. Used when a row is deleted out-of-band;
/// the reconciliation layer tolerates documents that outlive their rows.
pub fn deindex(conn: &Connection, kind: ModelKind, ref_key: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM search_index WHERE kind = ?1 AND ref_key = ?2",
        params![kind.as_str(), ref_key],
    )?;
    Ok(())
}

pub fn upsert_topic(conn: &Connection, topic: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO topics (topic) VALUES (?1) ON CONFLICT(topic) DO NOTHING",
        params![topic],
    )?;
    let id = conn.query_row("SELECT id FROM topics WHERE topic = ?1", params![topic], |row| {
        row.get(0)
    })?;
    Ok(id)
}

pub fn tag_leg_file(conn: &Connection, key: &str, topic_id: i64) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO leg_file_topics (legfile_key, topic_id) VALUES (?1, ?2)",
        params![key, topic_id],
    )?;
    Ok(())
}

pub fn link_sponsor(conn: &Connection, key: &str, member_id: i64) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO leg_file_sponsors (legfile_key, member_id) VALUES (?1, ?2)",
        params![key, member_id],
    )?;
    Ok(())
}

pub fn upsert_location(conn: &Connection, name: &str, valid: bool) -> Result<i64> {
    conn.execute(
        r#"
        INSERT INTO locations (name, valid) VALUES (?1, ?2)
        ON CONFLICT(name) DO UPDATE SET valid=excluded.valid
        "#,
        params![name, valid],
    )?;
    let id = conn.query_row("SELECT id FROM locations WHERE name = ?1", params![name], |row| {
        row.get(0)
    })?;
    Ok(id)
}

pub fn link_location(conn: &Connection, key: &str, location_id: i64) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO leg_file_locations (legfile_key, location_id) VALUES (?1, ?2)",
        params![key, location_id],
    )?;
    Ok(())
}

pub fn insert_subscription(conn: &Connection, label: &str, query: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO subscriptions (label, query) VALUES (?1, ?2)",
        params![label, query],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_bookmark(conn: &Connection, user: &str, key: &str) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO bookmarks (user, legfile_key) VALUES (?1, ?2)",
        params![user, key],
    )?;
    Ok(())
}

pub fn bookmarks_for_user(conn: &Connection, user: &str) -> Result<Vec<Bookmark>> {
    let mut stmt = conn.prepare(
        "SELECT id, user, legfile_key FROM bookmarks WHERE user = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![user], |row| {
        Ok(Bookmark {
            id: row.get(0)?,
            user: row.get(1)?,
            legfile_key: row.get(2)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

fn leg_file_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<LegFile> {
    let intro_date: String = row.get(7)?;
    let final_date: String = row.get(8)?;
    let sponsors_json: String = row.get(10)?;
    Ok(LegFile {
        key: row.get(0)?,
        id: row.get(1)?,
        url: row.get(2)?,
        file_type: row.get(3)?,
        status: row.get(4)?,
        title: row.get(5)?,
        controlling_body: row.get(6)?,
        intro_date: FileDate::from_iso(&intro_date).map_err(|e| conversion_error(7, e))?,
        final_date: FileDate::from_iso(&final_date).map_err(|e| conversion_error(8, e))?,
        version: row.get(9)?,
        sponsors: serde_json::from_str(&sponsors_json).map_err(|e| conversion_error(10, e))?,
        minutes_url: row.get(11)?,
    })
}

fn conversion_error(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

fn member_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CouncilMember> {
    Ok(CouncilMember {
        id: row.get(0)?,
        real_name: row.get(1)?,
        district: row.get(2)?,
        at_large: row.get(3)?,
        active: row.get(4)?,
    })
}

fn repeat_vars(count: usize) -> String {
    let mut vars = "?,".repeat(count);
    vars.pop();
    vars
}

/// Newest interesting legislation: untitled rows are placeholder records
/// and are skipped; `exclude_topic` drops anything tagged with the routine
/// topic. Keys are numeric strings assigned in scrape order.
pub fn recent_leg_files(
    conn: &Connection,
    limit: usize,
    exclude_topic: Option<&str>,
) -> Result<Vec<LegFileWithTopics>> {
    let sql = match exclude_topic {
        Some(_) => format!(
            r#"
            SELECT {LEG_FILE_COLUMNS} FROM leg_files
            WHERE title != ''
              AND key NOT IN (
                SELECT leg_file_topics.legfile_key FROM leg_file_topics
                JOIN topics ON topics.id = leg_file_topics.topic_id
                WHERE topics.topic = ?1
              )
            ORDER BY CAST(key AS INTEGER) DESC
            LIMIT ?2
            "#
        ),
        None => format!(
            r#"
            SELECT {LEG_FILE_COLUMNS} FROM leg_files
            WHERE title != ''
            ORDER BY CAST(key AS INTEGER) DESC
            LIMIT ?1
            "#
        ),
    };

    let mut stmt = conn.prepare(&sql)?;
    let files: Vec<LegFile> = match exclude_topic {
        Some(topic) => stmt
            .query_map(params![topic, limit as i64], leg_file_from_row)?
            .collect::<rusqlite::Result<_>>()?,
        None => stmt
            .query_map(params![limit as i64], leg_file_from_row)?
            .collect::<rusqlite::Result<_>>()?,
    };

    attach_topics(conn, files)
}

pub fn leg_file(conn: &Connection, key: &str) -> Result<Option<LegFileWithTopics>> {
    let mut found = leg_files_by_keys(conn, &[key.to_string()])?;
    Ok(found.pop())
}

pub fn leg_file_detail(conn: &Connection, key: &str) -> Result<Option<LegFileDetail>> {
    let Some(with_topics) = leg_file(conn, key)? else {
        return Ok(None);
    };
    Ok(Some(LegFileDetail {
        attachments: attachments_for(conn, key)?,
        actions: actions_for(conn, key)?,
        file: with_topics.file,
        topics: with_topics.topics,
    }))
}

/// Batched lookup used by search reconciliation: one query for the rows,
/// one for their topic tags. Output order is unspecified.
pub fn leg_files_by_keys(conn: &Connection, keys: &[String]) -> Result<Vec<LegFileWithTopics>> {
    if keys.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT {LEG_FILE_COLUMNS} FROM leg_files WHERE key IN ({})",
        repeat_vars(keys.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let files: Vec<LegFile> = stmt
        .query_map(params_from_iter(keys.iter()), leg_file_from_row)?
        .collect::<rusqlite::Result<_>>()?;
    attach_topics(conn, files)
}

fn attach_topics(conn: &Connection, files: Vec<LegFile>) -> Result<Vec<LegFileWithTopics>> {
    let keys: Vec<String> = files.iter().map(|f| f.key.clone()).collect();
    let mut topics = topics_for_keys(conn, &keys)?;
    Ok(files
        .into_iter()
        .map(|file| {
            let topics = topics.remove(&file.key).unwrap_or_default();
            LegFileWithTopics { file, topics }
        })
        .collect())
}

fn topics_for_keys(conn: &Connection, keys: &[String]) -> Result<HashMap<String, Vec<String>>> {
    if keys.is_empty() {
        return Ok(HashMap::new());
    }
    let sql = format!(
        r#"
        SELECT leg_file_topics.legfile_key, topics.topic FROM leg_file_topics
        JOIN topics ON topics.id = leg_file_topics.topic_id
        WHERE leg_file_topics.legfile_key IN ({})
        ORDER BY topics.topic
        "#,
        repeat_vars(keys.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(keys.iter()), |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut by_key: HashMap<String, Vec<String>> = HashMap::new();
    for row in rows {
        let (key, topic) = row?;
        by_key.entry(key).or_default().push(topic);
    }
    Ok(by_key)
}

pub fn attachments_for(conn: &Connection, key: &str) -> Result<Vec<Attachment>> {
    let mut stmt = conn.prepare(
        "SELECT legfile_key, file, url FROM attachments WHERE legfile_key = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![key], |row| {
        Ok(Attachment {
            key: row.get(0)?,
            file: row.get(1)?,
            url: row.get(2)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

pub fn actions_for(conn: &Connection, key: &str) -> Result<Vec<Action>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT legfile_key, date_taken, acting_body, motion, description
        FROM actions WHERE legfile_key = ?1 ORDER BY seq
        "#,
    )?;
    let rows = stmt.query_map(params![key], |row| {
        let date_taken: String = row.get(1)?;
        Ok(Action {
            key: row.get(0)?,
            date_taken: FileDate::from_iso(&date_taken).map_err(|e| conversion_error(1, e))?,
            acting_body: row.get(2)?,
            motion: row.get(3)?,
            description: row.get(4)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

pub fn all_members(conn: &Connection) -> Result<Vec<CouncilMember>> {
    let mut stmt = conn.prepare(
        "SELECT id, real_name, district, at_large, active FROM council_members ORDER BY real_name",
    )?;
    let rows = stmt.query_map([], member_from_row)?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

pub fn member_by_name(conn: &Connection, real_name: &str) -> Result<Option<CouncilMember>> {
    let member = conn
        .query_row(
            "SELECT id, real_name, district, at_large, active FROM council_members WHERE real_name = ?1",
            params![real_name],
            member_from_row,
        )
        .optional()?;
    Ok(member)
}

pub fn members_by_ids(conn: &Connection, ids: &[i64]) -> Result<Vec<CouncilMember>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT id, real_name, district, at_large, active FROM council_members WHERE id IN ({})",
        repeat_vars(ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(ids.iter()), member_from_row)?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

/// Legislation sponsored by one member, newest first, untitled rows skipped.
pub fn leg_files_sponsored_by(
    conn: &Connection,
    member_id: i64,
    limit: usize,
) -> Result<Vec<LegFileWithTopics>> {
    let sql = format!(
        r#"
        SELECT {LEG_FILE_COLUMNS} FROM leg_files
        WHERE title != ''
          AND key IN (SELECT legfile_key FROM leg_file_sponsors WHERE member_id = ?1)
        ORDER BY CAST(key AS INTEGER) DESC
        LIMIT ?2
        "#
    );
    let mut stmt = conn.prepare(&sql)?;
    let files: Vec<LegFile> = stmt
        .query_map(params![member_id, limit as i64], leg_file_from_row)?
        .collect::<rusqlite::Result<_>>()?;
    attach_topics(conn, files)
}

pub fn recent_locations(conn: &Connection, limit: usize) -> Result<Vec<Location>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, valid FROM locations WHERE valid = 1 ORDER BY id DESC LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit as i64], |row| {
        Ok(Location {
            id: row.get(0)?,
            name: row.get(1)?,
            valid: row.get(2)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

pub fn subscription(conn: &Connection, id: i64) -> Result<Option<Subscription>> {
    let sub = conn
        .query_row(
            "SELECT id, label, query FROM subscriptions WHERE id = ?1",
            params![id],
            |row| {
                Ok(Subscription {
                    id: row.get(0)?,
                    label: row.get(1)?,
                    query: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(sub)
}

/// Bookmark counts per legislation key, for badge rendering on list pages.
pub fn bookmarks_for_keys(conn: &Connection, keys: &[String]) -> Result<HashMap<String, i64>> {
    if keys.is_empty() {
        return Ok(HashMap::new());
    }
    let sql = format!(
        r#"
        SELECT legfile_key, COUNT(*) FROM bookmarks
        WHERE legfile_key IN ({})
        GROUP BY legfile_key
        "#,
        repeat_vars(keys.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(keys.iter()), |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;

    let mut counts = HashMap::new();
    for row in rows {
        let (key, count) = row?;
        counts.insert(key, count);
    }
    Ok(counts)
}

pub fn all_topics(conn: &Connection) -> Result<Vec<Topic>> {
    let mut stmt = conn.prepare("SELECT id, topic FROM topics ORDER BY topic")?;
    let rows = stmt.query_map([], |row| {
        Ok(Topic {
            id: row.get(0)?,
            topic: row.get(1)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

/// Facet columns a search form can filter on.
#[derive(Debug, Clone, Copy)]
pub enum LegFileField {
    Status,
    FileType,
    ControllingBody,
}

impl LegFileField {
    fn column(self) -> &'static str {
        match self {
            LegFileField::Status => "status",
            LegFileField::FileType => "file_type",
            LegFileField::ControllingBody => "controlling_body",
        }
    }
}

pub fn legfile_choices(conn: &Connection, field: LegFileField) -> Result<Vec<String>> {
    let col = field.column();
    let sql = format!("SELECT DISTINCT {col} FROM leg_files ORDER BY {col}");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

/// Legislation-per-topic counts for files introduced after `since`,
/// excluding the routine topic, busiest topics first.
pub fn topic_counts_since(conn: &Connection, since: Date, routine: &str) -> Result<Vec<TopicCount>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT topics.id, topics.topic, COUNT(leg_file_topics.legfile_key) AS leg_count
        FROM topics
        JOIN leg_file_topics ON leg_file_topics.topic_id = topics.id
        JOIN leg_files ON leg_files.key = leg_file_topics.legfile_key
        WHERE leg_files.intro_date > ?1 AND topics.topic != ?2
        GROUP BY topics.topic, topics.id
        ORDER BY leg_count DESC
        "#,
    )?;
    let since = FileDate::On(since).to_string();
    let rows = stmt.query_map(params![since, routine], topic_count_from_row)?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

/// All-time legislation-per-topic counts for one sponsor, excluding the
/// routine topic.
pub fn member_topic_counts(
    conn: &Connection,
    member_id: i64,
    routine: &str,
) -> Result<Vec<TopicCount>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT topics.id, topics.topic, COUNT(leg_file_topics.legfile_key) AS leg_count
        FROM topics
        JOIN leg_file_topics ON leg_file_topics.topic_id = topics.id
        JOIN leg_files ON leg_files.key = leg_file_topics.legfile_key
        JOIN leg_file_sponsors ON leg_file_sponsors.legfile_key = leg_files.key
        WHERE topics.topic != ?1 AND leg_file_sponsors.member_id = ?2
        GROUP BY topics.topic, topics.id
        ORDER BY leg_count DESC
        "#,
    )?;
    let rows = stmt.query_map(params![routine, member_id], topic_count_from_row)?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

fn topic_count_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TopicCount> {
    Ok(TopicCount {
        id: row.get(0)?,
        topic: row.get(1)?,
        leg_count: row.get(2)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FileDate;
    use pretty_assertions::assert_eq;
    use time::macros::date;

    fn sample_file(key: &str, title: &str, intro: FileDate) -> LegFile {
        LegFile {
            key: key.to_string(),
            id: format!("Bill {key}"),
            url: format!("https://council.example.gov/Legislation.aspx?ID={key}"),
            file_type: "Bill".to_string(),
            status: "In Committee".to_string(),
            title: title.to_string(),
            controlling_body: "Committee on Finance".to_string(),
            intro_date: intro,
            final_date: FileDate::Empty,
            version: "0".to_string(),
            sponsors: vec!["Jane Smith".to_string()],
            minutes_url: None,
        }
    }

    fn tagged(conn: &Connection, key: &str, title: &str, intro: FileDate, topics: &[&str]) {
        upsert_leg_file(conn, &sample_file(key, title, intro)).unwrap();
        for topic in topics {
            let id = upsert_topic(conn, topic).unwrap();
            tag_leg_file(conn, key, id).unwrap();
        }
    }

    #[test]
    fn upsert_is_idempotent_on_key() {
        let conn = open_in_memory().unwrap();
        let mut file = sample_file("100", "First title", FileDate::Empty);
        upsert_leg_file(&conn, &file).unwrap();
        file.title = "Second title".to_string();
        upsert_leg_file(&conn, &file).unwrap();

        let stored = leg_file(&conn, "100").unwrap().unwrap();
        assert_eq!(stored.file.title, "Second title");
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM leg_files", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn store_scrape_replaces_dependent_rows() {
        let mut conn = open_in_memory().unwrap();
        let file = sample_file("200", "Paving contract", FileDate::On(date!(2020 - 03 - 01)));
        let scrape = ScrapedFile {
            attachments: vec![Attachment {
                key: "200".to_string(),
                file: "Exhibit A".to_string(),
                url: None,
            }],
            actions: vec![
                Action {
                    key: "200".to_string(),
                    date_taken: FileDate::On(date!(2020 - 03 - 02)),
                    acting_body: "City Council".to_string(),
                    motion: "Referred".to_string(),
                    description: "Referred to committee".to_string(),
                },
                Action {
                    key: "200".to_string(),
                    date_taken: FileDate::On(date!(2020 - 03 - 09)),
                    acting_body: "Committee on Streets".to_string(),
                    motion: "Approved".to_string(),
                    description: "Reported favorably".to_string(),
                },
            ],
            minutes: Vec::new(),
            file,
        };
        store_scrape(&mut conn, &scrape).unwrap();
        store_scrape(&mut conn, &scrape).unwrap();

        let detail = leg_file_detail(&conn, "200").unwrap().unwrap();
        assert_eq!(detail.attachments.len(), 1);
        assert_eq!(detail.actions.len(), 2);
        // history order survives the round trip
        assert_eq!(detail.actions[0].motion, "Referred");
        assert_eq!(detail.actions[1].motion, "Approved");
    }

    #[test]
    fn recent_leg_files_skips_untitled_and_routine() {
        let conn = open_in_memory().unwrap();
        tagged(&conn, "1", "Zoning variance", FileDate::Empty, &["Zoning"]);
        tagged(&conn, "2", "", FileDate::Empty, &[]);
        tagged(&conn, "3", "Street renaming", FileDate::Empty, &["Routine"]);
        tagged(&conn, "10", "Budget amendment", FileDate::Empty, &["Budget"]);

        let recent = recent_leg_files(&conn, 6, Some("Routine")).unwrap();
        let keys: Vec<&str> = recent.iter().map(|f| f.file.key.as_str()).collect();
        // numeric ordering, not lexical: 10 outranks 3
        assert_eq!(keys, vec!["10", "1"]);
        assert_eq!(recent[0].topics, vec!["Budget".to_string()]);
    }

    #[test]
    fn topic_counts_exclude_routine_and_window() {
        let conn = open_in_memory().unwrap();
        let inside = FileDate::On(date!(2020 - 06 - 10));
        let outside = FileDate::On(date!(2019 - 01 - 01));
        tagged(&conn, "1", "a", inside, &["Zoning"]);
        tagged(&conn, "2", "b", inside, &["Zoning", "Budget"]);
        tagged(&conn, "3", "c", inside, &["Routine"]);
        tagged(&conn, "4", "d", outside, &["Budget"]);

        let counts = topic_counts_since(&conn, date!(2020 - 06 - 01), "Routine").unwrap();
        assert_eq!(counts.len(), 2);
        assert_eq!(counts[0].topic, "Zoning");
        assert_eq!(counts[0].leg_count, 2);
        assert_eq!(counts[1].topic, "Budget");
        assert_eq!(counts[1].leg_count, 1);
    }

    #[test]
    fn member_topic_counts_follow_sponsorship() {
        let conn = open_in_memory().unwrap();
        let member = CouncilMember {
            id: 7,
            real_name: "Jane Smith".to_string(),
            district: Some("2nd".to_string()),
            at_large: false,
            active: true,
        };
        upsert_member(&conn, &member).unwrap();
        tagged(&conn, "1", "a", FileDate::Empty, &["Zoning"]);
        tagged(&conn, "2", "b", FileDate::Empty, &["Budget"]);
        link_sponsor(&conn, "1", 7).unwrap();

        let counts = member_topic_counts(&conn, 7, "Routine").unwrap();
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[0].topic, "Zoning");
    }

    #[test]
    fn facet_choices_are_distinct_and_sorted() {
        let conn = open_in_memory().unwrap();
        let mut a = sample_file("1", "a", FileDate::Empty);
        a.status = "Passed".to_string();
        let mut b = sample_file("2", "b", FileDate::Empty);
        b.status = "In Committee".to_string();
        let mut c = sample_file("3", "c", FileDate::Empty);
        c.status = "Passed".to_string();
        for file in [&a, &b, &c] {
            upsert_leg_file(&conn, file).unwrap();
        }

        let statuses = legfile_choices(&conn, LegFileField::Status).unwrap();
        assert_eq!(statuses, vec!["In Committee".to_string(), "Passed".to_string()]);
    }

    #[test]
    fn bookmark_counts_group_by_key() {
        let conn = open_in_memory().unwrap();
        upsert_leg_file(&conn, &sample_file("1", "a", FileDate::Empty)).unwrap();
        upsert_leg_file(&conn, &sample_file("2", "b", FileDate::Empty)).unwrap();
        insert_bookmark(&conn, "alex", "1").unwrap();
        insert_bookmark(&conn, "sam", "1").unwrap();
        insert_bookmark(&conn, "alex", "2").unwrap();
        insert_bookmark(&conn, "alex", "2").unwrap(); // duplicate ignored

        let counts =
            bookmarks_for_keys(&conn, &["1".to_string(), "2".to_string(), "3".to_string()])
                .unwrap();
        assert_eq!(counts.get("1"), Some(&2));
        assert_eq!(counts.get("2"), Some(&1));
        assert_eq!(counts.get("3"), None);

        let mine = bookmarks_for_user(&conn, "alex").unwrap();
        let keys: Vec<&str> = mine.iter().map(|b| b.legfile_key.as_str()).collect();
        assert_eq!(keys, vec!["1", "2"]);
    }

    #[test]
    fn recent_locations_are_valid_newest_first() {
        let conn = open_in_memory().unwrap();
        let front = upsert_location(&conn, "Front St", true).unwrap();
        upsert_location(&conn, "Old Yard", false).unwrap();
        let market = upsert_location(&conn, "Market Sq", true).unwrap();
        upsert_leg_file(&conn, &sample_file("1", "a", FileDate::Empty)).unwrap();
        link_location(&conn, "1", front).unwrap();
        link_location(&conn, "1", market).unwrap();

        let recent = recent_locations(&conn, 10).unwrap();
        let names: Vec<&str> = recent.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["Market Sq", "Front St"]);
    }
}
