use std::collections::HashMap;
use std::fmt;
use std::ops::Range;

use rusqlite::{Connection, params};
use tracing::debug;

use crate::db::{self, LegFileWithTopics};
use crate::error::{Result, StoreError};
use crate::schema::CouncilMember;

/// Which table a search hit points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    LegFile,
    CouncilMember,
}

impl ModelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelKind::LegFile => "leg_file",
            ModelKind::CouncilMember => "council_member",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "leg_file" => Some(ModelKind::LegFile),
            "council_member" => Some(ModelKind::CouncilMember),
            _ => None,
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ranked hit from the index: enough to find the row, nothing more.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub kind: ModelKind,
    pub ref_key: String,
}

/// A rank-ordered hit list. Implemented by the FTS index and, in tests, by
/// a plain vector.
pub trait HitSource {
    fn count(&self) -> Result<usize>;
    fn hits(&self, range: Range<usize>) -> Result<Vec<SearchHit>>;
}

impl HitSource for Vec<SearchHit> {
    fn count(&self) -> Result<usize> {
        Ok(self.len())
    }

    fn hits(&self, range: Range<usize>) -> Result<Vec<SearchHit>> {
        let end = range.end.min(self.len());
        let start = range.start.min(end);
        Ok(self[start..end].to_vec())
    }
}

/// Ranked hits straight out of the FTS table, best match first.
pub struct FtsHitSource<'c> {
    conn: &'c Connection,
    query: String,
}

impl<'c> FtsHitSource<'c> {
    pub fn new(conn: &'c Connection, query: &str) -> Self {
        Self {
            conn,
            query: fts_quote(query),
        }
    }
}

impl HitSource for FtsHitSource<'_> {
    fn count(&self) -> Result<usize> {
        if self.query.is_empty() {
            return Ok(0);
        }
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM search_index WHERE search_index MATCH ?1",
            params![self.query],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn hits(&self, range: Range<usize>) -> Result<Vec<SearchHit>> {
        if self.query.is_empty() || range.is_empty() {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare(
            r#"
            SELECT kind, ref_key FROM search_index
            WHERE search_index MATCH ?1
            ORDER BY rank
            LIMIT ?2 OFFSET ?3
            "#,
        )?;
        let rows = stmt.query_map(
            params![self.query, range.len() as i64, range.start as i64],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )?;

        let mut hits = Vec::new();
        for row in rows {
            let (kind, ref_key) = row?;
            match ModelKind::parse(&kind) {
                Some(kind) => hits.push(SearchHit { kind, ref_key }),
                None => debug!(%kind, %ref_key, "dropping hit with unknown model kind"),
            }
        }
        Ok(hits)
    }
}

/// Quote every term so user input cannot hit FTS query syntax.
fn fts_quote(query: &str) -> String {
    query
        .split_whitespace()
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

/// A resolved search hit.
#[derive(Debug, Clone)]
pub enum SearchMatch {
    LegFile(LegFileWithTopics),
    Member(CouncilMember),
}

/// Presents ranked hits as a collection of domain objects, fetching the
/// backing rows in batches per model kind.
pub struct ResultSet<'c, S: HitSource> {
    conn: &'c Connection,
    source: S,
}

impl<'c, S: HitSource> ResultSet<'c, S> {
    pub fn new(conn: &'c Connection, source: S) -> Self {
        Self { conn, source }
    }

    pub fn count(&self) -> Result<usize> {
        self.source.count()
    }

    /// Every hit, resolved eagerly, rank order preserved.
    pub fn resolve_all(&self) -> Result<Vec<SearchMatch>> {
        let total = self.source.count()?;
        self.slice(0..total)
    }

    /// Resolve a contiguous run of ranked hits: one batched lookup per model
    /// kind, results reassembled in rank order. Hits whose row has since been
    /// deleted are dropped without error; the index catches up on the next
    /// reindex.
    pub fn slice(&self, range: Range<usize>) -> Result<Vec<SearchMatch>> {
        let hits = self.source.hits(range)?;

        let mut file_keys = Vec::new();
        let mut member_ids = Vec::new();
        for hit in &hits {
            match hit.kind {
                ModelKind::LegFile => file_keys.push(hit.ref_key.clone()),
                ModelKind::CouncilMember => {
                    if let Ok(id) = hit.ref_key.parse::<i64>() {
                        member_ids.push(id);
                    }
                }
            }
        }

        let files: HashMap<String, LegFileWithTopics> = db::leg_files_by_keys(self.conn, &file_keys)?
            .into_iter()
            .map(|f| (f.file.key.clone(), f))
            .collect();
        let members: HashMap<String, CouncilMember> = db::members_by_ids(self.conn, &member_ids)?
            .into_iter()
            .map(|m| (m.id.to_string(), m))
            .collect();

        let mut resolved = Vec::with_capacity(hits.len());
        for hit in hits {
            let found = match hit.kind {
                ModelKind::LegFile => files.get(&hit.ref_key).cloned().map(SearchMatch::LegFile),
                ModelKind::CouncilMember => {
                    members.get(&hit.ref_key).cloned().map(SearchMatch::Member)
                }
            };
            match found {
                Some(m) => resolved.push(m),
                None => debug!(
                    kind = %hit.kind,
                    ref_key = %hit.ref_key,
                    "dropping stale search hit"
                ),
            }
        }
        Ok(resolved)
    }

    /// Resolve exactly one ranked hit. Out-of-range is `None`; a hit whose
    /// row is gone is an error, since there is no list to quietly shrink.
    pub fn get(&self, index: usize) -> Result<Option<SearchMatch>> {
        let hits = self.source.hits(index..index + 1)?;
        let Some(hit) = hits.into_iter().next() else {
            return Ok(None);
        };
        let mut resolved = self.slice(index..index + 1)?;
        match resolved.pop() {
            Some(m) => Ok(Some(m)),
            None => Err(StoreError::StaleIndexReference {
                kind: hit.kind,
                key: hit.ref_key,
            }),
        }
    }
}
