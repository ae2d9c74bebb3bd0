use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use time::Date;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

const ISO_DATE: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// A legislative date that may be absent. The upstream feed uses the empty
/// string (not null) for missing dates, and that representation is kept on
/// the wire: `Empty` serializes as `""`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileDate {
    Empty,
    On(Date),
}

impl FileDate {
    pub fn is_empty(&self) -> bool {
        matches!(self, FileDate::Empty)
    }

    pub fn as_date(&self) -> Option<Date> {
        match self {
            FileDate::Empty => None,
            FileDate::On(d) => Some(*d),
        }
    }

    /// Parse the stored form: `""` or `YYYY-MM-DD`.
    pub fn from_iso(s: &str) -> Result<Self, time::error::Parse> {
        if s.is_empty() {
            Ok(FileDate::Empty)
        } else {
            Date::parse(s, ISO_DATE).map(FileDate::On)
        }
    }
}

impl fmt::Display for FileDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileDate::Empty => Ok(()),
            FileDate::On(d) => {
                let s = d.format(ISO_DATE).map_err(|_| fmt::Error)?;
                f.write_str(&s)
            }
        }
    }
}

impl Serialize for FileDate {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for FileDate {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        FileDate::from_iso(&s).map_err(serde::de::Error::custom)
    }
}

impl JsonSchema for FileDate {
    fn schema_name() -> String {
        "FileDate".to_string()
    }

    fn json_schema(generator: &mut schemars::r#gen::SchemaGenerator) -> schemars::schema::Schema {
        // ISO-8601 calendar date, or "" when the source had none
        String::json_schema(generator)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LegFile {
    pub key: String, // natural key, parsed from the source URL
    pub id: String,  // display id as shown on the site
    pub url: String,
    pub file_type: String,
    pub status: String,
    pub title: String,
    pub controlling_body: String,
    pub intro_date: FileDate,
    pub final_date: FileDate,
    pub version: String,
    pub sponsors: Vec<String>, // "First Last" order
    pub minutes_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Attachment {
    pub key: String,
    pub file: String, // display label
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Action {
    pub key: String,
    pub date_taken: FileDate,
    pub acting_body: String,
    pub motion: String,
    pub description: String,
}

/// The hosted site publishes no minutes; scrapes always produce an empty
/// list of these. The shape is kept so a future source can fill it in.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Minutes {
    pub key: String,
    pub url: String,
}

/// One fully mapped scrape result: the record plus everything that is
/// persisted together with it in a single transaction.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ScrapedFile {
    pub file: LegFile,
    pub attachments: Vec<Attachment>,
    pub actions: Vec<Action>,
    pub minutes: Vec<Minutes>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CouncilMember {
    pub id: i64,
    pub real_name: String,
    pub district: Option<String>,
    pub at_large: bool,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Topic {
    pub id: i64,
    pub topic: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Location {
    pub id: i64,
    pub name: String,
    pub valid: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Subscription {
    pub id: i64,
    pub label: String,
    pub query: String, // free-text search the feed re-runs
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Bookmark {
    pub id: i64,
    pub user: String,
    pub legfile_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn file_date_round_trips_iso() {
        let d = FileDate::from_iso("2020-01-15").unwrap();
        assert_eq!(d, FileDate::On(date!(2020 - 01 - 15)));
        assert_eq!(d.to_string(), "2020-01-15");
    }

    #[test]
    fn empty_file_date_is_the_empty_string() {
        let d = FileDate::from_iso("").unwrap();
        assert!(d.is_empty());
        assert_eq!(d.to_string(), "");
        assert_eq!(serde_json::to_string(&d).unwrap(), "\"\"");
    }

    #[test]
    fn bad_file_date_is_an_error() {
        assert!(FileDate::from_iso("01/15/2020").is_err());
    }
}
