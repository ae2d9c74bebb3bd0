use serde_json::Value;

use crate::error::ScrapeError;

/// One row of the site's legislation listing, validated at the boundary.
/// The upstream rows are loosely keyed maps; anything required that is
/// absent fails here, by name, instead of deep inside the field mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegislationSummary {
    pub record_no: String,
    pub url: String,
    pub file_type: String,
    pub status: String,
    pub title: String,
    pub intro_date: String,
    pub final_date: String, // "" when the listing omits it
    pub version: String,    // "" when the listing omits it
}

impl LegislationSummary {
    pub fn from_value(value: &Value) -> Result<Self, ScrapeError> {
        Ok(Self {
            record_no: required(value, "Record #")?,
            url: required(value, "URL")?,
            file_type: required(value, "Type")?,
            status: required(value, "Status")?,
            title: required(value, "Title")?,
            intro_date: required(value, "Intro Date")?,
            final_date: optional(value, "Final Date"),
            version: optional(value, "Version"),
        })
    }
}

/// The expanded attributes behind one summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegislationDetail {
    pub controlling_body: String,
    pub sponsors: Vec<String>, // site order, usually "Last, First"
    pub attachments: Vec<AttachmentDetail>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentDetail {
    pub label: String,
    pub url: Option<String>,
}

/// One row of a record's action history, in site order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub date: String,
    pub acting_body: String,
    pub result: String,
    pub status: String,
}

impl LegislationDetail {
    pub fn from_value(value: &Value) -> Result<Self, ScrapeError> {
        let controlling_body = required(value, "Current Controlling Legislative Body")?;

        let sponsors = value
            .get("Sponsors")
            .and_then(Value::as_array)
            .map(|rows| {
                rows.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        // Attachments are frequently absent from the detail page
        let attachments = value
            .get("Attachments")
            .and_then(Value::as_array)
            .map(|rows| rows.iter().filter_map(attachment_from_value).collect())
            .unwrap_or_default();

        Ok(Self {
            controlling_body,
            sponsors,
            attachments,
        })
    }
}

fn attachment_from_value(value: &Value) -> Option<AttachmentDetail> {
    let label = value.get("label").and_then(Value::as_str)?;
    let url = value
        .get("url")
        .and_then(Value::as_str)
        .map(str::to_string);
    Some(AttachmentDetail {
        label: label.to_string(),
        url,
    })
}

impl HistoryEntry {
    pub fn from_value(value: &Value) -> Result<Self, ScrapeError> {
        // "Action By" is an object with a label on the hosted site, but a
        // bare string in older exports; accept both.
        let acting_body = match value.get("Action By") {
            Some(Value::String(s)) => s.clone(),
            Some(body) => body
                .get("label")
                .and_then(Value::as_str)
                .ok_or(ScrapeError::MalformedSummary("Action By"))?
                .to_string(),
            None => return Err(ScrapeError::MalformedSummary("Action By")),
        };

        Ok(Self {
            date: required(value, "Date")?,
            acting_body,
            result: required(value, "Result")?,
            status: required(value, "Status")?,
        })
    }
}

fn required(value: &Value, field: &'static str) -> Result<String, ScrapeError> {
    match value.get(field).and_then(Value::as_str) {
        Some(s) => Ok(s.to_string()),
        None => Err(ScrapeError::MalformedSummary(field)),
    }
}

fn optional(value: &Value, field: &str) -> String {
    value
        .get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
