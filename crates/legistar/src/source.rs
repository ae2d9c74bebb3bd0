use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::adapter::key_from_url;
use crate::config::ScrapeConfig;
use crate::error::ScrapeError;
use crate::summary::{HistoryEntry, LegislationDetail, LegislationSummary};

/// Where summaries come from and how they expand into full records. The
/// hosted site implements this over HTTP; tests implement it in memory.
pub trait LegislationSource {
    /// The next listing row, or `None` once the listing is exhausted.
    fn next_summary(&mut self) -> Result<Option<LegislationSummary>, ScrapeError>;

    /// Full attributes and action history for one summary.
    fn expand(
        &mut self,
        summary: &LegislationSummary,
    ) -> Result<(LegislationDetail, Vec<HistoryEntry>), ScrapeError>;
}

/// Summaries from the hosted site's JSON API, fetched a page at a time.
/// All requests carry the configured timeout; connection and timeout
/// failures surface as `TransientFetch`, anything else as `BadResponse`.
pub struct HttpSource {
    client: reqwest::blocking::Client,
    base: Url,
    page_size: usize,
    buffered: VecDeque<LegislationSummary>,
    next_offset: usize,
    exhausted: bool,
}

impl HttpSource {
    pub fn new(config: &ScrapeConfig) -> Result<Self, ScrapeError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| ScrapeError::BadResponse(format!("building http client: {e}")))?;
        let base = Url::parse(&config.base_url)
            .map_err(|e| ScrapeError::BadResponse(format!("invalid base url: {e}")))?;
        Ok(Self {
            client,
            base,
            page_size: config.page_size,
            buffered: VecDeque::new(),
            next_offset: 0,
            exhausted: false,
        })
    }

    fn get_json(&self, url: Url) -> Result<Value, ScrapeError> {
        debug!(%url, "fetching");
        let response = self
            .client
            .get(url.clone())
            .send()
            .map_err(|e| ScrapeError::TransientFetch(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(ScrapeError::TransientFetch(format!("{status} from {url}")));
        }
        if !status.is_success() {
            return Err(ScrapeError::BadResponse(format!("{status} from {url}")));
        }
        response
            .json()
            .map_err(|e| ScrapeError::BadResponse(format!("decoding {url}: {e}")))
    }

    fn matters_url(&self, tail: &str) -> Result<Url, ScrapeError> {
        self.base
            .join(&format!("matters{tail}"))
            .map_err(|e| ScrapeError::BadResponse(format!("building request url: {e}")))
    }

    fn fetch_next_page(&mut self) -> Result<(), ScrapeError> {
        let mut url = self.matters_url("")?;
        url.query_pairs_mut()
            .append_pair("$top", &self.page_size.to_string())
            .append_pair("$skip", &self.next_offset.to_string());

        let page = self.get_json(url)?;
        let rows = page
            .as_array()
            .ok_or_else(|| ScrapeError::BadResponse("listing page is not an array".to_string()))?;

        if rows.len() < self.page_size {
            self.exhausted = true;
        }
        self.next_offset += rows.len();
        for row in rows {
            self.buffered.push_back(LegislationSummary::from_value(row)?);
        }
        Ok(())
    }
}

impl LegislationSource for HttpSource {
    fn next_summary(&mut self) -> Result<Option<LegislationSummary>, ScrapeError> {
        if self.buffered.is_empty() && !self.exhausted {
            self.fetch_next_page()?;
        }
        Ok(self.buffered.pop_front())
    }

    fn expand(
        &mut self,
        summary: &LegislationSummary,
    ) -> Result<(LegislationDetail, Vec<HistoryEntry>), ScrapeError> {
        let id = key_from_url(&summary.url).ok_or(ScrapeError::MalformedSummary("ID"))?;

        let attrs = self.get_json(self.matters_url(&format!("/{id}"))?)?;
        let detail = LegislationDetail::from_value(&attrs)?;

        let history_page = self.get_json(self.matters_url(&format!("/{id}/histories"))?)?;
        let rows = history_page.as_array().ok_or_else(|| {
            ScrapeError::BadResponse("history page is not an array".to_string())
        })?;
        let history = rows
            .iter()
            .map(HistoryEntry::from_value)
            .collect::<Result<Vec<_>, _>>()?;

        Ok((detail, history))
    }
}

/// In-memory source for tests and offline runs: summaries are served in
/// insertion order and expansions are looked up by record number.
#[derive(Default)]
pub struct FixtureSource {
    summaries: VecDeque<LegislationSummary>,
    expansions: HashMap<String, (LegislationDetail, Vec<HistoryEntry>)>,
}

impl FixtureSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        summary: LegislationSummary,
        detail: LegislationDetail,
        history: Vec<HistoryEntry>,
    ) {
        self.expansions
            .insert(summary.record_no.clone(), (detail, history));
        self.summaries.push_back(summary);
    }
}

impl LegislationSource for FixtureSource {
    fn next_summary(&mut self) -> Result<Option<LegislationSummary>, ScrapeError> {
        Ok(self.summaries.pop_front())
    }

    fn expand(
        &mut self,
        summary: &LegislationSummary,
    ) -> Result<(LegislationDetail, Vec<HistoryEntry>), ScrapeError> {
        self.expansions
            .get(&summary.record_no)
            .cloned()
            .ok_or_else(|| {
                ScrapeError::BadResponse(format!("no fixture for record {}", summary.record_no))
            })
    }
}
