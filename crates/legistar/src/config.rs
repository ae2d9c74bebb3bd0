use std::fs;
use std::path::Path;

use anyhow::Result;
use serde::Deserialize;

/// Settings for the hosted legislation source, loadable from a TOML file.
/// Every field has a default so a missing or partial file still yields a
/// working scraper.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub page_size: usize,
    pub user_agent: String,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            base_url: "https://webapi.legistar.com/v1/phila/".to_string(),
            timeout_secs: 15,
            page_size: 100,
            user_agent: concat!("councilmatic/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ScrapeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let config = toml::from_str(&raw)?;
        Ok(config)
    }
}
