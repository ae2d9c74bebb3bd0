use thiserror::Error;

/// Failure kinds the scrape can hit. Only `TransientFetch` is ever retried,
/// and only once; everything else goes straight to the caller.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("transient fetch failure: {0}")]
    TransientFetch(String),

    #[error("summary is missing required field `{0}`")]
    MalformedSummary(&'static str),

    #[error("unexpected response from the legislation source: {0}")]
    BadResponse(String),

    #[error("unparseable date {value:?}")]
    InvalidDate {
        value: String,
        #[source]
        source: time::error::Parse,
    },
}
