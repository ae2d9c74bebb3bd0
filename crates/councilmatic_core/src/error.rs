use thiserror::Error;

use crate::search::ModelKind;

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Storage(#[from] rusqlite::Error),

    /// The search index pointed at a row that no longer exists. Slice
    /// reconciliation drops these quietly; single-hit access surfaces them.
    #[error("search index references missing {kind} {key:?}")]
    StaleIndexReference { kind: ModelKind, key: String },

    #[error(transparent)]
    Serialize(#[from] serde_json::Error),
}
