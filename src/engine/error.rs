use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A mastery write or snapshot read failed. The session stays usable;
    /// the caller decides whether to retry.
    #[error("persistence unavailable: {0}")]
    Persistence(#[from] StoreError),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("invalid session state: expected {expected}, found {found}")]
    InvalidSessionState {
        expected: &'static str,
        found: &'static str,
    },
    #[error("no question is awaiting an answer")]
    NoPendingItem,
    #[error("question {0} is not part of the loaded course")]
    UnknownItem(String),
}

impl EngineError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Persistence(_) | Self::NoPendingItem)
    }
}
