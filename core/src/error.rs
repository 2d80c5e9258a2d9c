use thiserror::Error;

#[derive(Error, Debug)]
pub enum WindowError {
    #[error("Invalid event '{transaction_id}': {reason}")]
    Validation {
        transaction_id: String,
        reason:         String,
    },

    #[error("Event source did not return within {budget_ms} ms")]
    IngestionTimeout { budget_ms: u64 },

    #[error("Event source failed: {0}")]
    Source(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WindowError {
    pub fn validation(transaction_id: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            transaction_id: transaction_id.to_string(),
            reason:         reason.into(),
        }
    }

    /// True for the errors that abort a cycle before the window is touched.
    pub fn is_ingestion_failure(&self) -> bool {
        matches!(self, Self::IngestionTimeout { .. } | Self::Source(_))
    }
}

pub type WindowResult<T> = Result<T, WindowError>;

/// Failure of a single derived view. Never aborts a cycle: the
/// coordinator degrades the view to its empty form and records a warning.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ViewError {
    #[error("{view}: invalid parameter: {reason}")]
    InvalidParameter {
        view:   &'static str,
        reason: String,
    },

    #[error("graph layout diverged after {iterations} iterations")]
    LayoutDiverged { iterations: u32 },
}

pub type ViewResult<T> = Result<T, ViewError>;
