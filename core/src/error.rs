use crate::Field;
use thiserror::Error;

/// Errors produced while building, loading or reading an index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// A required store or table could not be loaded, or an option was invalid.
    #[error("configuration error in {component}: {reason}")]
    Configuration { component: String, reason: String },
    /// A stored posting run failed to decode. Never used for an unknown term.
    #[error("corrupt posting data for term {term:?} in {field} field: {reason}")]
    CorruptPostingData { field: Field, term: String, reason: String },
    /// The builder was fed input that breaks an index invariant.
    #[error("index build failed: {0}")]
    Build(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl IndexError {
    pub fn configuration(component: impl Into<String>, reason: impl ToString) -> Self {
        IndexError::Configuration { component: component.into(), reason: reason.to_string() }
    }

    pub fn corrupt(field: Field, term: &str, reason: impl Into<String>) -> Self {
        IndexError::CorruptPostingData { field, term: term.to_string(), reason: reason.into() }
    }

    pub fn is_corruption(&self) -> bool {
        matches!(self, IndexError::CorruptPostingData { .. })
    }
}

impl From<bincode::Error> for IndexError {
    fn from(e: bincode::Error) -> Self {
        IndexError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for IndexError {
    fn from(e: serde_json::Error) -> Self {
        IndexError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;
