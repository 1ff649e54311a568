use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnnError {
    #[error("{0}")]
    Configuration(String),

    #[error("Bad dimensions: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Message reported by the engine through its error context, passed through verbatim.
    #[error("{0}")]
    Engine(String),

    #[error("{0}")]
    UnsupportedOperation(String),

    #[error("Index is closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(String),

    #[error("JSON error: {0}")]
    Json(String),
}

pub type Result<T> = std::result::Result<T, AnnError>;

impl From<std::io::Error> for AnnError {
    fn from(e: std::io::Error) -> Self {
        AnnError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for AnnError {
    fn from(e: serde_json::Error) -> Self {
        AnnError::Json(e.to_string())
    }
}

impl AnnError {
    /// True for errors detected locally, before any call reaches the engine.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            AnnError::Configuration(_) | AnnError::DimensionMismatch { .. }
        )
    }
}
