use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cannot read {path}: {source}")]
    SourceRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed {path}: {source}")]
    SourceParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl CoreError {
    /// Short error code string returned by the control surface.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Config(_) => "CONFIG_ERROR",
            CoreError::SourceRead { .. } => "SOURCE_READ_ERROR",
            CoreError::SourceParse { .. } => "SOURCE_PARSE_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
