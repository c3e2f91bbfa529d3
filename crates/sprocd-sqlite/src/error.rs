use sprocd_scheduler::GatewayError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SqliteError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("invalid descriptor: {0}")]
    Descriptor(String),

    #[error("stored procedure not found: {0}")]
    NotFound(String),

    #[error("connection lock poisoned")]
    Poisoned,

    #[error("blocking task failed: {0}")]
    Join(String),
}

impl SqliteError {
    pub fn code(&self) -> &'static str {
        match self {
            SqliteError::Database(_) => "DATABASE_ERROR",
            SqliteError::Descriptor(_) => "INVALID_DESCRIPTOR",
            SqliteError::NotFound(_) => "PROCEDURE_NOT_FOUND",
            SqliteError::Poisoned | SqliteError::Join(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<tokio::task::JoinError> for SqliteError {
    fn from(e: tokio::task::JoinError) -> Self {
        SqliteError::Join(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SqliteError>;
