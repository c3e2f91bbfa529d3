use thiserror::Error;

/// Fatal problems found while joining the two configuration sources.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A database is listed but has no procedure-group entry.
    #[error("Database {database} has no stored procedure configuration")]
    MissingProcedures { database: String },

    /// A database references a group key its procedure entry does not declare.
    #[error("Group {group} referenced by database {database} is not declared")]
    UnknownGroup { database: String, group: String },

    /// A timeout or pause is below zero.
    #[error("Group {group} of database {database} has a negative {field}: {value}ms")]
    NegativeDuration {
        database: String,
        group: String,
        field: &'static str,
        value: i64,
    },

    /// The same database name appears twice in the database list.
    #[error("Database {0} is declared more than once")]
    DuplicateDatabase(String),

    /// A database entry lists the same group key twice.
    #[error("Group {group} is listed more than once for database {database}")]
    DuplicateGroup { database: String, group: String },
}

/// Failures reported by an execution gateway.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The database could not be reached or refused the session.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The connection descriptor is unusable for this backend.
    #[error("Invalid connection descriptor: {0}")]
    InvalidDescriptor(String),

    /// The procedure does not exist on the target.
    #[error("Procedure not found: {0}")]
    ProcedureNotFound(String),

    /// The procedure ran and failed.
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

/// Reasons a group pass ends without running its procedure loop.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Group {group} not found.")]
    GroupNotFound { database: String, group: String },

    #[error(transparent)]
    Connect(#[from] GatewayError),
}

impl RunnerError {
    pub fn code(&self) -> &'static str {
        match self {
            RunnerError::GroupNotFound { .. } => "GROUP_NOT_FOUND",
            RunnerError::Connect(_) => "CONNECT_FAILED",
        }
    }
}

pub type Result<T> = std::result::Result<T, RunnerError>;
