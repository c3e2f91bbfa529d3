use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::OpenFlags;
use serde::Deserialize;
use sprocd_scheduler::{Connection, DatabaseTarget, ExecSummary, ExecutionGateway, GatewayError};
use tracing::{debug, instrument};

use crate::db;
use crate::error::{Result, SqliteError};

/// Connection descriptor accepted by [`SqliteGateway`]: `{"path": "<file>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SqliteDescriptor {
    pub path: PathBuf,
}

impl SqliteDescriptor {
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        serde_json::from_value(value.clone()).map_err(|e| SqliteError::Descriptor(e.to_string()))
    }
}

/// Opens a fresh SQLite handle per group pass.
///
/// `rusqlite` is synchronous, so every call is moved onto the blocking pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteGateway;

impl SqliteGateway {
    pub fn new() -> Self {
        Self
    }

    /// Store `body` under `name`, creating the file and the procedure table
    /// if needed.
    pub fn register(path: &Path, name: &str, body: &str) -> Result<()> {
        let conn = rusqlite::Connection::open(path)?;
        db::init_db(&conn)?;
        db::register_procedure(&conn, name, body)
    }

    /// Procedure names registered in the existing file at `path`.
    pub fn procedures(path: &Path) -> Result<Vec<String>> {
        let conn = open_existing(path)?;
        db::list_procedures(&conn)
    }
}

/// Open a database file that must already exist. A mistyped path is a
/// connection failure, never a fresh empty database.
fn open_existing(path: &Path) -> Result<rusqlite::Connection> {
    let conn = rusqlite::Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    db::init_db(&conn)?;
    Ok(conn)
}

#[async_trait]
impl ExecutionGateway for SqliteGateway {
    fn name(&self) -> &str {
        "sqlite"
    }

    #[instrument(skip_all, fields(database = %target.name))]
    async fn connect(
        &self,
        target: &DatabaseTarget,
    ) -> std::result::Result<Box<dyn Connection>, GatewayError> {
        let descriptor = SqliteDescriptor::from_value(&target.descriptor)
            .map_err(|e| GatewayError::InvalidDescriptor(e.to_string()))?;
        let path = descriptor.path.clone();

        let conn = tokio::task::spawn_blocking(move || open_existing(&path))
            .await
            .map_err(SqliteError::from)
            .and_then(|r| r)
            .map_err(|e| {
                GatewayError::ConnectionFailed(format!("{}: {e}", descriptor.path.display()))
            })?;

        debug!(path = %descriptor.path.display(), "sqlite connection opened");
        Ok(Box::new(SqliteConnection {
            database: target.name.clone(),
            conn: Some(Arc::new(Mutex::new(conn))),
        }))
    }
}

struct SqliteConnection {
    database: String,
    conn: Option<Arc<Mutex<rusqlite::Connection>>>,
}

#[async_trait]
impl Connection for SqliteConnection {
    async fn execute(&mut self, procedure: &str) -> std::result::Result<ExecSummary, GatewayError> {
        let conn = self.conn.clone().ok_or_else(|| {
            GatewayError::ConnectionFailed(format!("{} connection is closed", self.database))
        })?;
        let name = procedure.to_string();

        let outcome = tokio::task::spawn_blocking(move || run_procedure(&conn, &name))
            .await
            .map_err(SqliteError::from)
            .and_then(|r| r);

        match outcome {
            Ok(rows_affected) => Ok(ExecSummary { rows_affected }),
            Err(SqliteError::NotFound(name)) => Err(GatewayError::ProcedureNotFound(name)),
            Err(e) => Err(GatewayError::ExecutionFailed(e.to_string())),
        }
    }

    async fn disconnect(&mut self) -> std::result::Result<(), GatewayError> {
        if self.conn.take().is_some() {
            debug!(database = %self.database, "sqlite connection closed");
        }
        Ok(())
    }
}

fn run_procedure(conn: &Mutex<rusqlite::Connection>, name: &str) -> Result<u64> {
    let conn = conn.lock().map_err(|_| SqliteError::Poisoned)?;
    let body = db::procedure_body(&conn, name)?
        .ok_or_else(|| SqliteError::NotFound(name.to_string()))?;
    let before = conn.total_changes();
    conn.execute_batch(&body)?;
    Ok(conn.total_changes().saturating_sub(before))
}
