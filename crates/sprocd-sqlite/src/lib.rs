//! SQLite execution backend. A "stored procedure" is a named SQL script kept
//! in the target file's `stored_procedures` table.

pub mod db;
pub mod error;
pub mod gateway;

pub use error::SqliteError;
pub use gateway::{SqliteDescriptor, SqliteGateway};
