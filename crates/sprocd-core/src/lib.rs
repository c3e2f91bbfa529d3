//! `sprocd-core`: configuration, shared types and errors used by every
//! other sprocd crate.

pub mod config;
pub mod error;
pub mod types;

pub use config::{DispatchMode, SprocdConfig};
pub use error::{CoreError, Result};
pub use types::{EventKind, StatusEvent};
