use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{error::GatewayError, types::DatabaseTarget};

/// Result of one successful procedure invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecSummary {
    pub rows_affected: u64,
}

/// Transport that runs stored procedures on a database target.
///
/// The engine treats implementations as black boxes: any backend that can
/// open a session from a [`DatabaseTarget`] descriptor is substitutable.
#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    /// Stable lowercase identifier used in logs (e.g. `"sqlite"`).
    fn name(&self) -> &str;

    /// Open a session against `target`.
    async fn connect(&self, target: &DatabaseTarget) -> Result<Box<dyn Connection>, GatewayError>;
}

/// An open session obtained from [`ExecutionGateway::connect`].
#[async_trait]
pub trait Connection: Send {
    /// Invoke one procedure by name and wait for it to finish.
    async fn execute(&mut self, procedure: &str) -> Result<ExecSummary, GatewayError>;

    /// Close the session. The connection must not be used afterwards.
    async fn disconnect(&mut self) -> Result<(), GatewayError>;
}
