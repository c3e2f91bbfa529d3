//! `sprocd-scheduler`: engine that keeps groups of stored procedures
//! running on a fixed re-trigger delay.
//!
//! # Overview
//!
//! [`SchedulerEngine::start`] spawns one [`orchestrator::DatabaseOrchestrator`]
//! per configured database, which in turn spawns one lineage per procedure
//! group. A lineage runs a pass through [`runner::GroupRunner::run_once`],
//! waits the group's timeout, and runs again until cancelled.
//!
//! | Layer          | Responsibility                                        |
//! |----------------|-------------------------------------------------------|
//! | `registry`     | Join and validate the database / procedure sources    |
//! | `runner`       | One ordered pass over a group's procedures            |
//! | `orchestrator` | Per-database lineage spawning and first-pass tracking |
//! | `engine`       | Generations, start / cancel, observability            |
//!
//! The execution transport and the status consumers plug in through the
//! [`ExecutionGateway`] and [`EventSink`] traits.

pub mod clock;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod lineage;
pub mod orchestrator;
pub mod pool;
pub mod registry;
pub mod runner;
pub mod sink;
pub mod state;
pub mod types;

pub use clock::{Clock, SystemClock};
pub use engine::{EngineOptions, SchedulerEngine};
pub use error::{ConfigError, GatewayError, RunnerError};
pub use gateway::{Connection, ExecSummary, ExecutionGateway};
pub use registry::Schedule;
pub use sink::{BroadcastSink, EventSink, SinkSet, TracingSink};
pub use types::{
    DatabaseTarget, Generation, GroupOutcome, LineageSnapshot, LineageState, PassReport,
    ProcedureGroup,
};
