use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Format used for every `StatusEvent` timestamp (local time).
pub const EVENT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Render a local instant the way status consumers expect it.
pub fn format_event_timestamp(at: DateTime<Local>) -> String {
    at.format(EVENT_TIMESTAMP_FORMAT).to_string()
}

/// What a status event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A procedure is about to be invoked.
    Executing,
    /// A procedure returned successfully.
    Executed,
    /// A procedure call failed; the pass continues.
    ProcedureFailed,
    /// The database could not be reached; the pass is abandoned.
    ConnectFailed,
    /// The group key is not part of the schedule.
    GroupNotFound,
    /// Last-activity timestamp refresh for the database.
    Timestamp,
    /// Engine lifecycle notices (start, cancel, first pass done).
    Info,
}

impl EventKind {
    /// UI channel the event is published on.
    pub fn channel(&self) -> &'static str {
        match self {
            EventKind::Timestamp => "sp-tarih",
            _ => "sp-status",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            EventKind::ProcedureFailed | EventKind::ConnectFailed | EventKind::GroupNotFound
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventKind::Executing => "executing",
            EventKind::Executed => "executed",
            EventKind::ProcedureFailed => "procedure_failed",
            EventKind::ConnectFailed => "connect_failed",
            EventKind::GroupNotFound => "group_not_found",
            EventKind::Timestamp => "timestamp",
            EventKind::Info => "info",
        };
        write!(f, "{s}")
    }
}

/// A single progress notification. Emitted once, never retained by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    /// Database the event belongs to; empty for engine-wide notices.
    pub database: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub procedure: Option<String>,
    pub kind: EventKind,
    pub message: String,
    /// `YYYY-MM-DD HH:mm:ss`, local time.
    pub timestamp: String,
}

impl StatusEvent {
    pub fn new(
        database: &str,
        kind: EventKind,
        message: impl Into<String>,
        timestamp: String,
    ) -> Self {
        Self {
            database: database.to_string(),
            group: None,
            procedure: None,
            kind,
            message: message.into(),
            timestamp,
        }
    }

    pub fn with_group(mut self, group: &str) -> Self {
        self.group = Some(group.to_string());
        self
    }

    pub fn with_procedure(mut self, procedure: &str) -> Self {
        self.procedure = Some(procedure.to_string());
        self
    }
}
