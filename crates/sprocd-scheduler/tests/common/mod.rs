#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone};
use sprocd_core::{EventKind, StatusEvent};
use sprocd_scheduler::{
    registry::ScheduledDatabase, Clock, Connection, DatabaseTarget, EventSink, ExecSummary,
    ExecutionGateway, GatewayError, ProcedureGroup, Schedule,
};
use tokio::sync::Notify;
use tokio::time::Instant;

/// Behaviour of a [`ScriptedGateway`].
#[derive(Default)]
pub struct Script {
    pub failing: HashSet<String>,
    pub unreachable: HashSet<String>,
    pub call_delay: Duration,
    /// Notified when the named procedure is invoked.
    pub gates: HashMap<String, Arc<Notify>>,
}

#[derive(Default)]
pub struct Stats {
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
    pub open: AtomicUsize,
    pub peak_open: AtomicUsize,
}

pub struct ScriptedGateway {
    script: Arc<Script>,
    pub stats: Arc<Stats>,
}

impl ScriptedGateway {
    pub fn new(script: Script) -> Self {
        Self {
            script: Arc::new(script),
            stats: Arc::new(Stats::default()),
        }
    }
}

#[async_trait]
impl ExecutionGateway for ScriptedGateway {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn connect(&self, target: &DatabaseTarget) -> Result<Box<dyn Connection>, GatewayError> {
        if self.script.unreachable.contains(&target.name) {
            return Err(GatewayError::ConnectionFailed(format!("{} is unreachable", target.name)));
        }
        self.stats.connects.fetch_add(1, Ordering::SeqCst);
        let open = self.stats.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.peak_open.fetch_max(open, Ordering::SeqCst);
        Ok(Box::new(ScriptedConnection {
            script: Arc::clone(&self.script),
            stats: Arc::clone(&self.stats),
        }))
    }
}

struct ScriptedConnection {
    script: Arc<Script>,
    stats: Arc<Stats>,
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn execute(&mut self, procedure: &str) -> Result<ExecSummary, GatewayError> {
        if let Some(gate) = self.script.gates.get(procedure) {
            gate.notify_one();
        }
        if !self.script.call_delay.is_zero() {
            tokio::time::sleep(self.script.call_delay).await;
        }
        if self.script.failing.contains(procedure) {
            return Err(GatewayError::ExecutionFailed(format!("{procedure} raised an error")));
        }
        Ok(ExecSummary { rows_affected: 1 })
    }

    async fn disconnect(&mut self) -> Result<(), GatewayError> {
        self.stats.open.fetch_sub(1, Ordering::SeqCst);
        self.stats.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Wall clock frozen at 2024-05-06 07:08:09 local time; delays still use the
/// (paused) tokio timer.
pub struct FixedClock {
    now: DateTime<Local>,
}

impl FixedClock {
    pub fn new() -> Self {
        Self {
            now: Local.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).single().unwrap(),
        }
    }
}

#[async_trait]
impl Clock for FixedClock {
    fn now(&self) -> DateTime<Local> {
        self.now
    }

    async fn sleep(&self, duration: Duration) {
        if duration.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Keeps every event with the (tokio) instant it arrived.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(Instant, StatusEvent)>>,
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &StatusEvent) {
        self.events.lock().unwrap().push((Instant::now(), event.clone()));
    }
}

impl RecordingSink {
    pub fn all(&self) -> Vec<(Instant, StatusEvent)> {
        self.events.lock().unwrap().clone()
    }

    pub fn of_kind(&self, kind: EventKind) -> Vec<StatusEvent> {
        self.all()
            .into_iter()
            .filter(|(_, e)| e.kind == kind)
            .map(|(_, e)| e)
            .collect()
    }

    /// `(database, group, procedure)` of every executing event, in order.
    pub fn executing(&self) -> Vec<(String, String, String)> {
        self.of_kind(EventKind::Executing)
            .into_iter()
            .map(|e| (e.database, e.group.unwrap_or_default(), e.procedure.unwrap_or_default()))
            .collect()
    }

    pub fn executing_in(&self, database: &str, group: &str) -> Vec<String> {
        self.executing()
            .into_iter()
            .filter(|(d, g, _)| d == database && g == group)
            .map(|(_, _, p)| p)
            .collect()
    }
}

pub fn group(key: &str, procedures: &[&str], timeout_ms: u64) -> ProcedureGroup {
    ProcedureGroup {
        key: key.to_string(),
        procedures: procedures.iter().map(|p| p.to_string()).collect(),
        timeout: Duration::from_millis(timeout_ms),
        pause: None,
    }
}

pub fn schedule(databases: Vec<(&str, Vec<ProcedureGroup>)>) -> Schedule {
    Schedule::from_databases(
        databases
            .into_iter()
            .map(|(name, groups)| ScheduledDatabase {
                target: Arc::new(DatabaseTarget {
                    name: name.to_string(),
                    descriptor: serde_json::Value::Null,
                }),
                groups: groups.into_iter().map(Arc::new).collect(),
            })
            .collect(),
    )
}
