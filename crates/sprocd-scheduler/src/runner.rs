use std::sync::Arc;
use std::time::Duration;

use sprocd_core::{types::format_event_timestamp, EventKind, StatusEvent};
use tracing::{debug, info, instrument, warn};

use crate::{
    clock::Clock,
    error::{Result, RunnerError},
    gateway::ExecutionGateway,
    pool::ConnectionLimits,
    registry::Schedule,
    sink::EventSink,
    state::RunTicket,
    types::{DatabaseTarget, GroupOutcome, PassReport},
};

/// Executes single passes over a group's procedure list.
///
/// One runner is shared by every lineage of an engine. It never reschedules
/// anything itself; the lineage loop in the orchestrator owns the timer.
pub struct GroupRunner {
    schedule: Arc<Schedule>,
    gateway: Arc<dyn ExecutionGateway>,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    limits: Arc<ConnectionLimits>,
    step_delay: Duration,
}

impl GroupRunner {
    pub fn new(
        schedule: Arc<Schedule>,
        gateway: Arc<dyn ExecutionGateway>,
        sink: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        limits: Arc<ConnectionLimits>,
        step_delay: Duration,
    ) -> Self {
        Self {
            schedule,
            gateway,
            sink,
            clock,
            limits,
            step_delay,
        }
    }

    pub fn schedule(&self) -> &Arc<Schedule> {
        &self.schedule
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Run one pass of `group_key` on `target`.
    ///
    /// Cancellation is checked before the pass and before every procedure.
    /// A failing procedure is reported and the pass moves on; only a missing
    /// group or a failed connection ends the pass early, as an `Err`.
    #[instrument(
        skip_all,
        fields(database = %target.name, group = %group_key, generation = %ticket.generation())
    )]
    pub async fn run_once(
        &self,
        target: &DatabaseTarget,
        group_key: &str,
        ticket: &RunTicket,
    ) -> Result<GroupOutcome> {
        if ticket.is_cancelled() {
            debug!("run cancelled before pass, skipping");
            return Ok(GroupOutcome::Skipped);
        }

        let Some(group) = self.schedule.group(&target.name, group_key) else {
            let err = RunnerError::GroupNotFound {
                database: target.name.clone(),
                group: group_key.to_string(),
            };
            warn!("{err}");
            self.emit(target, EventKind::GroupNotFound, group_key, None, err.to_string());
            return Err(err);
        };

        let _slot = tokio::select! {
            slot = self.limits.acquire(&target.name) => slot,
            _ = ticket.cancelled() => {
                debug!("cancelled while waiting for a connection slot");
                return Ok(GroupOutcome::Cancelled(PassReport::default()));
            }
        };

        let mut conn = match self.gateway.connect(target).await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(gateway = self.gateway.name(), error = %e, "connect failed, pass abandoned");
                self.emit(
                    target,
                    EventKind::ConnectFailed,
                    group_key,
                    None,
                    format!("Error in group {group_key}: {e}"),
                );
                return Err(RunnerError::Connect(e));
            }
        };

        let pause = group.pause.unwrap_or(self.step_delay);
        let mut report = PassReport::default();
        let mut cancelled = false;

        for procedure in &group.procedures {
            // Re-read on every step; a cancel may have landed during the last call or pause.
            if ticket.is_cancelled() {
                cancelled = true;
                break;
            }

            info!(procedure = %procedure, "executing");
            self.emit(
                target,
                EventKind::Executing,
                group_key,
                Some(procedure.as_str()),
                format!("{procedure} executing in group {group_key}."),
            );

            match conn.execute(procedure).await {
                Ok(summary) => {
                    info!(procedure = %procedure, rows = summary.rows_affected, "executed");
                    self.emit(
                        target,
                        EventKind::Executed,
                        group_key,
                        Some(procedure.as_str()),
                        format!("{procedure} executed in group {group_key}."),
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        procedure = %procedure,
                        error = %e,
                        "procedure failed, continuing with the group"
                    );
                    self.emit(
                        target,
                        EventKind::ProcedureFailed,
                        group_key,
                        Some(procedure.as_str()),
                        format!("Error in group {group_key}: {procedure}: {e}"),
                    );
                }
            }
            report.executed += 1;

            let stamp = format_event_timestamp(self.clock.now());
            self.emit(
                target,
                EventKind::Timestamp,
                group_key,
                Some(procedure.as_str()),
                format!("Last activity {stamp}"),
            );

            if !pause.is_zero() {
                tokio::select! {
                    _ = self.clock.sleep(pause) => {}
                    _ = ticket.cancelled() => {}
                }
            }
        }

        if let Err(e) = conn.disconnect().await {
            warn!(error = %e, "disconnect failed");
            self.emit(
                target,
                EventKind::ConnectFailed,
                group_key,
                None,
                format!("Error in group {group_key}: {e}"),
            );
        }

        let outcome = if cancelled {
            GroupOutcome::Cancelled(report)
        } else {
            GroupOutcome::Completed(report)
        };
        debug!(
            executed = report.executed,
            failed = report.failed,
            outcome = outcome.label(),
            "pass finished"
        );
        Ok(outcome)
    }

    fn emit(
        &self,
        target: &DatabaseTarget,
        kind: EventKind,
        group: &str,
        procedure: Option<&str>,
        message: String,
    ) {
        let stamp = format_event_timestamp(self.clock.now());
        let mut event = StatusEvent::new(&target.name, kind, message, stamp).with_group(group);
        if let Some(procedure) = procedure {
            event = event.with_procedure(procedure);
        }
        self.sink.emit(&event);
    }
}
