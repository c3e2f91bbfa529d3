use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use sprocd_core::DispatchMode;
use tokio::sync::oneshot;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::{
    lineage::LineageTable,
    runner::GroupRunner,
    state::RunTicket,
    types::{DatabaseTarget, GroupOutcome, LineageState},
};

/// Delay before retrying a lineage whose group vanished from the schedule.
pub const MISSING_GROUP_RETRY: Duration = Duration::from_secs(60);

/// First-pass result of every group of one database, for logging only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FirstPassSummary {
    pub database: String,
    /// `(group, outcome label)` in dispatch order.
    pub outcomes: Vec<(String, String)>,
}

/// Starts and supervises the group lineages of one database.
pub struct DatabaseOrchestrator {
    runner: Arc<GroupRunner>,
    lineages: Arc<LineageTable>,
    tasks: TaskTracker,
    dispatch: DispatchMode,
}

impl DatabaseOrchestrator {
    pub fn new(
        runner: Arc<GroupRunner>,
        lineages: Arc<LineageTable>,
        tasks: TaskTracker,
        dispatch: DispatchMode,
    ) -> Self {
        Self {
            runner,
            lineages,
            tasks,
            dispatch,
        }
    }

    /// Start one self-rescheduling lineage per group of `target`.
    ///
    /// Returns once every started lineage has finished its first pass. The
    /// lineages keep running afterwards until the ticket is cancelled.
    pub async fn run_all(
        &self,
        target: Arc<DatabaseTarget>,
        groups: Vec<String>,
        ticket: RunTicket,
    ) -> FirstPassSummary {
        let generation = ticket.generation();
        let mut outcomes = Vec::with_capacity(groups.len());
        let mut pending = Vec::new();

        for (i, group) in groups.iter().enumerate() {
            if ticket.is_cancelled() {
                debug!(
                    database = %target.name,
                    remaining = groups.len() - i,
                    "cancelled before all groups were dispatched"
                );
                let skipped = GroupOutcome::Skipped.label();
                for rest in &groups[i..] {
                    self.lineages.record_outcome(&target.name, rest, generation, skipped);
                    self.lineages.set_state(&target.name, rest, generation, LineageState::Stopped);
                    outcomes.push((rest.clone(), skipped.to_string()));
                }
                break;
            }

            let first_pass = self.spawn_lineage(Arc::clone(&target), group.clone(), ticket.clone());
            match self.dispatch {
                DispatchMode::Sequential => {
                    outcomes.push((group.clone(), await_first_pass(first_pass).await));
                }
                DispatchMode::Concurrent => pending.push((group.clone(), first_pass)),
            }
        }

        let concurrent = join_all(
            pending
                .into_iter()
                .map(|(group, rx)| async move { (group, await_first_pass(rx).await) }),
        )
        .await;
        outcomes.extend(concurrent);

        info!(
            database = %target.name,
            groups = outcomes.len(),
            %generation,
            "first pass finished for every group"
        );
        FirstPassSummary {
            database: target.name.clone(),
            outcomes,
        }
    }

    fn spawn_lineage(
        &self,
        target: Arc<DatabaseTarget>,
        group: String,
        ticket: RunTicket,
    ) -> oneshot::Receiver<String> {
        let (tx, rx) = oneshot::channel();
        let runner = Arc::clone(&self.runner);
        let lineages = Arc::clone(&self.lineages);
        self.tasks
            .spawn(async move { run_lineage(runner, lineages, target, group, ticket, tx).await });
        rx
    }
}

async fn await_first_pass(rx: oneshot::Receiver<String>) -> String {
    rx.await.unwrap_or_else(|_| "aborted".to_string())
}

/// Pass → wait → pass loop for one `(database, group)` under one generation.
///
/// Every outcome except `Skipped` re-arms the timer, including connect
/// failures. The wait races the ticket, and the ticket is checked again when
/// the timer fires, so a cancelled or superseded lineage never starts
/// another pass.
async fn run_lineage(
    runner: Arc<GroupRunner>,
    lineages: Arc<LineageTable>,
    target: Arc<DatabaseTarget>,
    group: String,
    ticket: RunTicket,
    first_pass: oneshot::Sender<String>,
) {
    let generation = ticket.generation();
    let database = target.name.as_str();
    let mut first_pass = Some(first_pass);

    loop {
        lineages.pass_started(database, &group, generation);
        let result = runner.run_once(&target, &group, &ticket).await;

        let label = match &result {
            Ok(outcome) => outcome.label().to_string(),
            Err(e) => e.code().to_ascii_lowercase(),
        };
        let skipped = matches!(result, Ok(GroupOutcome::Skipped));
        lineages.record_outcome(database, &group, generation, &label);
        if !skipped {
            lineages.pass_finished(database, &group, generation);
        }
        if let Some(tx) = first_pass.take() {
            let _ = tx.send(label);
        }

        if skipped {
            break;
        }

        let timeout = match runner.schedule().group(database, &group) {
            Some(g) => g.timeout,
            None => {
                warn!(
                    database,
                    group = %group,
                    retry_secs = MISSING_GROUP_RETRY.as_secs(),
                    "group missing, retrying later"
                );
                MISSING_GROUP_RETRY
            }
        };

        lineages.set_state(database, &group, generation, LineageState::WaitingForTimeout);
        debug!(
            database,
            group = %group,
            timeout_ms = timeout.as_millis() as u64,
            "waiting before next pass"
        );
        tokio::select! {
            _ = runner.clock().sleep(timeout) => {}
            _ = ticket.cancelled() => break,
        }
        if ticket.is_cancelled() {
            break;
        }
    }

    lineages.set_state(database, &group, generation, LineageState::Stopped);
    debug!(database, group = %group, %generation, "lineage stopped");
}
