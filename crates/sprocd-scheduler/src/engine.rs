use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use sprocd_core::{
    config::{EngineConfig, DEFAULT_MAX_CONNECTIONS, DEFAULT_STEP_DELAY_MS},
    types::format_event_timestamp,
    DispatchMode, EventKind, StatusEvent,
};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::{
    clock::{Clock, SystemClock},
    gateway::ExecutionGateway,
    lineage::LineageTable,
    orchestrator::DatabaseOrchestrator,
    pool::ConnectionLimits,
    registry::Schedule,
    runner::GroupRunner,
    sink::EventSink,
    state::RunState,
    types::{Generation, LineageSnapshot},
};

/// Tunables for a [`SchedulerEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Pause after each procedure unless the group sets its own.
    pub step_delay: Duration,
    /// Concurrent connections per database; `0` disables the cap.
    pub max_connections_per_database: usize,
    pub dispatch: DispatchMode,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            step_delay: Duration::from_millis(DEFAULT_STEP_DELAY_MS),
            max_connections_per_database: DEFAULT_MAX_CONNECTIONS,
            dispatch: DispatchMode::Concurrent,
        }
    }
}

impl From<&EngineConfig> for EngineOptions {
    fn from(config: &EngineConfig) -> Self {
        Self {
            step_delay: Duration::from_millis(config.step_delay_ms),
            max_connections_per_database: config.max_connections_per_database,
            dispatch: config.dispatch,
        }
    }
}

/// Top-level coordinator: owns the run state and fans `start()` out to one
/// orchestrator per database.
///
/// `start` and `cancel` never fail and never wait for work; outcomes are
/// observed through the event sink and [`SchedulerEngine::lineages`].
pub struct SchedulerEngine {
    schedule: Arc<Schedule>,
    runner: Arc<GroupRunner>,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    state: RunState,
    lineages: Arc<LineageTable>,
    tasks: TaskTracker,
    dispatch: DispatchMode,
}

impl SchedulerEngine {
    pub fn new(
        schedule: Schedule,
        gateway: Arc<dyn ExecutionGateway>,
        sink: Arc<dyn EventSink>,
        options: EngineOptions,
    ) -> Self {
        Self::with_clock(schedule, gateway, sink, options, Arc::new(SystemClock))
    }

    /// Like [`SchedulerEngine::new`] with an injected clock.
    pub fn with_clock(
        schedule: Schedule,
        gateway: Arc<dyn ExecutionGateway>,
        sink: Arc<dyn EventSink>,
        options: EngineOptions,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let schedule = Arc::new(schedule);
        let names = schedule.database_names();
        let limits = Arc::new(ConnectionLimits::new(
            names.iter().map(String::as_str),
            options.max_connections_per_database,
        ));
        let runner = Arc::new(GroupRunner::new(
            Arc::clone(&schedule),
            gateway,
            Arc::clone(&sink),
            Arc::clone(&clock),
            limits,
            options.step_delay,
        ));

        Self {
            schedule,
            runner,
            sink,
            clock,
            state: RunState::new(),
            lineages: Arc::new(LineageTable::new()),
            tasks: TaskTracker::new(),
            dispatch: options.dispatch,
        }
    }

    /// Begin continuous scheduling under a new generation.
    ///
    /// Lineages of any earlier generation observe themselves as cancelled at
    /// their next check-point, so overlapping calls never leave two cohorts
    /// running side by side.
    pub fn start(&self) -> Generation {
        let ticket = self.state.begin();
        let generation = ticket.generation();
        info!(%generation, databases = self.schedule.len(), "scheduling started");
        self.notice(format!("Scheduling started (generation {generation})."));

        let mut cohort = Vec::with_capacity(self.schedule.len());
        for scheduled in self.schedule.iter() {
            let keys: Vec<String> = scheduled.groups.iter().map(|g| g.key.clone()).collect();
            for key in &keys {
                self.lineages.register(&scheduled.target.name, key, generation);
            }

            let orchestrator = DatabaseOrchestrator::new(
                Arc::clone(&self.runner),
                Arc::clone(&self.lineages),
                self.tasks.clone(),
                self.dispatch,
            );
            let target = Arc::clone(&scheduled.target);
            let ticket = ticket.clone();
            cohort.push(
                self.tasks
                    .spawn(async move { orchestrator.run_all(target, keys, ticket).await }),
            );
        }

        let sink = Arc::clone(&self.sink);
        let clock = Arc::clone(&self.clock);
        self.tasks.spawn(async move {
            let mut failed = 0usize;
            for joined in join_all(cohort).await {
                match joined {
                    Ok(summary) => debug!(
                        database = %summary.database,
                        outcomes = ?summary.outcomes,
                        "first pass summary"
                    ),
                    Err(e) => {
                        failed += 1;
                        warn!(error = %e, "database orchestrator aborted");
                    }
                }
            }
            if failed == 0 {
                info!(%generation, "All procedures executed.");
                sink.emit(&StatusEvent::new(
                    "",
                    EventKind::Info,
                    "All procedures executed.",
                    format_event_timestamp(clock.now()),
                ));
            }
        });

        generation
    }

    /// Stop issuing new work. Calls already handed to the gateway finish.
    pub fn cancel(&self) {
        if self.state.is_cancelled() {
            return;
        }
        self.state.cancel();
        info!(generation = %self.state.generation(), "scheduling cancelled");
        self.notice("Scheduling cancelled.".to_string());
    }

    pub fn list_database_names(&self) -> Vec<String> {
        self.schedule.database_names()
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.is_cancelled()
    }

    pub fn generation(&self) -> Generation {
        self.state.generation()
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn lineages(&self) -> Vec<LineageSnapshot> {
        self.lineages.snapshot()
    }

    /// Wait until every task spawned so far has finished.
    ///
    /// Without a prior `cancel` this only returns once every lineage stops
    /// on its own. A gateway call that never returns keeps this waiting.
    pub async fn wait_idle(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
        info!("scheduler engine idle");
    }

    /// Cancel, then [`SchedulerEngine::wait_idle`].
    pub async fn shutdown(&self) {
        self.cancel();
        self.wait_idle().await;
    }

    fn notice(&self, message: String) {
        self.sink.emit(&StatusEvent::new(
            "",
            EventKind::Info,
            message,
            format_event_timestamp(self.clock.now()),
        ));
    }
}
