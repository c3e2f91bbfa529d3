mod common;

use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{group, schedule, FixedClock, RecordingSink, Script, ScriptedGateway};
use sprocd_core::{DispatchMode, EventKind};
use sprocd_scheduler::{EngineOptions, Generation, LineageState, Schedule, SchedulerEngine};
use tokio::sync::Notify;
use tokio::time::sleep;

fn options() -> EngineOptions {
    EngineOptions {
        step_delay: Duration::ZERO,
        max_connections_per_database: 0,
        dispatch: DispatchMode::Concurrent,
    }
}

fn engine(
    schedule: Schedule,
    script: Script,
    options: EngineOptions,
) -> (SchedulerEngine, Arc<RecordingSink>, Arc<ScriptedGateway>) {
    let sink = Arc::new(RecordingSink::default());
    let gateway = Arc::new(ScriptedGateway::new(script));
    let engine = SchedulerEngine::new(schedule, gateway.clone(), sink.clone(), options);
    (engine, sink, gateway)
}

#[tokio::test(start_paused = true)]
async fn procedure_order_holds_on_every_pass() {
    let procs = ["sp_extract", "sp_transform", "sp_load"];
    let (engine, sink, _) = engine(
        schedule(vec![("erp", vec![group("etl", &procs, 100)])]),
        Script::default(),
        options(),
    );

    engine.start();
    sleep(Duration::from_millis(350)).await;
    engine.shutdown().await;

    let seen = sink.executing_in("erp", "etl");
    assert!(seen.len() >= 9, "expected at least three passes, got {seen:?}");
    for (i, name) in seen.iter().enumerate() {
        assert_eq!(name, procs[i % procs.len()], "pass order broken at step {i}");
    }
}

#[tokio::test(start_paused = true)]
async fn cancel_before_any_group_starts_runs_nothing() {
    let (engine, sink, gateway) = engine(
        schedule(vec![
            ("erp", vec![group("a", &["p1"], 0), group("b", &["p2"], 0)]),
            ("crm", vec![group("c", &["p3"], 0)]),
        ]),
        Script::default(),
        options(),
    );

    engine.start();
    engine.cancel();
    engine.shutdown().await;

    assert!(sink.of_kind(EventKind::Executing).is_empty());
    assert!(sink.of_kind(EventKind::Executed).is_empty());
    assert_eq!(gateway.stats.connects.load(Ordering::SeqCst), 0);

    let lineages = engine.lineages();
    assert_eq!(lineages.len(), 3);
    for lineage in lineages {
        assert_eq!(lineage.state, LineageState::Stopped, "{lineage:?}");
        assert_eq!(lineage.last_outcome.as_deref(), Some("skipped"), "{lineage:?}");
        assert_eq!(lineage.passes, 0, "{lineage:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn cancel_mid_group_stops_after_the_in_flight_call() {
    let gate = Arc::new(Notify::new());
    let script = Script {
        call_delay: Duration::from_millis(50),
        gates: [("p2".to_string(), Arc::clone(&gate))].into(),
        ..Default::default()
    };
    let (engine, sink, gateway) = engine(
        schedule(vec![("erp", vec![group("g", &["p1", "p2", "p3", "p4"], 1_000)])]),
        script,
        options(),
    );

    engine.start();
    gate.notified().await;
    engine.cancel();
    engine.shutdown().await;

    assert_eq!(sink.executing_in("erp", "g"), ["p1", "p2"]);
    let executed: Vec<_> = sink
        .of_kind(EventKind::Executed)
        .into_iter()
        .filter_map(|e| e.procedure)
        .collect();
    assert_eq!(executed, ["p1", "p2"], "the dispatched call must complete");

    let lineage = &engine.lineages()[0];
    assert_eq!(lineage.last_outcome.as_deref(), Some("partially_cancelled"));
    assert_eq!(lineage.state, LineageState::Stopped);
    assert_eq!(gateway.stats.open.load(Ordering::SeqCst), 0, "connection released");
}

#[tokio::test(start_paused = true)]
async fn next_pass_waits_for_the_group_timeout() {
    let (engine, sink, _) = engine(
        schedule(vec![("erp", vec![group("g", &["p1", "p2"], 500)])]),
        Script {
            call_delay: Duration::from_millis(20),
            ..Default::default()
        },
        options(),
    );

    engine.start();
    sleep(Duration::from_millis(1_600)).await;
    engine.shutdown().await;

    let events: Vec<_> = sink
        .all()
        .into_iter()
        .filter(|(_, e)| e.group.as_deref() == Some("g"))
        .collect();

    // A pass starts with an executing p1; the event before it ends the previous pass.
    let pass_starts: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, (_, e))| {
            e.kind == EventKind::Executing && e.procedure.as_deref() == Some("p1")
        })
        .map(|(i, _)| i)
        .collect();
    assert!(pass_starts.len() >= 3, "expected several passes, got {}", pass_starts.len());

    for &start in pass_starts.iter().skip(1) {
        let gap = events[start].0 - events[start - 1].0;
        assert!(gap >= Duration::from_millis(500), "gap between passes was {gap:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn failing_procedure_does_not_stop_the_pass() {
    let (engine, sink, _) = engine(
        schedule(vec![("erp", vec![group("g", &["p1", "p2", "p3"], 60_000)])]),
        Script {
            failing: ["p2".to_string()].into(),
            ..Default::default()
        },
        options(),
    );

    engine.start();
    sleep(Duration::from_millis(10)).await;
    engine.shutdown().await;

    assert_eq!(sink.executing_in("erp", "g"), ["p1", "p2", "p3"]);
    let failures = sink.of_kind(EventKind::ProcedureFailed);
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].procedure.as_deref(), Some("p2"));
    assert!(failures[0].message.starts_with("Error in group g: p2:"), "{}", failures[0].message);
    assert_eq!(engine.lineages()[0].last_outcome.as_deref(), Some("completed_with_errors"));
}

#[tokio::test(start_paused = true)]
async fn two_databases_fan_out_within_one_tick() {
    let (engine, sink, _) = engine(
        schedule(vec![
            (
                "erp",
                vec![group("a", &["erp_a1", "erp_a2"], 0), group("b", &["erp_b1", "erp_b2"], 0)],
            ),
            (
                "crm",
                vec![group("c", &["crm_c1", "crm_c2"], 0), group("d", &["crm_d1", "crm_d2"], 0)],
            ),
        ]),
        Script::default(),
        options(),
    );

    engine.start();
    for _ in 0..1_000 {
        if sink.executing().len() >= 32 {
            break;
        }
        tokio::task::yield_now().await;
    }
    engine.shutdown().await;

    let lanes = [
        ("erp", "a", ["erp_a1", "erp_a2"]),
        ("erp", "b", ["erp_b1", "erp_b2"]),
        ("crm", "c", ["crm_c1", "crm_c2"]),
        ("crm", "d", ["crm_d1", "crm_d2"]),
    ];
    let mut first_passes = HashSet::new();
    for (db, g, expected) in lanes {
        let seen = sink.executing_in(db, g);
        assert!(seen.len() >= 2, "{db}/{g} never completed a pass");
        assert_eq!(seen[..2], expected, "{db}/{g} first pass out of order");
        for (i, name) in seen.iter().enumerate() {
            assert_eq!(name, expected[i % 2]);
        }
        first_passes.extend(expected.iter().map(|p| (db, *p)));
    }
    assert_eq!(first_passes.len(), 8);
}

#[tokio::test(start_paused = true)]
async fn cancel_then_start_does_not_resurrect_stale_lineages() {
    let (engine, sink, _) = engine(
        schedule(vec![("erp", vec![group("g", &["p1"], 1_000)])]),
        Script::default(),
        options(),
    );

    let first = engine.start();
    sleep(Duration::from_millis(10)).await;
    engine.cancel();
    let second = engine.start();
    assert_eq!(first, Generation(1));
    assert_eq!(second, Generation(2));

    // The first generation's timer would fire at 1000ms; the second's at 1010ms and 2010ms.
    sleep(Duration::from_millis(2_500)).await;
    engine.shutdown().await;

    assert_eq!(sink.executing_in("erp", "g").len(), 4, "one pass from gen 1, three from gen 2");
    let lineage = &engine.lineages()[0];
    assert_eq!(lineage.generation, second);
    assert_eq!(lineage.passes, 3);
}

#[tokio::test(start_paused = true)]
async fn overlapping_start_supersedes_the_running_cohort() {
    let (engine, sink, _) = engine(
        schedule(vec![("erp", vec![group("g", &["p1"], 1_000)])]),
        Script::default(),
        options(),
    );

    engine.start();
    sleep(Duration::from_millis(10)).await;
    engine.start();
    sleep(Duration::from_millis(2_500)).await;
    engine.shutdown().await;

    assert_eq!(sink.executing_in("erp", "g").len(), 4);
    assert_eq!(engine.generation(), Generation(2));
}

#[tokio::test(start_paused = true)]
async fn connect_failure_still_reschedules() {
    let (engine, sink, _) = engine(
        schedule(vec![("erp", vec![group("g", &["p1"], 100)])]),
        Script {
            unreachable: ["erp".to_string()].into(),
            ..Default::default()
        },
        options(),
    );

    engine.start();
    sleep(Duration::from_millis(250)).await;
    engine.shutdown().await;

    let failures = sink.of_kind(EventKind::ConnectFailed);
    assert_eq!(failures.len(), 3, "passes at 0, 100 and 200ms");
    assert!(failures[0].message.starts_with("Error in group g: Connection failed:"));
    assert!(sink.of_kind(EventKind::Executing).is_empty());
    assert_eq!(engine.lineages()[0].last_outcome.as_deref(), Some("connect_failed"));
}

#[tokio::test(start_paused = true)]
async fn connection_limit_serialises_groups_of_one_database() {
    let (engine, sink, gateway) = engine(
        schedule(vec![(
            "erp",
            vec![
                group("a", &["pa"], 60_000),
                group("b", &["pb"], 60_000),
                group("c", &["pc"], 60_000),
            ],
        )]),
        Script {
            call_delay: Duration::from_millis(100),
            ..Default::default()
        },
        EngineOptions {
            max_connections_per_database: 1,
            ..options()
        },
    );

    engine.start();
    sleep(Duration::from_millis(50)).await;
    assert_eq!(sink.executing().len(), 1);

    sleep(Duration::from_millis(400)).await;
    engine.shutdown().await;

    assert_eq!(sink.executing().len(), 3);
    assert_eq!(gateway.stats.peak_open.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn sequential_dispatch_waits_for_each_first_pass() {
    let (engine, sink, _) = engine(
        schedule(vec![(
            "erp",
            vec![group("a", &["a1", "a2"], 60_000), group("b", &["b1"], 60_000)],
        )]),
        Script {
            call_delay: Duration::from_millis(100),
            ..Default::default()
        },
        EngineOptions {
            dispatch: DispatchMode::Sequential,
            ..options()
        },
    );

    engine.start();
    sleep(Duration::from_millis(150)).await;
    assert_eq!(sink.executing_in("erp", "b"), Vec::<String>::new());

    sleep(Duration::from_millis(200)).await;
    engine.shutdown().await;

    let order: Vec<_> = sink.executing().into_iter().map(|(_, _, p)| p).collect();
    assert_eq!(order, ["a1", "a2", "b1"]);
}

#[tokio::test(start_paused = true)]
async fn first_pass_completion_is_announced() {
    let (engine, sink, _) = engine(
        schedule(vec![
            ("erp", vec![group("a", &["p1"], 60_000)]),
            ("crm", vec![group("b", &["p2"], 60_000)]),
        ]),
        Script::default(),
        options(),
    );

    engine.start();
    sleep(Duration::from_millis(10)).await;

    let notices: Vec<_> = sink.of_kind(EventKind::Info).into_iter().map(|e| e.message).collect();
    assert!(notices.contains(&"All procedures executed.".to_string()), "{notices:?}");

    let waiting = engine.lineages();
    assert!(waiting.iter().all(|l| l.state == LineageState::WaitingForTimeout), "{waiting:?}");
    engine.shutdown().await;
    assert!(engine.lineages().iter().all(|l| l.state == LineageState::Stopped));
}

#[tokio::test(start_paused = true)]
async fn events_are_stamped_by_the_injected_clock() {
    let sink = Arc::new(RecordingSink::default());
    let engine = SchedulerEngine::with_clock(
        schedule(vec![("erp", vec![group("g", &["p1", "p2"], 1_000)])]),
        Arc::new(ScriptedGateway::new(Script::default())),
        sink.clone(),
        options(),
        Arc::new(FixedClock::new()),
    );

    engine.start();
    sleep(Duration::from_millis(10)).await;
    engine.shutdown().await;

    let executed = sink.of_kind(EventKind::Executed);
    assert_eq!(executed.len(), 2);
    for event in executed.iter().chain(sink.of_kind(EventKind::Executing).iter()) {
        assert_eq!(event.timestamp, "2024-05-06 07:08:09", "{event:?}");
    }
    let stamps = sink.of_kind(EventKind::Timestamp);
    assert_eq!(stamps.len(), 2);
    assert!(stamps.iter().all(|e| e.message == "Last activity 2024-05-06 07:08:09"));
}

#[tokio::test(start_paused = true)]
async fn wait_idle_returns_once_cancelled_lineages_stop() {
    let (engine, sink, gateway) = engine(
        schedule(vec![
            ("erp", vec![group("a", &["p1"], 100), group("b", &["p2"], 250)]),
            ("crm", vec![group("c", &["p3"], 100)]),
        ]),
        Script {
            call_delay: Duration::from_millis(30),
            ..Script::default()
        },
        options(),
    );

    engine.start();
    sleep(Duration::from_millis(120)).await;
    engine.cancel();
    engine.wait_idle().await;

    let lineages = engine.lineages();
    assert_eq!(lineages.len(), 3);
    assert!(lineages.iter().all(|l| l.state == LineageState::Stopped), "{lineages:?}");
    assert_eq!(gateway.stats.open.load(Ordering::SeqCst), 0);

    // Nothing runs after the engine went idle.
    let seen = sink.of_kind(EventKind::Executing).len();
    sleep(Duration::from_millis(1_000)).await;
    assert_eq!(sink.of_kind(EventKind::Executing).len(), seen);

    // The tracker is reusable for the next generation.
    engine.start();
    sleep(Duration::from_millis(10)).await;
    engine.shutdown().await;
    assert!(sink.of_kind(EventKind::Executing).len() > seen);
}

#[tokio::test]
async fn lists_configured_database_names() {
    let (engine, _, _) = engine(
        schedule(vec![("erp", vec![]), ("crm", vec![]), ("hr", vec![])]),
        Script::default(),
        options(),
    );
    assert_eq!(engine.list_database_names(), ["erp", "crm", "hr"]);
    assert!(engine.is_cancelled());
    assert_eq!(engine.generation(), Generation(0));
}
