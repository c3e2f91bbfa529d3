use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sprocd_core::SprocdConfig;
use sprocd_scheduler::{
    BroadcastSink, EngineOptions, Schedule, SchedulerEngine, SinkSet, TracingSink,
};
use sprocd_sqlite::{SqliteDescriptor, SqliteGateway};
use tracing::info;

mod app;
mod http;
mod logfile;
mod ws;

#[derive(Parser)]
#[command(
    name = "sprocd",
    about = "Run groups of stored procedures against databases on a fixed re-trigger delay",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to sprocd.toml
    #[arg(long, short = 'c', global = true, env = "SPROCD_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the scheduler and the HTTP / WS control surface (default)
    Serve {
        /// Do not start scheduling until POST /start
        #[arg(long)]
        no_autostart: bool,
    },

    /// Load and validate both sources, then print the schedule
    Check,

    /// List configured database names
    Databases,

    /// Store a SQL script as a named procedure in a SQLite file
    Register {
        /// SQLite file (created if missing)
        #[arg(long)]
        db: PathBuf,
        /// Procedure name
        name: String,
        /// File holding the SQL body
        #[arg(long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sprocd=info,sprocd_scheduler=info,tower_http=debug".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = SprocdConfig::load(cli.config.as_deref()).context("loading sprocd config")?;

    match cli.command.unwrap_or(Commands::Serve { no_autostart: false }) {
        Commands::Serve { no_autostart } => serve(config, !no_autostart).await,
        Commands::Check => {
            for line in check_report(&load_schedule(&config)?) {
                println!("{line}");
            }
            Ok(())
        }
        Commands::Databases => {
            for name in load_schedule(&config)?.database_names() {
                println!("{name}");
            }
            Ok(())
        }
        Commands::Register { db, name, file } => {
            let body = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            SqliteGateway::register(&db, &name, &body)?;
            info!(db = %db.display(), procedure = %name, "procedure registered");
            Ok(())
        }
    }
}

/// Read and join both JSON sources. Any problem here is fatal.
fn load_schedule(config: &SprocdConfig) -> anyhow::Result<Schedule> {
    let (databases, procedures) = config.sources.read()?;
    let schedule = Schedule::load(&databases, &procedures)?;
    info!(databases = schedule.len(), "schedule loaded");
    Ok(schedule)
}

/// Human-readable schedule, flagging procedures missing from SQLite targets.
fn check_report(schedule: &Schedule) -> Vec<String> {
    let mut lines = Vec::new();
    for scheduled in schedule.iter() {
        lines.push(scheduled.target.name.clone());

        let registered = match SqliteDescriptor::from_value(&scheduled.target.descriptor) {
            Ok(descriptor) => match SqliteGateway::procedures(&descriptor.path) {
                Ok(names) => Some(names),
                Err(e) => {
                    lines.push(format!("  ! cannot open {}: {e}", descriptor.path.display()));
                    None
                }
            },
            Err(_) => None,
        };

        for group in &scheduled.groups {
            let pause = group
                .pause
                .map(|p| format!(", pause {}ms", p.as_millis()))
                .unwrap_or_default();
            lines.push(format!(
                "  {} (every {}ms{pause}): {}",
                group.key,
                group.timeout.as_millis(),
                group.procedures.join(", ")
            ));
            if let Some(registered) = &registered {
                for missing in group.procedures.iter().filter(|p| !registered.contains(p)) {
                    lines.push(format!("    ! {missing} is not registered"));
                }
            }
        }
    }
    lines
}

async fn serve(config: SprocdConfig, autostart: bool) -> anyhow::Result<()> {
    let schedule = load_schedule(&config)?;

    let (log_sink, log_writer) = logfile::LogFileSink::create(&config.log.path)
        .await
        .with_context(|| format!("opening event log {}", config.log.path))?;
    info!(path = %config.log.path, "event log truncated");

    let broadcaster = Arc::new(BroadcastSink::new());
    let sinks = SinkSet::new()
        .with(Arc::new(TracingSink))
        .with(broadcaster.clone())
        .with(Arc::new(log_sink));

    let engine = SchedulerEngine::new(
        schedule,
        Arc::new(SqliteGateway::new()),
        Arc::new(sinks),
        EngineOptions::from(&config.engine),
    );

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let start_now = autostart && config.engine.autostart;
    let state = Arc::new(app::AppState::new(config, engine, broadcaster));
    let router = app::build_router(state.clone());

    if start_now {
        state.engine.start();
    }

    info!("sprocd listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    state.engine.shutdown().await;
    // The writer ends once every handle to the sink set is gone; an
    // upgraded WS connection may still hold one.
    drop(state);
    if tokio::time::timeout(Duration::from_secs(2), log_writer).await.is_err() {
        tracing::warn!("event log writer still busy at exit");
    }
    Ok(())
}
