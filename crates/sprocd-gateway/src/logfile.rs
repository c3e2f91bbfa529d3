//! Plain-text event log: one `[<ISO-8601>] <message>` line per status event,
//! written by a background task so `emit` never touches the disk.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use sprocd_core::{EventKind, StatusEvent};
use sprocd_scheduler::EventSink;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub fn format_line(at: DateTime<Utc>, message: &str) -> String {
    format!("[{}] {}\n", at.to_rfc3339_opts(SecondsFormat::Millis, true), message)
}

pub struct LogFileSink {
    tx: mpsc::UnboundedSender<String>,
}

impl LogFileSink {
    /// Truncate (or create) `path` and start the writer task.
    ///
    /// The task ends, after flushing, once the sink is dropped.
    pub async fn create(path: impl AsRef<Path>) -> std::io::Result<(Self, JoinHandle<()>)> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(&path).await?;
        debug!(path = %path.display(), "event log truncated");

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let writer = tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                if let Err(e) = file.write_all(line.as_bytes()).await {
                    warn!(path = %path.display(), error = %e, "event log write failed");
                    continue;
                }
                if rx.is_empty() {
                    if let Err(e) = file.flush().await {
                        warn!(path = %path.display(), error = %e, "event log flush failed");
                    }
                }
            }
            let _ = file.flush().await;
        });

        Ok((Self { tx }, writer))
    }
}

impl EventSink for LogFileSink {
    fn emit(&self, event: &StatusEvent) {
        // Timestamp refreshes only drive the UI clock.
        if event.kind == EventKind::Timestamp {
            return;
        }
        let _ = self.tx.send(format_line(Utc::now(), &event.message));
    }
}
