use std::sync::Arc;

use sprocd_core::StatusEvent;
use tokio::sync::broadcast;
use tracing::{info, warn};

const BROADCAST_CAPACITY: usize = 256;

/// Destination for status events.
///
/// `emit` is called inline from runner tasks, so implementations must
/// return promptly and swallow their own delivery failures.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &StatusEvent);
}

/// Writes every event to the `tracing` pipeline.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &StatusEvent) {
        let group = event.group.as_deref().unwrap_or("-");
        if event.kind.is_failure() {
            warn!(database = %event.database, group, kind = %event.kind, "{}", event.message);
        } else {
            info!(database = %event.database, group, kind = %event.kind, "{}", event.message);
        }
    }
}

/// Fan-out of events to any number of live subscribers (e.g. WS clients).
pub struct BroadcastSink {
    tx: broadcast::Sender<StatusEvent>,
}

impl BroadcastSink {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for BroadcastSink {
    fn emit(&self, event: &StatusEvent) {
        // No subscribers is the normal idle state.
        let _ = self.tx.send(event.clone());
    }
}

/// Forwards each event to every registered sink, in registration order.
#[derive(Default, Clone)]
pub struct SinkSet {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl SinkSet {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for SinkSet {
    fn emit(&self, event: &StatusEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}
