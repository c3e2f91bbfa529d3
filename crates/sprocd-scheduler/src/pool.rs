use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Caps how many group passes may hold a connection to the same database.
///
/// A limit of `0` disables the cap. Databases not registered here are
/// never limited.
#[derive(Debug, Default)]
pub struct ConnectionLimits {
    per_database: HashMap<String, Arc<Semaphore>>,
    max: usize,
}

/// Held for the lifetime of one connection; releases the slot on drop.
#[derive(Debug)]
pub struct ConnectionSlot {
    _permit: Option<OwnedSemaphorePermit>,
}

impl ConnectionLimits {
    pub fn new<'a>(databases: impl IntoIterator<Item = &'a str>, max: usize) -> Self {
        let per_database = if max == 0 {
            HashMap::new()
        } else {
            databases
                .into_iter()
                .map(|name| (name.to_string(), Arc::new(Semaphore::new(max))))
                .collect()
        };
        Self { per_database, max }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Wait for a free connection slot on `database`.
    pub async fn acquire(&self, database: &str) -> ConnectionSlot {
        let Some(semaphore) = self.per_database.get(database) else {
            return ConnectionSlot { _permit: None };
        };
        if semaphore.available_permits() == 0 {
            debug!(database, max = self.max, "connection limit reached, waiting for a slot");
        }
        // The semaphore is never closed, so acquisition only fails on shutdown races.
        let permit = Arc::clone(semaphore).acquire_owned().await.ok();
        ConnectionSlot { _permit: permit }
    }

    /// Free slots on `database`, or `None` when it is not limited.
    #[cfg(test)]
    fn available(&self, database: &str) -> Option<usize> {
        self.per_database.get(database).map(|s| s.available_permits())
    }
}
