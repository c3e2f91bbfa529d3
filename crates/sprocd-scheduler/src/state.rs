use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::types::Generation;

/// Process-wide run state: the current generation and its cancellation token.
///
/// `begin` and `cancel` are the only writers. Every spawned task holds a
/// [`RunTicket`] and consults it at each check-point instead of caching a flag.
#[derive(Debug)]
pub struct RunState {
    generation: Arc<AtomicU64>,
    current: Mutex<CancellationToken>,
}

impl RunState {
    /// A fresh state is cancelled: nothing runs until the first `begin`.
    pub fn new() -> Self {
        let token = CancellationToken::new();
        token.cancel();
        Self {
            generation: Arc::new(AtomicU64::new(0)),
            current: Mutex::new(token),
        }
    }

    /// Start a new generation, invalidating every ticket issued before.
    pub fn begin(&self) -> RunTicket {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        current.cancel();

        let token = CancellationToken::new();
        *current = token.clone();
        let generation = Generation(self.generation.fetch_add(1, Ordering::SeqCst) + 1);

        RunTicket {
            generation,
            token,
            current: Arc::clone(&self.generation),
        }
    }

    /// Set the cancelled flag for the current generation.
    pub fn cancel(&self) {
        self.current.lock().unwrap_or_else(PoisonError::into_inner).cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.current.lock().unwrap_or_else(PoisonError::into_inner).is_cancelled()
    }

    pub fn generation(&self) -> Generation {
        Generation(self.generation.load(Ordering::SeqCst))
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

/// Captured by every task spawned under one `begin`.
#[derive(Debug, Clone)]
pub struct RunTicket {
    generation: Generation,
    token: CancellationToken,
    current: Arc<AtomicU64>,
}

impl RunTicket {
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// True once `cancel` was called or a newer generation began.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.current.load(Ordering::SeqCst) != self.generation.0
    }

    /// Resolves when the ticket becomes cancelled.
    pub async fn cancelled(&self) {
        // `begin` cancels the previous token, so this also covers supersession.
        self.token.cancelled().await
    }
}
