//! Process-wide cap on concurrent browser sessions.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::RenderFailure;

/// Counting pool of browser-session slots.
///
/// Waiters are served in FIFO order. A slot is held by a [`SessionPermit`]
/// and returned when the permit is dropped, so every exit path of a render
/// (success, failure, or the future being dropped) frees it.
#[derive(Debug, Clone)]
pub struct SessionPool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl SessionPool {
    /// Create a pool with `capacity` slots (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a free slot.
    pub async fn acquire(&self) -> Result<SessionPermit, RenderFailure> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| RenderFailure::Launch("session pool is closed".into()))?;
        Ok(SessionPermit { _permit: permit })
    }

    /// Total number of slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Slots currently held.
    pub fn in_use(&self) -> usize {
        self.capacity - self.available()
    }
}

/// A held session slot.
#[derive(Debug)]
pub struct SessionPermit {
    _permit: OwnedSemaphorePermit,
}
