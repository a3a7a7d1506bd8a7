use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use crate::errors::{AppError, Result};

/// Bounded pool of extraction slots.
///
/// This is a self-imposed rate limit towards the upstream video host, not a
/// correctness mechanism: waiters queue in FIFO order and may starve under
/// sustained overload.
#[derive(Clone)]
pub struct Slots {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// A held slot. Dropping it releases the slot.
pub type SlotPermit = OwnedSemaphorePermit;

impl Slots {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Blocks until a slot is free.
    pub async fn acquire(&self) -> Result<SlotPermit> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| AppError::Extraction("slot pool is closed".to_string()))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn dropping_a_permit_releases_the_slot() {
        let slots = Slots::new(2);
        let first = slots.acquire().await.unwrap();
        let _second = slots.acquire().await.unwrap();
        assert_eq!(slots.available(), 0);

        drop(first);
        assert_eq!(slots.available(), 1);
    }

    #[tokio::test]
    async fn acquire_blocks_while_exhausted() {
        let slots = Slots::new(1);
        let held = slots.acquire().await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(20), slots.acquire()).await;
        assert!(blocked.is_err());

        drop(held);
        let acquired = tokio::time::timeout(Duration::from_millis(20), slots.acquire()).await;
        assert!(acquired.is_ok());
    }

    #[test]
    fn zero_capacity_is_clamped() {
        assert_eq!(Slots::new(0).capacity(), 1);
    }
}
