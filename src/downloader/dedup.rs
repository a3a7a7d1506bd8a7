use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tokio::sync::watch;

/// Tracks keys with work in flight and hands the owner's result to every
/// caller that waited on the same key.
///
/// Each key maps to a `watch` sender that is written at most once. Any number of
/// receivers read the same value, and writing with no receivers is not an error.
pub struct InFlight<T> {
    keys: RwLock<HashMap<String, watch::Sender<Option<T>>>>,
}

/// Outcome of [`InFlight::join`].
pub enum Registration<'a, T> {
    /// The caller runs the work and must finish the guard.
    Owner(OwnerGuard<'a, T>),
    /// Another caller is already running it.
    Waiter(Waiter<T>),
}

impl<T> InFlight<T> {
    pub fn new() -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
        }
    }

    /// Registers `key`. Returns `true` if the caller now owns execution.
    pub fn add(&self, key: &str) -> bool {
        let mut keys = self.keys.write().unwrap_or_else(PoisonError::into_inner);
        if keys.contains_key(key) {
            return false;
        }
        let (sender, _) = watch::channel(None);
        keys.insert(key.to_string(), sender);
        true
    }

    /// Broadcasts `result` to the waiters of `key` and forgets the key.
    pub fn remove(&self, key: &str, result: T) {
        let mut keys = self.keys.write().unwrap_or_else(PoisonError::into_inner);
        match keys.remove(key) {
            Some(sender) => {
                let waiters = sender.receiver_count();
                sender.send_replace(Some(result));
                if waiters == 0 {
                    log::debug!("[DEDUP] No waiters for key {}, result dropped", key);
                } else {
                    log::debug!("[DEDUP] Delivered result for key {} to {} waiter(s)", key, waiters);
                }
            }
            None => log::warn!("[DEDUP] Remove called for key {} which is not in flight", key),
        }
    }

    /// Registers `key` or subscribes to its running owner.
    ///
    /// A duplicate caller holds its subscription before it returns, so it
    /// cannot miss the owner's result. If the owner finished in between, the
    /// key is free again and the caller owns a fresh run.
    pub fn join(&self, key: &str) -> Registration<'_, T> {
        loop {
            if self.add(key) {
                return Registration::Owner(OwnerGuard {
                    inflight: self,
                    key: key.to_string(),
                    finished: false,
                });
            }
            if let Some(waiter) = self.subscribe(key) {
                return Registration::Waiter(waiter);
            }
        }
    }

    fn subscribe(&self, key: &str) -> Option<Waiter<T>> {
        let keys = self.keys.read().unwrap_or_else(PoisonError::into_inner);
        keys.get(key).map(|sender| Waiter {
            receiver: sender.subscribe(),
        })
    }

    fn abandon(&self, key: &str) {
        let removed = self
            .keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        if removed.is_some() {
            log::warn!("[DEDUP] Owner of key {} went away without a result", key);
        }
    }
}

#[cfg(test)]
impl<T: Clone> InFlight<T> {
    /// Waits for the owner of `key` and returns its result.
    ///
    /// Returns `None` right away when `key` is not in flight, and also when the
    /// owner was dropped without finishing. `None` is never a success.
    pub async fn wait(&self, key: &str) -> Option<T> {
        self.subscribe(key)?.outcome().await
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }
}

impl<T> Default for InFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Subscription to another caller's in-flight work.
pub struct Waiter<T> {
    receiver: watch::Receiver<Option<T>>,
}

impl<T: Clone> Waiter<T> {
    /// Waits for the owner's result. `None` means the owner went away without
    /// one, and is never a success.
    pub async fn outcome(mut self) -> Option<T> {
        match self.receiver.wait_for(Option::is_some).await {
            Ok(value) => (*value).clone(),
            Err(_) => None,
        }
    }
}

/// Ownership of an in-flight key. Dropping it without [`OwnerGuard::finish`]
/// (cancellation, panic) still frees the key; waiters then observe `None`.
pub struct OwnerGuard<'a, T> {
    inflight: &'a InFlight<T>,
    key: String,
    finished: bool,
}

impl<T> OwnerGuard<'_, T> {
    pub fn finish(mut self, result: T) {
        self.finished = true;
        self.inflight.remove(&self.key, result);
    }
}

impl<T> Drop for OwnerGuard<'_, T> {
    fn drop(&mut self) {
        if !self.finished {
            self.inflight.abandon(&self.key);
        }
    }
}
