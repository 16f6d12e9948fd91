//! In-memory (single process) implementation of per-stream locks.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;
use tributary_locks::{LockManager, LockManager1};

type LockMap = DashMap<String, Arc<Mutex<()>>>;

/// In-memory lock manager. Clones share the same lock table.
#[derive(Clone, Debug, Default)]
pub struct MemoryLockManager {
    locks: Arc<LockMap>,
    prefix: Option<String>,
}

/// Guard returned by [`MemoryLockManager`]; the lock is released on drop.
#[derive(Debug)]
pub struct MemoryLockGuard {
    key: String,
    locks: Arc<LockMap>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for MemoryLockGuard {
    fn drop(&mut self) {
        drop(self.guard.take());

        // Forget the mutex once nobody else holds or waits on it.
        self.locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
        trace!(key = %self.key, "released lock");
    }
}

impl MemoryLockManager {
    /// Creates a new instance of `MemoryLockManager`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
            prefix: None,
        }
    }

    fn get_key(&self, resource_id: &str) -> Result<String, Error> {
        if resource_id.is_empty() {
            return Err(Error::EmptyResource);
        }

        Ok(match &self.prefix {
            Some(prefix) => format!("{prefix}:{resource_id}"),
            None => resource_id.to_string(),
        })
    }
}

#[async_trait]
impl LockManager for MemoryLockManager {
    type Error = Error;
    type Guard = MemoryLockGuard;

    async fn lock<R>(&self, resource_id: R) -> Result<Self::Guard, Self::Error>
    where
        R: Into<String> + Send,
    {
        let key = self.get_key(&resource_id.into())?;
        let mutex = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;
        trace!(%key, "acquired lock");

        Ok(MemoryLockGuard {
            key,
            locks: self.locks.clone(),
            guard: Some(guard),
        })
    }
}

impl LockManager1 for MemoryLockManager {
    type Error = Error;
    type Scoped = Self;

    fn scope<S>(&self, scope: S) -> Self::Scoped
    where
        S: AsRef<str>,
    {
        let new_scope = match &self.prefix {
            Some(existing_scope) => format!("{existing_scope}:{}", scope.as_ref()),
            None => scope.as_ref().to_string(),
        };

        Self {
            locks: self.locks.clone(),
            prefix: Some(new_scope),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;
    use tokio::time::{Duration, timeout};

    fn is_held(manager: &MemoryLockManager, key: &str) -> bool {
        manager
            .locks
            .get(key)
            .is_some_and(|mutex| mutex.try_lock().is_err())
    }

    #[tokio::test]
    async fn test_lock_and_release() {
        let manager = MemoryLockManager::new();

        let guard = manager.lock("orders").await.unwrap();
        assert!(is_held(&manager, "orders"));

        drop(guard);
        assert!(!is_held(&manager, "orders"));
        assert!(manager.locks.is_empty());
    }

    #[tokio::test]
    async fn test_other_resources_stay_free() {
        let manager = MemoryLockManager::new();
        let _guard = manager.lock("orders").await.unwrap();

        let other = timeout(Duration::from_millis(100), manager.lock("payments")).await;
        assert!(other.is_ok());

        let same = timeout(Duration::from_millis(20), manager.lock("orders")).await;
        assert!(same.is_err());
    }

    #[tokio::test]
    async fn test_waiter_gets_lock_after_release() {
        let manager = MemoryLockManager::new();
        let guard = manager.lock("orders").await.unwrap();

        let waiter = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.lock("orders").await.map(|_| ()) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_scoped_lock_manager() {
        let manager = MemoryLockManager::new();
        let scoped = manager.scope("cluster");

        let _guard = scoped.lock("orders").await.unwrap();

        assert!(manager.locks.contains_key("cluster:orders"));
        assert!(!is_held(&manager, "orders"));
        assert!(is_held(&manager, "cluster:orders"));
    }

    #[tokio::test]
    async fn test_empty_resource_is_rejected() {
        let manager = MemoryLockManager::new();

        assert_matches!(manager.lock("").await, Err(Error::EmptyResource));
    }
}
