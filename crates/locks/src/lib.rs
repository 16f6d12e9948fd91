//! Abstract interface for per-stream mutation locks.
//!
//! A command handler validates against the current state and then mutates it.
//! Holding the lock for the stream name across both steps keeps two commands on
//! the same stream from interleaving, without serializing unrelated streams.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::error::Error;
use std::fmt::Debug;

use async_trait::async_trait;

/// Marker trait for `LockManager` errors
pub trait LockManagerError: Debug + Error + Send + Sync + 'static {}

/// Hands out exclusive guards keyed by resource id.
///
/// The lock is released when the guard is dropped.
#[async_trait]
pub trait LockManager
where
    Self: Clone + Debug + Send + Sync + 'static,
{
    /// The error type for lock operations.
    type Error: LockManagerError;

    /// The guard type that releases the lock on drop.
    type Guard: Send + Sync + 'static;

    /// Waits until the lock for `resource_id` is free and takes it.
    async fn lock<R>(&self, resource_id: R) -> Result<Self::Guard, Self::Error>
    where
        R: Into<String> + Send;
}

/// A lock manager that must be scoped (usually by cluster name) before use.
pub trait LockManager1
where
    Self: Clone + Debug + Send + Sync + 'static,
{
    /// The error type for the lock manager.
    type Error: LockManagerError;

    /// The scoped lock manager type.
    type Scoped: LockManager<Error = Self::Error>;

    /// Creates a scoped lock manager.
    fn scope<S>(&self, scope: S) -> Self::Scoped
    where
        S: AsRef<str>;
}
