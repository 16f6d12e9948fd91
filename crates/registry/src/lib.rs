//! Abstract interface for the cluster-wide registry of stream status records.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::error::Error;
use std::fmt::Debug;

use async_trait::async_trait;
use bytes::Bytes;

/// Marker trait for `Registry` errors
pub trait RegistryError: Debug + Error + Send + Sync + 'static {}

/// A concurrent key-value registry shared by every engine instance.
///
/// Values travel as `Bytes` so that backends may live in another process. Every
/// single-key operation is atomic with respect to concurrent writers of the same
/// key; anything spanning several keys (for example `keys` followed by `remove`)
/// is only eventually consistent.
#[async_trait]
pub trait Registry<T, D, S>
where
    Self: Clone + Debug + Send + Sync + 'static,
    T: Clone
        + Debug
        + Send
        + Sync
        + TryFrom<Bytes, Error = D>
        + TryInto<Bytes, Error = S>
        + 'static,
    D: Debug + Error + Send + Sync + 'static,
    S: Debug + Error + Send + Sync + 'static,
{
    /// The error type for the registry.
    type Error: RegistryError;

    /// Reads the value stored under `key`.
    async fn get<K>(&self, key: K) -> Result<Option<T>, Self::Error>
    where
        K: AsRef<str> + Send;

    /// Stores `value` under `key` unless the key is already present.
    ///
    /// Returns `true` if the value was inserted.
    async fn insert_if_absent<K>(&self, key: K, value: T) -> Result<bool, Self::Error>
    where
        K: Into<String> + Send;

    /// Lists every key visible to this registry.
    async fn keys(&self) -> Result<Vec<String>, Self::Error>;

    /// Removes `key`, returning the value it held.
    async fn remove<K>(&self, key: K) -> Result<Option<T>, Self::Error>
    where
        K: AsRef<str> + Send;

    /// Atomically applies `f` to the value stored under `key`.
    ///
    /// Returns `None` without calling `f` when the key is absent.
    async fn update<K, F, R>(&self, key: K, f: F) -> Result<Option<R>, Self::Error>
    where
        K: AsRef<str> + Send,
        F: FnOnce(&mut T) -> R + Send,
        R: Send;
}

/// A registry that must be scoped once (usually by cluster name) before use.
#[async_trait]
pub trait Registry1<T, D, S>
where
    Self: Clone + Debug + Send + Sync + 'static,
    T: Clone + Debug + Send + Sync + TryFrom<Bytes, Error = D> + TryInto<Bytes, Error = S> + 'static,
    D: Debug + Error + Send + Sync + 'static,
    S: Debug + Error + Send + Sync + 'static,
{
    /// The error type for the registry.
    type Error: RegistryError;

    /// The scoped registry type.
    type Scoped: Registry<T, D, S, Error = Self::Error>;

    /// Narrows the registry to the given scope.
    fn scope<K>(&self, scope: K) -> Self::Scoped
    where
        K: AsRef<str> + Send;
}
