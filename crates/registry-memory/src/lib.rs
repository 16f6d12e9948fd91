//! Embedded (single process) implementation of the stream registry.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::error::Error as StdError;
use std::fmt::{Debug, Formatter};
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tributary_registry::{Registry, Registry1};

/// In-memory registry backed by a sharded concurrent map.
///
/// Clones share the same map, so every clone handed to a worker observes the
/// same records. Per-key atomicity comes from the shard write lock held for the
/// whole read-modify-write in [`Registry::update`].
pub struct MemoryRegistry<T, D, S> {
    map: Arc<DashMap<String, Bytes>>,
    prefix: Option<String>,
    _marker: PhantomData<fn() -> (T, D, S)>,
}

impl<T, D, S> Clone for MemoryRegistry<T, D, S> {
    fn clone(&self) -> Self {
        Self {
            map: self.map.clone(),
            prefix: self.prefix.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T, D, S> Debug for MemoryRegistry<T, D, S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryRegistry")
            .field("entries", &self.map.len())
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl<T, D, S> Default for MemoryRegistry<T, D, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, D, S> MemoryRegistry<T, D, S> {
    /// Creates a new, empty `MemoryRegistry`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            map: Arc::new(DashMap::new()),
            prefix: None,
            _marker: PhantomData,
        }
    }

    fn with_scope(&self, prefix: String) -> Self {
        Self {
            map: self.map.clone(),
            prefix: Some(prefix),
            _marker: PhantomData,
        }
    }

    fn get_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}:{key}"),
            None => key.to_string(),
        }
    }

    fn strip_key<'a>(&self, full_key: &'a str) -> Option<&'a str> {
        match &self.prefix {
            Some(prefix) => full_key
                .strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_prefix(':')),
            None => Some(full_key),
        }
    }
}

fn decode<T, D>(key: &str, bytes: Bytes) -> Result<T, Error>
where
    T: TryFrom<Bytes, Error = D>,
    D: StdError,
{
    T::try_from(bytes).map_err(|e| Error::Deserialize {
        key: key.to_string(),
        message: e.to_string(),
    })
}

fn encode<T, S>(key: &str, value: T) -> Result<Bytes, Error>
where
    T: TryInto<Bytes, Error = S>,
    S: StdError,
{
    value.try_into().map_err(|e| Error::Serialize {
        key: key.to_string(),
        message: e.to_string(),
    })
}

#[async_trait]
impl<T, D, S> Registry<T, D, S> for MemoryRegistry<T, D, S>
where
    T: Clone
        + Debug
        + Send
        + Sync
        + TryFrom<Bytes, Error = D>
        + TryInto<Bytes, Error = S>
        + 'static,
    D: Debug + StdError + Send + Sync + 'static,
    S: Debug + StdError + Send + Sync + 'static,
{
    type Error = Error;

    async fn get<K>(&self, key: K) -> Result<Option<T>, Self::Error>
    where
        K: AsRef<str> + Send,
    {
        let key = self.get_key(key.as_ref());
        let bytes = self.map.get(&key).map(|entry| entry.value().clone());

        bytes.map(|bytes| decode(&key, bytes)).transpose()
    }

    async fn insert_if_absent<K>(&self, key: K, value: T) -> Result<bool, Self::Error>
    where
        K: Into<String> + Send,
    {
        let key = self.get_key(&key.into());
        let bytes = encode(&key, value)?;

        match self.map.entry(key) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(vacant) => {
                vacant.insert(bytes);
                Ok(true)
            }
        }
    }

    async fn keys(&self) -> Result<Vec<String>, Self::Error> {
        Ok(self
            .map
            .iter()
            .filter_map(|entry| self.strip_key(entry.key()).map(ToString::to_string))
            .collect())
    }

    async fn remove<K>(&self, key: K) -> Result<Option<T>, Self::Error>
    where
        K: AsRef<str> + Send,
    {
        let key = self.get_key(key.as_ref());

        self.map
            .remove(&key)
            .map(|(_, bytes)| decode(&key, bytes))
            .transpose()
    }

    async fn update<K, F, R>(&self, key: K, f: F) -> Result<Option<R>, Self::Error>
    where
        K: AsRef<str> + Send,
        F: FnOnce(&mut T) -> R + Send,
        R: Send,
    {
        let key = self.get_key(key.as_ref());

        // The shard stays write-locked until `entry` drops, so no other writer
        // can interleave between decode and store.
        let Some(mut entry) = self.map.get_mut(&key) else {
            return Ok(None);
        };

        let mut value: T = decode(&key, entry.value().clone())?;
        let result = f(&mut value);
        *entry.value_mut() = encode(&key, value)?;
        drop(entry);

        Ok(Some(result))
    }
}

#[async_trait]
impl<T, D, S> Registry1<T, D, S> for MemoryRegistry<T, D, S>
where
    T: Clone + Debug + Send + Sync + TryFrom<Bytes, Error = D> + TryInto<Bytes, Error = S> + 'static,
    D: Debug + StdError + Send + Sync + 'static,
    S: Debug + StdError + Send + Sync + 'static,
{
    type Error = Error;
    type Scoped = Self;

    fn scope<K>(&self, scope: K) -> Self::Scoped
    where
        K: AsRef<str> + Send,
    {
        let new_scope = match &self.prefix {
            Some(existing_scope) => format!("{existing_scope}:{}", scope.as_ref()),
            None => scope.as_ref().to_string(),
        };
        self.with_scope(new_scope)
    }
}
