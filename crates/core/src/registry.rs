use crate::command::ActionKind;
use crate::error::Error;
use crate::status::{QueryRecord, StatusDeserializeError, StatusSerializeError, StreamStatus};

use std::collections::BTreeSet;

use tracing::{debug, info, warn};
use tributary_control::ControlBus;
use tributary_query_engine::{QueryEngine, QueryId, StreamDefinition};
use tributary_registry::Registry;

/// Stream status records kept in line with the engine's live definitions.
///
/// Single-stream operations go through [`Registry::update`] and are atomic per
/// stream name. [`StreamRegistry::sweep_orphans`] spans many keys and is only
/// eventually consistent; a duplicate teardown broadcast is harmless.
#[derive(Clone, Debug)]
pub struct StreamRegistry<R, Q, C> {
    registry: R,
    engine: Q,
    control: C,
}

impl<R, Q, C> StreamRegistry<R, Q, C>
where
    R: Registry<StreamStatus, StatusDeserializeError, StatusSerializeError>,
    Q: QueryEngine,
    C: ControlBus,
{
    /// Creates a new `StreamRegistry`.
    pub const fn new(registry: R, engine: Q, control: C) -> Self {
        Self {
            registry,
            engine,
            control,
        }
    }

    /// Status of a stream the engine knows about.
    ///
    /// A stream the engine defines but the registry has not seen yet gets an
    /// inferred (not user defined) record. Returns `None` when the engine has no
    /// such stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine or the registry cannot be read.
    pub async fn get_status(&self, stream_name: &str) -> Result<Option<StreamStatus>, Error> {
        let Some(definition) = self
            .engine
            .get_definition(stream_name)
            .await
            .map_err(Error::query_engine)?
        else {
            return Ok(None);
        };

        if let Some(status) = self.load(stream_name).await? {
            return Ok(Some(status));
        }

        let status = StreamStatus::new(&definition, false);
        if self.insert(stream_name, status.clone()).await? {
            debug!(stream = %stream_name, "materialized inferred stream status");
            return Ok(Some(status));
        }

        // Another worker materialized it first.
        self.load(stream_name).await
    }

    /// Records a stream created by a client. Does nothing if a record exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be written.
    pub async fn create_status(&self, definition: &StreamDefinition) -> Result<(), Error> {
        if !self
            .insert(&definition.name, StreamStatus::new(definition, true))
            .await?
        {
            debug!(stream = %definition.name, "stream status already present");
        }

        Ok(())
    }

    /// Re-syncs the cached columns after the engine definition changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is gone from the engine or the registry.
    pub async fn update_after_definition_change(&self, stream_name: &str) -> Result<(), Error> {
        let definition = self
            .engine
            .get_definition(stream_name)
            .await
            .map_err(Error::query_engine)?
            .ok_or_else(|| Error::StreamNotFound(stream_name.to_string()))?;

        self.modify(stream_name, |status| status.columns = definition.columns)
            .await
    }

    /// Attaches a query record to a stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream has no record.
    pub async fn add_query(
        &self,
        stream_name: &str,
        query_id: QueryId,
        record: QueryRecord,
    ) -> Result<(), Error> {
        self.modify(stream_name, |status| {
            status.added_queries.insert(query_id, record);
        })
        .await
    }

    /// Detaches the query with this engine id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueryNotFound`] if no attached query has this id.
    pub async fn remove_query(&self, stream_name: &str, query_id: &str) -> Result<(), Error> {
        let removed = self
            .registry
            .update(stream_name, |status| {
                status.added_queries.remove(query_id).is_some()
            })
            .await
            .map_err(|e| Error::Registry(e.to_string()))?;

        match removed {
            Some(true) => Ok(()),
            Some(false) => Err(Error::QueryNotFound(stream_name.to_string())),
            None => Err(Error::StreamNotFound(stream_name.to_string())),
        }
    }

    /// Detaches the given engine queries from every stream that records them.
    ///
    /// Used when the engine stopped queries on its own, for example those
    /// reading or writing a removed stream. Returns how many records went.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be read or written.
    pub async fn forget_queries(&self, query_ids: &[QueryId]) -> Result<usize, Error> {
        if query_ids.is_empty() {
            return Ok(0);
        }

        let mut forgotten = 0;
        for stream_name in self.keys().await? {
            let removed = self
                .registry
                .update(&stream_name, |status| {
                    let before = status.added_queries.len();
                    status
                        .added_queries
                        .retain(|query_id, _| !query_ids.contains(query_id));
                    before - status.added_queries.len()
                })
                .await
                .map_err(|e| Error::Registry(e.to_string()))?
                .unwrap_or_default();

            if removed > 0 {
                debug!(stream = %stream_name, removed, "forgot queries stopped by the engine");
                forgotten += removed;
            }
        }

        Ok(forgotten)
    }

    /// Adds or removes `kind` from the stream's enabled actions.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream has no record.
    pub async fn set_action_enabled(
        &self,
        stream_name: &str,
        kind: ActionKind,
        enabled: bool,
    ) -> Result<(), Error> {
        self.modify(stream_name, |status| {
            if enabled {
                status.actions_enabled.insert(kind);
            } else {
                status.actions_enabled.remove(&kind);
            }
        })
        .await
    }

    /// Deletes the stream's record.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be written.
    pub async fn remove_status(&self, stream_name: &str) -> Result<Option<StreamStatus>, Error> {
        self.registry
            .remove(stream_name)
            .await
            .map_err(|e| Error::Registry(e.to_string()))
    }

    /// Removes every record whose stream the engine no longer defines.
    ///
    /// Each removed stream's name is broadcast on the LISTEN channel and on the
    /// channel of every other action enabled on it. Returns the removed names.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry or the engine cannot be read.
    pub async fn sweep_orphans(&self) -> Result<Vec<String>, Error> {
        let mut removed = Vec::new();

        for stream_name in self.keys().await? {
            if self
                .engine
                .get_definition(&stream_name)
                .await
                .map_err(Error::query_engine)?
                .is_some()
            {
                continue;
            }

            let Some(status) = self.remove_status(&stream_name).await? else {
                continue;
            };

            let mut kinds: BTreeSet<ActionKind> = status.actions_enabled;
            kinds.insert(ActionKind::Listen);

            for kind in kinds {
                if let Err(e) = self
                    .control
                    .publish(kind.channel(), stream_name.clone())
                    .await
                {
                    warn!(stream = %stream_name, %kind, error = %e, "failed to broadcast teardown");
                }
            }

            info!(stream = %stream_name, "removed orphaned stream status");
            removed.push(stream_name);
        }

        Ok(removed)
    }

    /// Every stream name with a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be read.
    pub async fn keys(&self) -> Result<Vec<String>, Error> {
        self.registry
            .keys()
            .await
            .map_err(|e| Error::Registry(e.to_string()))
    }

    async fn load(&self, stream_name: &str) -> Result<Option<StreamStatus>, Error> {
        self.registry
            .get(stream_name)
            .await
            .map_err(|e| Error::Registry(e.to_string()))
    }

    async fn insert(&self, stream_name: &str, status: StreamStatus) -> Result<bool, Error> {
        self.registry
            .insert_if_absent(stream_name, status)
            .await
            .map_err(|e| Error::Registry(e.to_string()))
    }

    async fn modify<F>(&self, stream_name: &str, f: F) -> Result<(), Error>
    where
        F: FnOnce(&mut StreamStatus) + Send,
    {
        self.registry
            .update(stream_name, f)
            .await
            .map_err(|e| Error::Registry(e.to_string()))?
            .ok_or_else(|| Error::StreamNotFound(stream_name.to_string()))
    }
}
