//! One handler per operation. Each runs after validation passed, under the
//! stream's lock: engine first, then the registry, then sink subscriptions.

use crate::command::{ActionKind, Command};
use crate::control_plane::{ControlPlane, normalize_query};
use crate::error::Error;
use crate::reply::{QueryListing, ReplyCode, StreamListing};
use crate::status::{QueryRecord, StatusDeserializeError, StatusSerializeError, StreamStatus};
use crate::validation::Rejection;

use std::collections::BTreeSet;

use tracing::{info, warn};
use tributary_control::ControlBus;
use tributary_locks::LockManager;
use tributary_query_engine::{
    QueryEngine, QueryEngineError, QueryEngineErrorKind, QueryShape, StreamDefinition, Value,
};
use tributary_registry::Registry;

impl<R, Q, C, L> ControlPlane<R, Q, C, L>
where
    R: Registry<StreamStatus, StatusDeserializeError, StatusSerializeError>,
    Q: QueryEngine,
    C: ControlBus,
    L: LockManager,
{
    pub(crate) async fn create(&self, command: &Command) -> Result<(), Error> {
        let definition = StreamDefinition::new(&command.stream_name, command.column_definitions());

        self.engine
            .define_stream(definition.clone())
            .await
            .map_err(Error::query_engine)?;
        self.streams.create_status(&definition).await?;

        info!(stream = %definition.name, columns = definition.columns.len(), "stream created");

        Ok(())
    }

    pub(crate) async fn alter(&self, command: &Command) -> Result<(), Error> {
        let columns = command.column_definitions();
        let added = columns.len();

        self.engine
            .append_columns(&command.stream_name, columns)
            .await
            .map_err(Error::query_engine)?;
        self.streams
            .update_after_definition_change(&command.stream_name)
            .await?;

        info!(stream = %command.stream_name, added, "stream altered");

        Ok(())
    }

    pub(crate) async fn drop_stream(&self, command: &Command) -> Result<(), Error> {
        let stream_name = command.stream_name.as_str();
        let status = self
            .streams
            .get_status(stream_name)
            .await?
            .ok_or_else(|| Error::StreamNotFound(stream_name.to_string()))?;

        for query_id in status.added_queries.keys() {
            self.remove_engine_query(stream_name, query_id).await?;
        }

        let mut kinds: BTreeSet<ActionKind> = status.actions_enabled;
        kinds.insert(ActionKind::Listen);
        for kind in kinds {
            self.lifecycle.disable(stream_name, kind).await?;
        }

        let dropped = self
            .engine
            .remove_stream(stream_name)
            .await
            .map_err(Error::query_engine)?;
        self.streams.remove_status(stream_name).await?;
        self.streams.forget_queries(&dropped).await?;
        self.streams.sweep_orphans().await?;

        info!(stream = %stream_name, "stream dropped");

        Ok(())
    }

    pub(crate) async fn insert(
        &self,
        command: &Command,
        definition: Option<StreamDefinition>,
    ) -> Result<(), Error> {
        let definition =
            definition.ok_or_else(|| Error::StreamNotFound(command.stream_name.clone()))?;
        let mut values = vec![Value::Null; definition.columns.len()];

        for entry in &command.columns {
            let Some((index, column)) = definition.column(&entry.column) else {
                continue;
            };

            let json = entry.value.clone().unwrap_or_default();
            values[index] = Value::from_json(column.column_type, &json).ok_or_else(|| {
                Rejection::new(
                    ReplyCode::KoParserError,
                    format!(
                        "Value {json} for column {} is not a valid {}",
                        column.name, column.column_type
                    ),
                )
            })?;
        }

        self.engine
            .send(&command.stream_name, values)
            .await
            .map_err(Error::query_engine)
    }

    pub(crate) async fn add_query(
        &self,
        command: &Command,
        shape: Option<QueryShape>,
    ) -> Result<(), Error> {
        let raw_query = command.query.clone().unwrap_or_default();

        let query_id = self
            .engine
            .add_query(&normalize_query(command.query_text()))
            .await
            .map_err(Error::query_engine)?;

        let source_stream = shape
            .and_then(|shape| shape.inputs.into_iter().next())
            .unwrap_or_else(|| command.stream_name.clone());
        let record = QueryRecord {
            raw_query,
            source_stream,
        };

        if let Err(e) = self
            .streams
            .add_query(&command.stream_name, query_id.clone(), record)
            .await
        {
            self.remove_engine_query(&command.stream_name, &query_id).await?;
            return Err(e);
        }

        // Give every stream the query brought into existence a record.
        for definition in self
            .engine
            .list_definitions()
            .await
            .map_err(Error::query_engine)?
        {
            self.streams.get_status(&definition.name).await?;
        }

        info!(stream = %command.stream_name, query = %query_id, "query added");

        Ok(())
    }

    pub(crate) async fn remove_query(
        &self,
        command: &Command,
        status: Option<StreamStatus>,
    ) -> Result<(), Error> {
        let stream_name = command.stream_name.as_str();
        let query_id = status
            .as_ref()
            .and_then(|status| status.find_query(command.query_text()))
            .map(str::to_string)
            .ok_or_else(|| Error::QueryNotFound(stream_name.to_string()))?;

        // The record goes only once the engine no longer runs the query.
        self.remove_engine_query(stream_name, &query_id).await?;

        match self.streams.remove_query(stream_name, &query_id).await {
            Ok(()) | Err(Error::QueryNotFound(_)) => {}
            Err(e) => return Err(e),
        }
        self.streams.sweep_orphans().await?;

        info!(stream = %stream_name, query = %query_id, "query removed");

        Ok(())
    }

    async fn remove_engine_query(&self, stream_name: &str, query_id: &str) -> Result<(), Error> {
        match self.engine.remove_query(query_id).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == QueryEngineErrorKind::QueryNotFound => {
                warn!(stream = %stream_name, query = %query_id, "query already gone from engine");
                Ok(())
            }
            Err(e) => Err(Error::query_engine(e)),
        }
    }

    pub(crate) async fn start_action(&self, command: &Command, kind: ActionKind) -> Result<(), Error> {
        let stream_name = command.stream_name.as_str();
        let definition = self
            .engine
            .get_definition(stream_name)
            .await
            .map_err(Error::query_engine)?
            .ok_or_else(|| Error::StreamNotFound(stream_name.to_string()))?;

        let callback = self.lifecycle.enable(&definition, kind).await?;

        if let Err(e) = self.streams.set_action_enabled(stream_name, kind, true).await {
            callback.stop().await;
            return Err(e);
        }

        info!(stream = %stream_name, %kind, "action enabled");

        Ok(())
    }

    pub(crate) async fn stop_action(
        &self,
        command: &Command,
        kind: ActionKind,
        status: Option<StreamStatus>,
    ) -> Result<(), Error> {
        let stream_name = command.stream_name.as_str();

        if !status.is_some_and(|status| status.is_enabled(kind)) {
            info!(stream = %stream_name, %kind, "action not enabled, nothing to stop");
            return Ok(());
        }

        self.lifecycle.disable(stream_name, kind).await?;
        self.streams
            .set_action_enabled(stream_name, kind, false)
            .await?;

        info!(stream = %stream_name, %kind, "action disabled");

        Ok(())
    }

    pub(crate) async fn list(&self) -> Result<Vec<StreamListing>, Error> {
        let definitions = self
            .engine
            .list_definitions()
            .await
            .map_err(Error::query_engine)?;

        let mut listings = Vec::with_capacity(definitions.len());
        for definition in definitions {
            if self.is_reserved(&definition.name) {
                continue;
            }

            let Some(status) = self.streams.get_status(&definition.name).await? else {
                continue;
            };

            listings.push(StreamListing {
                stream_name: definition.name,
                columns: definition.columns,
                queries: status
                    .added_queries
                    .into_iter()
                    .map(|(query_id, record)| QueryListing {
                        query_id,
                        query: record.raw_query,
                    })
                    .collect(),
                user_defined: status.user_defined,
                active_actions: status.actions_enabled.into_iter().collect(),
            });
        }

        Ok(listings)
    }
}
