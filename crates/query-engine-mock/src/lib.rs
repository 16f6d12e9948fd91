//! In-memory continuous-query engine for tests and single-process runs.
//!
//! Supports filter-and-project queries over a single source stream, written
//! either as `from SRC[cond and cond] select cols insert into OUT` or as
//! `insert into OUT select cols from SRC[cond]`. Window clauses are checked for
//! a known window name but events are passed through without buffering.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod query;

pub use error::Error;

use query::{ParsedQuery, QueryPlan};

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use tributary_query_engine::{
    Column, Event, OutputCallback, QueryEngine, QueryId, QueryShape, StreamDefinition, Value,
};
use uuid::Uuid;

/// Options for configuring a `MockQueryEngine`.
#[derive(Clone, Copy, Debug)]
pub struct MockQueryEngineOptions {
    /// How many query hops an event may travel before it is dropped.
    pub max_cascade_depth: usize,
}

impl Default for MockQueryEngineOptions {
    fn default() -> Self {
        Self {
            max_cascade_depth: 16,
        }
    }
}

#[derive(Debug)]
struct StreamEntry {
    definition: StreamDefinition,
    explicit: bool,
    callbacks: Vec<Arc<dyn OutputCallback>>,
}

#[derive(Debug, Default)]
struct State {
    streams: HashMap<String, StreamEntry>,
    queries: HashMap<QueryId, QueryPlan>,
}

impl State {
    fn stream(&self, stream_name: &str) -> Result<&StreamEntry, Error> {
        self.streams
            .get(stream_name)
            .ok_or_else(|| Error::StreamNotFound(stream_name.to_string()))
    }

    // Drops inferred streams that no query writes into or reads from.
    fn prune_inferred(&mut self) {
        loop {
            let used: HashSet<&str> = self
                .queries
                .values()
                .flat_map(|plan| [plan.source.as_str(), plan.output.name.as_str()])
                .collect();

            let orphans: Vec<String> = self
                .streams
                .iter()
                .filter(|(name, entry)| !entry.explicit && !used.contains(name.as_str()))
                .map(|(name, _)| name.clone())
                .collect();

            if orphans.is_empty() {
                return;
            }

            for name in orphans {
                debug!(stream = %name, "removing inferred stream");
                self.streams.remove(&name);
            }
        }
    }
}

/// In-memory continuous-query engine. Clones share the same state.
#[derive(Clone, Debug, Default)]
pub struct MockQueryEngine {
    options: MockQueryEngineOptions,
    state: Arc<RwLock<State>>,
}

impl MockQueryEngine {
    /// Creates a new instance of `MockQueryEngine`.
    #[must_use]
    pub fn new(options: MockQueryEngineOptions) -> Self {
        Self {
            options,
            state: Arc::new(RwLock::new(State::default())),
        }
    }

    /// Number of running queries.
    pub async fn query_count(&self) -> usize {
        self.state.read().await.queries.len()
    }

    fn check_values(definition: &StreamDefinition, values: &[Value]) -> Result<(), Error> {
        if values.len() != definition.columns.len() {
            return Err(Error::Arity {
                stream: definition.name.clone(),
                expected: definition.columns.len(),
                actual: values.len(),
            });
        }

        if let Some(column) = definition
            .columns
            .iter()
            .zip(values)
            .find(|(column, value)| !value.fits(column.column_type))
            .map(|(column, _)| column)
        {
            return Err(Error::InvalidValue {
                stream: definition.name.clone(),
                column: column.name.clone(),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl QueryEngine for MockQueryEngine {
    type Error = Error;

    async fn define_stream(&self, definition: StreamDefinition) -> Result<(), Self::Error> {
        let mut state = self.state.write().await;

        if state.streams.contains_key(&definition.name) {
            return Err(Error::StreamAlreadyExists(definition.name));
        }

        let mut seen = HashSet::new();
        if let Some(column) = definition
            .columns
            .iter()
            .find(|column| !seen.insert(column.name.as_str()))
        {
            return Err(Error::ColumnAlreadyExists {
                stream: definition.name.clone(),
                column: column.name.clone(),
            });
        }

        debug!(stream = %definition.name, "defined stream");
        state.streams.insert(
            definition.name.clone(),
            StreamEntry {
                definition,
                explicit: true,
                callbacks: Vec::new(),
            },
        );

        Ok(())
    }

    async fn append_columns(
        &self,
        stream_name: &str,
        columns: Vec<Column>,
    ) -> Result<StreamDefinition, Self::Error> {
        let mut state = self.state.write().await;

        let entry = state
            .streams
            .get_mut(stream_name)
            .ok_or_else(|| Error::StreamNotFound(stream_name.to_string()))?;

        let mut definition = entry.definition.clone();
        for column in columns {
            if definition.has_column(&column.name) {
                return Err(Error::ColumnAlreadyExists {
                    stream: stream_name.to_string(),
                    column: column.name,
                });
            }
            definition.columns.push(column);
        }

        entry.definition = definition.clone();

        Ok(definition)
    }

    async fn remove_stream(&self, stream_name: &str) -> Result<Vec<QueryId>, Self::Error> {
        let mut state = self.state.write().await;

        if state.streams.remove(stream_name).is_none() {
            return Err(Error::StreamNotFound(stream_name.to_string()));
        }

        let mut dropped = Vec::new();
        state.queries.retain(|id, plan| {
            if !plan.touches(stream_name) {
                return true;
            }
            debug!(query = %id, stream = %stream_name, "removing dependent query");
            dropped.push(id.clone());
            false
        });
        state.prune_inferred();

        Ok(dropped)
    }

    async fn inspect_query(&self, query: &str) -> Result<QueryShape, Self::Error> {
        let parsed = ParsedQuery::parse(query)?;

        Ok(QueryShape {
            inputs: vec![parsed.source],
            output: parsed.output,
        })
    }

    async fn add_query(&self, query: &str) -> Result<QueryId, Self::Error> {
        let parsed = ParsedQuery::parse(query)?;
        let mut state = self.state.write().await;

        let plan = QueryPlan::bind(parsed.clone(), &state.stream(&parsed.source)?.definition)?;

        match state.streams.get(&plan.output.name) {
            Some(existing) if !existing.definition.same_columns(&plan.output) => {
                return Err(Error::OutputDefinitionMismatch(plan.output.name));
            }
            Some(_) => {}
            None => {
                debug!(stream = %plan.output.name, "inferred output stream");
                state.streams.insert(
                    plan.output.name.clone(),
                    StreamEntry {
                        definition: plan.output.clone(),
                        explicit: false,
                        callbacks: Vec::new(),
                    },
                );
            }
        }

        let query_id = Uuid::new_v4().to_string();
        debug!(query = %query_id, source = %plan.source, output = %plan.output.name, "added query");
        state.queries.insert(query_id.clone(), plan);

        Ok(query_id)
    }

    async fn remove_query(&self, query_id: &str) -> Result<(), Self::Error> {
        let mut state = self.state.write().await;

        if state.queries.remove(query_id).is_none() {
            return Err(Error::QueryNotFound(query_id.to_string()));
        }

        debug!(query = %query_id, "removed query");
        state.prune_inferred();

        Ok(())
    }

    async fn get_definition(
        &self,
        stream_name: &str,
    ) -> Result<Option<StreamDefinition>, Self::Error> {
        Ok(self
            .state
            .read()
            .await
            .streams
            .get(stream_name)
            .map(|entry| entry.definition.clone()))
    }

    async fn list_definitions(&self) -> Result<Vec<StreamDefinition>, Self::Error> {
        let mut definitions: Vec<StreamDefinition> = self
            .state
            .read()
            .await
            .streams
            .values()
            .map(|entry| entry.definition.clone())
            .collect();

        definitions.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(definitions)
    }

    async fn register_callback(
        &self,
        stream_name: &str,
        callback: Arc<dyn OutputCallback>,
    ) -> Result<(), Self::Error> {
        let mut state = self.state.write().await;

        state
            .streams
            .get_mut(stream_name)
            .ok_or_else(|| Error::StreamNotFound(stream_name.to_string()))?
            .callbacks
            .push(callback);

        Ok(())
    }

    async fn send(&self, stream_name: &str, values: Vec<Value>) -> Result<(), Self::Error> {
        {
            let state = self.state.read().await;
            Self::check_values(&state.stream(stream_name)?.definition, &values)?;
        }

        let mut pending = VecDeque::from([(stream_name.to_string(), vec![Event::new(values)], 0)]);

        while let Some((name, events, depth)) = pending.pop_front() {
            if depth > self.options.max_cascade_depth {
                warn!(stream = %name, depth, "dropping events past cascade depth");
                continue;
            }

            // Snapshot under the lock; callbacks run without it.
            let (definition, callbacks) = {
                let state = self.state.read().await;
                let Some(entry) = state.streams.get(&name) else {
                    continue;
                };

                for plan in state.queries.values().filter(|plan| plan.source == name) {
                    let produced = plan.apply(&events);
                    if !produced.is_empty() {
                        pending.push_back((plan.output.name.clone(), produced, depth + 1));
                    }
                }

                (entry.definition.clone(), entry.callbacks.clone())
            };

            let mut saw_inactive = false;
            for callback in callbacks {
                if callback.is_active() {
                    callback.receive(&definition, &events).await;
                } else {
                    saw_inactive = true;
                }
            }

            if saw_inactive {
                if let Some(entry) = self.state.write().await.streams.get_mut(&name) {
                    entry.callbacks.retain(|callback| callback.is_active());
                }
            }
        }

        Ok(())
    }
}
