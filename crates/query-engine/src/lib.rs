//! Abstract interface for the continuous-query engine the control plane drives.
//!
//! The engine owns stream definitions and running queries. The control plane
//! only defines and removes streams, attaches and detaches queries, feeds
//! events in, and registers output callbacks that sinks hang off.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod schema;

pub use schema::{Column, ColumnType, Event, StreamDefinition, UnknownColumnType, Value};

use std::error::Error;
use std::fmt::{self, Debug, Display};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Engine-assigned identifier of a running query.
pub type QueryId = String;

/// The streams a query reads and the stream it writes, known without running it.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct QueryShape {
    /// Streams the query consumes.
    pub inputs: Vec<String>,

    /// Stream the query produces into.
    pub output: String,
}

/// The kind of query engine error.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum QueryEngineErrorKind {
    /// The query or definition text could not be understood.
    Parse,

    /// A stream with the same name is already defined.
    StreamAlreadyExists,

    /// The referenced stream is not defined.
    StreamNotFound,

    /// A column with the same name already exists on the stream.
    ColumnAlreadyExists,

    /// The referenced column does not exist on the stream.
    ColumnNotFound,

    /// No running query has the given id.
    QueryNotFound,

    /// The query's output stream exists with a different definition.
    OutputDefinitionMismatch,

    /// Other/unknown error
    Other,
}

impl Display for QueryEngineErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Marker trait for `QueryEngine` errors
pub trait QueryEngineError: Debug + Error + Send + Sync + 'static {
    /// Returns the kind of this error
    fn kind(&self) -> QueryEngineErrorKind;
}

/// Receives the output events the engine produces for one stream.
#[async_trait]
pub trait OutputCallback: Debug + Send + Sync + 'static {
    /// Called with every batch of events produced on the stream.
    async fn receive(&self, definition: &StreamDefinition, events: &[Event]);

    /// Whether the callback still wants events. Inactive callbacks are dropped
    /// by the engine the next time it delivers to the stream.
    fn is_active(&self) -> bool {
        true
    }
}

/// Abstract interface for a continuous-query engine.
#[async_trait]
pub trait QueryEngine
where
    Self: Clone + Debug + Send + Sync + 'static,
{
    /// The error type for the engine.
    type Error: QueryEngineError;

    /// Defines a new stream.
    async fn define_stream(&self, definition: StreamDefinition) -> Result<(), Self::Error>;

    /// Appends columns to an existing stream and returns the new definition.
    async fn append_columns(
        &self,
        stream_name: &str,
        columns: Vec<Column>,
    ) -> Result<StreamDefinition, Self::Error>;

    /// Removes a stream definition along with the queries that read or write
    /// it, and returns the ids of those queries.
    async fn remove_stream(&self, stream_name: &str) -> Result<Vec<QueryId>, Self::Error>;

    /// Parses a query and reports which streams it reads and writes.
    async fn inspect_query(&self, query: &str) -> Result<QueryShape, Self::Error>;

    /// Starts a query, creating its output stream if needed.
    async fn add_query(&self, query: &str) -> Result<QueryId, Self::Error>;

    /// Stops a query. Output streams that no longer have a producer or a
    /// consumer and were never defined explicitly disappear with it.
    async fn remove_query(&self, query_id: &str) -> Result<(), Self::Error>;

    /// Returns the live definition of a stream, if any.
    async fn get_definition(&self, stream_name: &str)
    -> Result<Option<StreamDefinition>, Self::Error>;

    /// Returns every live stream definition.
    async fn list_definitions(&self) -> Result<Vec<StreamDefinition>, Self::Error>;

    /// Registers a callback for the events produced on a stream.
    async fn register_callback(
        &self,
        stream_name: &str,
        callback: Arc<dyn OutputCallback>,
    ) -> Result<(), Self::Error>;

    /// Feeds one event into a stream. `values` follow the stream's column order.
    async fn send(&self, stream_name: &str, values: Vec<Value>) -> Result<(), Self::Error>;
}
