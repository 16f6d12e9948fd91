use thiserror::Error;
use tributary_query_engine::{QueryEngineError, QueryEngineErrorKind};

/// Errors that can occur in this crate.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// The event does not carry one value per column.
    #[error("stream {stream} expects {expected} values, got {actual}")]
    Arity {
        /// The stream name.
        stream: String,
        /// Number of columns on the stream.
        expected: usize,
        /// Number of values supplied.
        actual: usize,
    },

    /// A column with this name already exists.
    #[error("column {column} already exists in stream {stream}")]
    ColumnAlreadyExists {
        /// The stream name.
        stream: String,
        /// The column name.
        column: String,
    },

    /// A value does not match its column type.
    #[error("value for column {column} of stream {stream} does not match its type")]
    InvalidValue {
        /// The stream name.
        stream: String,
        /// The column name.
        column: String,
    },

    /// The output stream exists with other columns.
    #[error("output stream {0} already exists with a different definition")]
    OutputDefinitionMismatch(String),

    /// The query text could not be parsed or bound.
    #[error("parse error: {0}")]
    Parse(String),

    /// No query with this id is running.
    #[error("query {0} not found")]
    QueryNotFound(String),

    /// The stream is already defined.
    #[error("stream {0} already exists")]
    StreamAlreadyExists(String),

    /// The stream is not defined.
    #[error("stream {0} not found")]
    StreamNotFound(String),
}

impl QueryEngineError for Error {
    fn kind(&self) -> QueryEngineErrorKind {
        match self {
            Self::Arity { .. } | Self::InvalidValue { .. } => QueryEngineErrorKind::Other,
            Self::ColumnAlreadyExists { .. } => QueryEngineErrorKind::ColumnAlreadyExists,
            Self::OutputDefinitionMismatch(_) => QueryEngineErrorKind::OutputDefinitionMismatch,
            Self::Parse(_) => QueryEngineErrorKind::Parse,
            Self::QueryNotFound(_) => QueryEngineErrorKind::QueryNotFound,
            Self::StreamAlreadyExists(_) => QueryEngineErrorKind::StreamAlreadyExists,
            Self::StreamNotFound(_) => QueryEngineErrorKind::StreamNotFound,
        }
    }
}
