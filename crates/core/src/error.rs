use crate::command::ActionKind;
use crate::reply::ReplyCode;
use crate::validation::Rejection;

use thiserror::Error;
use tributary_query_engine::{QueryEngineError, QueryEngineErrorKind};

/// Errors that can occur while applying a command.
#[derive(Debug, Error)]
pub enum Error {
    /// No sink factory is configured for the action kind.
    #[error("action {0} is not configured")]
    ActionNotConfigured(ActionKind),

    /// Control bus error.
    #[error("control bus error: {0}")]
    Control(String),

    /// Lock manager error.
    #[error("lock error: {0}")]
    Locks(String),

    /// Query engine error.
    #[error("{message}")]
    QueryEngine {
        /// What went wrong in the engine.
        kind: QueryEngineErrorKind,
        /// The engine's description.
        message: String,
    },

    /// The query is no longer attached to the stream.
    #[error("Query does not exist in stream {0}")]
    QueryNotFound(String),

    /// Registry error.
    #[error("registry error: {0}")]
    Registry(String),

    /// The command failed validation.
    #[error("{0}")]
    Rejected(Rejection),

    /// A sink could not be opened.
    #[error("sink error: {0}")]
    Sink(String),

    /// The stream disappeared while the command was applied.
    #[error("Stream {0} does not exist")]
    StreamNotFound(String),
}

impl Error {
    pub(crate) fn query_engine<E: QueryEngineError>(error: E) -> Self {
        Self::QueryEngine {
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    /// Reply code reported to the client for this error.
    #[must_use]
    pub const fn reply_code(&self) -> ReplyCode {
        match self {
            Self::Rejected(rejection) => rejection.code,
            Self::QueryEngine { kind, .. } => match kind {
                QueryEngineErrorKind::Parse => ReplyCode::KoParserError,
                QueryEngineErrorKind::StreamAlreadyExists => ReplyCode::KoStreamAlreadyExists,
                QueryEngineErrorKind::StreamNotFound => ReplyCode::KoStreamDoesNotExist,
                QueryEngineErrorKind::ColumnAlreadyExists => ReplyCode::KoColumnAlreadyExists,
                QueryEngineErrorKind::ColumnNotFound => ReplyCode::KoColumnDoesNotExist,
                QueryEngineErrorKind::QueryNotFound => ReplyCode::KoQueryDoesNotExist,
                QueryEngineErrorKind::OutputDefinitionMismatch => {
                    ReplyCode::KoOutputstreamExistsAndDefinitionIsDifferent
                }
                QueryEngineErrorKind::Other => ReplyCode::KoGeneralError,
            },
            Self::QueryNotFound(_) => ReplyCode::KoQueryDoesNotExist,
            Self::StreamNotFound(_) => ReplyCode::KoStreamDoesNotExist,
            Self::ActionNotConfigured(_)
            | Self::Control(_)
            | Self::Locks(_)
            | Self::Registry(_)
            | Self::Sink(_) => ReplyCode::KoGeneralError,
        }
    }
}

impl From<Rejection> for Error {
    fn from(rejection: Rejection) -> Self {
        Self::Rejected(rejection)
    }
}
