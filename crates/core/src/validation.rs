//! Per-operation validation rules.
//!
//! Every operation maps to an ordered slice of [`Rule`]s. Rules are pure checks
//! over a [`Snapshot`] gathered before validation starts, so validating has no
//! side effects. The first failing rule decides the reply.

use crate::command::{ActionKind, Command, Operation};
use crate::reply::ReplyCode;
use crate::status::StreamStatus;

use std::fmt::{self, Display};

use tributary_query_engine::{QueryShape, StreamDefinition};

/// A failed validation: the reply code and the message sent to the client.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Rejection {
    /// Reply code of the failed rule.
    pub code: ReplyCode,

    /// Formatted message naming the stream and operation involved.
    pub message: String,
}

impl Rejection {
    /// Creates a new rejection.
    pub fn new(code: ReplyCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for Rejection {}

/// Everything the rules need to know about the command's target.
#[derive(Debug)]
pub struct Snapshot<'a> {
    /// The command being validated.
    pub command: &'a Command,

    /// Whether the target is a reserved stream name.
    pub reserved: bool,

    /// Live engine definition of the target.
    pub definition: Option<StreamDefinition>,

    /// Registry record of the target.
    pub status: Option<StreamStatus>,

    /// Result of inspecting the command's query, for ADD_QUERY.
    pub query_shape: Option<Result<QueryShape, String>>,

    /// Query inputs the engine does not define.
    pub missing_sources: Vec<String>,
}

/// One validation rule.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Rule {
    /// The target is not a reserved stream.
    StreamAllowed,
    /// The target is not defined yet.
    StreamMustNotExist,
    /// The target is defined.
    StreamMustExist,
    /// The target was created by a client.
    StreamUserDefined,
    /// None of the command's columns exist on the target.
    ColumnsMustNotExist,
    /// All of the command's columns exist on the target.
    ColumnsMustExist,
    /// The query text parses.
    QueryParses,
    /// No query with the same text is attached to the target.
    QueryMustNotExist,
    /// A query with the same text is attached to the target.
    QueryMustExist,
    /// Every stream the query reads is defined.
    SourceStreamsExist,
    /// The action kind is not enabled on the target.
    ActionNotEnabled(ActionKind),
    /// No listener is active on the target.
    ListenerMustNotExist,
    /// A listener is active on the target.
    ListenerMustExist,
}

const CREATE: &[Rule] = &[Rule::StreamAllowed, Rule::StreamMustNotExist];
const ALTER: &[Rule] = &[
    Rule::StreamAllowed,
    Rule::StreamMustExist,
    Rule::StreamUserDefined,
    Rule::ColumnsMustNotExist,
];
const DROP: &[Rule] = &[
    Rule::StreamAllowed,
    Rule::StreamMustExist,
    Rule::StreamUserDefined,
];
const INSERT: &[Rule] = &[
    Rule::StreamAllowed,
    Rule::StreamMustExist,
    Rule::ColumnsMustExist,
];
const ADD_QUERY: &[Rule] = &[
    Rule::StreamAllowed,
    Rule::StreamMustExist,
    Rule::QueryParses,
    Rule::QueryMustNotExist,
    Rule::SourceStreamsExist,
];
const REMOVE_QUERY: &[Rule] = &[
    Rule::StreamAllowed,
    Rule::StreamMustExist,
    Rule::QueryMustExist,
];
const LISTEN: &[Rule] = &[Rule::StreamMustExist, Rule::ListenerMustNotExist];
const STOP_LISTEN: &[Rule] = &[Rule::StreamMustExist, Rule::ListenerMustExist];
const SAVE_TO_CASSANDRA: &[Rule] = &[
    Rule::StreamAllowed,
    Rule::StreamMustExist,
    Rule::ActionNotEnabled(ActionKind::SaveToCassandra),
];
const SAVE_TO_MONGO: &[Rule] = &[
    Rule::StreamAllowed,
    Rule::StreamMustExist,
    Rule::ActionNotEnabled(ActionKind::SaveToMongo),
];
const INDEX: &[Rule] = &[
    Rule::StreamAllowed,
    Rule::StreamMustExist,
    Rule::ActionNotEnabled(ActionKind::Indexed),
];
const STOP_ACTION: &[Rule] = &[Rule::StreamAllowed, Rule::StreamMustExist];

/// Rules checked, in order, for `operation`.
#[must_use]
pub const fn rules_for(operation: Operation) -> &'static [Rule] {
    match operation {
        Operation::Create => CREATE,
        Operation::Alter => ALTER,
        Operation::Drop => DROP,
        Operation::Insert => INSERT,
        Operation::AddQuery => ADD_QUERY,
        Operation::RemoveQuery => REMOVE_QUERY,
        Operation::Listen => LISTEN,
        Operation::StopListen => STOP_LISTEN,
        Operation::SaveToCassandra => SAVE_TO_CASSANDRA,
        Operation::SaveToMongo => SAVE_TO_MONGO,
        Operation::Index => INDEX,
        Operation::StopSaveToCassandra | Operation::StopSaveToMongo | Operation::StopIndex => {
            STOP_ACTION
        }
        Operation::List => &[],
    }
}

/// Runs the operation's rules against `snapshot`, stopping at the first failure.
///
/// # Errors
///
/// Returns the rejection of the first rule that fails.
pub fn validate(snapshot: &Snapshot<'_>) -> Result<(), Rejection> {
    rules_for(snapshot.command.operation)
        .iter()
        .try_for_each(|rule| rule.check(snapshot))
}

impl Rule {
    /// Checks this rule against `snapshot`.
    ///
    /// # Errors
    ///
    /// Returns the rule's rejection when it does not hold.
    pub fn check(self, snapshot: &Snapshot<'_>) -> Result<(), Rejection> {
        let command = snapshot.command;
        let stream = command.stream_name.as_str();
        let enabled = |kind| {
            snapshot
                .status
                .as_ref()
                .is_some_and(|status| status.is_enabled(kind))
        };

        match self {
            Self::StreamAllowed if snapshot.reserved => Err(Rejection::new(
                ReplyCode::KoStreamOperationNotAllowed,
                format!("Operation {} not allowed in stream {stream}", command.operation),
            )),
            Self::StreamMustNotExist if snapshot.definition.is_some() => Err(Rejection::new(
                ReplyCode::KoStreamAlreadyExists,
                format!("Stream {stream} already exists"),
            )),
            Self::StreamMustExist if snapshot.definition.is_none() => Err(Rejection::new(
                ReplyCode::KoStreamDoesNotExist,
                format!("Stream {stream} does not exist"),
            )),
            Self::StreamUserDefined
                if !snapshot
                    .status
                    .as_ref()
                    .is_some_and(|status| status.user_defined) =>
            {
                Err(Rejection::new(
                    ReplyCode::KoStreamIsNotUserDefined,
                    format!(
                        "Stream {stream} is not user defined, operation {} not allowed",
                        command.operation
                    ),
                ))
            }
            Self::ColumnsMustNotExist => snapshot.definition.as_ref().map_or(Ok(()), |definition| {
                command
                    .columns
                    .iter()
                    .find(|entry| definition.has_column(&entry.column))
                    .map_or(Ok(()), |entry| {
                        Err(Rejection::new(
                            ReplyCode::KoColumnAlreadyExists,
                            format!("Column {} already exists in stream {stream}", entry.column),
                        ))
                    })
            }),
            Self::ColumnsMustExist => snapshot.definition.as_ref().map_or(Ok(()), |definition| {
                command
                    .columns
                    .iter()
                    .find(|entry| !definition.has_column(&entry.column))
                    .map_or(Ok(()), |entry| {
                        Err(Rejection::new(
                            ReplyCode::KoColumnDoesNotExist,
                            format!("Column {} does not exist in stream {stream}", entry.column),
                        ))
                    })
            }),
            Self::QueryParses => match &snapshot.query_shape {
                Some(Err(reason)) => Err(Rejection::new(
                    ReplyCode::KoParserError,
                    format!("Query in stream {stream} could not be parsed: {reason}"),
                )),
                _ => Ok(()),
            },
            Self::QueryMustNotExist
                if snapshot
                    .status
                    .as_ref()
                    .and_then(|status| status.find_query(command.query_text()))
                    .is_some() =>
            {
                Err(Rejection::new(
                    ReplyCode::KoQueryAlreadyExists,
                    format!("Query already exists in stream {stream}"),
                ))
            }
            Self::QueryMustExist
                if snapshot
                    .status
                    .as_ref()
                    .and_then(|status| status.find_query(command.query_text()))
                    .is_none() =>
            {
                Err(Rejection::new(
                    ReplyCode::KoQueryDoesNotExist,
                    format!("Query does not exist in stream {stream}"),
                ))
            }
            Self::SourceStreamsExist => snapshot.missing_sources.first().map_or(Ok(()), |source| {
                Err(Rejection::new(
                    ReplyCode::KoSourceStreamDoesNotExist,
                    format!("Source stream {source} in query does not exist"),
                ))
            }),
            Self::ActionNotEnabled(kind) if enabled(kind) => Err(Rejection::new(
                kind.already_enabled_code(),
                format!("Action {kind} already enabled in stream {stream}"),
            )),
            Self::ListenerMustNotExist if enabled(ActionKind::Listen) => Err(Rejection::new(
                ActionKind::Listen.already_enabled_code(),
                format!("Listener already exists in stream {stream}"),
            )),
            Self::ListenerMustExist if !enabled(ActionKind::Listen) => Err(Rejection::new(
                ReplyCode::KoListenerDoesNotExist,
                format!("Listener does not exist in stream {stream}"),
            )),
            _ => Ok(()),
        }
    }
}
