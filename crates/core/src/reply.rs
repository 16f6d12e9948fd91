use crate::command::{Command, Operation};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tributary_query_engine::Column;

/// Error returned when an integer is outside the reply code range.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
#[error("unknown reply code: {0}")]
pub struct UnknownReplyCode(pub i32);

/// Outcome code carried by every reply.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
#[repr(i32)]
pub enum ReplyCode {
    /// The command was applied.
    Ok = 1,
    /// The command or its query text is malformed.
    KoParserError = 2,
    /// The stream is already defined.
    KoStreamAlreadyExists = 3,
    /// The stream is not defined.
    KoStreamDoesNotExist = 4,
    /// The query is already attached to the stream.
    KoQueryAlreadyExists = 5,
    /// A listener is already active on the stream.
    KoListenerAlreadyExists = 6,
    /// Any failure not covered by a more specific code.
    KoGeneralError = 7,
    /// The column is already part of the stream.
    KoColumnAlreadyExists = 8,
    /// The column is not part of the stream.
    KoColumnDoesNotExist = 9,
    /// No listener is active on the stream.
    KoListenerDoesNotExist = 10,
    /// The query is not attached to the stream.
    KoQueryDoesNotExist = 11,
    /// The stream only exists as the output of a query.
    KoStreamIsNotUserDefined = 12,
    /// The query's output stream exists with other columns.
    KoOutputstreamExistsAndDefinitionIsDifferent = 13,
    /// Saving to Cassandra is already enabled on the stream.
    KoSave2cassandraStreamAlreadyEnabled = 14,
    /// A stream the query reads from is not defined.
    KoSourceStreamDoesNotExist = 15,
    /// Indexing is already enabled on the stream.
    KoIndexStreamAlreadyEnabled = 16,
    /// The stream is reserved and does not accept the operation.
    KoStreamOperationNotAllowed = 17,
    /// Saving to Mongo is already enabled on the stream.
    KoSave2mongoStreamAlreadyEnabled = 18,
}

impl ReplyCode {
    const ALL: [Self; 18] = [
        Self::Ok,
        Self::KoParserError,
        Self::KoStreamAlreadyExists,
        Self::KoStreamDoesNotExist,
        Self::KoQueryAlreadyExists,
        Self::KoListenerAlreadyExists,
        Self::KoGeneralError,
        Self::KoColumnAlreadyExists,
        Self::KoColumnDoesNotExist,
        Self::KoListenerDoesNotExist,
        Self::KoQueryDoesNotExist,
        Self::KoStreamIsNotUserDefined,
        Self::KoOutputstreamExistsAndDefinitionIsDifferent,
        Self::KoSave2cassandraStreamAlreadyEnabled,
        Self::KoSourceStreamDoesNotExist,
        Self::KoIndexStreamAlreadyEnabled,
        Self::KoStreamOperationNotAllowed,
        Self::KoSave2mongoStreamAlreadyEnabled,
    ];

    /// The wire value of the code.
    #[must_use]
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Human-readable description of the code.
    #[must_use]
    pub const fn readable(self) -> &'static str {
        readable_reply(self.code())
    }

    /// Whether the code reports success.
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl From<ReplyCode> for i32 {
    fn from(code: ReplyCode) -> Self {
        code.code()
    }
}

impl TryFrom<i32> for ReplyCode {
    type Error = UnknownReplyCode;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|code| code.code() == value)
            .ok_or(UnknownReplyCode(value))
    }
}

/// Maps any integer to its readable reply text. Unknown codes get a generic text.
#[must_use]
pub const fn readable_reply(code: i32) -> &'static str {
    match code {
        1 => "OK",
        2 => "KO: PARSER ERROR",
        3 => "KO: STREAM ALREADY EXISTS",
        4 => "KO: STREAM DOES NOT EXIST",
        5 => "KO: QUERY ALREADY EXISTS",
        6 => "KO: LISTENER ALREADY EXISTS",
        7 => "KO: GENERAL ERROR",
        8 => "KO: COLUMN ALREADY EXISTS",
        9 => "KO: COLUMN DOES NOT EXIST",
        10 => "KO: LISTENER DOES NOT EXIST",
        11 => "KO: QUERY DOES NOT EXIST",
        12 => "KO: STREAM IS NOT USER_DEFINED",
        13 => "KO: OUTPUT STREAM ALREADY EXISTS AND ITS DEFINITION IS DIFFERENT",
        14 => "KO: SAVE2CASSANDRA IN THIS STREAM IS ALREADY_ENABLED",
        15 => "KO: SOURCE STREAM IN QUERY DOES NOT EXIST",
        16 => "KO: INDEX IN THIS STREAM IS ALREADY_ENABLED",
        17 => "KO: STREAM OPERATION NOT ALLOWED",
        18 => "KO: SAVE2MONGO IN THIS STREAM IS ALREADY_ENABLED",
        _ => "UNKNOWN ERROR",
    }
}

/// A query attached to a listed stream.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct QueryListing {
    /// Engine-assigned query id.
    pub query_id: String,

    /// The query text as submitted.
    pub query: String,
}

/// One stream as reported by `LIST`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct StreamListing {
    /// Stream name.
    pub stream_name: String,

    /// Live columns.
    pub columns: Vec<Column>,

    /// Attached queries, ordered by id.
    pub queries: Vec<QueryListing>,

    /// Whether a client created the stream.
    pub user_defined: bool,

    /// Enabled action kinds.
    pub active_actions: Vec<crate::ActionKind>,
}

/// Answer to one command.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    /// Correlation id copied from the command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    /// Target stream of the command.
    pub stream_name: String,

    /// Operation of the command.
    pub operation: Operation,

    /// Outcome code.
    pub code: ReplyCode,

    /// Human-readable outcome.
    pub message: String,

    /// Streams returned by `LIST`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub streams: Vec<StreamListing>,
}

impl Reply {
    /// Builds a reply for `command`.
    pub fn new(command: &Command, code: ReplyCode, message: impl Into<String>) -> Self {
        Self {
            request_id: command.request_id.clone(),
            stream_name: command.stream_name.clone(),
            operation: command.operation,
            code,
            message: message.into(),
            streams: Vec::new(),
        }
    }

    /// Builds a success reply for `command`.
    #[must_use]
    pub fn ok(command: &Command, streams: Vec<StreamListing>) -> Self {
        Self {
            streams,
            ..Self::new(command, ReplyCode::Ok, ReplyCode::Ok.readable())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readable_reply_is_total() {
        assert_eq!(readable_reply(1), "OK");
        assert_eq!(readable_reply(17), "KO: STREAM OPERATION NOT ALLOWED");
        assert_eq!(readable_reply(0), "UNKNOWN ERROR");
        assert_eq!(readable_reply(19), "UNKNOWN ERROR");
        assert_eq!(readable_reply(i32::MIN), "UNKNOWN ERROR");
    }

    #[test]
    fn test_codes_match_wire_values() {
        for (index, code) in ReplyCode::ALL.into_iter().enumerate() {
            assert_eq!(usize::try_from(code.code()).unwrap(), index + 1);
            assert_eq!(ReplyCode::try_from(code.code()), Ok(code));
            assert_ne!(code.readable(), "UNKNOWN ERROR");
        }

        assert_eq!(ReplyCode::try_from(42), Err(UnknownReplyCode(42)));
    }

    #[test]
    fn test_code_serializes_as_integer() {
        let json = serde_json::to_string(&ReplyCode::KoQueryDoesNotExist).unwrap();
        assert_eq!(json, "11");

        let code: ReplyCode = serde_json::from_str("13").unwrap();
        assert_eq!(code, ReplyCode::KoOutputstreamExistsAndDefinitionIsDifferent);
    }
}
