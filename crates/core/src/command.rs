use crate::reply::ReplyCode;
use crate::validation::Rejection;

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use tributary_query_engine::{Column, ColumnType};

/// A category of sink subscription.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    /// Republish output events externally.
    Listen,

    /// Write output events to a columnar store.
    SaveToCassandra,

    /// Write output events to a document store.
    SaveToMongo,

    /// Write output events to a search index.
    Indexed,
}

impl ActionKind {
    /// Every action kind.
    pub const ALL: [Self; 4] = [
        Self::Listen,
        Self::SaveToCassandra,
        Self::SaveToMongo,
        Self::Indexed,
    ];

    /// Control channel carrying teardown signals for this kind.
    #[must_use]
    pub const fn channel(self) -> &'static str {
        match self {
            Self::Listen => "tributary_listen",
            Self::SaveToCassandra => "tributary_save_to_cassandra",
            Self::SaveToMongo => "tributary_save_to_mongo",
            Self::Indexed => "tributary_index",
        }
    }

    /// Reply code for enabling this kind twice on one stream.
    #[must_use]
    pub const fn already_enabled_code(self) -> ReplyCode {
        match self {
            Self::Listen => ReplyCode::KoListenerAlreadyExists,
            Self::SaveToCassandra => ReplyCode::KoSave2cassandraStreamAlreadyEnabled,
            Self::SaveToMongo => ReplyCode::KoSave2mongoStreamAlreadyEnabled,
            Self::Indexed => ReplyCode::KoIndexStreamAlreadyEnabled,
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Self::Listen => "LISTEN",
            Self::SaveToCassandra => "SAVE_TO_CASSANDRA",
            Self::SaveToMongo => "SAVE_TO_MONGO",
            Self::Indexed => "INDEXED",
        }
    }
}

impl Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a command asks the control plane to do.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    /// Define a new stream.
    Create,
    /// Append columns to a stream.
    Alter,
    /// Remove a stream and everything hanging off it.
    Drop,
    /// Feed one event into a stream.
    Insert,
    /// Attach a query to a stream.
    AddQuery,
    /// Detach a query from a stream.
    RemoveQuery,
    /// Start republishing a stream.
    Listen,
    /// Stop republishing a stream.
    StopListen,
    /// Start writing a stream to Cassandra.
    #[serde(rename = "SAVETO_CASSANDRA", alias = "SAVE_TO_CASSANDRA")]
    SaveToCassandra,
    /// Stop writing a stream to Cassandra.
    #[serde(rename = "STOP_SAVETO_CASSANDRA", alias = "STOP_SAVE_TO_CASSANDRA")]
    StopSaveToCassandra,
    /// Start writing a stream to Mongo.
    #[serde(rename = "SAVETO_MONGO", alias = "SAVE_TO_MONGO")]
    SaveToMongo,
    /// Stop writing a stream to Mongo.
    #[serde(rename = "STOP_SAVETO_MONGO", alias = "STOP_SAVE_TO_MONGO")]
    StopSaveToMongo,
    /// Start indexing a stream.
    Index,
    /// Stop indexing a stream.
    StopIndex,
    /// List every stream.
    List,
}

impl Operation {
    /// Action kind and direction (`true` = start) of an action operation.
    #[must_use]
    pub const fn action(self) -> Option<(ActionKind, bool)> {
        match self {
            Self::Listen => Some((ActionKind::Listen, true)),
            Self::StopListen => Some((ActionKind::Listen, false)),
            Self::SaveToCassandra => Some((ActionKind::SaveToCassandra, true)),
            Self::StopSaveToCassandra => Some((ActionKind::SaveToCassandra, false)),
            Self::SaveToMongo => Some((ActionKind::SaveToMongo, true)),
            Self::StopSaveToMongo => Some((ActionKind::SaveToMongo, false)),
            Self::Index => Some((ActionKind::Indexed, true)),
            Self::StopIndex => Some((ActionKind::Indexed, false)),
            _ => None,
        }
    }

    /// Position of the operation's group inside a micro-batch.
    #[must_use]
    pub const fn batch_rank(self) -> u8 {
        match self {
            Self::Create => 0,
            Self::Alter => 1,
            Self::Insert => 2,
            Self::AddQuery => 3,
            Self::RemoveQuery => 4,
            Self::Listen => 5,
            Self::StopListen => 6,
            Self::SaveToCassandra => 7,
            Self::StopSaveToCassandra => 8,
            Self::SaveToMongo => 9,
            Self::StopSaveToMongo => 10,
            Self::Index => 11,
            Self::StopIndex => 12,
            Self::List => 13,
            Self::Drop => 14,
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Alter => "ALTER",
            Self::Drop => "DROP",
            Self::Insert => "INSERT",
            Self::AddQuery => "ADD_QUERY",
            Self::RemoveQuery => "REMOVE_QUERY",
            Self::Listen => "LISTEN",
            Self::StopListen => "STOP_LISTEN",
            Self::SaveToCassandra => "SAVETO_CASSANDRA",
            Self::StopSaveToCassandra => "STOP_SAVETO_CASSANDRA",
            Self::SaveToMongo => "SAVETO_MONGO",
            Self::StopSaveToMongo => "STOP_SAVETO_MONGO",
            Self::Index => "INDEX",
            Self::StopIndex => "STOP_INDEX",
            Self::List => "LIST",
        }
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A column entry of a command: a definition for CREATE/ALTER, a value for INSERT.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnNameTypeValue {
    /// Column name.
    pub column: String,

    /// Column type, required when defining columns.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub column_type: Option<ColumnType>,

    /// Column value, used by INSERT.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

impl ColumnNameTypeValue {
    /// A column definition entry.
    pub fn definition(column: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            column: column.into(),
            column_type: Some(column_type),
            value: None,
        }
    }

    /// A column value entry.
    pub fn value(column: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            column: column.into(),
            column_type: None,
            value: Some(value),
        }
    }
}

/// A decoded client command.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Client correlation id, echoed in the reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    /// Target stream.
    #[serde(default)]
    pub stream_name: String,

    /// What to do.
    pub operation: Operation,

    /// Column definitions or values.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<ColumnNameTypeValue>,

    /// Query text for ADD_QUERY and REMOVE_QUERY.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,

    /// The message the command was decoded from, when known.
    #[serde(skip)]
    pub raw_payload: Option<String>,
}

impl Command {
    /// Creates a command with no columns and no query.
    pub fn new(operation: Operation, stream_name: impl Into<String>) -> Self {
        Self {
            request_id: None,
            stream_name: stream_name.into(),
            operation,
            columns: Vec::new(),
            query: None,
            raw_payload: None,
        }
    }

    /// Sets the correlation id.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Sets the column entries.
    #[must_use]
    pub fn with_columns(mut self, columns: Vec<ColumnNameTypeValue>) -> Self {
        self.columns = columns;
        self
    }

    /// Sets the query text.
    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Query text, trimmed. Empty when absent.
    #[must_use]
    pub fn query_text(&self) -> &str {
        self.query.as_deref().map_or("", str::trim)
    }

    /// Column entries as typed column definitions, skipping untyped entries.
    #[must_use]
    pub fn column_definitions(&self) -> Vec<Column> {
        self.columns
            .iter()
            .filter_map(|entry| {
                entry
                    .column_type
                    .map(|column_type| Column::new(entry.column.clone(), column_type))
            })
            .collect()
    }

    /// Checks that the fields the operation needs are present.
    ///
    /// # Errors
    ///
    /// Returns a `KO_PARSER_ERROR` rejection naming the missing field.
    pub fn check_shape(&self) -> Result<(), Rejection> {
        let parser_error = |message: String| Err(Rejection::new(ReplyCode::KoParserError, message));

        if self.operation == Operation::List {
            return Ok(());
        }

        if self.stream_name.trim().is_empty() {
            return parser_error(format!("Operation {} needs a stream name", self.operation));
        }

        match self.operation {
            Operation::Create | Operation::Alter => {
                if self.columns.is_empty() {
                    return parser_error(format!(
                        "Operation {} needs at least one column",
                        self.operation
                    ));
                }

                if let Some(entry) = self.columns.iter().find(|entry| entry.column_type.is_none()) {
                    return parser_error(format!("Column {} has no type", entry.column));
                }
            }
            Operation::Insert => {
                if self.columns.is_empty() {
                    return parser_error("Operation INSERT needs at least one value".to_string());
                }
            }
            Operation::AddQuery | Operation::RemoveQuery => {
                if self.query_text().is_empty() {
                    return parser_error(format!("Operation {} needs a query", self.operation));
                }
            }
            _ => {}
        }

        Ok(())
    }
}
