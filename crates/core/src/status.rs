use crate::command::ActionKind;

use std::collections::{BTreeMap, BTreeSet};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tributary_query_engine::{Column, StreamDefinition};

/// Deserialization error of a stored [`StreamStatus`].
pub type StatusDeserializeError = ciborium::de::Error<std::io::Error>;

/// Serialization error of a stored [`StreamStatus`].
pub type StatusSerializeError = ciborium::ser::Error<std::io::Error>;

/// A query attached to a stream.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct QueryRecord {
    /// The query text as the client sent it, surrounding whitespace included.
    pub raw_query: String,

    /// The first stream the query reads from.
    pub source_stream: String,
}

/// Cluster-wide record of one stream.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct StreamStatus {
    /// Stream name.
    pub stream_name: String,

    /// True if a client created the stream, false if it only exists as a query output.
    pub user_defined: bool,

    /// Columns as last synced from the engine.
    pub columns: Vec<Column>,

    /// Attached queries by engine query id.
    pub added_queries: BTreeMap<String, QueryRecord>,

    /// Action kinds with a live sink subscription.
    pub actions_enabled: BTreeSet<ActionKind>,
}

impl StreamStatus {
    /// A fresh status for `definition`.
    #[must_use]
    pub fn new(definition: &StreamDefinition, user_defined: bool) -> Self {
        Self {
            stream_name: definition.name.clone(),
            user_defined,
            columns: definition.columns.clone(),
            added_queries: BTreeMap::new(),
            actions_enabled: BTreeSet::new(),
        }
    }

    /// Whether `kind` is enabled on the stream.
    #[must_use]
    pub fn is_enabled(&self, kind: ActionKind) -> bool {
        self.actions_enabled.contains(&kind)
    }

    /// Id of the attached query with this text. Surrounding whitespace is
    /// ignored on both sides.
    #[must_use]
    pub fn find_query(&self, raw_query: &str) -> Option<&str> {
        let raw_query = raw_query.trim();
        self.added_queries
            .iter()
            .find(|(_, record)| record.raw_query.trim() == raw_query)
            .map(|(query_id, _)| query_id.as_str())
    }
}

impl TryFrom<Bytes> for StreamStatus {
    type Error = StatusDeserializeError;

    fn try_from(bytes: Bytes) -> Result<Self, Self::Error> {
        let reader = bytes.as_ref();
        ciborium::de::from_reader(reader)
    }
}

impl TryInto<Bytes> for StreamStatus {
    type Error = StatusSerializeError;

    fn try_into(self) -> Result<Bytes, Self::Error> {
        let mut writer = Vec::new();
        ciborium::ser::into_writer(&self, &mut writer)?;
        Ok(Bytes::from(writer))
    }
}
