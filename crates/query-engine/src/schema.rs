use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a column type name is not recognised.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[error("unknown column type: {0}")]
pub struct UnknownColumnType(pub String);

/// Type of a stream column.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum ColumnType {
    /// UTF-8 text.
    String,

    /// `true` or `false`.
    Boolean,

    /// 64-bit float.
    Double,

    /// 32-bit signed integer.
    Integer,

    /// 64-bit signed integer.
    Long,

    /// 32-bit float.
    Float,
}

impl ColumnType {
    /// Whether values of this type can be compared as numbers.
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::Double | Self::Integer | Self::Long | Self::Float)
    }
}

impl Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Double => "double",
            Self::Integer => "integer",
            Self::Long => "long",
            Self::Float => "float",
        };

        f.write_str(name)
    }
}

impl FromStr for ColumnType {
    type Err = UnknownColumnType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "string" | "str" => Ok(Self::String),
            "boolean" | "bool" => Ok(Self::Boolean),
            "double" => Ok(Self::Double),
            "integer" | "int" => Ok(Self::Integer),
            "long" => Ok(Self::Long),
            "float" => Ok(Self::Float),
            _ => Err(UnknownColumnType(s.to_string())),
        }
    }
}

impl TryFrom<String> for ColumnType {
    type Error = UnknownColumnType;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A named, typed column.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name, unique within its stream.
    pub name: String,

    /// Column type.
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

impl Column {
    /// Creates a new column.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// The schema of a stream.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct StreamDefinition {
    /// Stream name.
    pub name: String,

    /// Columns in event order.
    pub columns: Vec<Column>,
}

impl StreamDefinition {
    /// Creates a new definition.
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    /// Looks up a column and its position.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<(usize, &Column)> {
        self.columns
            .iter()
            .enumerate()
            .find(|(_, column)| column.name == name)
    }

    /// Whether the stream has a column with this name.
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Whether two definitions describe the same columns in the same order.
    /// Stream names are not compared.
    #[must_use]
    pub fn same_columns(&self, other: &Self) -> bool {
        self.columns == other.columns
    }
}

/// A single column value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Missing value.
    Null,

    /// Boolean value.
    Boolean(bool),

    /// 32-bit integer value.
    Integer(i32),

    /// 64-bit integer value.
    Long(i64),

    /// 32-bit float value.
    Float(f32),

    /// 64-bit float value.
    Double(f64),

    /// Text value.
    String(String),
}

impl Value {
    /// Converts a JSON value into a value of the given column type.
    ///
    /// Strings holding a number or boolean are accepted for the matching
    /// types. Returns `None` when the value does not fit the type.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_json(column_type: ColumnType, json: &serde_json::Value) -> Option<Self> {
        use serde_json::Value as Json;

        if json.is_null() {
            return Some(Self::Null);
        }

        match (column_type, json) {
            (ColumnType::String, Json::String(s)) => Some(Self::String(s.clone())),
            (ColumnType::Boolean, Json::Bool(b)) => Some(Self::Boolean(*b)),
            (ColumnType::Integer, Json::Number(n)) => {
                n.as_i64().and_then(|n| i32::try_from(n).ok()).map(Self::Integer)
            }
            (ColumnType::Long, Json::Number(n)) => n.as_i64().map(Self::Long),
            (ColumnType::Float, Json::Number(n)) => n.as_f64().map(|n| Self::Float(n as f32)),
            (ColumnType::Double, Json::Number(n)) => n.as_f64().map(Self::Double),
            (_, Json::String(s)) => Self::parse(column_type, s),
            _ => None,
        }
    }

    /// Parses a textual literal into a value of the given column type.
    #[must_use]
    pub fn parse(column_type: ColumnType, text: &str) -> Option<Self> {
        let text = text.trim();

        match column_type {
            ColumnType::String => Some(Self::String(text.to_string())),
            ColumnType::Boolean => text.parse().ok().map(Self::Boolean),
            ColumnType::Integer => text.parse().ok().map(Self::Integer),
            ColumnType::Long => text.parse().ok().map(Self::Long),
            ColumnType::Float => text.parse().ok().map(Self::Float),
            ColumnType::Double => text.parse().ok().map(Self::Double),
        }
    }

    /// Numeric view of the value, if it has one.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(n) => Some(f64::from(*n)),
            Self::Long(n) => Some(*n as f64),
            Self::Float(n) => Some(f64::from(*n)),
            Self::Double(n) => Some(*n),
            _ => None,
        }
    }

    /// Whether the value matches the column type. `Null` matches every type.
    #[must_use]
    pub const fn fits(&self, column_type: ColumnType) -> bool {
        matches!(
            (self, column_type),
            (Self::Null, _)
                | (Self::Boolean(_), ColumnType::Boolean)
                | (Self::Integer(_), ColumnType::Integer)
                | (Self::Long(_), ColumnType::Long)
                | (Self::Float(_), ColumnType::Float)
                | (Self::Double(_), ColumnType::Double)
                | (Self::String(_), ColumnType::String)
        )
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Long(n) => write!(f, "{n}"),
            Self::Float(n) => write!(f, "{n}"),
            Self::Double(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

/// One row produced on, or fed into, a stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Values in the order of the stream's columns.
    pub values: Vec<Value>,
}

impl Event {
    /// Creates a new event.
    #[must_use]
    pub const fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Value of the named column under `definition`.
    #[must_use]
    pub fn get<'a>(&'a self, definition: &StreamDefinition, column: &str) -> Option<&'a Value> {
        definition
            .column(column)
            .and_then(|(index, _)| self.values.get(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_type_names() {
        assert_eq!("INT".parse::<ColumnType>(), Ok(ColumnType::Integer));
        assert_eq!("Double".parse::<ColumnType>(), Ok(ColumnType::Double));
        assert_eq!(
            "decimal".parse::<ColumnType>(),
            Err(UnknownColumnType("decimal".to_string()))
        );

        let column: Column = serde_json::from_str(r#"{"name":"id","type":"INTEGER"}"#).unwrap();
        assert_eq!(column, Column::new("id", ColumnType::Integer));
    }

    #[test]
    fn test_value_from_json() {
        let json = serde_json::json!(42);
        assert_eq!(
            Value::from_json(ColumnType::Integer, &json),
            Some(Value::Integer(42))
        );
        assert_eq!(
            Value::from_json(ColumnType::Double, &json),
            Some(Value::Double(42.0))
        );
        assert_eq!(
            Value::from_json(ColumnType::Long, &serde_json::json!("7")),
            Some(Value::Long(7))
        );
        assert_eq!(Value::from_json(ColumnType::Boolean, &json), None);
        assert_eq!(
            Value::from_json(ColumnType::Integer, &serde_json::json!(i64::MAX)),
            None
        );
        assert_eq!(
            Value::from_json(ColumnType::String, &serde_json::Value::Null),
            Some(Value::Null)
        );
    }

    #[test]
    fn test_event_lookup_by_column() {
        let definition = StreamDefinition::new(
            "orders",
            vec![
                Column::new("id", ColumnType::Integer),
                Column::new("total", ColumnType::Double),
            ],
        );
        let event = Event::new(vec![Value::Integer(1), Value::Double(150.0)]);

        assert_eq!(event.get(&definition, "total"), Some(&Value::Double(150.0)));
        assert_eq!(event.get(&definition, "missing"), None);
    }
}
