use crate::Error;

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tributary_query_engine::{Column, ColumnType, Event, StreamDefinition, Value};

// insert into OUT select PROJ from SRC[FILTER]#window.NAME(ARGS)
static INSERT_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)^\s*insert\s+into\s+(?P<output>\w+)\s+select\s+(?P<projection>.+?)\s+from\s+(?P<source>\w+)\s*(?:\[(?P<filter>[^\]]*)\])?\s*(?:#window\.(?P<window>\w+)\s*\((?P<args>[^)]*)\))?\s*;?\s*$",
    )
    .unwrap()
});

// from SRC[FILTER]#window.NAME(ARGS) select PROJ insert into OUT
static FROM_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)^\s*from\s+(?P<source>\w+)\s*(?:\[(?P<filter>[^\]]*)\])?\s*(?:#window\.(?P<window>\w+)\s*\((?P<args>[^)]*)\))?\s+select\s+(?P<projection>.+?)\s+insert\s+into\s+(?P<output>\w+)\s*;?\s*$",
    )
    .unwrap()
});

static CONDITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?P<column>\w+)\s*(?P<op>==|!=|>=|<=|=|>|<)\s*(?P<literal>.+?)\s*$").unwrap()
});

static CONJUNCTION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\s+and\s+").unwrap());

static PROJECTED_COLUMN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(?P<column>\w+)(?:\s+as\s+(?P<alias>\w+))?\s*$").unwrap());

const WINDOWS: [&str; 5] = ["externalTime", "length", "lengthBatch", "time", "timeBatch"];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Comparison {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Comparison {
    fn parse(op: &str) -> Self {
        match op {
            "!=" => Self::Ne,
            ">" => Self::Gt,
            ">=" => Self::Ge,
            "<" => Self::Lt,
            "<=" => Self::Le,
            _ => Self::Eq,
        }
    }

    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Gt => ordering == Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
            Self::Lt => ordering == Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Literal {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Literal {
    fn parse(text: &str) -> Result<Self, Error> {
        let text = text.trim();

        for quote in ['\'', '"'] {
            if let Some(inner) = text
                .strip_prefix(quote)
                .and_then(|rest| rest.strip_suffix(quote))
            {
                return Ok(Self::Text(inner.to_string()));
            }
        }

        if text.eq_ignore_ascii_case("true") {
            return Ok(Self::Bool(true));
        }
        if text.eq_ignore_ascii_case("false") {
            return Ok(Self::Bool(false));
        }

        text.parse()
            .map(Self::Number)
            .map_err(|_| Error::Parse(format!("invalid literal: {text}")))
    }

    const fn accepts(&self, column_type: ColumnType) -> bool {
        match self {
            Self::Bool(_) => matches!(column_type, ColumnType::Boolean),
            Self::Number(_) => column_type.is_numeric(),
            Self::Text(_) => matches!(column_type, ColumnType::String),
        }
    }

    fn compare(&self, value: &Value) -> Option<Ordering> {
        match (value, self) {
            (Value::Boolean(value), Self::Bool(literal)) => Some(value.cmp(literal)),
            (Value::String(value), Self::Text(literal)) => Some(value.as_str().cmp(literal.as_str())),
            (value, Self::Number(literal)) => value.as_f64()?.partial_cmp(literal),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
struct Condition {
    column: String,
    comparison: Comparison,
    literal: Literal,
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum Projection {
    All,
    Columns(Vec<(String, String)>),
}

/// A query as written, before it is checked against its source stream.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedQuery {
    pub source: String,
    pub output: String,
    conditions: Vec<Condition>,
    projection: Projection,
}

impl ParsedQuery {
    pub fn parse(text: &str) -> Result<Self, Error> {
        let captures = INSERT_FIRST
            .captures(text)
            .or_else(|| FROM_FIRST.captures(text))
            .ok_or_else(|| Error::Parse(format!("unrecognised query: {}", text.trim())))?;

        let source = captures["source"].to_string();
        let output = captures["output"].to_string();

        if source == output {
            return Err(Error::Parse(format!(
                "query reads and writes the same stream {source}"
            )));
        }

        if let Some(window) = captures.name("window") {
            if !WINDOWS.contains(&window.as_str()) {
                return Err(Error::Parse(format!("unknown window: {}", window.as_str())));
            }
        }

        let conditions = match captures.name("filter") {
            Some(filter) => parse_conditions(filter.as_str())?,
            None => Vec::new(),
        };

        let projection = parse_projection(&captures["projection"])?;

        Ok(Self {
            source,
            output,
            conditions,
            projection,
        })
    }
}

fn parse_conditions(filter: &str) -> Result<Vec<Condition>, Error> {
    if filter.trim().is_empty() {
        return Err(Error::Parse("empty filter".to_string()));
    }

    CONJUNCTION
        .split(filter)
        .map(|part| {
            let captures = CONDITION
                .captures(part)
                .ok_or_else(|| Error::Parse(format!("invalid condition: {}", part.trim())))?;

            Ok(Condition {
                column: captures["column"].to_string(),
                comparison: Comparison::parse(&captures["op"]),
                literal: Literal::parse(&captures["literal"])?,
            })
        })
        .collect()
}

fn parse_projection(projection: &str) -> Result<Projection, Error> {
    if projection.trim() == "*" {
        return Ok(Projection::All);
    }

    let mut seen = HashSet::new();
    let mut columns = Vec::new();

    for part in projection.split(',') {
        let captures = PROJECTED_COLUMN
            .captures(part)
            .ok_or_else(|| Error::Parse(format!("invalid projection: {}", part.trim())))?;

        let column = captures["column"].to_string();
        let alias = captures
            .name("alias")
            .map_or_else(|| column.clone(), |alias| alias.as_str().to_string());

        if !seen.insert(alias.clone()) {
            return Err(Error::Parse(format!("duplicate output column: {alias}")));
        }

        columns.push((column, alias));
    }

    Ok(Projection::Columns(columns))
}

#[derive(Clone, Debug)]
struct BoundCondition {
    index: usize,
    comparison: Comparison,
    literal: Literal,
}

/// A query bound to its source definition, ready to run.
#[derive(Clone, Debug)]
pub struct QueryPlan {
    pub source: String,
    pub output: StreamDefinition,
    conditions: Vec<BoundCondition>,
    projection: Vec<usize>,
}

impl QueryPlan {
    pub fn bind(parsed: ParsedQuery, source: &StreamDefinition) -> Result<Self, Error> {
        let lookup = |name: &str| {
            source.column(name).ok_or_else(|| {
                Error::Parse(format!("column {name} does not exist in stream {}", source.name))
            })
        };

        let conditions = parsed
            .conditions
            .into_iter()
            .map(|condition| {
                let (index, column) = lookup(&condition.column)?;

                if !condition.literal.accepts(column.column_type) {
                    return Err(Error::Parse(format!(
                        "cannot compare {} column {} with {:?}",
                        column.column_type, column.name, condition.literal
                    )));
                }

                Ok(BoundCondition {
                    index,
                    comparison: condition.comparison,
                    literal: condition.literal,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let (projection, columns) = match parsed.projection {
            Projection::All => ((0..source.columns.len()).collect(), source.columns.clone()),
            Projection::Columns(selected) => {
                let mut projection = Vec::with_capacity(selected.len());
                let mut columns = Vec::with_capacity(selected.len());

                for (name, alias) in selected {
                    let (index, column) = lookup(&name)?;
                    projection.push(index);
                    columns.push(Column::new(alias, column.column_type));
                }

                (projection, columns)
            }
        };

        Ok(Self {
            source: parsed.source,
            output: StreamDefinition::new(parsed.output, columns),
            conditions,
            projection,
        })
    }

    /// Filters and projects a batch of source events.
    pub fn apply(&self, events: &[Event]) -> Vec<Event> {
        events
            .iter()
            .filter(|event| self.matches(event))
            .map(|event| {
                Event::new(
                    self.projection
                        .iter()
                        .map(|index| event.values.get(*index).cloned().unwrap_or(Value::Null))
                        .collect(),
                )
            })
            .collect()
    }

    fn matches(&self, event: &Event) -> bool {
        self.conditions.iter().all(|condition| {
            event
                .values
                .get(condition.index)
                .and_then(|value| condition.literal.compare(value))
                .is_some_and(|ordering| condition.comparison.holds(ordering))
        })
    }

    /// Whether the plan reads or writes the named stream.
    pub fn touches(&self, stream_name: &str) -> bool {
        self.source == stream_name || self.output.name == stream_name
    }
}
