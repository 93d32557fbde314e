use serde::Serialize;

use crate::record::Value;
use crate::timestamp::parse_timestamp;

/// Semantic column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Text,
    Integer,
    Decimal,
    Boolean,
    Timestamp,
}

impl ColumnType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamp",
        }
    }

    /// Whether `value` satisfies this declared type without coercion.
    /// Null never does.
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => false,
            (Self::Text, Value::Text(_)) => true,
            (Self::Integer, Value::Integer(_)) => true,
            (Self::Decimal, Value::Decimal(_) | Value::Integer(_)) => true,
            (Self::Boolean, Value::Boolean(_)) => true,
            (Self::Timestamp, Value::Timestamp(_)) => true,
            (Self::Timestamp, Value::Text(text)) => parse_timestamp(text).is_some(),
            _ => false,
        }
    }

    /// Convert an accepted value to the declared representation. Values this
    /// type cannot represent become null.
    pub fn conform(self, value: Value) -> Value {
        match (self, value) {
            (_, Value::Null) => Value::Null,
            (Self::Text, Value::Text(text)) => Value::Text(text),
            (Self::Integer, Value::Integer(value)) => Value::Integer(value),
            (Self::Decimal, Value::Decimal(value)) => Value::Decimal(value),
            (Self::Decimal, Value::Integer(value)) => Value::Decimal(value as f64),
            (Self::Boolean, Value::Boolean(value)) => Value::Boolean(value),
            (Self::Timestamp, other) => other.as_timestamp().map_or(Value::Null, Value::Timestamp),
            _ => Value::Null,
        }
    }

    /// Decode a stored cell written by a trusted or cumulative writer.
    /// `None` means the cell cannot be read as this type.
    pub fn decode(self, raw: &str) -> Option<Value> {
        if raw.is_empty() {
            return Some(Value::Null);
        }

        match self {
            Self::Text => Some(Value::Text(raw.to_owned())),
            Self::Integer => raw.parse().ok().map(Value::Integer),
            Self::Decimal => raw
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .map(Value::Decimal),
            Self::Boolean => match raw {
                "true" | "True" | "TRUE" => Some(Value::Boolean(true)),
                "false" | "False" | "FALSE" => Some(Value::Boolean(false)),
                _ => None,
            },
            Self::Timestamp => parse_timestamp(raw).map(Value::Timestamp),
        }
    }
}

/// Ordered mapping from column name to semantic type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<(&'static str, ColumnType)>,
}

impl Schema {
    pub fn new(columns: impl IntoIterator<Item = (&'static str, ColumnType)>) -> Self {
        Self {
            columns: columns.into_iter().collect(),
        }
    }

    pub fn columns(&self) -> &[(&'static str, ColumnType)] {
        &self.columns
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|(name, _)| *name)
    }

    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.columns
            .iter()
            .find(|(column, _)| *column == name)
            .map(|(_, column_type)| *column_type)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.column_type(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn timestamp_columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns
            .iter()
            .filter(|(_, column_type)| *column_type == ColumnType::Timestamp)
            .map(|(name, _)| *name)
    }
}
