//! Typed cell values and column-oriented record sets.

use std::cmp::Ordering;

use time::PrimitiveDateTime;

use crate::error::PipelineError;
use crate::schema::{ColumnType, Schema};
use crate::timestamp::{format_timestamp, parse_timestamp};

/// One cell of a record set.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Integer(i64),
    Decimal(f64),
    Boolean(bool),
    Timestamp(PrimitiveDateTime),
}

/// Hashable projection of a [`Value`], used for key grouping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyValue {
    Null,
    Text(String),
    Integer(i64),
    Decimal(u64),
    Boolean(bool),
    Timestamp(PrimitiveDateTime),
}

impl Value {
    /// Classify a raw cell lexically, the way an untyped extract is read.
    pub fn infer(raw: &str) -> Self {
        if raw.is_empty() {
            return Self::Null;
        }

        match raw {
            "true" | "True" | "TRUE" => return Self::Boolean(true),
            "false" | "False" | "FALSE" => return Self::Boolean(false),
            _ => {}
        }

        if is_integer_literal(raw) {
            if let Ok(parsed) = raw.parse::<i64>() {
                return Self::Integer(parsed);
            }
        }

        if is_float_literal(raw) {
            if let Ok(parsed) = raw.parse::<f64>() {
                if parsed.is_finite() {
                    return Self::Decimal(parsed);
                }
            }
        }

        Self::Text(raw.to_owned())
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Null or an empty string; such a value never identifies a row.
    pub fn is_missing(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(text) => text.is_empty(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Decimal(value) => Some(*value),
            Self::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }

    /// Timestamp view; text cells are parsed under the pinned formats.
    pub fn as_timestamp(&self) -> Option<PrimitiveDateTime> {
        match self {
            Self::Timestamp(value) => Some(*value),
            Self::Text(text) => parse_timestamp(text),
            _ => None,
        }
    }

    /// Canonical text rendering used by every file backend.
    pub fn render(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Text(text) => text.clone(),
            Self::Integer(value) => value.to_string(),
            Self::Decimal(value) => {
                if value.is_finite() && value.fract() == 0.0 {
                    format!("{value:.1}")
                } else {
                    value.to_string()
                }
            }
            Self::Boolean(value) => value.to_string(),
            Self::Timestamp(value) => format_timestamp(*value),
        }
    }

    pub fn to_key(&self) -> KeyValue {
        match self {
            Self::Null => KeyValue::Null,
            Self::Text(text) => KeyValue::Text(text.clone()),
            Self::Integer(value) => KeyValue::Integer(*value),
            Self::Decimal(value) => KeyValue::Decimal(value.to_bits()),
            Self::Boolean(value) => KeyValue::Boolean(*value),
            Self::Timestamp(value) => KeyValue::Timestamp(*value),
        }
    }

    /// Total order over values. Null sorts below everything, numbers compare
    /// across integer and decimal, mismatched kinds order by kind.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Null, _) => Ordering::Less,
            (_, Self::Null) => Ordering::Greater,
            (Self::Text(left), Self::Text(right)) => left.cmp(right),
            (Self::Integer(left), Self::Integer(right)) => left.cmp(right),
            (Self::Boolean(left), Self::Boolean(right)) => left.cmp(right),
            (Self::Timestamp(left), Self::Timestamp(right)) => left.cmp(right),
            (left, right) => match (left.as_f64(), right.as_f64()) {
                (Some(left), Some(right)) => left.total_cmp(&right),
                _ => left.kind_rank().cmp(&right.kind_rank()),
            },
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Boolean(_) => 1,
            Self::Integer(_) | Self::Decimal(_) => 2,
            Self::Timestamp(_) => 3,
            Self::Text(_) => 4,
        }
    }
}

fn is_integer_literal(raw: &str) -> bool {
    let digits = raw.strip_prefix(['+', '-']).unwrap_or(raw);
    !digits.is_empty() && digits.bytes().all(|byte| byte.is_ascii_digit())
}

fn is_float_literal(raw: &str) -> bool {
    let body = raw.strip_prefix(['+', '-']).unwrap_or(raw);
    let (mantissa, exponent) = match body.find(['e', 'E']) {
        Some(position) => (&body[..position], Some(&body[position + 1..])),
        None => (body, None),
    };

    let (whole, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    let mantissa_ok = (!whole.is_empty() || !fraction.is_empty())
        && whole.bytes().all(|byte| byte.is_ascii_digit())
        && fraction.bytes().all(|byte| byte.is_ascii_digit());
    let has_marker = mantissa.contains('.') || exponent.is_some();

    let exponent_ok = exponent.map_or(true, is_integer_literal);
    mantissa_ok && has_marker && exponent_ok
}

/// Ordered column names plus row-major values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSet {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl RecordSet {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Empty record set shaped like `schema`.
    pub fn empty(schema: &Schema) -> Self {
        Self::new(schema.names())
    }

    pub fn from_rows<I, S>(columns: I, rows: Vec<Vec<Value>>) -> Result<Self, PipelineError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut records = Self::new(columns);
        records.rows.reserve(rows.len());
        for row in rows {
            records.push_row(row)?;
        }
        Ok(records)
    }

    /// Caller guarantees every row matches the column count.
    pub(crate) fn from_parts(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        debug_assert!(rows.iter().all(|row| row.len() == columns.len()));
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Vec<Value>> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    /// Index of `name`, or a `MissingColumn` error attributed to `table`.
    pub fn require_column(&self, table: &str, name: &str) -> Result<usize, PipelineError> {
        self.column_index(name)
            .ok_or_else(|| PipelineError::missing_column(table, name))
    }

    pub fn column<'a>(&'a self, name: &str) -> Option<impl Iterator<Item = &'a Value> + 'a> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| &row[index]))
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), PipelineError> {
        if row.len() != self.columns.len() {
            return Err(PipelineError::RowWidth {
                expected: self.columns.len(),
                actual: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Keep the rows whose mask entry is `true`, in their original order.
    pub fn filter_by_mask(self, mask: &[bool]) -> Self {
        let rows = self
            .rows
            .into_iter()
            .zip(mask.iter().copied().chain(std::iter::repeat(false)))
            .filter_map(|(row, keep)| keep.then_some(row))
            .collect();

        Self {
            columns: self.columns,
            rows,
        }
    }

    /// Append `other`, aligning its columns to ours by name. Columns we have and
    /// `other` lacks are filled with nulls; columns only `other` has are dropped.
    pub fn append(&mut self, other: Self) {
        let mapping: Vec<Option<usize>> = self
            .columns
            .iter()
            .map(|column| other.column_index(column))
            .collect();

        self.rows.reserve(other.rows.len());
        for mut row in other.rows {
            let aligned = mapping
                .iter()
                .map(|source| match source {
                    Some(index) => std::mem::replace(&mut row[*index], Value::Null),
                    None => Value::Null,
                })
                .collect();
            self.rows.push(aligned);
        }
    }

    /// Reorder to `columns`; any column we lack is filled with nulls.
    pub fn project(&self, columns: &[&str]) -> Self {
        let mapping: Vec<Option<usize>> = columns
            .iter()
            .map(|column| self.column_index(column))
            .collect();

        let rows = self
            .rows
            .iter()
            .map(|row| {
                mapping
                    .iter()
                    .map(|source| source.map_or(Value::Null, |index| row[index].clone()))
                    .collect()
            })
            .collect();

        Self {
            columns: columns.iter().map(|column| (*column).to_owned()).collect(),
            rows,
        }
    }

    /// Type the raw text cells of schema-declared columns. Text columns keep
    /// the written text; other columns are classified with [`Value::infer`].
    /// Columns outside the schema are left untouched.
    pub fn classify(mut self, schema: &Schema) -> Self {
        let targets: Vec<usize> = schema
            .columns()
            .iter()
            .filter(|(_, column_type)| *column_type != ColumnType::Text)
            .filter_map(|(name, _)| self.column_index(name))
            .collect();

        for row in &mut self.rows {
            for index in &targets {
                let typed = match &row[*index] {
                    Value::Text(raw) => Value::infer(raw),
                    _ => continue,
                };
                row[*index] = typed;
            }
        }
        self
    }

    /// Convert every schema-declared column into its declared representation.
    pub fn conform(mut self, schema: &Schema) -> Self {
        let targets: Vec<(usize, _)> = schema
            .columns()
            .iter()
            .filter_map(|(name, column_type)| {
                self.column_index(name).map(|index| (index, *column_type))
            })
            .collect();

        for row in &mut self.rows {
            for (index, column_type) in &targets {
                let value = std::mem::replace(&mut row[*index], Value::Null);
                row[*index] = column_type.conform(value);
            }
        }
        self
    }
}
