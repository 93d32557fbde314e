//! Merge engines that fold one day's output into a cumulative table.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::Serialize;
use time::Date;

use crate::dedupe::{dedupe, DuplicatePolicy};
use crate::error::PipelineError;
use crate::record::{KeyValue, RecordSet, Value};

/// Date-replace upsert parameters for one fact table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactMerge {
    /// Column whose calendar date decides which rows a load replaces.
    pub date_column: &'static str,
    pub identity_key: Vec<&'static str>,
}

/// Resolution of an attribute observed on both sides of a dimension merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictRule {
    /// Larger value wins; a null side counts as negative infinity.
    Greatest,
    /// Incoming value wins unless it is null.
    PreferIncoming,
    /// Stored value wins unless it is null.
    PreferExisting,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionMerge {
    pub key: Vec<&'static str>,
    /// Per-attribute rules. Attributes without a rule use `PreferIncoming`.
    pub rules: Vec<(&'static str, ConflictRule)>,
}

impl DimensionMerge {
    fn rule_for(&self, column: &str) -> ConflictRule {
        self.rules
            .iter()
            .find(|(name, _)| *name == column)
            .map_or(ConflictRule::PreferIncoming, |(_, rule)| *rule)
    }
}

/// Replace every cumulative row dated `date` with `new_rows`, then dedupe by
/// the identity key. A missing cumulative table is initialized from `new_rows`.
pub fn merge_fact(
    date: Date,
    new_rows: RecordSet,
    cumulative: Option<RecordSet>,
    config: &FactMerge,
    policy: &DuplicatePolicy,
) -> Result<RecordSet, PipelineError> {
    let Some(cumulative) = cumulative else {
        return Ok(new_rows);
    };

    let date_index = cumulative.require_column("cumulative table", config.date_column)?;
    new_rows.require_column("new rows", config.date_column)?;

    let mask: Vec<bool> = cumulative
        .rows()
        .iter()
        .map(|row| row[date_index].as_timestamp().map(|at| at.date()) != Some(date))
        .collect();

    let mut merged = cumulative.filter_by_mask(&mask);
    merged.append(new_rows);
    dedupe(merged, &config.identity_key, policy)
}

/// Outer-join `incoming` onto `cumulative` by key, resolving shared attributes
/// with the configured conflict rules. Output holds one row per key.
pub fn merge_dimension(
    incoming: RecordSet,
    cumulative: Option<RecordSet>,
    config: &DimensionMerge,
) -> Result<RecordSet, PipelineError> {
    let incoming = dedupe(incoming, &config.key, &DuplicatePolicy::KeepLast)?;
    let Some(cumulative) = cumulative else {
        return Ok(incoming);
    };
    let cumulative = dedupe(cumulative, &config.key, &DuplicatePolicy::KeepLast)?;

    let mut columns: Vec<String> = cumulative.columns().to_vec();
    for column in incoming.columns() {
        if !columns.contains(column) {
            columns.push(column.clone());
        }
    }
    let rules: Vec<ConflictRule> = columns
        .iter()
        .map(|column| {
            if config.key.iter().any(|key| *key == column.as_str()) {
                ConflictRule::PreferExisting
            } else {
                config.rule_for(column)
            }
        })
        .collect();

    let existing_index = key_indexes(&cumulative, &config.key, "cumulative table")?;
    let incoming_index = key_indexes(&incoming, &config.key, "incoming rows")?;
    let existing_columns = column_map(&columns, &cumulative);
    let incoming_columns = column_map(&columns, &incoming);

    let mut incoming_by_key: HashMap<Vec<KeyValue>, usize> = incoming
        .rows()
        .iter()
        .enumerate()
        .map(|(position, row)| (row_key(row, &incoming_index), position))
        .collect();

    let mut merged = RecordSet::new(columns.iter().cloned());
    for row in cumulative.rows() {
        let matched = incoming_by_key
            .remove(&row_key(row, &existing_index))
            .map(|position| &incoming.rows()[position]);

        let resolved = rules
            .iter()
            .enumerate()
            .map(|(column, rule)| {
                let stored = cell(row, existing_columns[column]);
                match matched {
                    Some(other) => resolve(*rule, stored, cell(other, incoming_columns[column])),
                    None => stored,
                }
            })
            .collect();
        merged.push_row(resolved)?;
    }

    for (position, row) in incoming.rows().iter().enumerate() {
        if incoming_by_key.get(&row_key(row, &incoming_index)) == Some(&position) {
            let values = incoming_columns
                .iter()
                .map(|source| cell(row, *source))
                .collect();
            merged.push_row(values)?;
        }
    }

    dedupe(merged, &config.key, &DuplicatePolicy::KeepLast)
}

fn resolve(rule: ConflictRule, stored: Value, incoming: Value) -> Value {
    match rule {
        ConflictRule::Greatest => {
            if incoming.total_cmp(&stored) == Ordering::Greater {
                incoming
            } else {
                stored
            }
        }
        ConflictRule::PreferIncoming if incoming.is_null() => stored,
        ConflictRule::PreferIncoming => incoming,
        ConflictRule::PreferExisting if stored.is_null() => incoming,
        ConflictRule::PreferExisting => stored,
    }
}

fn key_indexes(
    records: &RecordSet,
    key: &[&str],
    context: &str,
) -> Result<Vec<usize>, PipelineError> {
    key.iter()
        .map(|column| records.require_column(context, column))
        .collect()
}

fn column_map(columns: &[String], records: &RecordSet) -> Vec<Option<usize>> {
    columns
        .iter()
        .map(|column| records.column_index(column))
        .collect()
}

fn row_key(row: &[Value], indexes: &[usize]) -> Vec<KeyValue> {
    indexes.iter().map(|index| row[*index].to_key()).collect()
}

fn cell(row: &[Value], index: Option<usize>) -> Value {
    index.map_or(Value::Null, |index| row[index].clone())
}
