use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

use serde::Serialize;

use crate::error::PipelineError;
use crate::record::{KeyValue, RecordSet};

/// Which row survives when several share a key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "policy", content = "column")]
pub enum DuplicatePolicy {
    /// Last row in input order.
    #[default]
    KeepLast,
    /// First row in input order.
    KeepFirst,
    /// Row with the greatest value in the named column; ties go to the later row.
    KeepGreatest(String),
}

/// Collapse rows sharing `key_columns`, keeping one per key under `policy`.
///
/// Survivors keep their relative input order.
pub fn dedupe(
    records: RecordSet,
    key_columns: &[&str],
    policy: &DuplicatePolicy,
) -> Result<RecordSet, PipelineError> {
    let key_indexes = key_columns
        .iter()
        .map(|column| records.require_column("dedupe input", column))
        .collect::<Result<Vec<_>, _>>()?;

    let ranking_index = match policy {
        DuplicatePolicy::KeepGreatest(column) => {
            Some(records.require_column("dedupe input", column)?)
        }
        _ => None,
    };

    let mut winners: HashMap<Vec<KeyValue>, usize> = HashMap::with_capacity(records.len());
    for (position, row) in records.rows().iter().enumerate() {
        let key: Vec<KeyValue> = key_indexes.iter().map(|index| row[*index].to_key()).collect();
        match winners.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(position);
            }
            Entry::Occupied(mut slot) => {
                let replace = match ranking_index {
                    None => *policy != DuplicatePolicy::KeepFirst,
                    Some(index) => {
                        let incumbent = &records.rows()[*slot.get()][index];
                        row[index].total_cmp(incumbent) != Ordering::Less
                    }
                };
                if replace {
                    slot.insert(position);
                }
            }
        }
    }

    let mut mask = vec![false; records.len()];
    for position in winners.into_values() {
        mask[position] = true;
    }

    Ok(records.filter_by_mask(&mask))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Value;

    fn rows(pairs: &[(i64, &str)]) -> RecordSet {
        RecordSet::from_rows(
            ["id", "tag"],
            pairs
                .iter()
                .map(|(id, tag)| vec![Value::Integer(*id), Value::text(*tag)])
                .collect(),
        )
        .expect("records")
    }

    fn tags(records: &RecordSet) -> Vec<String> {
        records
            .column("tag")
            .expect("tag")
            .map(Value::render)
            .collect()
    }

    #[test]
    fn keeps_last_occurrence_per_key() {
        let input = rows(&[(1, "a"), (2, "b"), (1, "c"), (3, "d"), (2, "e")]);
        let output = dedupe(input, &["id"], &DuplicatePolicy::KeepLast).expect("dedupe");
        assert_eq!(tags(&output), vec!["c", "d", "e"]);
    }

    #[test]
    fn keep_first_retains_earliest() {
        let input = rows(&[(1, "a"), (1, "b"), (2, "c")]);
        let output = dedupe(input, &["id"], &DuplicatePolicy::KeepFirst).expect("dedupe");
        assert_eq!(tags(&output), vec!["a", "c"]);
    }

    #[test]
    fn keep_greatest_breaks_ties_towards_later_rows() {
        let input = RecordSet::from_rows(
            ["id", "score", "tag"],
            vec![
                vec![Value::Integer(1), Value::Integer(5), Value::text("a")],
                vec![Value::Integer(1), Value::Integer(9), Value::text("b")],
                vec![Value::Integer(1), Value::Integer(9), Value::text("c")],
                vec![Value::Integer(1), Value::Integer(2), Value::text("d")],
            ],
        )
        .expect("records");

        let output = dedupe(
            input,
            &["id"],
            &DuplicatePolicy::KeepGreatest("score".to_owned()),
        )
        .expect("dedupe");
        assert_eq!(tags(&output), vec!["c"]);
    }

    #[test]
    fn composite_keys_group_on_every_column() {
        let input = RecordSet::from_rows(
            ["user_id", "jurisdiction", "tag"],
            vec![
                vec![Value::text("u1"), Value::text("us"), Value::text("a")],
                vec![Value::text("u1"), Value::text("eu"), Value::text("b")],
                vec![Value::text("u1"), Value::text("us"), Value::text("c")],
            ],
        )
        .expect("records");

        let output =
            dedupe(input, &["user_id", "jurisdiction"], &DuplicatePolicy::KeepLast).expect("dedupe");
        assert_eq!(tags(&output), vec!["b", "c"]);
    }

    #[test]
    fn exactly_one_survivor_per_key_and_it_is_the_last() {
        let input = rows(&[
            (4, "a"),
            (1, "b"),
            (4, "c"),
            (2, "d"),
            (1, "e"),
            (4, "f"),
            (3, "g"),
        ]);
        let output = dedupe(input.clone(), &["id"], &DuplicatePolicy::KeepLast).expect("dedupe");

        for id in 1..=4 {
            let survivors: Vec<_> = output
                .rows()
                .iter()
                .filter(|row| row[0] == Value::Integer(id))
                .collect();
            let last = input
                .rows()
                .iter()
                .rev()
                .find(|row| row[0] == Value::Integer(id))
                .expect("present");
            assert_eq!(survivors, vec![last]);
        }
    }

    #[test]
    fn policy_serializes_with_its_column() {
        let json = serde_json::to_value(DuplicatePolicy::KeepGreatest("level".to_owned()))
            .expect("json");
        assert_eq!(
            json,
            serde_json::json!({ "policy": "keep_greatest", "column": "level" })
        );
        assert_eq!(
            serde_json::to_value(DuplicatePolicy::KeepLast).expect("json"),
            serde_json::json!({ "policy": "keep_last" })
        );
    }

    #[test]
    fn missing_key_column_is_an_error() {
        let error = dedupe(rows(&[(1, "a")]), &["user_id"], &DuplicatePolicy::KeepLast)
            .expect_err("missing column");
        assert!(matches!(error, PipelineError::MissingColumn { column, .. } if column == "user_id"));
    }
}
