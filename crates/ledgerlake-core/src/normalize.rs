use crate::record::{RecordSet, Value};
use crate::schema::Schema;

/// Canonicalize every timestamp column to a second-precision naive timestamp.
///
/// Zones and fractional seconds are discarded. Unparseable cells become null
/// rather than being dropped.
pub fn normalize(records: RecordSet, schema: &Schema) -> RecordSet {
    let indexes: Vec<usize> = schema
        .timestamp_columns()
        .filter_map(|name| records.column_index(name))
        .collect();
    if indexes.is_empty() {
        return records;
    }

    let columns = records.columns().to_vec();
    let rows = records
        .into_rows()
        .into_iter()
        .map(|mut row| {
            for index in &indexes {
                row[*index] = normalize_cell(&row[*index]);
            }
            row
        })
        .collect();

    RecordSet::from_parts(columns, rows)
}

fn normalize_cell(value: &Value) -> Value {
    match value.as_timestamp() {
        Some(timestamp) => Value::Timestamp(timestamp.replace_nanosecond(0).unwrap_or(timestamp)),
        None => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnType;
    use time::macros::datetime;

    #[test]
    fn strips_zone_and_fraction_and_nulls_garbage() {
        let schema = Schema::new([
            ("id", ColumnType::Integer),
            ("event_timestamp", ColumnType::Timestamp),
        ]);
        let records = RecordSet::from_rows(
            ["id", "event_timestamp"],
            vec![
                vec![Value::Integer(1), Value::text("2023-01-02T10:11:12.987+03:00")],
                vec![Value::Integer(2), Value::text("garbage")],
                vec![
                    Value::Integer(3),
                    Value::Timestamp(datetime!(2023-01-02 10:11:12.5)),
                ],
            ],
        )
        .expect("records");

        let normalized = normalize(records, &schema);
        let cells: Vec<String> = normalized
            .column("event_timestamp")
            .expect("column")
            .map(Value::render)
            .collect();
        assert_eq!(
            cells,
            vec!["2023-01-02 10:11:12", "", "2023-01-02 10:11:12"]
        );
    }

    #[test]
    fn distinct_offsets_collapse_to_the_same_reading() {
        let schema = Schema::new([("at", ColumnType::Timestamp)]);
        let records = RecordSet::from_rows(
            ["at"],
            vec![
                vec![Value::text("2023-01-02 10:00:00Z")],
                vec![Value::text("2023-01-02 10:00:00.250-07:00")],
            ],
        )
        .expect("records");

        let normalized = normalize(records, &schema);
        assert_eq!(normalized.rows()[0], normalized.rows()[1]);
    }
}
