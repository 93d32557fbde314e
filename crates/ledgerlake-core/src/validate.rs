use crate::record::RecordSet;
use crate::schema::Schema;

/// Per-row validity against `schema`, computed column by column.
///
/// Only columns present in both the schema and the record set are checked.
pub fn validation_mask(records: &RecordSet, schema: &Schema) -> Vec<bool> {
    let mut mask = vec![true; records.len()];

    for (name, column_type) in schema.columns() {
        let Some(values) = records.column(name) else {
            continue;
        };
        for (valid, value) in mask.iter_mut().zip(values) {
            *valid &= column_type.accepts(value);
        }
    }

    mask
}

/// Drop every row that fails a declared type check.
pub fn validate(records: RecordSet, schema: &Schema) -> RecordSet {
    let mask = validation_mask(&records, schema);
    records.filter_by_mask(&mask)
}
