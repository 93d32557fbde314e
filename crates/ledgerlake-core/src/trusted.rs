//! Raw-to-trusted cleanup for one `(table, date)`.

use serde::Serialize;
use time::Date;
use tracing::{debug, info};

use crate::dedupe::dedupe;
use crate::error::PipelineError;
use crate::normalize::normalize;
use crate::record::RecordSet;
use crate::registry::{Registry, TableSpec};
use crate::store::PartitionStore;
use crate::timestamp::format_date;
use crate::validate::validate;

/// Row counts observed at each cleanup step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanReport {
    pub table: String,
    pub date: String,
    /// No raw partition existed; nothing was written.
    pub absent: bool,
    pub rows_read: usize,
    pub after_dedupe: usize,
    pub after_key_filter: usize,
    pub after_validation: usize,
    /// Rows left once keys are compared again on normalized timestamps.
    pub after_normalize: usize,
}

impl CleanReport {
    pub fn rows_written(&self) -> usize {
        self.after_normalize
    }
}

/// Type raw cells, dedupe, drop rows with missing keys, validate, normalize
/// timestamps, and conform cells to the schema. Keys are deduplicated a second
/// time after normalization, since differently written timestamps can name the
/// same instant. Output keeps only schema columns, in schema order.
pub fn build_trusted(
    raw: RecordSet,
    spec: &TableSpec,
    report: &mut CleanReport,
) -> Result<RecordSet, PipelineError> {
    report.rows_read = raw.len();

    let typed = raw.classify(&spec.schema);
    let deduped = dedupe(typed, &spec.primary_key, &spec.duplicate_policy)?;
    report.after_dedupe = deduped.len();

    let key_indexes = spec
        .primary_key
        .iter()
        .map(|column| deduped.require_column(spec.name, column))
        .collect::<Result<Vec<_>, _>>()?;
    let mask: Vec<bool> = deduped
        .rows()
        .iter()
        .map(|row| key_indexes.iter().all(|index| !row[*index].is_missing()))
        .collect();
    let keyed = deduped.filter_by_mask(&mask);
    report.after_key_filter = keyed.len();

    let valid = validate(keyed, &spec.schema);
    report.after_validation = valid.len();

    let normalized = dedupe(
        normalize(valid, &spec.schema).conform(&spec.schema),
        &spec.primary_key,
        &spec.duplicate_policy,
    )?;
    report.after_normalize = normalized.len();
    let columns: Vec<&str> = spec
        .schema
        .names()
        .filter(|name| normalized.column_index(name).is_some())
        .collect();

    debug!(
        table = spec.name,
        rows_read = report.rows_read,
        after_dedupe = report.after_dedupe,
        after_key_filter = report.after_key_filter,
        after_validation = report.after_validation,
        after_normalize = report.after_normalize,
        "trusted partition built"
    );
    Ok(normalized.project(&columns))
}

/// Cleanup entry point over a partition store.
pub struct Cleaner<'a> {
    partitions: &'a dyn PartitionStore,
    registry: &'a Registry,
}

impl<'a> Cleaner<'a> {
    pub fn new(partitions: &'a dyn PartitionStore, registry: &'a Registry) -> Self {
        Self {
            partitions,
            registry,
        }
    }

    /// Rebuild the trusted partition of `table` for `date`. A missing raw
    /// partition is reported as absent and leaves the store untouched.
    pub fn clean(&self, table: &str, date: Date) -> Result<CleanReport, PipelineError> {
        let spec = self.registry.get(table)?;
        let mut report = CleanReport {
            table: spec.name.to_owned(),
            date: format_date(date),
            ..CleanReport::default()
        };

        let Some(raw) = self.partitions.read_raw(spec.name, date)? else {
            report.absent = true;
            debug!(table = spec.name, date = %report.date, "no raw partition");
            return Ok(report);
        };

        let trusted = build_trusted(raw, spec, &mut report)?;
        self.partitions.write_trusted(spec, date, &trusted)?;

        info!(
            table = spec.name,
            date = %report.date,
            rows_read = report.rows_read,
            rows_written = report.rows_written(),
            "cleaned partition"
        );
        Ok(report)
    }

    /// Clean every source table for `date`, stopping at the first fatal error.
    pub fn clean_all(&self, date: Date) -> Result<Vec<CleanReport>, PipelineError> {
        self.registry
            .sources()
            .map(|spec| self.clean(spec.name, date))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Value;
    use crate::registry::{DEPOSIT, USER_ID, USER_LEVEL};
    use crate::schema::{ColumnType, Schema};
    use crate::store::MemoryStore;
    use time::macros::{date, datetime};

    #[test]
    fn empty_keys_and_type_mismatches_are_dropped() {
        let mut spec = Registry::standard().get(DEPOSIT).expect("deposit").clone();
        spec.schema = Schema::new([
            ("id", ColumnType::Integer),
            ("pk", ColumnType::Text),
            ("amt", ColumnType::Decimal),
        ]);
        spec.primary_key = vec!["id", "pk"];

        let raw = RecordSet::from_rows(
            ["id", "pk", "amt"],
            vec![
                vec![Value::infer("1"), Value::infer(""), Value::infer("5")],
                vec![Value::infer("2"), Value::infer("u1"), Value::infer("bad")],
                vec![Value::infer("3"), Value::infer("u1"), Value::infer("10")],
            ],
        )
        .expect("raw");

        let mut report = CleanReport::default();
        let trusted = build_trusted(raw, &spec, &mut report).expect("build");

        assert_eq!(
            trusted.rows(),
            &[vec![
                Value::Integer(3),
                Value::text("u1"),
                Value::Decimal(10.0)
            ]]
        );
        assert_eq!(report.rows_read, 3);
        assert_eq!(report.after_key_filter, 2);
        assert_eq!(report.after_validation, 1);
    }

    #[test]
    fn duplicates_resolve_before_validation() {
        let spec = Registry::standard().get(DEPOSIT).expect("deposit").clone();
        let raw = RecordSet::from_rows(
            ["id", "event_timestamp", "user_id", "amount", "currency", "tx_status"],
            vec![
                ["1", "2023-01-02 10:00:00", "u1", "5.0", "USD", "complete"],
                ["1", "2023-01-02 10:00:00", "u1", "oops", "USD", "complete"],
                ["2", "2023-01-02T11:00:00.5Z", "42", "7", "USD", "pending"],
            ]
            .into_iter()
            .map(|row| row.into_iter().map(Value::text).collect())
            .collect(),
        )
        .expect("raw");

        let mut report = CleanReport::default();
        let trusted = build_trusted(raw, &spec, &mut report).expect("build");

        // the last copy of id 1 wins and then fails validation
        assert_eq!(report.after_dedupe, 2);
        assert_eq!(trusted.len(), 1);
        assert_eq!(
            trusted.rows()[0],
            vec![
                Value::Integer(2),
                Value::Timestamp(datetime!(2023-01-02 11:00:00)),
                Value::text("42"),
                Value::Decimal(7.0),
                Value::text("USD"),
                Value::text("pending"),
            ]
        );
    }

    #[test]
    fn text_columns_keep_identifiers_as_written() {
        let spec = Registry::standard().get(USER_ID).expect("users").clone();
        let raw = RecordSet::from_rows(
            ["user_id"],
            ["0042", "1.50", "1e3", "TRUE"]
                .into_iter()
                .map(|cell| vec![Value::text(cell)])
                .collect(),
        )
        .expect("raw");

        let trusted = build_trusted(raw, &spec, &mut CleanReport::default()).expect("build");

        let ids: Vec<_> = trusted.rows().iter().map(|row| row[0].clone()).collect();
        assert_eq!(
            ids,
            vec![
                Value::text("0042"),
                Value::text("1.50"),
                Value::text("1e3"),
                Value::text("TRUE"),
            ]
        );
    }

    #[test]
    fn keys_equal_after_normalization_are_deduplicated() {
        let spec = Registry::standard().get(USER_LEVEL).expect("levels").clone();
        let raw = RecordSet::from_rows(
            ["user_id", "jurisdiction", "level", "event_timestamp"],
            vec![
                ["u1", "us", "1", "2023-01-02 08:00:00"],
                ["u1", "us", "2", "2023-01-02T08:00:00Z"],
            ]
            .into_iter()
            .map(|row| row.into_iter().map(Value::text).collect())
            .collect(),
        )
        .expect("raw");

        let mut report = CleanReport::default();
        let trusted = build_trusted(raw, &spec, &mut report).expect("build");

        assert_eq!(report.after_validation, 2);
        assert_eq!(report.after_normalize, 1);
        assert_eq!(report.rows_written(), 1);
        assert_eq!(
            trusted.rows(),
            &[vec![
                Value::text("u1"),
                Value::text("us"),
                Value::Integer(2),
                Value::Timestamp(datetime!(2023-01-02 08:00:00)),
            ]]
        );
    }

    #[test]
    fn missing_primary_key_column_is_fatal() {
        let spec = Registry::standard().get(USER_LEVEL).expect("levels").clone();
        let raw = RecordSet::from_rows(
            ["user_id", "level"],
            vec![vec![Value::text("u1"), Value::Integer(1)]],
        )
        .expect("raw");

        let error = build_trusted(raw, &spec, &mut CleanReport::default()).expect_err("fatal");
        assert!(matches!(error, PipelineError::MissingColumn { .. }));
    }

    #[test]
    fn cleaner_reports_absent_partitions_without_writing() {
        let store = MemoryStore::new();
        let registry = Registry::standard();
        let cleaner = Cleaner::new(&store, &registry);
        let day = date!(2023 - 01 - 07);

        let report = cleaner.clean(DEPOSIT, day).expect("clean");
        assert!(report.absent);
        let spec = registry.get(DEPOSIT).expect("spec");
        assert!(store.read_trusted(spec, day).expect("read").is_none());
    }

    #[test]
    fn cleaning_twice_yields_the_same_trusted_partition() {
        let store = MemoryStore::new();
        let registry = Registry::standard();
        let day = date!(2023 - 01 - 02);
        let raw = RecordSet::from_rows(
            ["user_id"],
            vec![
                vec![Value::text("u1")],
                vec![Value::text("")],
                vec![Value::text("u1")],
                vec![Value::text("u2")],
            ],
        )
        .expect("raw");
        store.put_raw("user_id", day, raw).expect("put");

        let cleaner = Cleaner::new(&store, &registry);
        let spec = registry.get("user_id").expect("spec");
        cleaner.clean("user_id", day).expect("first");
        let first = store.read_trusted(spec, day).expect("read");
        cleaner.clean("user_id", day).expect("second");
        let second = store.read_trusted(spec, day).expect("read");

        assert_eq!(first, second);
        assert_eq!(first.map(|records| records.len()), Some(2));
    }

    #[test]
    fn clean_all_covers_every_source_table() {
        let store = MemoryStore::new();
        let registry = Registry::standard();
        let reports = Cleaner::new(&store, &registry)
            .clean_all(date!(2023 - 01 - 02))
            .expect("clean all");
        assert_eq!(reports.len(), 5);
        assert!(reports.iter().all(|report| report.absent));
    }

    #[test]
    fn unknown_table_is_rejected() {
        let store = MemoryStore::new();
        let registry = Registry::standard();
        let error = Cleaner::new(&store, &registry)
            .clean("ledger", date!(2023 - 01 - 02))
            .expect_err("unknown");
        assert!(matches!(error, PipelineError::UnknownTable { .. }));
    }
}
