//! Landing-file extraction into raw daily partitions.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use ledgerlake_core::{format_date, RecordSet, StoreError, Value};
use serde::Serialize;
use time::{Date, Duration};
use tracing::{info, warn};

use crate::lake::{read_verbatim, LakeStore};

/// Column whose calendar date decides the partition of a landing row.
pub const PARTITION_COLUMN: &str = "event_timestamp";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionWrite {
    pub date: String,
    pub rows: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractReport {
    pub table: String,
    pub landing: PathBuf,
    pub rows_read: usize,
    /// Rows whose partition timestamp could not be parsed.
    pub rows_skipped: usize,
    /// Rows dated outside the requested range.
    pub rows_out_of_range: usize,
    pub partitions: Vec<PartitionWrite>,
}

/// Inclusive date window. An open side accepts every date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<Date>,
    pub to: Option<Date>,
}

impl DateRange {
    pub fn contains(&self, date: Date) -> bool {
        self.from.map_or(true, |from| date >= from) && self.to.map_or(true, |to| date <= to)
    }
}

/// Split a landing file into one raw partition per `event_timestamp` date.
/// Cells are copied as written.
pub fn split_by_event_date(
    landing: &Path,
    table: &str,
    range: DateRange,
    lake: &LakeStore,
) -> Result<ExtractReport, StoreError> {
    let records = read_landing(landing)?;
    let stamp_index = records
        .column_index(PARTITION_COLUMN)
        .ok_or_else(|| {
            StoreError::malformed(landing, format!("no '{PARTITION_COLUMN}' column"))
        })?;

    let mut report = ExtractReport {
        table: table.to_owned(),
        landing: landing.to_path_buf(),
        rows_read: records.len(),
        rows_skipped: 0,
        rows_out_of_range: 0,
        partitions: Vec::new(),
    };

    let columns = records.columns().to_vec();
    let mut by_date: BTreeMap<Date, Vec<Vec<Value>>> = BTreeMap::new();
    for row in records.into_rows() {
        let Some(date) = row[stamp_index].as_timestamp().map(|stamp| stamp.date()) else {
            report.rows_skipped += 1;
            continue;
        };
        if !range.contains(date) {
            report.rows_out_of_range += 1;
            continue;
        }
        by_date.entry(date).or_default().push(row);
    }

    if report.rows_skipped > 0 {
        warn!(
            table,
            landing = %landing.display(),
            skipped = report.rows_skipped,
            "skipped landing rows without a parseable {PARTITION_COLUMN}"
        );
    }

    for (date, rows) in by_date {
        let partition = RecordSet::from_rows(columns.iter().map(String::as_str), rows)
            .map_err(|error| StoreError::malformed(landing, error.to_string()))?;
        lake.write_raw(table, date, &partition)?;
        report.partitions.push(PartitionWrite {
            date: format_date(date),
            rows: partition.len(),
        });
    }

    info!(
        table,
        rows_read = report.rows_read,
        partitions = report.partitions.len(),
        "split landing file"
    );
    Ok(report)
}

/// Copy a dateless landing file into every raw partition from `from` to `to`
/// inclusive. An inverted range writes nothing.
pub fn replicate_daily(
    landing: &Path,
    table: &str,
    from: Date,
    to: Date,
    lake: &LakeStore,
) -> Result<ExtractReport, StoreError> {
    let records = read_landing(landing)?;
    let mut report = ExtractReport {
        table: table.to_owned(),
        landing: landing.to_path_buf(),
        rows_read: records.len(),
        rows_skipped: 0,
        rows_out_of_range: 0,
        partitions: Vec::new(),
    };

    let mut date = from;
    while date <= to {
        lake.write_raw(table, date, &records)?;
        report.partitions.push(PartitionWrite {
            date: format_date(date),
            rows: records.len(),
        });
        let Some(next) = date.checked_add(Duration::days(1)) else {
            break;
        };
        date = next;
    }

    info!(
        table,
        rows_read = report.rows_read,
        partitions = report.partitions.len(),
        "replicated landing file"
    );
    Ok(report)
}

fn read_landing(landing: &Path) -> Result<RecordSet, StoreError> {
    read_verbatim(landing)?.ok_or_else(|| {
        StoreError::io(
            landing,
            io::Error::new(io::ErrorKind::NotFound, "landing file not found"),
        )
    })
}
