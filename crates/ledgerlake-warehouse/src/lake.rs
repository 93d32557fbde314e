//! CSV-backed data lake.
//!
//! Layout under the lake root:
//!
//! | Zone | Path |
//! |------|------|
//! | raw | `raw/<table>/<YYYY-MM-DD>/<table>.csv` |
//! | trusted | `trusted/<table>/<YYYY-MM-DD>/<table>.csv` |
//! | curated | `curated/<table>.csv` |
//!
//! A file that does not exist reads as `None`. A file that exists but cannot be
//! decoded is a [`StoreError::Malformed`], never an empty table.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use ledgerlake_core::{
    format_date, PartitionStore, RecordSet, Schema, StoreError, TableSpec, TableStore, Value,
};
use time::Date;
use tracing::debug;
use uuid::Uuid;

const RAW_ZONE: &str = "raw";
const TRUSTED_ZONE: &str = "trusted";
const CURATED_ZONE: &str = "curated";

/// Partition and cumulative-table store over plain CSV files.
#[derive(Debug, Clone)]
pub struct LakeStore {
    root: PathBuf,
}

impl LakeStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn raw_path(&self, table: &str, date: Date) -> PathBuf {
        partition_path(&self.root.join(RAW_ZONE), table, date)
    }

    pub fn trusted_path(&self, table: &str, date: Date) -> PathBuf {
        partition_path(&self.root.join(TRUSTED_ZONE), table, date)
    }

    pub fn curated_path(&self, table: &str) -> PathBuf {
        self.root.join(CURATED_ZONE).join(format!("{table}.csv"))
    }

    /// Replace the raw extract for `(table, date)`.
    pub fn write_raw(&self, table: &str, date: Date, records: &RecordSet) -> Result<(), StoreError> {
        write_csv(&self.raw_path(table, date), records)
    }
}

impl PartitionStore for LakeStore {
    fn read_raw(&self, table: &str, date: Date) -> Result<Option<RecordSet>, StoreError> {
        read_verbatim(&self.raw_path(table, date))
    }

    fn read_trusted(&self, spec: &TableSpec, date: Date) -> Result<Option<RecordSet>, StoreError> {
        read_typed(&self.trusted_path(spec.name, date), &spec.schema)
    }

    fn write_trusted(
        &self,
        spec: &TableSpec,
        date: Date,
        records: &RecordSet,
    ) -> Result<(), StoreError> {
        write_csv(&self.trusted_path(spec.name, date), records)
    }
}

impl TableStore for LakeStore {
    fn read(&self, spec: &TableSpec) -> Result<Option<RecordSet>, StoreError> {
        read_typed(&self.curated_path(spec.name), &spec.schema)
    }

    fn write(&self, spec: &TableSpec, records: &RecordSet) -> Result<(), StoreError> {
        write_csv(&self.curated_path(spec.name), records)
    }

    /// Stage every table before renaming any into place, so a failed write
    /// leaves all curated tables as they were.
    fn write_all(&self, tables: &[(&TableSpec, RecordSet)]) -> Result<(), StoreError> {
        let mut staged = Vec::with_capacity(tables.len());
        for (spec, records) in tables {
            let target = self.curated_path(spec.name);
            match stage_csv(&target, records) {
                Ok(staging) => staged.push((staging, target, records.len())),
                Err(error) => {
                    for (staging, _, _) in &staged {
                        let _ = fs::remove_file(staging);
                    }
                    return Err(error);
                }
            }
        }

        let mut pending = staged.into_iter();
        while let Some((staging, target, rows)) = pending.next() {
            if let Err(error) = fs::rename(&staging, &target) {
                let _ = fs::remove_file(&staging);
                for (staging, _, _) in pending.by_ref() {
                    let _ = fs::remove_file(staging);
                }
                return Err(StoreError::io(&target, error));
            }
            debug!(path = %target.display(), rows, "wrote table file");
        }
        Ok(())
    }
}

fn partition_path(zone: &Path, table: &str, date: Date) -> PathBuf {
    zone.join(table)
        .join(format_date(date))
        .join(format!("{table}.csv"))
}

/// Read a CSV file keeping every non-empty cell as the text it was written as.
/// Raw partitions and landing files are read this way.
pub fn read_verbatim(path: &Path) -> Result<Option<RecordSet>, StoreError> {
    let Some(mut reader) = open_reader(path)? else {
        return Ok(None);
    };
    let columns = read_header(path, &mut reader)?;

    let mut records = RecordSet::new(columns);
    for record in reader.records() {
        let record = record.map_err(|error| csv_failure(path, error))?;
        let row = record
            .iter()
            .map(|raw| if raw.is_empty() { Value::Null } else { Value::text(raw) })
            .collect();
        records
            .push_row(row)
            .map_err(|error| StoreError::malformed(path, error.to_string()))?;
    }
    Ok(Some(records))
}

/// Read a CSV file written by this store, decoding each column with `schema`.
fn read_typed(path: &Path, schema: &Schema) -> Result<Option<RecordSet>, StoreError> {
    let Some(mut reader) = open_reader(path)? else {
        return Ok(None);
    };
    let columns = read_header(path, &mut reader)?;
    let types = columns
        .iter()
        .map(|column| {
            schema.column_type(column).ok_or_else(|| {
                StoreError::malformed(path, format!("unexpected column '{column}'"))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut records = RecordSet::new(columns.iter().map(String::as_str));
    for record in reader.records() {
        let record = record.map_err(|error| csv_failure(path, error))?;
        let line = record.position().map_or(0, csv::Position::line);
        let row = record
            .iter()
            .zip(&types)
            .zip(&columns)
            .map(|((cell, column_type), column)| {
                column_type.decode(cell).ok_or_else(|| {
                    StoreError::malformed(
                        path,
                        format!(
                            "line {line}: '{cell}' is not a valid {} for column '{column}'",
                            column_type.as_str()
                        ),
                    )
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        records
            .push_row(row)
            .map_err(|error| StoreError::malformed(path, error.to_string()))?;
    }
    Ok(Some(records))
}

fn open_reader(path: &Path) -> Result<Option<csv::Reader<File>>, StoreError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(error) => return Err(StoreError::io(path, error)),
    };
    Ok(Some(
        csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(file),
    ))
}

fn read_header(path: &Path, reader: &mut csv::Reader<File>) -> Result<Vec<String>, StoreError> {
    let header = reader
        .headers()
        .map_err(|error| csv_failure(path, error))?;
    let columns: Vec<String> = header.iter().map(str::to_owned).collect();

    if columns.is_empty() || columns.iter().any(String::is_empty) {
        return Err(StoreError::malformed(path, "missing or blank header column"));
    }
    for (index, column) in columns.iter().enumerate() {
        if columns[..index].contains(column) {
            return Err(StoreError::malformed(
                path,
                format!("duplicate header column '{column}'"),
            ));
        }
    }
    Ok(columns)
}

fn csv_failure(path: &Path, error: csv::Error) -> StoreError {
    let reason = error.to_string();
    match error.into_kind() {
        csv::ErrorKind::Io(source) => StoreError::io(path, source),
        _ => StoreError::malformed(path, reason),
    }
}

/// Write `records` next to `path` and rename the result into place.
pub(crate) fn write_csv(path: &Path, records: &RecordSet) -> Result<(), StoreError> {
    let staging = stage_csv(path, records)?;
    if let Err(error) = fs::rename(&staging, path) {
        let _ = fs::remove_file(&staging);
        return Err(StoreError::io(path, error));
    }

    debug!(path = %path.display(), rows = records.len(), "wrote table file");
    Ok(())
}

/// Write `records` to a hidden sibling of `path` and return the sibling.
fn stage_csv(path: &Path, records: &RecordSet) -> Result<PathBuf, StoreError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|error| StoreError::io(parent, error))?;

    let file_name = path
        .file_name()
        .map_or_else(|| "table".into(), |name| name.to_string_lossy());
    let staging = parent.join(format!(".{file_name}.{}.tmp", Uuid::new_v4()));

    if let Err(error) = write_rows(&staging, records) {
        let _ = fs::remove_file(&staging);
        return Err(error);
    }
    Ok(staging)
}

fn write_rows(path: &Path, records: &RecordSet) -> Result<(), StoreError> {
    let mut writer = csv::Writer::from_path(path).map_err(|error| csv_failure(path, error))?;
    writer
        .write_record(records.columns())
        .map_err(|error| csv_failure(path, error))?;
    for row in records.rows() {
        writer
            .write_record(row.iter().map(Value::render))
            .map_err(|error| csv_failure(path, error))?;
    }
    writer.flush().map_err(|error| StoreError::io(path, error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerlake_core::registry::{Registry, DEPOSIT, DIM_USER, FACT_USER_DAILY_SNAPSHOT};
    use tempfile::tempdir;
    use time::macros::{date, datetime};

    #[test]
    fn missing_partition_reads_as_none() {
        let temp = tempdir().expect("tempdir");
        let lake = LakeStore::new(temp.path());
        assert!(lake
            .read_raw(DEPOSIT, date!(2023 - 01 - 02))
            .expect("read")
            .is_none());
    }

    #[test]
    fn ragged_rows_are_malformed_not_empty() {
        let temp = tempdir().expect("tempdir");
        let lake = LakeStore::new(temp.path());
        let path = lake.raw_path(DEPOSIT, date!(2023 - 01 - 02));
        fs::create_dir_all(path.parent().expect("parent")).expect("dirs");
        fs::write(&path, "id,user_id\n1,u1\n2\n").expect("write");

        let error = lake
            .read_raw(DEPOSIT, date!(2023 - 01 - 02))
            .expect_err("ragged");
        assert!(matches!(error, StoreError::Malformed { .. }));
    }

    #[test]
    fn duplicate_header_columns_are_malformed() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("landing.csv");
        fs::write(&path, "id,id\n1,2\n").expect("write");
        assert!(matches!(
            read_verbatim(&path),
            Err(StoreError::Malformed { .. })
        ));
    }

    #[test]
    fn raw_cells_keep_their_written_text() {
        let temp = tempdir().expect("tempdir");
        let lake = LakeStore::new(temp.path());
        let day = date!(2023 - 01 - 02);
        let path = lake.raw_path(DEPOSIT, day);
        fs::create_dir_all(path.parent().expect("parent")).expect("dirs");
        fs::write(&path, "id,amount,user_id,note\n7,1.50,0042,\n").expect("write");

        let records = lake.read_raw(DEPOSIT, day).expect("read").expect("present");
        assert_eq!(
            records.rows()[0],
            vec![
                Value::text("7"),
                Value::text("1.50"),
                Value::text("0042"),
                Value::Null,
            ]
        );
    }

    #[test]
    fn curated_tables_decode_with_their_schema() {
        let temp = tempdir().expect("tempdir");
        let lake = LakeStore::new(temp.path());
        let registry = Registry::standard();
        let spec = registry.get(FACT_USER_DAILY_SNAPSHOT).expect("spec");

        let records = RecordSet::from_rows(
            spec.schema.names(),
            vec![vec![
                Value::text("42"),
                Value::Timestamp(datetime!(2023-01-02 0:00)),
                Value::Integer(1),
                Value::Integer(0),
                Value::Integer(3),
                Value::Boolean(true),
            ]],
        )
        .expect("records");
        lake.write(spec, &records).expect("write");

        let read = lake.read(spec).expect("read").expect("present");
        assert_eq!(read, records);
        let leftovers: Vec<_> = fs::read_dir(temp.path().join(CURATED_ZONE))
            .expect("dir")
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn failed_multi_table_write_leaves_curated_tables_unchanged() {
        let temp = tempdir().expect("tempdir");
        let lake = LakeStore::new(temp.path());
        let registry = Registry::standard();
        let dim_user = registry.get(DIM_USER).expect("spec");
        let original = RecordSet::from_rows(
            dim_user.schema.names(),
            vec![vec![
                Value::text("u1"),
                Value::Timestamp(datetime!(2023-01-01 08:00)),
            ]],
        )
        .expect("records");
        lake.write(dim_user, &original).expect("seed");

        // a plain file where the second table's directory should be
        fs::write(temp.path().join(CURATED_ZONE).join("blocked"), "").expect("blocker");
        let mut blocked = registry.get(FACT_USER_DAILY_SNAPSHOT).expect("spec").clone();
        blocked.name = "blocked/fact_user_daily_snapshot";

        let replacement = RecordSet::empty(&dim_user.schema);
        let result = lake.write_all(&[
            (dim_user, replacement),
            (&blocked, RecordSet::empty(&blocked.schema)),
        ]);

        assert!(matches!(result, Err(StoreError::Io { .. })));
        assert_eq!(lake.read(dim_user).expect("read"), Some(original));
        let leftovers: Vec<_> = fs::read_dir(temp.path().join(CURATED_ZONE))
            .expect("dir")
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn undecodable_curated_cell_is_malformed() {
        let temp = tempdir().expect("tempdir");
        let lake = LakeStore::new(temp.path());
        let registry = Registry::standard();
        let spec = registry.get(FACT_USER_DAILY_SNAPSHOT).expect("spec");
        let path = lake.curated_path(spec.name);
        fs::create_dir_all(path.parent().expect("parent")).expect("dirs");
        fs::write(&path, "user_id,qty_deposits\nu1,many\n").expect("write");

        let error = lake.read(spec).expect_err("malformed");
        let StoreError::Malformed { reason, .. } = error else {
            panic!("expected malformed, got {error:?}");
        };
        assert!(reason.contains("line 2"), "{reason}");
    }

    #[test]
    fn unknown_curated_column_is_malformed() {
        let temp = tempdir().expect("tempdir");
        let lake = LakeStore::new(temp.path());
        let registry = Registry::standard();
        let spec = registry.get(FACT_USER_DAILY_SNAPSHOT).expect("spec");
        let path = lake.curated_path(spec.name);
        fs::create_dir_all(path.parent().expect("parent")).expect("dirs");
        fs::write(&path, "user_id,mystery\nu1,x\n").expect("write");

        assert!(matches!(lake.read(spec), Err(StoreError::Malformed { .. })));
    }
}
