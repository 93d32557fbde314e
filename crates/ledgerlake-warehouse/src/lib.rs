//! # ledgerlake warehouse
//!
//! Storage backends for the ledgerlake pipeline.
//!
//! - [`LakeStore`]: the CSV data lake holding raw and trusted daily partitions,
//!   and optionally the curated cumulative tables
//! - [`Warehouse`]: a DuckDB database holding the cumulative tables, the load
//!   log and the reporting views, with read-only reports
//! - [`landing`]: extraction of landing files into raw partitions
//!
//! ## Tables
//!
//! | Table | Description |
//! |-------|-------------|
//! | one per cumulative table | rows in write order, tracked by `row_ordinal` |
//! | `table_versions` | which cumulative tables have been written |
//! | `load_log` | one row per table per load run |
//!
//! ## Views
//!
//! | View | Description |
//! |------|-------------|
//! | `vw_daily_active_users` | active users and activity counts per day |
//! | `vw_level_totals` | deposit and withdrawal totals per day and level |

pub mod duckdb;
pub mod lake;
pub mod landing;
pub mod migrations;
pub mod report;
pub mod views;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use ::duckdb::{params_from_iter, Connection, ToSql};
use ledgerlake_core::{
    LoadReport, RecordSet, Registry, StoreError, TableSpec, TableStore, Value,
};
use thiserror::Error;
use tracing::{debug, info};

pub use self::duckdb::{AccessMode, DuckDbConnectionManager, PooledConnection};
pub use lake::LakeStore;
pub use landing::{replicate_daily, split_by_event_date, DateRange, ExtractReport};
pub use report::{Report, ReportColumn, ReportLimits};

use migrations::{quote_identifier, sql_type, table_ddl};
use report::{run_report, single_statement};

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error("report rejected: {0}")]
    ReportRejected(String),

    #[error("report timed out after {timeout_ms}ms")]
    ReportTimeout { timeout_ms: u64 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<WarehouseError> for StoreError {
    fn from(error: WarehouseError) -> Self {
        match error {
            WarehouseError::Store(error) => error,
            other => StoreError::backend(other),
        }
    }
}

/// Where ledgerlake keeps its data.
#[derive(Debug, Clone)]
pub struct LakeConfig {
    pub home: PathBuf,
    pub lake_root: PathBuf,
    pub db_path: PathBuf,
    pub max_pool_size: usize,
}

impl Default for LakeConfig {
    fn default() -> Self {
        Self::with_home(resolve_ledgerlake_home())
    }
}

impl LakeConfig {
    /// Standard layout below `home`.
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        Self {
            lake_root: home.join("lake"),
            db_path: home.join("warehouse").join("ledgerlake.duckdb"),
            home,
            max_pool_size: 4,
        }
    }

    pub fn lake(&self) -> LakeStore {
        LakeStore::new(self.lake_root.clone())
    }

    pub fn warehouse(&self) -> WarehouseConfig {
        WarehouseConfig {
            db_path: self.db_path.clone(),
            max_pool_size: self.max_pool_size,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    pub db_path: PathBuf,
    pub max_pool_size: usize,
}

/// DuckDB-backed store for cumulative tables.
#[derive(Clone)]
pub struct Warehouse {
    manager: DuckDbConnectionManager,
}

impl Warehouse {
    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let manager = DuckDbConnectionManager::new(config.db_path, config.max_pool_size);
        let warehouse = Self { manager };
        warehouse.initialize()?;
        Ok(warehouse)
    }

    /// Apply migrations, create the standard cumulative tables, then the views.
    pub fn initialize(&self) -> Result<(), WarehouseError> {
        let connection = self.manager.acquire(AccessMode::ReadWrite)?;
        migrations::apply_migrations(&connection)?;
        migrations::create_cumulative_tables(&connection, Registry::standard().cumulative())?;
        views::create_views(&connection)?;
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        self.manager.db_path()
    }

    /// Run one query statement over a read-only connection, within `limits`.
    pub fn report(&self, sql: &str, limits: ReportLimits) -> Result<Report, WarehouseError> {
        let statement = single_statement(sql)?;
        let connection = self.manager.acquire(AccessMode::ReadOnly)?;
        run_report(&connection, statement, limits)
    }

    /// Append one `load_log` row per table of `report`.
    pub fn record_load(&self, run_id: &str, report: &LoadReport) -> Result<(), WarehouseError> {
        if report.tables.is_empty() {
            return Ok(());
        }

        let connection = self.manager.acquire(AccessMode::ReadWrite)?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<(), WarehouseError> {
            let mut statement = connection.prepare(
                "INSERT INTO load_log \
                 (run_id, load_date, table_name, rows_generated, rows_before, rows_after) \
                 VALUES (?, CAST(? AS DATE), ?, ?, ?, ?)",
            )?;
            for table in &report.tables {
                let generated = to_i64(table.generated);
                let before = table.rows_before.map(to_i64);
                let after = to_i64(table.rows_after);
                let params: [&dyn ToSql; 6] =
                    [&run_id, &report.date, &table.table, &generated, &before, &after];
                statement.execute(params.as_slice())?;
            }
            Ok(())
        })();
        finalize_transaction(&connection, result)?;

        debug!(run_id, date = %report.date, tables = report.tables.len(), "recorded load");
        Ok(())
    }

    fn read_table(&self, spec: &TableSpec) -> Result<Option<RecordSet>, WarehouseError> {
        let connection = self.manager.acquire(AccessMode::ReadWrite)?;
        if !table_written(&connection, spec.name)? {
            return Ok(None);
        }

        let select = format!(
            "SELECT {} FROM {} ORDER BY row_ordinal",
            spec.schema
                .names()
                .map(|name| format!("CAST({} AS VARCHAR)", quote_identifier(name)))
                .collect::<Vec<_>>()
                .join(", "),
            quote_identifier(spec.name)
        );
        let mut statement = connection.prepare(&select)?;
        let mut cursor = statement.query([] as [&dyn ToSql; 0])?;

        let mut records = RecordSet::empty(&spec.schema);
        while let Some(row) = cursor.next()? {
            let mut values = Vec::with_capacity(spec.schema.len());
            for (index, (name, column_type)) in spec.schema.columns().iter().enumerate() {
                let cell: Option<String> = row.get(index)?;
                let value = match cell {
                    None => Value::Null,
                    Some(raw) => column_type.decode(&raw).ok_or_else(|| {
                        StoreError::backend(format!(
                            "{}.{name} holds '{raw}', not a {}",
                            spec.name,
                            column_type.as_str()
                        ))
                    })?,
                };
                values.push(value);
            }
            records.push_row(values).map_err(StoreError::backend)?;
        }
        Ok(Some(records))
    }

    fn write_tables(&self, tables: &[(&TableSpec, RecordSet)]) -> Result<(), WarehouseError> {
        let connection = self.manager.acquire(AccessMode::ReadWrite)?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<(), WarehouseError> {
            for (spec, records) in tables {
                replace_table(&connection, spec, records)?;
            }
            Ok(())
        })();
        finalize_transaction(&connection, result)?;

        for (spec, records) in tables {
            info!(table = spec.name, rows = records.len(), "wrote cumulative table");
        }
        Ok(())
    }
}

impl TableStore for Warehouse {
    fn read(&self, spec: &TableSpec) -> Result<Option<RecordSet>, StoreError> {
        Ok(self.read_table(spec)?)
    }

    fn write(&self, spec: &TableSpec, records: &RecordSet) -> Result<(), StoreError> {
        Ok(self.write_tables(&[(spec, records.clone())])?)
    }

    fn write_all(&self, tables: &[(&TableSpec, RecordSet)]) -> Result<(), StoreError> {
        Ok(self.write_tables(tables)?)
    }
}

fn table_written(connection: &Connection, table: &str) -> Result<bool, ::duckdb::Error> {
    let count: i64 = connection.query_row(
        "SELECT COUNT(*) FROM table_versions WHERE table_name = ?",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Replace every row of `spec`'s table with `records`, projected to the schema.
fn replace_table(
    connection: &Connection,
    spec: &TableSpec,
    records: &RecordSet,
) -> Result<(), WarehouseError> {
    let table = quote_identifier(spec.name);
    connection.execute_batch(&table_ddl(spec))?;
    connection.execute_batch(&format!("DELETE FROM {table}"))?;

    let names: Vec<&str> = spec.schema.names().collect();
    let projected = records.project(&names);
    let column_list = names
        .iter()
        .map(|name| quote_identifier(name))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = spec
        .schema
        .columns()
        .iter()
        .map(|(_, column_type)| format!("CAST(? AS {})", sql_type(*column_type)))
        .collect::<Vec<_>>()
        .join(", ");
    let mut insert = connection.prepare(&format!(
        "INSERT INTO {table} (row_ordinal, {column_list}) VALUES (?, {placeholders})"
    ))?;

    for (ordinal, row) in projected.rows().iter().enumerate() {
        let cells = row
            .iter()
            .map(|value| (!value.is_null()).then(|| value.render()));
        let params = std::iter::once(Some(ordinal.to_string())).chain(cells);
        insert.execute(params_from_iter(params))?;
    }

    connection.execute(
        "DELETE FROM table_versions WHERE table_name = ?",
        [spec.name],
    )?;
    let row_count = to_i64(projected.len());
    let params: [&dyn ToSql; 2] = [&spec.name, &row_count];
    connection.execute(
        "INSERT INTO table_versions (table_name, row_count) VALUES (?, ?)",
        params.as_slice(),
    )?;
    Ok(())
}

/// Commit on success, roll back on failure.
fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, WarehouseError>,
) -> Result<T, WarehouseError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn resolve_ledgerlake_home() -> PathBuf {
    if let Some(path) = env::var_os("LEDGERLAKE_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".ledgerlake");
    }

    PathBuf::from(".ledgerlake")
}
