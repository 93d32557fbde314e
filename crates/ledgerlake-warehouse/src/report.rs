//! Read-only reports over the cumulative tables, the load log and the views.
//!
//! A report is one query statement. DuckDB describes it before it runs, so
//! anything that is not a query fails at bind time and nothing is written.

use std::time::{Duration, Instant};

use ::duckdb::types::{TimeUnit, Value as DuckValue};
use ::duckdb::{Connection, ToSql};
use ledgerlake_core::{format_date, format_timestamp};
use serde::Serialize;
use serde_json::{Number, Value};
use time::macros::datetime;
use time::{Duration as TimeDuration, PrimitiveDateTime};
use tracing::debug;

use crate::WarehouseError;

/// Row and time limits for one report.
#[derive(Debug, Clone, Copy)]
pub struct ReportLimits {
    pub max_rows: usize,
    pub timeout_ms: u64,
}

impl Default for ReportLimits {
    fn default() -> Self {
        Self {
            max_rows: 10_000,
            timeout_ms: 5_000,
        }
    }
}

impl ReportLimits {
    fn check(self) -> Result<(), WarehouseError> {
        if self.max_rows == 0 {
            return Err(rejected("--max-rows must be greater than zero"));
        }
        if self.timeout_ms == 0 {
            return Err(rejected("--timeout-ms must be greater than zero"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub sql_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub columns: Vec<ReportColumn>,
    pub rows: Vec<Vec<Value>>,
    /// Rows past `max_rows` were left out.
    pub truncated: bool,
}

/// Strip surrounding whitespace and trailing semicolons, leaving one statement.
pub(crate) fn single_statement(sql: &str) -> Result<&str, WarehouseError> {
    let statement = sql.trim().trim_end_matches(';').trim_end();
    if statement.is_empty() {
        return Err(rejected("query must not be empty"));
    }
    // Quoted semicolons are refused too.
    if statement.contains(';') {
        return Err(rejected("a report runs exactly one statement"));
    }
    Ok(statement)
}

pub(crate) fn run_report(
    connection: &Connection,
    statement: &str,
    limits: ReportLimits,
) -> Result<Report, WarehouseError> {
    limits.check()?;
    let deadline = Deadline::start(limits.timeout_ms);

    let columns = describe(connection, statement)?;
    deadline.check()?;

    // One row past the cap tells a complete result from a cut one.
    let bounded = format!(
        "SELECT * FROM ({statement}) AS report LIMIT {}",
        limits.max_rows.saturating_add(1)
    );
    let mut prepared = connection.prepare(&bounded)?;
    let mut cursor = prepared.query([] as [&dyn ToSql; 0])?;
    let mut rows = Vec::new();
    let mut truncated = false;

    while let Some(row) = cursor.next()? {
        deadline.check()?;
        if rows.len() == limits.max_rows {
            truncated = true;
            break;
        }
        let cells = (0..columns.len())
            .map(|index| row.get::<_, DuckValue>(index).map(to_json))
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(cells);
    }
    deadline.check()?;

    debug!(rows = rows.len(), truncated, "report finished");
    Ok(Report {
        columns,
        rows,
        truncated,
    })
}

fn describe(connection: &Connection, statement: &str) -> Result<Vec<ReportColumn>, WarehouseError> {
    let mut described = connection
        .prepare(&format!("DESCRIBE {statement}"))
        .map_err(|error| rejected(format!("not a query: {error}")))?;
    let columns = described
        .query_map([] as [&dyn ToSql; 0], |row| {
            Ok(ReportColumn {
                name: row.get(0)?,
                sql_type: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns)
}

struct Deadline {
    started: Instant,
    limit: Duration,
    timeout_ms: u64,
}

impl Deadline {
    fn start(timeout_ms: u64) -> Self {
        Self {
            started: Instant::now(),
            limit: Duration::from_millis(timeout_ms),
            timeout_ms,
        }
    }

    fn check(&self) -> Result<(), WarehouseError> {
        if self.started.elapsed() > self.limit {
            return Err(WarehouseError::ReportTimeout {
                timeout_ms: self.timeout_ms,
            });
        }
        Ok(())
    }
}

fn rejected(reason: impl Into<String>) -> WarehouseError {
    WarehouseError::ReportRejected(reason.into())
}

/// JSON for the value kinds the cumulative tables and views hold.
fn to_json(value: DuckValue) -> Value {
    match value {
        DuckValue::Null => Value::Null,
        DuckValue::Boolean(flag) => Value::Bool(flag),
        DuckValue::Int(number) => Value::from(number),
        DuckValue::BigInt(number) => Value::from(number),
        DuckValue::HugeInt(number) => i64::try_from(number)
            .map_or_else(|_| Value::String(number.to_string()), Value::from),
        DuckValue::Double(number) => Number::from_f64(number).map_or(Value::Null, Value::Number),
        DuckValue::Text(text) => Value::String(text),
        DuckValue::Date32(days) => epoch()
            .date()
            .checked_add(TimeDuration::days(i64::from(days)))
            .map_or(Value::Null, |date| Value::String(format_date(date))),
        DuckValue::Timestamp(unit, ticks) => since_epoch(unit, ticks)
            .map_or(Value::Null, |stamp| Value::String(format_timestamp(stamp))),
        other => Value::String(format!("{other:?}")),
    }
}

fn since_epoch(unit: TimeUnit, ticks: i64) -> Option<PrimitiveDateTime> {
    let offset = match unit {
        TimeUnit::Second => TimeDuration::seconds(ticks),
        TimeUnit::Millisecond => TimeDuration::milliseconds(ticks),
        TimeUnit::Microsecond => TimeDuration::microseconds(ticks),
        TimeUnit::Nanosecond => TimeDuration::nanoseconds(ticks),
    };
    epoch().checked_add(offset)
}

fn epoch() -> PrimitiveDateTime {
    datetime!(1970-01-01 0:00)
}
