//! Behavior-driven tests for the DuckDB warehouse
//!
//! These tests load the fixture days into DuckDB and check what users see
//! through the cumulative tables, the load log and the reporting views.

use ledgerlake_core::registry::{DIM_USER, FACT_DAILY_STATS, FACT_USER_DAILY_SNAPSHOT};
use ledgerlake_core::Registry;
use ledgerlake_tests::{
    clean_and_load, cumulative, extract_fixture, rendered, rendered_sorted, row, DAY_ONE, DAY_TWO,
};
use ledgerlake_warehouse::{LakeConfig, ReportLimits, Warehouse, WarehouseError};
use serde_json::json;
use tempfile::tempdir;

fn loaded_warehouse() -> (tempfile::TempDir, Warehouse, Registry) {
    let temp = tempdir().expect("tempdir");
    let config = LakeConfig::with_home(temp.path());
    let lake = config.lake();
    let warehouse = Warehouse::open(config.warehouse()).expect("warehouse open");
    let registry = Registry::standard();

    extract_fixture(&temp.path().join("landing"), &lake);
    for (day, run_id) in [(DAY_ONE, "run-1"), (DAY_TWO, "run-2")] {
        let report = clean_and_load(&lake, &warehouse, &registry, day);
        warehouse.record_load(run_id, &report).expect("record load");
    }
    (temp, warehouse, registry)
}

fn select(warehouse: &Warehouse, sql: &str) -> Vec<Vec<serde_json::Value>> {
    warehouse
        .report(sql, ReportLimits::default())
        .expect("report should succeed")
        .rows
}

// =============================================================================
// Warehouse: Cumulative Tables
// =============================================================================

#[test]
fn when_user_loads_into_duckdb_tables_match_the_lake_semantics() {
    // Given/When: Two days loaded into the warehouse
    let (_temp, warehouse, registry) = loaded_warehouse();

    // Then: Cumulative tables read back typed and in order
    let dim_user = cumulative(&warehouse, &registry, DIM_USER);
    assert_eq!(rendered(&dim_user), vec![row(&["u1", "2023-01-02 07:00:00"])]);

    let stats = cumulative(&warehouse, &registry, FACT_DAILY_STATS);
    assert_eq!(
        rendered_sorted(&stats),
        vec![
            row(&["2023-01-01 00:00:00", "USD", "1", "us", "1", "0", "1", "0.0", "100.0"]),
            row(&["2023-01-01 00:00:00", "USD", "2", "us", "1", "0", "1", "0.0", "50.0"]),
            row(&["2023-01-02 00:00:00", "USD", "2", "us", "2", "1", "1", "20.0", "25.0"]),
        ]
    );
}

#[test]
fn when_user_replays_a_day_in_duckdb_row_counts_hold() {
    // Given: Two loaded days
    let (temp, warehouse, registry) = loaded_warehouse();
    let lake = LakeConfig::with_home(temp.path()).lake();

    // When: Day two is replayed
    let report = clean_and_load(&lake, &warehouse, &registry, DAY_TWO);

    // Then: Nothing grows
    for table in &report.tables {
        assert_eq!(table.rows_before, Some(table.rows_after), "{}", table.table);
    }
    assert_eq!(cumulative(&warehouse, &registry, FACT_USER_DAILY_SNAPSHOT).len(), 5);
}

// =============================================================================
// Warehouse: Views and Load Log
// =============================================================================

#[test]
fn when_user_queries_daily_active_users_each_day_is_summarized() {
    let (_temp, warehouse, _registry) = loaded_warehouse();

    let rows = select(
        &warehouse,
        "SELECT date, active_users, deposits, withdrawals, logins \
         FROM vw_daily_active_users ORDER BY date",
    );

    assert_eq!(
        rows,
        vec![
            vec![json!("2023-01-01"), json!(2), json!(2), json!(0), json!(2)],
            vec![json!("2023-01-02"), json!(2), json!(1), json!(1), json!(2)],
        ]
    );
}

#[test]
fn when_user_queries_level_totals_currencies_are_summed_per_level() {
    let (_temp, warehouse, _registry) = loaded_warehouse();

    let rows = select(
        &warehouse,
        "SELECT date, level, deposit_amount, withdrawal_amount \
         FROM vw_level_totals ORDER BY date, level",
    );

    assert_eq!(
        rows,
        vec![
            vec![json!("2023-01-01"), json!(1), json!(100.0), json!(0.0)],
            vec![json!("2023-01-01"), json!(2), json!(50.0), json!(0.0)],
            vec![json!("2023-01-02"), json!(2), json!(25.0), json!(20.0)],
        ]
    );
}

#[test]
fn when_user_inspects_the_load_log_every_table_of_every_day_is_listed() {
    let (_temp, warehouse, _registry) = loaded_warehouse();

    let rows = select(
        &warehouse,
        "SELECT run_id, COUNT(*) AS tables FROM load_log GROUP BY run_id ORDER BY run_id",
    );

    assert_eq!(
        rows,
        vec![
            vec![json!("run-1"), json!(6)],
            vec![json!("run-2"), json!(6)],
        ]
    );
}

// =============================================================================
// Warehouse: Report Limits
// =============================================================================

#[test]
fn when_user_reports_a_write_statement_it_is_rejected() {
    let (_temp, warehouse, registry) = loaded_warehouse();

    for sql in ["DELETE FROM dim_user", "DROP VIEW vw_level_totals"] {
        let result = warehouse.report(sql, ReportLimits::default());
        assert!(matches!(result, Err(WarehouseError::ReportRejected(_))), "{sql}");
    }

    assert_eq!(cumulative(&warehouse, &registry, DIM_USER).len(), 1);
    assert_eq!(select(&warehouse, "SELECT COUNT(*) FROM vw_level_totals"), vec![vec![json!(3)]]);
}

#[test]
fn when_user_caps_rows_the_result_is_marked_truncated() {
    let (_temp, warehouse, _registry) = loaded_warehouse();

    let result = warehouse
        .report(
            "SELECT * FROM fact_user_daily_snapshot",
            ReportLimits {
                max_rows: 2,
                timeout_ms: 5_000,
            },
        )
        .expect("report should succeed");

    assert_eq!(result.rows.len(), 2);
    assert!(result.truncated);
}

#[test]
fn when_user_reports_a_view_columns_carry_their_types() {
    let (_temp, warehouse, _registry) = loaded_warehouse();

    let report = warehouse
        .report(
            "WITH totals AS (SELECT * FROM vw_level_totals) SELECT date, level FROM totals",
            ReportLimits::default(),
        )
        .expect("report should succeed");

    let columns: Vec<_> = report
        .columns
        .iter()
        .map(|column| (column.name.as_str(), column.sql_type.as_str()))
        .collect();
    assert_eq!(columns, [("date", "DATE"), ("level", "BIGINT")]);
    assert!(!report.truncated);
}
