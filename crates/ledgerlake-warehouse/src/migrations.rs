use ::duckdb::Connection;
use ledgerlake_core::{ColumnType, TableSpec};

struct Migration {
    version: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "0001_bookkeeping",
        sql: r#"
CREATE TABLE IF NOT EXISTS load_log (
    run_id TEXT NOT NULL,
    load_date DATE NOT NULL,
    table_name TEXT NOT NULL,
    rows_generated BIGINT NOT NULL,
    rows_before BIGINT,
    rows_after BIGINT NOT NULL,
    recorded_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS table_versions (
    table_name TEXT PRIMARY KEY,
    row_count BIGINT NOT NULL,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    },
    Migration {
        version: "0002_load_log_index",
        sql: r#"
CREATE INDEX IF NOT EXISTS idx_load_log_date_table ON load_log(load_date, table_name);
"#,
    },
];

pub fn apply_migrations(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    )?;

    for migration in MIGRATIONS {
        let applied_count: i64 = connection.query_row(
            "SELECT COUNT(*) FROM schema_migrations WHERE version = ?",
            [migration.version],
            |row| row.get(0),
        )?;

        if applied_count == 0 {
            connection.execute_batch(migration.sql)?;
            connection.execute(
                "INSERT INTO schema_migrations (version) VALUES (?)",
                [migration.version],
            )?;
        }
    }

    Ok(())
}

/// Create the storage table of every cumulative spec. Each table carries a
/// leading `row_ordinal` so reads come back in the order they were written.
pub fn create_cumulative_tables<'a>(
    connection: &Connection,
    specs: impl IntoIterator<Item = &'a TableSpec>,
) -> Result<(), ::duckdb::Error> {
    for spec in specs {
        connection.execute_batch(&table_ddl(spec))?;
    }
    Ok(())
}

pub(crate) fn table_ddl(spec: &TableSpec) -> String {
    let columns: Vec<String> = spec
        .schema
        .columns()
        .iter()
        .map(|(name, column_type)| format!("    {} {}", quote_identifier(name), sql_type(*column_type)))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    row_ordinal BIGINT NOT NULL,\n{}\n);",
        quote_identifier(spec.name),
        columns.join(",\n")
    )
}

pub(crate) const fn sql_type(column_type: ColumnType) -> &'static str {
    match column_type {
        ColumnType::Text => "VARCHAR",
        ColumnType::Integer => "BIGINT",
        ColumnType::Decimal => "DOUBLE",
        ColumnType::Boolean => "BOOLEAN",
        ColumnType::Timestamp => "TIMESTAMP",
    }
}

pub(crate) fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
