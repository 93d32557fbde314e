//! CLI argument definitions for ledgerlake.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `extract` | Split a landing file into raw daily partitions |
//! | `clean` | Build trusted partitions for one day |
//! | `load` | Merge one day into the cumulative tables |
//! | `run` | Clean and load every day of a range |
//! | `sql` | Read-only report over the DuckDB warehouse |
//! | `tables` | List the table registry |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--home` | `$LEDGERLAKE_HOME` or `~/.ledgerlake` | Data directory |
//! | `--store` | `duckdb` | Backend for cumulative tables |
//! | `--pretty` | `false` | Pretty-print JSON output |
//!
//! # Examples
//!
//! ```bash
//! ledgerlake extract --table deposit --landing landing/deposit.csv
//! ledgerlake extract --table user_id --landing landing/user_id.csv --from 2023-01-01 --to 2023-01-31
//! ledgerlake run --from 2023-01-01 --to 2023-01-31
//! ledgerlake sql "SELECT * FROM vw_level_totals ORDER BY date"
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use ledgerlake_core::parse_date;
use time::Date;

#[derive(Debug, Parser)]
#[command(
    name = "ledgerlake",
    version,
    about = "Daily lake-to-warehouse pipeline for deposit, withdrawal and login activity"
)]
pub struct Cli {
    /// Data directory holding the lake and the warehouse database.
    #[arg(long, global = true)]
    pub home: Option<PathBuf>,

    /// Backend that stores the cumulative tables. Partitions always live in the CSV lake.
    #[arg(long, global = true, value_enum, default_value_t = StoreKind::Duckdb)]
    pub store: StoreKind,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    /// Curated CSV files under the lake root.
    Csv,
    /// Tables in the DuckDB warehouse.
    Duckdb,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Split a landing CSV into raw daily partitions.
    ///
    /// Tables with an `event_timestamp` column are partitioned by its date.
    /// Dateless tables (`user_id`) are copied into every day of --from..--to.
    Extract(ExtractArgs),

    /// Build trusted partitions from raw partitions for one day.
    Clean(CleanArgs),

    /// Merge one day of trusted partitions into the cumulative tables.
    Load(LoadArgs),

    /// Clean and then load every day from --from to --to, in order.
    ///
    /// Stops at the first day that fails.
    Run(RunArgs),

    /// Run a read-only report query against the DuckDB warehouse.
    ///
    /// Tables change only through `load` and `run`.
    Sql(SqlArgs),

    /// List every registered table with its schema and merge rule.
    Tables,
}

#[derive(Debug, Args)]
pub struct ExtractArgs {
    /// Source table the landing file belongs to.
    #[arg(long)]
    pub table: String,

    /// Landing CSV file.
    #[arg(long)]
    pub landing: PathBuf,

    /// First day to write (inclusive).
    #[arg(long, value_parser = parse_date_arg)]
    pub from: Option<Date>,

    /// Last day to write (inclusive).
    #[arg(long, value_parser = parse_date_arg)]
    pub to: Option<Date>,
}

#[derive(Debug, Args)]
pub struct CleanArgs {
    /// Day to clean (YYYY-MM-DD).
    #[arg(long, value_parser = parse_date_arg)]
    pub date: Date,

    /// Clean a single source table instead of all of them.
    #[arg(long)]
    pub table: Option<String>,
}

#[derive(Debug, Args)]
pub struct LoadArgs {
    /// Day to load (YYYY-MM-DD).
    #[arg(long, value_parser = parse_date_arg)]
    pub date: Date,

    #[command(flatten)]
    pub options: LoadFlags,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    #[arg(long, value_parser = parse_date_arg)]
    pub from: Date,

    #[arg(long, value_parser = parse_date_arg)]
    pub to: Date,

    #[command(flatten)]
    pub options: LoadFlags,
}

#[derive(Debug, Clone, Copy, Args)]
pub struct LoadFlags {
    /// Keep users with no deposits, withdrawals or logins in the daily snapshot.
    #[arg(long, default_value_t = false)]
    pub retain_idle_users: bool,
}

#[derive(Debug, Args)]
pub struct SqlArgs {
    /// One SELECT statement over the cumulative tables, load_log or the views.
    pub query: String,

    /// Maximum number of rows to return.
    #[arg(long, default_value_t = 10_000)]
    pub max_rows: usize,

    /// Report timeout in milliseconds.
    #[arg(long, default_value_t = 5_000)]
    pub timeout_ms: u64,
}

fn parse_date_arg(value: &str) -> Result<Date, String> {
    parse_date(value).map_err(|error| error.to_string())
}
