use ledgerlake_core::{LoadOptions, LoadReport, Loader};
use serde_json::{json, Value};
use time::Date;
use uuid::Uuid;

use crate::cli::{LoadArgs, LoadFlags};
use crate::error::CliError;

use super::{Context, Tables};

pub fn run(args: &LoadArgs, context: &Context) -> Result<Value, CliError> {
    let run_id = Uuid::new_v4().to_string();
    let tables = context.tables()?;
    let report = load_day(context, &tables, &run_id, args.date, args.options)?;

    Ok(json!({
        "run_id": run_id,
        "load": report,
    }))
}

/// Load one day and, on the DuckDB backend, record it in the load log.
pub(super) fn load_day(
    context: &Context,
    tables: &Tables,
    run_id: &str,
    date: Date,
    flags: LoadFlags,
) -> Result<LoadReport, CliError> {
    let options = LoadOptions {
        retain_idle_users: flags.retain_idle_users,
    };
    let report = Loader::new(&context.lake, tables.store(), &context.registry)
        .with_options(options)
        .load(date)?;

    if let Some(warehouse) = tables.warehouse() {
        warehouse.record_load(run_id, &report)?;
    }
    Ok(report)
}
