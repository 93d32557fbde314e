use ledgerlake_core::{format_date, Cleaner};
use serde_json::{json, Value};
use time::Duration;
use tracing::info;
use uuid::Uuid;

use crate::cli::RunArgs;
use crate::error::CliError;

use super::load::load_day;
use super::Context;

/// Clean then load each day of the range in ascending order. The first
/// failing day aborts the run; days already loaded stay loaded.
pub fn run(args: &RunArgs, context: &Context) -> Result<Value, CliError> {
    if args.from > args.to {
        return Err(CliError::Usage(String::from("--from must not be after --to")));
    }

    let run_id = Uuid::new_v4().to_string();
    let tables = context.tables()?;
    let cleaner = Cleaner::new(&context.lake, &context.registry);

    let mut days = Vec::new();
    let mut date = args.from;
    loop {
        let cleaned = cleaner.clean_all(date)?;
        let loaded = load_day(context, &tables, &run_id, date, args.options)?;
        days.push(json!({
            "date": format_date(date),
            "clean": cleaned,
            "load": loaded,
        }));

        if date >= args.to {
            break;
        }
        let Some(next) = date.checked_add(Duration::days(1)) else {
            break;
        };
        date = next;
    }

    info!(run_id = %run_id, days = days.len(), "run complete");
    Ok(json!({
        "run_id": run_id,
        "days": days,
    }))
}
