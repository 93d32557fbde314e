use ledgerlake_warehouse::ReportLimits;
use serde_json::Value;

use crate::cli::SqlArgs;
use crate::error::CliError;

use super::Context;

pub fn run(args: &SqlArgs, context: &Context) -> Result<Value, CliError> {
    let query = args.query.trim();
    if query.is_empty() {
        return Err(CliError::Usage(String::from("query must not be empty")));
    }

    let limits = ReportLimits {
        max_rows: args.max_rows,
        timeout_ms: args.timeout_ms,
    };
    let report = context.warehouse()?.report(query, limits)?;

    Ok(serde_json::to_value(report)?)
}
