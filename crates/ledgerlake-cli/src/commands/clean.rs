use ledgerlake_core::{format_date, Cleaner, TableKind};
use serde_json::{json, Value};

use crate::cli::CleanArgs;
use crate::error::CliError;

use super::Context;

pub fn run(args: &CleanArgs, context: &Context) -> Result<Value, CliError> {
    let cleaner = Cleaner::new(&context.lake, &context.registry);
    let reports = match &args.table {
        Some(table) => {
            let spec = context.registry.get(table)?;
            if spec.kind != TableKind::Source {
                return Err(CliError::Usage(format!(
                    "'{}' is a cumulative table; only source tables are cleaned",
                    spec.name
                )));
            }
            vec![cleaner.clean(spec.name, args.date)?]
        }
        None => cleaner.clean_all(args.date)?,
    };

    Ok(json!({
        "date": format_date(args.date),
        "tables": reports,
    }))
}
