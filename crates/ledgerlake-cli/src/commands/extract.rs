use ledgerlake_core::TableKind;
use ledgerlake_warehouse::landing::PARTITION_COLUMN;
use ledgerlake_warehouse::{replicate_daily, split_by_event_date, DateRange};
use serde_json::Value;

use crate::cli::ExtractArgs;
use crate::error::CliError;

use super::Context;

pub fn run(args: &ExtractArgs, context: &Context) -> Result<Value, CliError> {
    let spec = context.registry.get(&args.table)?;
    if spec.kind != TableKind::Source {
        return Err(CliError::Usage(format!(
            "'{}' is a cumulative table; only source tables are extracted",
            spec.name
        )));
    }
    if let (Some(from), Some(to)) = (args.from, args.to) {
        if from > to {
            return Err(CliError::Usage(String::from("--from must not be after --to")));
        }
    }

    let report = if spec.schema.contains(PARTITION_COLUMN) {
        let range = DateRange {
            from: args.from,
            to: args.to,
        };
        split_by_event_date(&args.landing, spec.name, range, &context.lake)?
    } else {
        let (Some(from), Some(to)) = (args.from, args.to) else {
            return Err(CliError::Usage(format!(
                "'{}' has no {PARTITION_COLUMN} column; --from and --to are required",
                spec.name
            )));
        };
        replicate_daily(&args.landing, spec.name, from, to, &context.lake)?
    };

    Ok(serde_json::to_value(report)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::StoreKind;
    use ledgerlake_warehouse::LakeConfig;
    use std::fs;
    use tempfile::tempdir;
    use time::macros::date;

    #[test]
    fn dateless_table_needs_a_range() {
        let temp = tempdir().expect("tempdir");
        let landing = temp.path().join("user_id.csv");
        fs::write(&landing, "user_id\nu1\n").expect("landing");
        let context = Context::new(LakeConfig::with_home(temp.path()), StoreKind::Csv);

        let args = ExtractArgs {
            table: "user_id".to_owned(),
            landing: landing.clone(),
            from: None,
            to: None,
        };
        assert!(matches!(run(&args, &context), Err(CliError::Usage(_))));

        let args = ExtractArgs {
            from: Some(date!(2023 - 01 - 01)),
            to: Some(date!(2023 - 01 - 02)),
            ..args
        };
        let report = run(&args, &context).expect("extract");
        assert_eq!(report["partitions"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn cumulative_tables_cannot_be_extracted() {
        let temp = tempdir().expect("tempdir");
        let context = Context::new(LakeConfig::with_home(temp.path()), StoreKind::Csv);
        let args = ExtractArgs {
            table: "fact_deposit".to_owned(),
            landing: temp.path().join("fact.csv"),
            from: None,
            to: None,
        };
        assert!(matches!(run(&args, &context), Err(CliError::Usage(_))));
    }
}
