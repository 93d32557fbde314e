use ledgerlake_core::{MergeStrategy, TableSpec};
use serde_json::{json, Value};

use crate::error::CliError;

use super::Context;

pub fn run(context: &Context) -> Result<Value, CliError> {
    let tables: Vec<Value> = context.registry.tables().iter().map(describe).collect();
    Ok(json!({ "tables": tables }))
}

fn describe(spec: &TableSpec) -> Value {
    let columns: Vec<Value> = spec
        .schema
        .columns()
        .iter()
        .map(|(name, column_type)| json!({ "name": name, "type": column_type }))
        .collect();

    let merge = match &spec.merge {
        MergeStrategy::None => Value::Null,
        MergeStrategy::Fact(fact) => json!({
            "strategy": "fact",
            "date_column": fact.date_column,
            "identity_key": fact.identity_key,
        }),
        MergeStrategy::Dimension(dimension) => json!({
            "strategy": "dimension",
            "key": dimension.key,
            "rules": dimension
                .rules
                .iter()
                .map(|(column, rule)| json!({ "column": column, "rule": rule }))
                .collect::<Vec<_>>(),
        }),
    };

    json!({
        "name": spec.name,
        "kind": spec.kind,
        "columns": columns,
        "primary_key": spec.primary_key,
        "duplicate_policy": spec.duplicate_policy,
        "merge": merge,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::StoreKind;
    use ledgerlake_warehouse::LakeConfig;

    #[test]
    fn listing_covers_every_table_with_its_merge_rule() {
        let context = Context::new(LakeConfig::with_home("/unused"), StoreKind::Csv);
        let listing = run(&context).expect("tables");
        let tables = listing["tables"].as_array().expect("array");

        assert_eq!(tables.len(), 11);
        let dim_user = tables
            .iter()
            .find(|table| table["name"] == "dim_user")
            .expect("dim_user");
        assert_eq!(dim_user["kind"], "dimension");
        assert_eq!(
            dim_user["merge"]["rules"],
            json!([{ "column": "last_login", "rule": "greatest" }])
        );
        assert_eq!(dim_user["duplicate_policy"], json!({ "policy": "keep_last" }));
    }
}
