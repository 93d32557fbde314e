//! Static per-table configuration: schema, keys, duplicate policy and merge strategy.

use serde::Serialize;

use crate::dedupe::DuplicatePolicy;
use crate::error::PipelineError;
use crate::merge::{ConflictRule, DimensionMerge, FactMerge};
use crate::schema::{ColumnType, Schema};

pub const DEPOSIT: &str = "deposit";
pub const WITHDRAWAL: &str = "withdrawal";
pub const EVENT: &str = "event";
pub const USER_LEVEL: &str = "user_level";
pub const USER_ID: &str = "user_id";

pub const DIM_USER: &str = "dim_user";
pub const FACT_DEPOSIT: &str = "fact_deposit";
pub const FACT_WITHDRAWAL: &str = "fact_withdrawal";
pub const FACT_USER_LEVEL: &str = "fact_user_level";
pub const FACT_USER_DAILY_SNAPSHOT: &str = "fact_user_daily_snapshot";
pub const FACT_DAILY_STATS: &str = "fact_daily_stats";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    /// Raw extract cleaned into trusted daily partitions.
    Source,
    Dimension,
    Fact,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MergeStrategy {
    None,
    Fact(FactMerge),
    Dimension(DimensionMerge),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableSpec {
    pub name: &'static str,
    pub kind: TableKind,
    pub schema: Schema,
    pub primary_key: Vec<&'static str>,
    pub duplicate_policy: DuplicatePolicy,
    pub merge: MergeStrategy,
}

impl TableSpec {
    fn source(
        name: &'static str,
        columns: &[(&'static str, ColumnType)],
        primary_key: &[&'static str],
    ) -> Self {
        Self {
            name,
            kind: TableKind::Source,
            schema: Schema::new(columns.iter().copied()),
            primary_key: primary_key.to_vec(),
            duplicate_policy: DuplicatePolicy::KeepLast,
            merge: MergeStrategy::None,
        }
    }

    fn fact(
        name: &'static str,
        columns: &[(&'static str, ColumnType)],
        date_column: &'static str,
        identity_key: &[&'static str],
    ) -> Self {
        Self {
            name,
            kind: TableKind::Fact,
            schema: Schema::new(columns.iter().copied()),
            primary_key: identity_key.to_vec(),
            duplicate_policy: DuplicatePolicy::KeepLast,
            merge: MergeStrategy::Fact(FactMerge {
                date_column,
                identity_key: identity_key.to_vec(),
            }),
        }
    }

    pub fn fact_merge(&self) -> Result<&FactMerge, PipelineError> {
        match &self.merge {
            MergeStrategy::Fact(config) => Ok(config),
            _ => Err(PipelineError::NotMergeable {
                table: self.name,
                operation: "fact merge",
            }),
        }
    }

    pub fn dimension_merge(&self) -> Result<&DimensionMerge, PipelineError> {
        match &self.merge {
            MergeStrategy::Dimension(config) => Ok(config),
            _ => Err(PipelineError::NotMergeable {
                table: self.name,
                operation: "dimension merge",
            }),
        }
    }

    pub fn is_cumulative(&self) -> bool {
        self.kind != TableKind::Source
    }
}

const DEPOSIT_COLUMNS: &[(&str, ColumnType)] = &[
    ("id", ColumnType::Integer),
    ("event_timestamp", ColumnType::Timestamp),
    ("user_id", ColumnType::Text),
    ("amount", ColumnType::Decimal),
    ("currency", ColumnType::Text),
    ("tx_status", ColumnType::Text),
];

const WITHDRAWAL_COLUMNS: &[(&str, ColumnType)] = &[
    ("id", ColumnType::Integer),
    ("event_timestamp", ColumnType::Timestamp),
    ("user_id", ColumnType::Text),
    ("amount", ColumnType::Decimal),
    ("interface", ColumnType::Text),
    ("currency", ColumnType::Text),
    ("tx_status", ColumnType::Text),
];

const EVENT_COLUMNS: &[(&str, ColumnType)] = &[
    ("id", ColumnType::Integer),
    ("event_timestamp", ColumnType::Timestamp),
    ("user_id", ColumnType::Text),
    ("event_name", ColumnType::Text),
];

const USER_LEVEL_COLUMNS: &[(&str, ColumnType)] = &[
    ("user_id", ColumnType::Text),
    ("jurisdiction", ColumnType::Text),
    ("level", ColumnType::Integer),
    ("event_timestamp", ColumnType::Timestamp),
];

const USER_ID_COLUMNS: &[(&str, ColumnType)] = &[("user_id", ColumnType::Text)];

const DIM_USER_COLUMNS: &[(&str, ColumnType)] = &[
    ("user_id", ColumnType::Text),
    ("last_login", ColumnType::Timestamp),
];

const SNAPSHOT_COLUMNS: &[(&str, ColumnType)] = &[
    ("user_id", ColumnType::Text),
    ("date", ColumnType::Timestamp),
    ("qty_deposits", ColumnType::Integer),
    ("qty_withdrawals", ColumnType::Integer),
    ("qty_logins", ColumnType::Integer),
    ("is_active", ColumnType::Boolean),
];

const DAILY_STATS_COLUMNS: &[(&str, ColumnType)] = &[
    ("date", ColumnType::Timestamp),
    ("currency", ColumnType::Text),
    ("level", ColumnType::Integer),
    ("jurisdiction", ColumnType::Text),
    ("total_active_users", ColumnType::Integer),
    ("total_distinct_withdrawal_users", ColumnType::Integer),
    ("total_distinct_deposit_users", ColumnType::Integer),
    ("total_withdrawal_amount", ColumnType::Decimal),
    ("total_deposit_amount", ColumnType::Decimal),
];

/// Immutable lookup of every table the pipeline knows about.
#[derive(Debug, Clone, PartialEq)]
pub struct Registry {
    tables: Vec<TableSpec>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::standard()
    }
}

impl Registry {
    pub fn standard() -> Self {
        let tables = vec![
            TableSpec::source(DEPOSIT, DEPOSIT_COLUMNS, &["id"]),
            TableSpec::source(WITHDRAWAL, WITHDRAWAL_COLUMNS, &["id"]),
            TableSpec::source(EVENT, EVENT_COLUMNS, &["id"]),
            TableSpec::source(
                USER_LEVEL,
                USER_LEVEL_COLUMNS,
                &["user_id", "jurisdiction", "event_timestamp"],
            ),
            TableSpec::source(USER_ID, USER_ID_COLUMNS, &["user_id"]),
            TableSpec {
                name: DIM_USER,
                kind: TableKind::Dimension,
                schema: Schema::new(DIM_USER_COLUMNS.iter().copied()),
                primary_key: vec!["user_id"],
                duplicate_policy: DuplicatePolicy::KeepLast,
                merge: MergeStrategy::Dimension(DimensionMerge {
                    key: vec!["user_id"],
                    rules: vec![("last_login", ConflictRule::Greatest)],
                }),
            },
            TableSpec::fact(FACT_DEPOSIT, DEPOSIT_COLUMNS, "event_timestamp", &["id"]),
            TableSpec::fact(FACT_WITHDRAWAL, WITHDRAWAL_COLUMNS, "event_timestamp", &["id"]),
            TableSpec::fact(
                FACT_USER_LEVEL,
                USER_LEVEL_COLUMNS,
                "event_timestamp",
                &["user_id", "jurisdiction", "event_timestamp"],
            ),
            TableSpec::fact(
                FACT_USER_DAILY_SNAPSHOT,
                SNAPSHOT_COLUMNS,
                "date",
                &["user_id", "date"],
            ),
            TableSpec::fact(
                FACT_DAILY_STATS,
                DAILY_STATS_COLUMNS,
                "date",
                &["date", "currency", "level", "jurisdiction"],
            ),
        ];

        Self { tables }
    }

    pub fn get(&self, name: &str) -> Result<&TableSpec, PipelineError> {
        self.tables
            .iter()
            .find(|table| table.name == name)
            .ok_or_else(|| PipelineError::UnknownTable {
                name: name.to_owned(),
            })
    }

    pub fn tables(&self) -> &[TableSpec] {
        &self.tables
    }

    pub fn sources(&self) -> impl Iterator<Item = &TableSpec> {
        self.tables
            .iter()
            .filter(|table| table.kind == TableKind::Source)
    }

    pub fn cumulative(&self) -> impl Iterator<Item = &TableSpec> {
        self.tables.iter().filter(|table| table.is_cumulative())
    }

    /// Override the duplicate policy of one table.
    pub fn with_policy(mut self, name: &str, policy: DuplicatePolicy) -> Result<Self, PipelineError> {
        let table = self
            .tables
            .iter_mut()
            .find(|table| table.name == name)
            .ok_or_else(|| PipelineError::UnknownTable {
                name: name.to_owned(),
            })?;
        table.duplicate_policy = policy;
        Ok(self)
    }
}
