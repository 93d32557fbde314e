mod clean;
mod extract;
mod load;
mod run;
mod sql;
mod tables;

use ledgerlake_core::{Registry, TableStore};
use ledgerlake_warehouse::{LakeConfig, LakeStore, Warehouse};
use serde_json::Value;

use crate::cli::{Cli, Command, StoreKind};
use crate::error::CliError;

/// Stores and registry shared by every command.
pub struct Context {
    pub config: LakeConfig,
    pub registry: Registry,
    pub lake: LakeStore,
    store: StoreKind,
}

impl Context {
    pub fn new(config: LakeConfig, store: StoreKind) -> Self {
        Self {
            lake: config.lake(),
            registry: Registry::standard(),
            config,
            store,
        }
    }

    pub fn warehouse(&self) -> Result<Warehouse, CliError> {
        Ok(Warehouse::open(self.config.warehouse())?)
    }

    /// Cumulative-table backend selected by `--store`.
    pub fn tables(&self) -> Result<Tables, CliError> {
        Ok(match self.store {
            StoreKind::Csv => Tables::Lake(self.lake.clone()),
            StoreKind::Duckdb => Tables::Warehouse(self.warehouse()?),
        })
    }
}

pub enum Tables {
    Lake(LakeStore),
    Warehouse(Warehouse),
}

impl Tables {
    pub fn store(&self) -> &dyn TableStore {
        match self {
            Self::Lake(lake) => lake,
            Self::Warehouse(warehouse) => warehouse,
        }
    }

    pub fn warehouse(&self) -> Option<&Warehouse> {
        match self {
            Self::Lake(_) => None,
            Self::Warehouse(warehouse) => Some(warehouse),
        }
    }
}

pub fn run(cli: &Cli) -> Result<Value, CliError> {
    let config = cli
        .home
        .clone()
        .map_or_else(LakeConfig::default, LakeConfig::with_home);
    let context = Context::new(config, cli.store);

    match &cli.command {
        Command::Extract(args) => extract::run(args, &context),
        Command::Clean(args) => clean::run(args, &context),
        Command::Load(args) => load::run(args, &context),
        Command::Run(args) => run::run(args, &context),
        Command::Sql(args) => sql::run(args, &context),
        Command::Tables => tables::run(&context),
    }
}
