//! Daily load: generate each cumulative table's slice and merge it in.

use serde::Serialize;
use time::Date;
use tracing::info;

use crate::error::PipelineError;
use crate::generate::{self, DailyPartitions};
use crate::merge::{merge_dimension, merge_fact};
use crate::record::RecordSet;
use crate::registry::{
    Registry, TableSpec, DEPOSIT, DIM_USER, EVENT, FACT_DAILY_STATS, FACT_DEPOSIT,
    FACT_USER_DAILY_SNAPSHOT, FACT_USER_LEVEL, FACT_WITHDRAWAL, USER_ID, USER_LEVEL, WITHDRAWAL,
};
use crate::store::{PartitionStore, TableStore};
use crate::timestamp::format_date;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Keep users with no activity in the daily snapshot.
    pub retain_idle_users: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableLoad {
    pub table: String,
    pub generated: usize,
    /// `None` when the cumulative table did not exist before this load.
    pub rows_before: Option<usize>,
    pub rows_after: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub date: String,
    pub tables: Vec<TableLoad>,
}

pub struct Loader<'a> {
    partitions: &'a dyn PartitionStore,
    tables: &'a dyn TableStore,
    registry: &'a Registry,
    options: LoadOptions,
}

impl<'a> Loader<'a> {
    pub fn new(
        partitions: &'a dyn PartitionStore,
        tables: &'a dyn TableStore,
        registry: &'a Registry,
    ) -> Self {
        Self {
            partitions,
            tables,
            registry,
            options: LoadOptions::default(),
        }
    }

    pub fn with_options(mut self, options: LoadOptions) -> Self {
        self.options = options;
        self
    }

    /// Load every cumulative table for `date`. All six results are computed
    /// before anything is written, and then committed together.
    pub fn load(&self, date: Date) -> Result<LoadReport, PipelineError> {
        let day = format_date(date);
        let partitions = self.read_partitions(date)?;
        let mut staged: Vec<(&TableSpec, RecordSet)> = Vec::with_capacity(6);
        let mut tables = Vec::with_capacity(6);

        let dim = self.registry.get(DIM_USER)?;
        let generated = generate::dim_user(&partitions)?;
        let cumulative = self.tables.read(dim)?;
        let pending = pending_load(dim, &generated, cumulative.as_ref());
        let merged = merge_dimension(generated, cumulative, dim.dimension_merge()?)?;
        tables.push(pending.finish(&merged));
        staged.push((dim, merged));

        let deposit = self.registry.get(FACT_DEPOSIT)?;
        let generated = generate::passthrough(partitions.deposit.as_ref(), &deposit.schema);
        tables.push(self.stage_fact(date, deposit, generated, &mut staged)?);

        let withdrawal = self.registry.get(FACT_WITHDRAWAL)?;
        let generated = generate::passthrough(partitions.withdrawal.as_ref(), &withdrawal.schema);
        tables.push(self.stage_fact(date, withdrawal, generated, &mut staged)?);

        let snapshot = self.registry.get(FACT_USER_DAILY_SNAPSHOT)?;
        let generated =
            generate::daily_snapshot(date, &partitions, self.options.retain_idle_users)?;
        tables.push(self.stage_fact(date, snapshot, generated, &mut staged)?);

        let levels = self.registry.get(FACT_USER_LEVEL)?;
        let generated = generate::latest_user_levels(&partitions, &levels.schema)?;
        tables.push(self.stage_fact(date, levels, generated, &mut staged)?);

        let stats = self.registry.get(FACT_DAILY_STATS)?;
        let staged_levels = staged.last().map(|(_, records)| records);
        let generated = generate::daily_stats(date, staged_levels, &partitions)?;
        tables.push(self.stage_fact(date, stats, generated, &mut staged)?);

        self.tables.write_all(&staged)?;

        for table in &tables {
            info!(
                table = %table.table,
                date = %day,
                generated = table.generated,
                rows_after = table.rows_after,
                "loaded table"
            );
        }
        Ok(LoadReport { date: day, tables })
    }

    fn read_partitions(&self, date: Date) -> Result<DailyPartitions, PipelineError> {
        let read = |name: &str| -> Result<Option<RecordSet>, PipelineError> {
            let spec = self.registry.get(name)?;
            Ok(self.partitions.read_trusted(spec, date)?)
        };

        Ok(DailyPartitions {
            user_id: read(USER_ID)?,
            deposit: read(DEPOSIT)?,
            withdrawal: read(WITHDRAWAL)?,
            event: read(EVENT)?,
            user_level: read(USER_LEVEL)?,
        })
    }

    fn stage_fact(
        &self,
        date: Date,
        spec: &'a TableSpec,
        generated: RecordSet,
        staged: &mut Vec<(&'a TableSpec, RecordSet)>,
    ) -> Result<TableLoad, PipelineError> {
        let cumulative = self.tables.read(spec)?;
        let pending = pending_load(spec, &generated, cumulative.as_ref());
        let merged = merge_fact(
            date,
            generated,
            cumulative,
            spec.fact_merge()?,
            &spec.duplicate_policy,
        )?;

        let report = pending.finish(&merged);
        staged.push((spec, merged));
        Ok(report)
    }
}

struct PendingLoad {
    table: String,
    generated: usize,
    rows_before: Option<usize>,
}

impl PendingLoad {
    fn finish(self, merged: &RecordSet) -> TableLoad {
        TableLoad {
            table: self.table,
            generated: self.generated,
            rows_before: self.rows_before,
            rows_after: merged.len(),
        }
    }
}

fn pending_load(spec: &TableSpec, generated: &RecordSet, cumulative: Option<&RecordSet>) -> PendingLoad {
    PendingLoad {
        table: spec.name.to_owned(),
        generated: generated.len(),
        rows_before: cumulative.map(RecordSet::len),
    }
}
