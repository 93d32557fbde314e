//! Storage seams between the engines and their backends.

use std::collections::HashMap;
use std::sync::Mutex;

use time::Date;

use crate::error::StoreError;
use crate::record::{RecordSet, Value};
use crate::registry::TableSpec;

/// Daily partitions of source tables.
pub trait PartitionStore {
    /// Raw extract for `(table, date)` with every non-empty cell as written, or
    /// `None` when no extract exists for that date.
    fn read_raw(&self, table: &str, date: Date) -> Result<Option<RecordSet>, StoreError>;

    /// Trusted partition decoded with the table's schema.
    fn read_trusted(&self, spec: &TableSpec, date: Date) -> Result<Option<RecordSet>, StoreError>;

    /// Replace the trusted partition for `(spec, date)`.
    fn write_trusted(
        &self,
        spec: &TableSpec,
        date: Date,
        records: &RecordSet,
    ) -> Result<(), StoreError>;
}

/// Whole-table access to cumulative tables.
pub trait TableStore {
    fn read(&self, spec: &TableSpec) -> Result<Option<RecordSet>, StoreError>;

    fn write(&self, spec: &TableSpec, records: &RecordSet) -> Result<(), StoreError>;

    /// Persist several tables. Transactional backends override this so that
    /// either every table is written or none is.
    fn write_all(&self, tables: &[(&TableSpec, RecordSet)]) -> Result<(), StoreError> {
        for (spec, records) in tables {
            self.write(spec, records)?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    raw: HashMap<(String, Date), RecordSet>,
    trusted: HashMap<(String, Date), RecordSet>,
    tables: HashMap<String, RecordSet>,
}

/// In-process store used by tests and embedders.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a raw extract. Cells are stored as their rendered text so typed
    /// input behaves like a freshly read file.
    pub fn put_raw(&self, table: &str, date: Date, records: RecordSet) -> Result<(), StoreError> {
        let columns = records.columns().to_vec();
        let rows = records
            .into_rows()
            .into_iter()
            .map(|row| {
                row.iter()
                    .map(|value| match value {
                        Value::Null => Value::Null,
                        other => Value::Text(other.render()),
                    })
                    .collect()
            })
            .collect();
        let records = RecordSet::from_rows(columns, rows).map_err(StoreError::backend)?;

        self.lock()?.raw.insert((table.to_owned(), date), records);
        Ok(())
    }

    pub fn raw_partition(&self, table: &str, date: Date) -> Result<Option<RecordSet>, StoreError> {
        Ok(self.lock()?.raw.get(&(table.to_owned(), date)).cloned())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::backend("memory store lock poisoned"))
    }
}

impl PartitionStore for MemoryStore {
    fn read_raw(&self, table: &str, date: Date) -> Result<Option<RecordSet>, StoreError> {
        self.raw_partition(table, date)
    }

    fn read_trusted(&self, spec: &TableSpec, date: Date) -> Result<Option<RecordSet>, StoreError> {
        Ok(self
            .lock()?
            .trusted
            .get(&(spec.name.to_owned(), date))
            .cloned())
    }

    fn write_trusted(
        &self,
        spec: &TableSpec,
        date: Date,
        records: &RecordSet,
    ) -> Result<(), StoreError> {
        self.lock()?
            .trusted
            .insert((spec.name.to_owned(), date), records.clone());
        Ok(())
    }
}

impl TableStore for MemoryStore {
    fn read(&self, spec: &TableSpec) -> Result<Option<RecordSet>, StoreError> {
        Ok(self.lock()?.tables.get(spec.name).cloned())
    }

    fn write(&self, spec: &TableSpec, records: &RecordSet) -> Result<(), StoreError> {
        self.lock()?
            .tables
            .insert(spec.name.to_owned(), records.clone());
        Ok(())
    }

    fn write_all(&self, tables: &[(&TableSpec, RecordSet)]) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        for (spec, records) in tables {
            state.tables.insert(spec.name.to_owned(), records.clone());
        }
        Ok(())
    }
}
