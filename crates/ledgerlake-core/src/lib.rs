//! Core engines for ledgerlake.
//!
//! This crate contains:
//! - The typed record model and pinned timestamp formats
//! - Schema validation, deduplication and timestamp normalization
//! - Trusted-partition cleanup
//! - Fact (date-replace) and dimension (conflict-rule) merge engines
//! - Daily aggregation generators and the load orchestrator
//! - Storage traits and an in-memory store

pub mod dedupe;
pub mod error;
pub mod generate;
pub mod loader;
pub mod merge;
pub mod normalize;
pub mod record;
pub mod registry;
pub mod schema;
pub mod store;
pub mod timestamp;
pub mod trusted;
pub mod validate;

pub use dedupe::{dedupe, DuplicatePolicy};
pub use error::{PipelineError, StoreError};
pub use generate::DailyPartitions;
pub use loader::{LoadOptions, LoadReport, Loader, TableLoad};
pub use merge::{merge_dimension, merge_fact, ConflictRule, DimensionMerge, FactMerge};
pub use normalize::normalize;
pub use record::{KeyValue, RecordSet, Value};
pub use registry::{MergeStrategy, Registry, TableKind, TableSpec};
pub use schema::{ColumnType, Schema};
pub use store::{MemoryStore, PartitionStore, TableStore};
pub use timestamp::{format_date, format_timestamp, parse_date, parse_timestamp};
pub use trusted::{build_trusted, CleanReport, Cleaner};
pub use validate::validate;
