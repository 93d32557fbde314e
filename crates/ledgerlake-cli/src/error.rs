use ledgerlake_core::{PipelineError, StoreError};
use ledgerlake_warehouse::WarehouseError;
use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Usage(_) => 2,
            Self::Pipeline(PipelineError::UnknownTable { .. } | PipelineError::InvalidDate { .. }) => 2,
            Self::Pipeline(PipelineError::Store(error)) | Self::Store(error) => store_exit_code(error),
            Self::Pipeline(_) => 3,
            Self::Warehouse(WarehouseError::ReportRejected(_)) => 2,
            Self::Warehouse(WarehouseError::Io(_)) => 10,
            Self::Warehouse(WarehouseError::Store(error)) => store_exit_code(error),
            Self::Warehouse(_) => 3,
            Self::Serialization(_) | Self::Io(_) => 10,
        }
    }
}

const fn store_exit_code(error: &StoreError) -> u8 {
    match error {
        StoreError::Io { .. } => 10,
        StoreError::Malformed { .. } | StoreError::Backend(_) => 3,
    }
}
