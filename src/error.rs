use thiserror::Error;

#[derive(Error, Debug)]
pub enum PayrollError {
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Not found: {0}")]
    NotFoundError(String),
    #[error("State conflict: {0}")]
    StateConflictError(String),
    #[error("Data incomplete: {0}")]
    DataIncompleteError(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDBError(#[from] rocksdb::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl PayrollError {
    /// The message without the kind prefix, used in per-item reason lists.
    pub fn reason(&self) -> String {
        match self {
            Self::ValidationError(msg)
            | Self::NotFoundError(msg)
            | Self::StateConflictError(msg)
            | Self::DataIncompleteError(msg) => msg.clone(),
            other => other.to_string(),
        }
    }

    /// Errors worth retrying at the job level. Domain errors never are.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::IoError(_) | Self::InternalError(_) => true,
            #[cfg(feature = "storage-rocksdb")]
            Self::RocksDBError(_) => true,
            _ => false,
        }
    }

    pub(crate) fn internal(msg: impl Into<String>) -> Self {
        Self::InternalError(Box::new(std::io::Error::other(msg.into())))
    }
}

pub type Result<T> = std::result::Result<T, PayrollError>;
