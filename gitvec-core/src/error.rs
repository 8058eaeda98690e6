use std::path::PathBuf;

/// The closed error taxonomy the core surfaces to callers. Named by
/// behavior, not by the underlying library that produced it.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("unsupported filter leaf: {0}")]
    UnsupportedFilter(String),

    #[error("corrupt vector file at {path:?}: {reason}")]
    CorruptVectorFile { path: PathBuf, reason: String },

    #[error("index stale for collection {collection}")]
    IndexStale { collection: String },

    #[error("index missing for collection {collection}")]
    IndexMissing { collection: String },

    #[error("git backend error: {0}")]
    GitBackendError(String),

    #[error("temporal index absent for collection {collection}")]
    TemporalIndexAbsent { collection: String },

    #[error("matrix service unavailable: {0}")]
    MatrixServiceUnavailable(String),

    #[error("port allocation lost to another process")]
    PortAllocationLost,

    #[error("lock busy on {path:?}")]
    LockBusy { path: PathBuf },

    #[error("insufficient memory: {available_mb} MiB free, need at least {required_mb} MiB")]
    InsufficientMemory { available_mb: u64, required_mb: u64 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serde_json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("toml serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("git2 error: {0}")]
    Git2(#[from] git2::Error),

    #[error("hnsw artifact error: {0}")]
    HnswArtifact(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// HTTP status code a boundary server should map this error to, per
    /// the error-handling principle that "user-facing exit / response
    /// codes follow HTTP conventions at the boundary."
    pub fn http_status(&self) -> u16 {
        match self {
            CoreError::DimensionMismatch { .. } => 400,
            CoreError::UnsupportedFilter(_) => 400,
            CoreError::IndexMissing { .. } => 404,
            CoreError::PortAllocationLost => 200,
            CoreError::LockBusy { .. } => 409,
            CoreError::InsufficientMemory { .. } => 507,
            _ => 500,
        }
    }
}
