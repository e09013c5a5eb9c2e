use crate::backend::StoreError;

/// Failures surfaced by tree operations.
///
/// Validation failures (`InvalidPath`, `AlreadyExists`, `NotExists`) are always
/// detected before any mutating store call is issued.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("object already exists: {0}")]
    AlreadyExists(String),
    #[error("object does not exist: {0}")]
    NotExists(String),
    #[error("upload of {path} failed: {reason}")]
    Upload { path: String, reason: String },
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),
    #[error("archive stream failed: {0}")]
    Archive(#[source] std::io::Error),
}

impl TreeError {
    /// Short machine-readable code, used in error bodies at the boundary.
    pub fn code(&self) -> &'static str {
        match self {
            TreeError::InvalidPath(_) => "invalid_path",
            TreeError::AlreadyExists(_) => "already_exists",
            TreeError::NotExists(_) => "not_found",
            TreeError::Upload { .. } => "upload_failed",
            TreeError::StoreUnavailable(_) => "store_unavailable",
            TreeError::Archive(_) => "archive_failed",
        }
    }
}

impl From<StoreError> for TreeError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(key) => TreeError::NotExists(key),
            other => TreeError::StoreUnavailable(other),
        }
    }
}

pub type TreeResult<T> = Result<T, TreeError>;
