use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("key_id {0} already exists")]
    DuplicateKeyId(Uuid),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("key not found or no longer deliverable")]
    NotFound,

    #[error("requester is not authorized to access this key")]
    Unauthorized,

    #[error("stored key failed integrity verification")]
    IntegrityError,

    #[error("storage layer unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;
