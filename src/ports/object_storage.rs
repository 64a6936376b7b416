use async_trait::async_trait;

use crate::helper::error_chain_fmt;

/// Outbound port to the object storage holding raw uploaded documents
#[async_trait]
pub trait ObjectStoragePort: Send + Sync {
    async fn fetch(&self, key: &str) -> Result<Vec<u8>, ObjectStorageError>;

    async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), ObjectStorageError>;

    async fn exists(&self, key: &str) -> Result<bool, ObjectStorageError>;
}

#[derive(thiserror::Error)]
pub enum ObjectStorageError {
    #[error("The object could not be found in the bucket: {0}")]
    ObjectNotFound(String),
    #[error("Invalid content type header: {0}")]
    InvalidContentType(String),
    #[error(transparent)]
    Other(#[from] s3::error::S3Error),
}

impl std::fmt::Debug for ObjectStorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
