use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use s3::Bucket;

use crate::ports::object_storage::{ObjectStorageError, ObjectStoragePort};

/// Simple Storage Service (S3) repository for raw policy documents.
///
/// The bucket is created at startup when missing (see `startup::set_up_s3`).
pub struct DocumentS3Repository {
    bucket: Bucket,
}

impl DocumentS3Repository {
    pub fn new(bucket: Bucket) -> Self {
        Self { bucket }
    }

    /// Key layout for uploaded documents: `requests/{request_id}/{ts}_{name}`
    pub fn object_key(request_id: &str, filename: &str) -> String {
        let sanitized: String = filename
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();

        format!(
            "requests/{}/{}_{}",
            request_id,
            Utc::now().timestamp_millis(),
            sanitized
        )
    }

    /// Presigned URL letting a client upload a document without storage
    /// credentials
    pub fn presigned_upload_url(
        &self,
        key: &str,
        content_type: &str,
        expires_in_secs: u32,
    ) -> Result<String, ObjectStorageError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_str(content_type)
                .map_err(|_| ObjectStorageError::InvalidContentType(content_type.to_string()))?,
        );

        Ok(self.bucket.presign_put(key, expires_in_secs, Some(headers))?)
    }

    /// Presigned URL letting a client download a document without storage
    /// credentials
    pub fn presigned_download_url(
        &self,
        key: &str,
        expires_in_secs: u32,
    ) -> Result<String, ObjectStorageError> {
        Ok(self.bucket.presign_get(key, expires_in_secs, None)?)
    }
}

#[async_trait]
impl ObjectStoragePort for DocumentS3Repository {
    #[tracing::instrument(name = "Fetching file from bucket", skip(self))]
    async fn fetch(&self, key: &str) -> Result<Vec<u8>, ObjectStorageError> {
        let response = self.bucket.get_object(key).await.map_err(|error| match error {
            s3::error::S3Error::Http(404, _) => ObjectStorageError::ObjectNotFound(key.to_string()),
            _ => ObjectStorageError::Other(error),
        })?;

        Ok(response.bytes().to_vec())
    }

    #[tracing::instrument(name = "Adding file to bucket", skip(self, bytes))]
    async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), ObjectStorageError> {
        self.bucket
            .put_object_with_content_type(key, bytes, content_type)
            .await?;

        Ok(())
    }

    #[tracing::instrument(name = "Checking file presence in bucket", skip(self))]
    async fn exists(&self, key: &str) -> Result<bool, ObjectStorageError> {
        match self.bucket.head_object(key).await {
            Ok(_) => Ok(true),
            // Only a not-found (404) means a clean "no"
            Err(s3::error::S3Error::Http(404, _)) => Ok(false),
            Err(error) => Err(ObjectStorageError::Other(error)),
        }
    }
}
