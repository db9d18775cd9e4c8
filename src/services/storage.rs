use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, Region};

/// Opaque blob store that intake documents are written to.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Bucket name recorded on every ingest.
    fn bucket(&self) -> &str;

    /// Region recorded on every ingest.
    fn region(&self) -> &str;

    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// Client for AWS S3 or any S3-compatible object store.
pub struct S3Storage {
    bucket: Box<Bucket>,
    name: String,
    region: String,
}

impl S3Storage {
    /// Build a client for `bucket_name`. When `endpoint` is set the bucket is
    /// addressed path-style against that endpoint instead of AWS.
    pub fn new(
        bucket_name: &str,
        region: &str,
        endpoint: Option<&str>,
        access_key: &str,
        secret_key: &str,
    ) -> Result<Self, StorageError> {
        let s3_region = match endpoint {
            Some(endpoint) => Region::Custom {
                region: region.to_string(),
                endpoint: endpoint.to_string(),
            },
            None => region
                .parse::<Region>()
                .map_err(|e| StorageError::Config(e.to_string()))?,
        };

        let credentials = Credentials::new(Some(access_key), Some(secret_key), None, None, None)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        let mut bucket = Bucket::new(bucket_name, s3_region, credentials)
            .map_err(|e| StorageError::Config(e.to_string()))?;
        if endpoint.is_some() {
            bucket = bucket.with_path_style();
        }

        Ok(Self {
            bucket,
            name: bucket_name.to_string(),
            region: region.to_string(),
        })
    }
}

#[async_trait]
impl BlobStore for S3Storage {
    fn bucket(&self) -> &str {
        &self.name
    }

    fn region(&self) -> &str {
        &self.region
    }

    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError> {
        let response = self
            .bucket
            .put_object_with_content_type(key, data, content_type)
            .await?;
        check_status(response.status_code())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let response = self.bucket.delete_object(key).await?;
        check_status(response.status_code())
    }
}

fn check_status(code: u16) -> Result<(), StorageError> {
    if (200..300).contains(&code) {
        Ok(())
    } else {
        Err(StorageError::Status(code))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("S3 responded with status {0}")]
    Status(u16),

    #[error("Storage configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_success_status_is_an_error() {
        assert!(check_status(200).is_ok());
        assert!(check_status(204).is_ok());
        assert!(matches!(check_status(403), Err(StorageError::Status(403))));
        assert!(matches!(check_status(500), Err(StorageError::Status(500))));
    }

    #[test]
    fn custom_endpoint_keeps_configured_region() {
        let storage = S3Storage::new(
            "intake-docs",
            "auto",
            Some("http://localhost:9000"),
            "key",
            "secret",
        )
        .unwrap();

        assert_eq!(storage.bucket(), "intake-docs");
        assert_eq!(storage.region(), "auto");
    }
}
