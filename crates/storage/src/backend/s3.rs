//! S3-compatible blob store backend.
//!
//! This module provides a storage backend implementation for S3-compatible
//! services including AWS S3, Backblaze B2, MinIO, Garage and others.
//!
//! # Credentials
//!
//! Credentials are provided explicitly via environment configuration; the AWS
//! SDK credential-provider chain is deliberately not consulted because the
//! deployment targets are mostly not AWS.

use super::checked;
use crate::BlobStore;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Credentials, Region, retry::RetryConfig},
    error::SdkError,
    operation::{get_object::GetObjectError, head_object::HeadObjectError},
    primitives::ByteStream,
};
use exn::ResultExt;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Generous default for concurrent S3 requests.
///
/// TODO: Adaptive rate limiting based on 429/throttling responses?
const DEFAULT_CONCURRENT_REQUESTS: usize = 100;

/// S3-compatible blob store backend.
///
/// Stores blobs flat in a single bucket under their opaque keys. Addressing
/// style defaults to virtual-hosted; switch to path-style for services that
/// don't do bucket subdomains (MinIO, Garage, most self-hosted things).
#[derive(Debug, Clone)]
pub struct S3Backend {
    name: String,
    client: Client,
    bucket: String,
    /// Rate limiter for concurrent S3 requests.
    rate_limiter: Arc<Semaphore>,
}

impl S3Backend {
    /// Create a new S3 blob store backend.
    ///
    /// # Arguments
    /// * `name` - A name for this backend (used in display/logging)
    /// * `bucket` - S3 bucket name
    /// * `region` - AWS region or provider-specific region
    /// * `endpoint` - Custom endpoint URL for S3-compatible services
    /// * `key_id` - AWS/provider access key ID
    /// * `key_secret` - AWS/provider secret access key
    /// * `virtual_addressing` - virtual-hosted (`true`) or path-style (`false`)
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        bucket: impl Into<String>,
        region: impl Into<String>,
        endpoint: Option<impl Into<String>>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
        virtual_addressing: bool,
    ) -> Self {
        let name = name.into();
        let bucket = bucket.into();
        let region = Region::new(region.into());
        let credentials = Credentials::new(key_id, key_secret, None, None, "hoard-config");
        let mut config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(region)
            // Configure retry policy with exponential backoff (1 initial + 3 retries)
            .retry_config(RetryConfig::standard().with_max_attempts(4))
            .force_path_style(!virtual_addressing);
        // Set custom endpoint for non-AWS services
        if let Some(endpoint_url) = endpoint {
            config_builder = config_builder.endpoint_url(endpoint_url);
        }
        let client = Client::from_conf(config_builder.build());
        let rate_limiter = Arc::new(Semaphore::new(DEFAULT_CONCURRENT_REQUESTS));
        Self {
            name,
            client,
            bucket,
            rate_limiter,
        }
    }

    /// Acquire a rate limiter permit before making an S3 API call.
    async fn acquire_permit(&self) -> OwnedSemaphorePermit {
        // unwrap is safe: semaphore is never closed
        self.rate_limiter.clone().acquire_owned().await.unwrap()
    }
}

#[async_trait]
impl BlobStore for S3Backend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let key = checked(key)?;
        let _permit = self.acquire_permit().await;
        match self.client.head_object().bucket(&self.bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(SdkError::ServiceError(e)) if matches!(e.err(), HeadObjectError::NotFound(_)) => Ok(false),
            Err(e) => Err(ErrorKind::from_sdk(e, key).into()),
        }
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        let key = checked(key)?;
        let _permit = self.acquire_permit().await;
        // Blobs are compressed HTML/ebook files of at most a few tens of
        // megabytes; whole-buffer reads are fine.
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_get_error(e, key))?;
        let bytes = response
            .body
            .collect()
            .await
            .or_raise(|| ErrorKind::Network("failed to read response body".to_string()))?
            .into_bytes();
        Ok(bytes.to_vec())
    }

    async fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        let key = checked(key)?;
        let _permit = self.acquire_permit().await;
        let body = ByteStream::from(data.to_vec());
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| ErrorKind::from_sdk(e, key))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let key = checked(key)?;
        // Note: S3 DeleteObject succeeds even if the object doesn't exist.
        // The existence check is only here to match the trait's expected
        // behaviour, not because S3 requires it.
        if !self.exists(key).await? {
            exn::bail!(ErrorKind::NotFound(key.to_string()));
        }
        let _permit = self.acquire_permit().await;
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| ErrorKind::from_sdk(e, key))?;
        Ok(())
    }
}

impl ErrorKind {
    fn from_sdk<E>(e: SdkError<E>, _key: &str) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        match &e {
            SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => ErrorKind::Network(e.to_string()),
            _ => ErrorKind::Backend(e.to_string()),
        }
    }
}

fn map_get_error(e: SdkError<GetObjectError>, key: &str) -> ErrorKind {
    match &e {
        SdkError::ServiceError(s) if matches!(s.err(), GetObjectError::NoSuchKey(_)) => {
            ErrorKind::NotFound(key.to_string())
        },
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => ErrorKind::Network(e.to_string()),
        _ => ErrorKind::Backend(e.to_string()),
    }
}
