//! Blob storage for large testcase payloads

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::error::StoreError;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch a text payload by key.
    async fn fetch(&self, key: &str) -> Result<String, StoreError>;
}

/// S3/MinIO storage client
#[derive(Clone)]
pub struct StorageClient {
    client: Client,
    bucket: String,
}

impl StorageClient {
    pub fn new(
        endpoint_url: &str,
        bucket: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        let credentials = Credentials::new(access_key, secret_key, None, None, "judge-engine");

        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .endpoint_url(endpoint_url)
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(config),
            bucket: bucket.into(),
        }
    }

    /// Build a client from `MINIO_*` environment variables
    pub fn from_env() -> Self {
        let env = |key: &str, default: &str| std::env::var(key).unwrap_or_else(|_| default.into());
        let use_ssl = std::env::var("MINIO_USE_SSL")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let endpoint_url = format!(
            "{}://{}:{}",
            if use_ssl { "https" } else { "http" },
            env("MINIO_ENDPOINT", "localhost"),
            env("MINIO_PORT", "9000"),
        );
        info!("Using blob storage at {}", endpoint_url);

        Self::new(
            &endpoint_url,
            env("MINIO_BUCKET", "judge-testcases"),
            env("MINIO_ACCESS_KEY", "minioadmin"),
            env("MINIO_SECRET_KEY", "minioadmin"),
        )
    }

    pub async fn download(&self, key: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to download {}", key))?;

        let data = response
            .body
            .collect()
            .await
            .with_context(|| format!("Failed to read body of {}", key))?;
        Ok(data.into_bytes().to_vec())
    }

    pub async fn download_string(&self, key: &str) -> Result<String> {
        let bytes = self.download(key).await?;
        String::from_utf8(bytes).context("Invalid UTF-8 content")
    }
}

#[async_trait]
impl BlobStore for StorageClient {
    async fn fetch(&self, key: &str) -> Result<String, StoreError> {
        debug!(key, "fetching blob");
        self.download_string(key)
            .await
            .map_err(|e| StoreError::Blob(format!("{:#}", e)))
    }
}

/// Blobs held in memory
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, String>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>, content: impl Into<String>) {
        self.blobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.into(), content.into());
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn fetch(&self, key: &str) -> Result<String, StoreError> {
        self.blobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("blob {}", key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_blobs() {
        let blobs = MemoryBlobStore::new();
        blobs.insert("tc/1.in", "1 2\n");
        assert_eq!(blobs.fetch("tc/1.in").await.unwrap(), "1 2\n");
        assert!(matches!(
            blobs.fetch("tc/2.in").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_client_construction() {
        let client = StorageClient::new("http://localhost:9000", "bucket", "key", "secret");
        assert_eq!(client.bucket, "bucket");
    }
}
