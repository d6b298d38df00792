//! Object storage seam and backends.
//!
//! Keys are opaque to callers: whatever `put` returns is what `get`
//! accepts. Backends: in-memory (tests, ephemeral dev), local
//! filesystem, and S3.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::ProviderError;

/// Opaque byte storage for input artifacts and stage outputs.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `bytes` and return an opaque reference to them.
    async fn put(&self, bytes: Vec<u8>) -> Result<String, ProviderError>;

    /// Fetch the bytes behind a reference produced by `put`.
    async fn get(&self, key: &str) -> Result<Vec<u8>, ProviderError>;
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

/// Keeps objects in a map. Tests and throwaway development only.
#[derive(Default)]
pub struct MemoryStorage {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn put(&self, bytes: Vec<u8>) -> Result<String, ProviderError> {
        let key = Uuid::new_v4().to_string();
        self.objects.write().await.insert(key.clone(), bytes);
        Ok(key)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, ProviderError> {
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| ProviderError::Permanent(format!("no such object: {key}")))
    }
}

// ---------------------------------------------------------------------------
// Local filesystem backend
// ---------------------------------------------------------------------------

/// Stores objects as files under a root directory.
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ObjectStorage for LocalStorage {
    async fn put(&self, bytes: Vec<u8>) -> Result<String, ProviderError> {
        let key = Uuid::new_v4().to_string();
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(self.root.join(&key), bytes).await?;
        Ok(key)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, ProviderError> {
        // Keys are UUIDs we issued; anything path-like is rejected.
        if key.contains(['/', '\\']) || key.contains("..") {
            return Err(ProviderError::Permanent(format!("invalid object key: {key}")));
        }
        Ok(tokio::fs::read(self.root.join(key)).await?)
    }
}

// ---------------------------------------------------------------------------
// S3 backend
// ---------------------------------------------------------------------------

/// Stores objects in an S3 bucket under an optional key prefix.
pub struct S3Storage {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: String,
}

impl S3Storage {
    /// Build a client from the ambient AWS environment configuration.
    pub async fn from_env(bucket: String, prefix: String) -> Self {
        let config = aws_config::load_from_env().await;
        Self {
            client: aws_sdk_s3::Client::new(&config),
            bucket,
            prefix,
        }
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn put(&self, bytes: Vec<u8>) -> Result<String, ProviderError> {
        let key = format!("{}{}", self.prefix, Uuid::new_v4());
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(bytes.into())
            .send()
            .await
            .map_err(|e| ProviderError::Transient(format!("s3 put failed: {e}")))?;
        Ok(key)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, ProviderError> {
        let object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| ProviderError::Transient(format!("s3 get failed: {e}")))?;
        let bytes = object
            .body
            .collect()
            .await
            .map_err(|e| ProviderError::Transient(format!("s3 body read failed: {e}")))?;
        Ok(bytes.into_bytes().to_vec())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
