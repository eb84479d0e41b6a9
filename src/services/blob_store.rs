//! Blob storage boundary: JSON documents addressed by (bucket, key).

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlobStoreError {
    #[error("blob not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("invalid blob key: {0}")]
    InvalidKey(String),

    #[error("blob io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("blob is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put_json(&self, bucket: &str, key: &str, value: &Value) -> Result<(), BlobStoreError>;

    async fn get_json(&self, bucket: &str, key: &str) -> Result<Value, BlobStoreError>;

    async fn exists(&self, bucket: &str, key: &str) -> bool;

    /// Stable locator recorded alongside persisted results
    fn uri(&self, bucket: &str, key: &str) -> String;
}

/// Reject keys that could escape the bucket directory
fn validate_key(key: &str) -> Result<(), BlobStoreError> {
    if key.is_empty() || key.starts_with('/') {
        return Err(BlobStoreError::InvalidKey(key.to_string()));
    }
    let escapes = Path::new(key)
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));
    if escapes {
        return Err(BlobStoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Buckets are directories under `root`; keys are relative paths inside them.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, bucket: &str, key: &str) -> Result<PathBuf, BlobStoreError> {
        validate_key(bucket)?;
        validate_key(key)?;
        Ok(self.root.join(bucket).join(key))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put_json(&self, bucket: &str, key: &str, value: &Value) -> Result<(), BlobStoreError> {
        let path = self.path_for(bucket, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let bytes = serde_json::to_vec(value)?;
        // Write-then-rename so readers never observe a partial document
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;

        tracing::debug!("Wrote blob {}/{}", bucket, key);
        Ok(())
    }

    async fn get_json(&self, bucket: &str, key: &str) -> Result<Value, BlobStoreError> {
        let path = self.path_for(bucket, key)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BlobStoreError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn exists(&self, bucket: &str, key: &str) -> bool {
        match self.path_for(bucket, key) {
            Ok(path) => tokio::fs::try_exists(path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    fn uri(&self, bucket: &str, key: &str) -> String {
        format!("file://{}", self.root.join(bucket).join(key).display())
    }
}

/// In-process blob store
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<(String, String), Value>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .blobs
            .read()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put_json(&self, bucket: &str, key: &str, value: &Value) -> Result<(), BlobStoreError> {
        validate_key(key)?;
        self.blobs
            .write()
            .insert((bucket.to_string(), key.to_string()), value.clone());
        Ok(())
    }

    async fn get_json(&self, bucket: &str, key: &str) -> Result<Value, BlobStoreError> {
        self.blobs
            .read()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| BlobStoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    async fn exists(&self, bucket: &str, key: &str) -> bool {
        self.blobs
            .read()
            .contains_key(&(bucket.to_string(), key.to_string()))
    }

    fn uri(&self, bucket: &str, key: &str) -> String {
        format!("memory://{}/{}", bucket, key)
    }
}
