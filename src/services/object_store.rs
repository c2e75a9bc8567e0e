//! The storage capability the router depends on.
//!
//! Anything that can list, fetch, write and delete objects by key can sit
//! behind the router. Two implementations ship with the crate:
//! [`DiskStore`](super::storage_service::DiskStore) and
//! [`MemoryStore`](super::memory_store::MemoryStore).

use crate::models::object::{ByteStream, ObjectInfo, StoredObject};
use async_trait::async_trait;
use std::io;
use thiserror::Error;

/// Longest key any backend accepts.
pub const MAX_OBJECT_KEY_LEN: usize = 1024;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid object key")]
    InvalidObjectKey,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Every object currently in the bucket.
    async fn list(&self) -> StorageResult<Vec<ObjectInfo>>;

    /// Metadata and payload for `key`, or `None` when absent.
    async fn get(&self, key: &str) -> StorageResult<Option<StoredObject>>;

    /// Write `content` under `key`, replacing any existing object.
    async fn put(
        &self,
        key: &str,
        content_type: Option<String>,
        content: ByteStream,
    ) -> StorageResult<ObjectInfo>;

    /// Remove `key`. Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> StorageResult<()>;
}

/// Keys must be non-empty and at most [`MAX_OBJECT_KEY_LEN`] bytes.
pub fn ensure_key_valid(key: &str) -> StorageResult<()> {
    if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
        return Err(StorageError::InvalidObjectKey);
    }
    Ok(())
}
