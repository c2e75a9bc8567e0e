//! Process-local `ObjectStore`. Nothing survives a restart; used by the
//! router tests and by `--backend memory`.

use crate::{
    models::object::{ByteStream, ObjectInfo, StoredObject},
    services::object_store::{ObjectStore, StorageResult, ensure_key_valid},
};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use futures::{StreamExt, TryStreamExt, stream};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, (ObjectInfo, Bytes)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list(&self) -> StorageResult<Vec<ObjectInfo>> {
        let objects = self.objects.read().await;
        Ok(objects.values().map(|(info, _)| info.clone()).collect())
    }

    async fn get(&self, key: &str) -> StorageResult<Option<StoredObject>> {
        let objects = self.objects.read().await;
        Ok(objects.get(key).map(|(info, data)| StoredObject {
            info: info.clone(),
            content: stream::once(futures::future::ready(Ok(data.clone()))).boxed(),
        }))
    }

    /// The body is fully drained before the map is touched, so a failed
    /// stream leaves any previous object in place.
    async fn put(
        &self,
        key: &str,
        content_type: Option<String>,
        content: ByteStream,
    ) -> StorageResult<ObjectInfo> {
        ensure_key_valid(key)?;
        let data = content
            .try_fold(BytesMut::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await?
            .freeze();

        let info = ObjectInfo {
            key: key.to_string(),
            content_type,
            size_bytes: data.len() as i64,
            etag: format!("{:x}", md5::compute(&data)),
            last_modified: Utc::now(),
        };
        self.objects
            .write()
            .await
            .insert(key.to_string(), (info.clone(), data));
        Ok(info)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.objects.write().await.remove(key);
        Ok(())
    }
}
