//! src/services/storage_service.rs
//!
//! DiskStore — the durable `ObjectStore`, backed by SQLite for metadata and
//! local disk for object payloads. Payloads live beneath
//! `base_path/{shard}/{shard}/{md5(key)}`, so arbitrary keys never turn into
//! arbitrary filesystem paths.
//!
//! The payload file and its metadata row change together under `write_lock`:
//! `put` renames and upserts while holding it, `delete` drops both while
//! holding it, and `get` reads the row and opens the file while holding it.
//! An open file handle keeps reading the old payload after a later rename.

use crate::{
    models::object::{ByteStream, ObjectInfo, StoredObject},
    services::object_store::{ObjectStore, StorageError, StorageResult, ensure_key_valid},
};
use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use md5::Context;
use sqlx::SqlitePool;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
    sync::Mutex,
};
use tokio_util::io::ReaderStream;
use tracing::debug;
use uuid::Uuid;

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

/// Apply the embedded schema. Every statement is idempotent, so this runs on
/// each start as well as from `--migrate`.
pub async fn apply_schema(db: &SqlitePool) -> StorageResult<()> {
    let statements = SCHEMA
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty());

    for stmt in statements {
        debug!("Executing schema SQL: {}", stmt);
        sqlx::query(stmt).execute(db).await?;
    }
    Ok(())
}

#[derive(Clone)]
pub struct DiskStore {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,

    /// Serializes the steps that touch a payload file and its row together.
    write_lock: Arc<Mutex<()>>,
}

impl DiskStore {
    /// Create a DiskStore using `base_path` as the payload root and make sure
    /// the metadata schema exists.
    pub async fn open(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let store = Self {
            db,
            base_path: base_path.into(),
            write_lock: Arc::new(Mutex::new(())),
        };
        fs::create_dir_all(&store.base_path).await?;
        apply_schema(&store.db).await?;
        Ok(store)
    }

    /// Two-level shard directories plus file name for a key, all derived
    /// from MD5(key).
    fn object_path(&self, key: &str) -> PathBuf {
        let digest = md5::compute(key.as_bytes());
        let mut path = self.base_path.clone();
        path.push(format!("{:02x}", digest[0]));
        path.push(format!("{:02x}", digest[1]));
        path.push(format!("{:x}", digest));
        path
    }

    async fn fetch_info(&self, key: &str) -> StorageResult<Option<ObjectInfo>> {
        let info = sqlx::query_as::<_, ObjectInfo>(
            "SELECT key, content_type, size_bytes, etag, last_modified
             FROM objects WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&*self.db)
        .await?;
        Ok(info)
    }

    /// Stream `content` into a temp file next to its final location,
    /// returning the byte count and hex MD5. The temp file is removed on any
    /// failure.
    async fn write_payload(
        &self,
        tmp_path: &Path,
        mut content: ByteStream,
    ) -> StorageResult<(i64, String)> {
        let mut file = File::create(tmp_path).await?;
        let mut digest = Context::new();

        match copy_into(&mut file, &mut content, &mut digest).await {
            Ok(size_bytes) => Ok((size_bytes, format!("{:x}", digest.compute()))),
            Err(err) => {
                drop(file);
                let _ = fs::remove_file(tmp_path).await;
                Err(StorageError::Io(err))
            }
        }
    }

    /// Remove empty shard directories up to, but never including, the base
    /// path.
    async fn prune_empty_dirs(&self, start: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(&self.base_path) && current != self.base_path {
            match fs::remove_dir(&current).await {
                Ok(_) => match current.parent() {
                    Some(parent) => current = parent.to_path_buf(),
                    None => break,
                },
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl ObjectStore for DiskStore {
    async fn list(&self) -> StorageResult<Vec<ObjectInfo>> {
        let rows = sqlx::query_as::<_, ObjectInfo>(
            "SELECT key, content_type, size_bytes, etag, last_modified
             FROM objects ORDER BY key ASC",
        )
        .fetch_all(&*self.db)
        .await?;
        Ok(rows)
    }

    /// Metadata from SQLite, payload opened from disk. A row whose payload
    /// file has gone missing counts as absent.
    async fn get(&self, key: &str) -> StorageResult<Option<StoredObject>> {
        if ensure_key_valid(key).is_err() {
            return Ok(None);
        }
        let _guard = self.write_lock.lock().await;
        let Some(info) = self.fetch_info(key).await? else {
            return Ok(None);
        };

        let file = match File::open(self.object_path(key)).await {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("metadata for `{}` has no payload on disk", key);
                return Ok(None);
            }
            Err(err) => return Err(StorageError::Io(err)),
        };

        Ok(Some(StoredObject {
            info,
            content: ReaderStream::new(file).boxed(),
        }))
    }

    /// Write to a temp file in the base directory and fsync it, then rename
    /// into place and upsert the metadata row under the write lock.
    async fn put(
        &self,
        key: &str,
        content_type: Option<String>,
        content: ByteStream,
    ) -> StorageResult<ObjectInfo> {
        ensure_key_valid(key)?;

        let file_path = self.object_path(key);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StorageError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        let tmp_path = self.base_path.join(format!(".tmp-{}", Uuid::new_v4()));

        let (size_bytes, etag) = self.write_payload(&tmp_path, content).await?;

        let _guard = self.write_lock.lock().await;
        if let Err(err) = fs::create_dir_all(&parent).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&file_path).await?;
                fs::rename(&tmp_path, &file_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        }

        let upserted = sqlx::query_as::<_, ObjectInfo>(
            r#"
            INSERT INTO objects (key, content_type, size_bytes, etag, last_modified)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                content_type = excluded.content_type,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                last_modified = excluded.last_modified
            RETURNING key, content_type, size_bytes, etag, last_modified
            "#,
        )
        .bind(key)
        .bind(content_type)
        .bind(size_bytes)
        .bind(&etag)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await;

        match upserted {
            Ok(info) => Ok(info),
            Err(err) => {
                let _ = fs::remove_file(&file_path).await;
                Err(StorageError::Sqlx(err))
            }
        }
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        if ensure_key_valid(key).is_err() {
            return Ok(());
        }

        let _guard = self.write_lock.lock().await;
        sqlx::query("DELETE FROM objects WHERE key = ?")
            .bind(key)
            .execute(&*self.db)
            .await?;

        let file_path = self.object_path(key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", file_path.display());
            }
            Err(err) => return Err(StorageError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent).await;
        }
        Ok(())
    }
}

/// Drain `content` into `file`, feeding the digest as it goes, then fsync.
async fn copy_into(file: &mut File, content: &mut ByteStream, digest: &mut Context) -> io::Result<i64> {
    let mut size_bytes: i64 = 0;
    while let Some(chunk) = content.next().await {
        let chunk = chunk?;
        size_bytes += chunk.len() as i64;
        digest.consume(&chunk);
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok(size_bytes)
}
