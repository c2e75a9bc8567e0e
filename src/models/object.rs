//! Represents an object (file) stored in the bucket.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use sqlx::FromRow;
use std::{fmt, io};

/// Byte stream used for object payloads going into and out of a store.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// Metadata of a single object, as reported by the backend.
///
/// This system never computes any of these fields itself; they are copied
/// verbatim into fetch responses.
#[derive(Clone, FromRow, Debug, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Object key, unique within the bucket.
    pub key: String,

    /// Content type (MIME type) recorded at upload.
    pub content_type: Option<String>,

    /// Size in bytes.
    pub size_bytes: i64,

    /// Hex MD5 of the payload, unquoted.
    pub etag: String,

    /// Timestamp of the last write.
    pub last_modified: DateTime<Utc>,
}

/// An object's metadata together with its payload.
pub struct StoredObject {
    pub info: ObjectInfo,
    pub content: ByteStream,
}

impl fmt::Debug for StoredObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredObject")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}
