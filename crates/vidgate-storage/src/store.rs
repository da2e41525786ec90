//! The object store contract.
//!
//! The upload coordinator drives a remote store exclusively through this
//! trait. Implementations perform a single attempt per call and never
//! retry internally; retry policy belongs to the caller.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StorageResult;

/// Integrity token for one uploaded part, required at finalize time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartToken {
    /// 1-based part number.
    pub part_number: i32,
    /// The store's ETag for the uploaded bytes.
    pub etag: String,
}

/// Location of a stored object after a successful write.
#[derive(Debug, Clone)]
pub struct ObjectLocation {
    /// Object key within the bucket.
    pub key: String,
    /// ETag of the assembled object, when the store reports one.
    pub etag: Option<String>,
}

/// Information about a stored object.
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    /// Object key
    pub key: String,
    /// Size in bytes
    pub size: u64,
    /// Last modified timestamp (milliseconds since epoch)
    pub last_modified: Option<u64>,
}

/// Remote object store operations.
///
/// Multipart life cycle: `begin_multipart` opens a store-side transaction,
/// `upload_part` transfers one numbered byte range, and the transaction ends
/// with exactly one of `finalize_multipart` (submitting the ordered part
/// list) or `abort_multipart`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Begin a multipart upload; returns the store's transaction id.
    async fn begin_multipart(&self, key: &str, content_type: &str) -> StorageResult<String>;

    /// Upload one numbered part; returns its ETag.
    ///
    /// Re-uploading the same part number replaces the previous bytes
    /// store-side, so retries never create duplicate parts.
    async fn upload_part(
        &self,
        upload_id: &str,
        key: &str,
        part_number: i32,
        body: Bytes,
    ) -> StorageResult<String>;

    /// Finalize a multipart upload with the ordered part list.
    ///
    /// The store requires strictly ascending, contiguous part numbers.
    async fn finalize_multipart(
        &self,
        upload_id: &str,
        key: &str,
        parts: &[PartToken],
    ) -> StorageResult<ObjectLocation>;

    /// Abort a multipart upload, discarding all uploaded parts.
    async fn abort_multipart(&self, upload_id: &str, key: &str) -> StorageResult<()>;

    /// Single-shot upload for objects small enough to send in one request.
    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> StorageResult<ObjectLocation>;

    /// Generate a time-limited presigned URL for reading one object.
    async fn presign_get(&self, key: &str, expires_in: Duration) -> StorageResult<String>;

    /// List objects under a prefix.
    async fn list_objects(&self, prefix: &str) -> StorageResult<Vec<ObjectInfo>>;

    /// Delete an object.
    async fn delete_object(&self, key: &str) -> StorageResult<()>;

    /// Check whether an object exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Check connectivity to the store (readiness probe).
    async fn check_connectivity(&self) -> StorageResult<()>;
}
