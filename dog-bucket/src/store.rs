use async_trait::async_trait;
use bytes::Bytes;

use crate::{BucketResult, EncryptionKey, FileMetadata};

/// Object storage primitives - must be implemented by all storage backends.
///
/// Every method takes the bucket name so one store session can serve
/// several buckets.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Check whether a bucket exists
    async fn bucket_exists(&self, bucket: &str) -> BucketResult<bool>;

    /// Open a non-resumable writer for an object.
    ///
    /// The encryption key in `options` is applied before the first chunk.
    async fn open_writer(
        &self,
        bucket: &str,
        path: &str,
        options: WriteOptions,
    ) -> BucketResult<Box<dyn ObjectWriter>>;

    /// Public URL of an object
    fn public_url(&self, bucket: &str, path: &str) -> String;

    /// Get custom metadata of an object
    async fn get_metadata(
        &self,
        bucket: &str,
        path: &str,
        encryption: Option<&EncryptionKey>,
    ) -> BucketResult<FileMetadata>;

    /// Replace custom metadata of an object
    async fn set_metadata(
        &self,
        bucket: &str,
        path: &str,
        metadata: FileMetadata,
        encryption: Option<&EncryptionKey>,
    ) -> BucketResult<()>;

    /// Delete an object
    async fn delete(&self, bucket: &str, path: &str) -> BucketResult<()>;

    /// Download an object's full content
    async fn download(
        &self,
        bucket: &str,
        path: &str,
        encryption: Option<&EncryptionKey>,
    ) -> BucketResult<Bytes>;
}

/// Sequential writer for one object.
///
/// `write_chunk` resolves once the store has acknowledged the chunk; callers
/// must not issue the next chunk before that. Buffering backends acknowledge
/// chunks locally and only send data in `finish`, so progress can reach 100%
/// before the object is durable; the upload is complete once `finish` returns.
#[async_trait]
pub trait ObjectWriter: Send {
    /// Write one chunk and wait for its acknowledgment
    async fn write_chunk(&mut self, chunk: Bytes) -> BucketResult<()>;

    /// Finish the object, making it visible
    async fn finish(self: Box<Self>) -> BucketResult<WriteResult>;
}

/// Options applied when a writer is opened
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    pub content_type: Option<String>,
    pub metadata: FileMetadata,
    pub encryption_key: Option<EncryptionKey>,
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content_type<S: Into<String>>(mut self, content_type: S) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_metadata(mut self, metadata: FileMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_encryption_key(mut self, key: Option<EncryptionKey>) -> Self {
        self.encryption_key = key;
        self
    }
}

/// Result of a finished write
#[derive(Debug, Clone, Default)]
pub struct WriteResult {
    pub etag: Option<String>,
    pub size_bytes: u64,
}
