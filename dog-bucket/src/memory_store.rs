use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::{
    BucketError, BucketResult, EncryptionKey, FileMetadata, ObjectStore, ObjectWriter, WriteOptions,
    WriteResult,
};

/// An object held by [`MemoryObjectStore`]
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Bytes,
    pub metadata: FileMetadata,
    pub content_type: Option<String>,
    pub etag: String,
    encryption_key: Option<EncryptionKey>,
}

impl StoredObject {
    pub fn is_encrypted(&self) -> bool {
        self.encryption_key.is_some()
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    buckets: HashMap<String, HashMap<String, StoredObject>>,
    chunk_writes: HashMap<(String, String), usize>,
    writers_opened: usize,
    failing_paths: HashSet<String>,
}

/// In-process object store for tests and local development.
///
/// Clones share state, so a test can keep one handle while a `Bucket` owns
/// another.
#[derive(Debug, Clone, Default)]
pub struct MemoryObjectStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds an empty bucket
    pub fn with_bucket<S: Into<String>>(self, bucket: S) -> Self {
        self.create_bucket(bucket);
        self
    }

    pub fn create_bucket<S: Into<String>>(&self, bucket: S) {
        self.state.write().buckets.entry(bucket.into()).or_default();
    }

    /// Make every chunk write to `path` fail
    pub fn fail_writes_to<S: Into<String>>(&self, path: S) {
        self.state.write().failing_paths.insert(path.into());
    }

    pub fn object(&self, bucket: &str, path: &str) -> Option<StoredObject> {
        self.state
            .read()
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(path))
            .cloned()
    }

    /// Sorted object paths in a bucket
    pub fn paths(&self, bucket: &str) -> Vec<String> {
        let state = self.state.read();
        let mut paths: Vec<String> = state
            .buckets
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default();
        paths.sort();
        paths
    }

    /// Number of chunk writes issued against an object
    pub fn chunk_writes(&self, bucket: &str, path: &str) -> usize {
        self.state
            .read()
            .chunk_writes
            .get(&(bucket.to_string(), path.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Number of writers opened across all buckets
    pub fn writers_opened(&self) -> usize {
        self.state.read().writers_opened
    }

    fn with_object<F, R>(&self, bucket: &str, path: &str, f: F) -> BucketResult<R>
    where
        F: FnOnce(&mut StoredObject) -> R,
    {
        let mut state = self.state.write();
        let objects = state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| BucketError::BucketNotFound {
                bucket: bucket.to_string(),
            })?;
        let object = objects
            .get_mut(path)
            .ok_or_else(|| BucketError::not_found(path))?;
        Ok(f(object))
    }

    fn check_key(object: &StoredObject, key: Option<&EncryptionKey>) -> BucketResult<()> {
        if object.encryption_key.as_ref() == key {
            Ok(())
        } else {
            Err(BucketError::invalid(
                "the provided encryption key does not match the object's key",
            ))
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn bucket_exists(&self, bucket: &str) -> BucketResult<bool> {
        Ok(self.state.read().buckets.contains_key(bucket))
    }

    async fn open_writer(
        &self,
        bucket: &str,
        path: &str,
        options: WriteOptions,
    ) -> BucketResult<Box<dyn ObjectWriter>> {
        let mut state = self.state.write();
        if !state.buckets.contains_key(bucket) {
            return Err(BucketError::BucketNotFound {
                bucket: bucket.to_string(),
            });
        }
        state.writers_opened += 1;

        Ok(Box::new(MemoryObjectWriter {
            state: self.state.clone(),
            bucket: bucket.to_string(),
            path: path.to_string(),
            options,
            buffer: BytesMut::new(),
        }))
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("memory://{bucket}/{path}")
    }

    async fn get_metadata(
        &self,
        bucket: &str,
        path: &str,
        encryption: Option<&EncryptionKey>,
    ) -> BucketResult<FileMetadata> {
        self.with_object(bucket, path, |object| {
            Self::check_key(object, encryption).map(|_| object.metadata.clone())
        })?
    }

    async fn set_metadata(
        &self,
        bucket: &str,
        path: &str,
        metadata: FileMetadata,
        encryption: Option<&EncryptionKey>,
    ) -> BucketResult<()> {
        self.with_object(bucket, path, |object| {
            Self::check_key(object, encryption)?;
            object.metadata = metadata;
            Ok(())
        })?
    }

    async fn delete(&self, bucket: &str, path: &str) -> BucketResult<()> {
        let mut state = self.state.write();
        let objects = state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| BucketError::BucketNotFound {
                bucket: bucket.to_string(),
            })?;
        objects
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| BucketError::not_found(path))
    }

    async fn download(
        &self,
        bucket: &str,
        path: &str,
        encryption: Option<&EncryptionKey>,
    ) -> BucketResult<Bytes> {
        self.with_object(bucket, path, |object| {
            Self::check_key(object, encryption).map(|_| object.data.clone())
        })?
    }
}

/// Buffers acknowledged chunks and publishes the object on finish
struct MemoryObjectWriter {
    state: Arc<RwLock<MemoryState>>,
    bucket: String,
    path: String,
    options: WriteOptions,
    buffer: BytesMut,
}

#[async_trait]
impl ObjectWriter for MemoryObjectWriter {
    async fn write_chunk(&mut self, chunk: Bytes) -> BucketResult<()> {
        let mut state = self.state.write();
        *state
            .chunk_writes
            .entry((self.bucket.clone(), self.path.clone()))
            .or_default() += 1;

        if state.failing_paths.contains(&self.path) {
            return Err(BucketError::backend(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                format!("write to {} rejected", self.path),
            )));
        }

        self.buffer.extend_from_slice(&chunk);
        Ok(())
    }

    async fn finish(self: Box<Self>) -> BucketResult<WriteResult> {
        let this = *self;
        let size_bytes = this.buffer.len() as u64;
        let etag = Uuid::new_v4().simple().to_string();

        let object = StoredObject {
            data: this.buffer.freeze(),
            metadata: this.options.metadata,
            content_type: this.options.content_type,
            etag: etag.clone(),
            encryption_key: this.options.encryption_key,
        };

        let mut state = this.state.write();
        let objects = state
            .buckets
            .get_mut(&this.bucket)
            .ok_or_else(|| BucketError::BucketNotFound {
                bucket: this.bucket.clone(),
            })?;
        objects.insert(this.path, object);

        Ok(WriteResult {
            etag: Some(etag),
            size_bytes,
        })
    }
}
