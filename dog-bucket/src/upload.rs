use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, trace};

use crate::naming::ObjectPath;
use crate::{
    BucketConfig, BucketError, BucketResult, EncryptionKey, ImageClassifier, ObjectStore, PhysicalFile,
    ProgressSender, UploadProgress, UploadReceipt, WriteOptions,
};

/// Writes physical files to the store in fixed-size, acknowledged chunks
pub struct ChunkedUploader {
    store: Arc<dyn ObjectStore>,
    classifier: ImageClassifier,
    bucket: String,
    chunk_size: usize,
    write_timeout: Duration,
    encryption_key: Option<EncryptionKey>,
}

impl ChunkedUploader {
    pub fn new(store: Arc<dyn ObjectStore>, classifier: ImageClassifier, config: &BucketConfig) -> Self {
        Self {
            store,
            classifier,
            bucket: config.bucket_name.clone(),
            chunk_size: config.chunk_size.max(1),
            write_timeout: config.write_timeout,
            encryption_key: config.encrypt_key.clone(),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of chunk writes needed for `len` bytes
    pub fn chunk_count(&self, len: usize) -> usize {
        len.div_ceil(self.chunk_size)
    }

    /// Upload one physical file.
    ///
    /// Names are normalized and validated before any writer is opened. Each
    /// chunk is acknowledged before the next is issued, and a progress event
    /// follows every acknowledgment. Every chunk write and the final commit
    /// must complete within the write timeout.
    #[instrument(skip(self, file, progress), fields(bucket = %self.bucket, folder = %file.folder_name, file = %file.file_name))]
    pub async fn upload(
        &self,
        file: PhysicalFile,
        progress: Option<&ProgressSender>,
    ) -> BucketResult<UploadReceipt> {
        let target = ObjectPath::new(&file.folder_name, &file.file_name)?;
        let data = file.file_data;
        let total_bytes = data.len() as u64;
        let detected = self.classifier.detect_type(&data);

        let mut options = WriteOptions::new()
            .with_metadata(file.file_metadata)
            .with_encryption_key(self.encryption_key.clone());
        if let Some(detected) = &detected {
            options = options.with_content_type(detected.mime_type.clone());
        }

        let mut writer = self
            .store
            .open_writer(&self.bucket, &target.path, options)
            .await
            .map_err(|e| BucketError::upload_failed(&target.path, e))?;

        let mut uploaded_bytes = 0u64;
        let mut offset = 0usize;
        while offset < data.len() {
            let end = usize::min(offset + self.chunk_size, data.len());
            let chunk = data.slice(offset..end);
            let chunk_len = chunk.len() as u64;

            self.acknowledged(&target.path, writer.write_chunk(chunk)).await?;

            uploaded_bytes += chunk_len;
            offset = end;

            let event = UploadProgress::new(&target.path, uploaded_bytes, total_bytes);
            trace!(path = %target.path, uploaded_bytes, total_bytes, percentage = event.percentage, "Chunk acknowledged");
            if let Some(progress) = progress {
                progress.send(event);
            }
        }

        let result = self.acknowledged(&target.path, writer.finish()).await?;

        // Nothing to chunk, still report completion once
        if total_bytes == 0 {
            if let Some(progress) = progress {
                progress.send(UploadProgress::new(&target.path, 0, 0));
            }
        }

        debug!(path = %target.path, etag = ?result.etag, "Object finished");

        let mut receipt = UploadReceipt::new(
            self.store.public_url(&self.bucket, &target.path),
            target.path.clone(),
            target.file_name,
            total_bytes,
        );
        if let Some(detected) = detected {
            receipt = receipt.with_detected_type(detected);
        }

        info!(
            path = %receipt.file_path,
            bytes = total_bytes,
            chunks = self.chunk_count(data.len()),
            "Uploaded file"
        );
        Ok(receipt)
    }

    /// Await a store write under the write timeout, wrapping failures for `path`
    async fn acknowledged<T, F>(&self, path: &str, write: F) -> BucketResult<T>
    where
        F: Future<Output = BucketResult<T>>,
    {
        match tokio::time::timeout(self.write_timeout, write).await {
            Ok(result) => result.map_err(|e| BucketError::upload_failed(path, e)),
            Err(_) => Err(BucketError::upload_failed(
                path,
                BucketError::WriteTimeout(self.write_timeout),
            )),
        }
    }
}

impl std::fmt::Debug for ChunkedUploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkedUploader")
            .field("bucket", &self.bucket)
            .field("chunk_size", &self.chunk_size)
            .field("write_timeout", &self.write_timeout)
            .field("encrypted", &self.encryption_key.is_some())
            .finish()
    }
}
