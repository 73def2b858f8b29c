use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_stream::StreamExt;

use dog_bucket::{
    progress_channel, BucketConfig, BucketError, BucketResult, ChunkedUploader, EncryptionKey, FileMetadata,
    ImageClassifier, MemoryObjectStore, NameKind, ObjectStore, ObjectWriter, PhysicalFile, UploadProgress,
    WriteOptions,
};

const BUCKET: &str = "media";

/// Test factory functions
fn create_store() -> MemoryObjectStore {
    MemoryObjectStore::new().with_bucket(BUCKET)
}

fn create_uploader(store: &MemoryObjectStore) -> ChunkedUploader {
    create_uploader_with(Arc::new(store.clone()), BucketConfig::new(BUCKET))
}

fn create_uploader_with(store: Arc<dyn ObjectStore>, config: BucketConfig) -> ChunkedUploader {
    ChunkedUploader::new(store, ImageClassifier::default(), &config)
}

fn payload(len: usize) -> Bytes {
    Bytes::from((0..len).map(|i| (i % 251) as u8).collect::<Vec<_>>())
}

async fn collect_progress(file: PhysicalFile, uploader: &ChunkedUploader) -> Vec<UploadProgress> {
    let (tx, rx) = progress_channel();
    uploader.upload(file, Some(&tx)).await.unwrap();
    drop(tx);
    rx.collect().await
}

/// U1. Chunk count is ceil(N / C)
#[tokio::test]
async fn test_chunk_count_is_ceiling() {
    let store = create_store();
    let uploader = create_uploader(&store);

    for (len, expected) in [(1usize, 1usize), (1024, 1), (1025, 2), (2048, 2), (2500, 3)] {
        let name = format!("blob-{len}.bin");
        uploader
            .upload(PhysicalFile::new("chunks", name.clone(), payload(len)), None)
            .await
            .unwrap();

        let path = format!("chunks/{name}");
        assert_eq!(store.chunk_writes(BUCKET, &path), expected, "len {len}");
        assert_eq!(uploader.chunk_count(len), expected);
    }
}

/// U2. Progress is monotonic and ends at exactly 100
#[tokio::test]
async fn test_progress_is_monotonic() {
    let store = create_store();
    let uploader = create_uploader(&store);

    let events = collect_progress(PhysicalFile::new("docs", "report.bin", payload(2500)), &uploader).await;

    let uploaded: Vec<u64> = events.iter().map(|e| e.uploaded_bytes).collect();
    assert_eq!(uploaded, vec![1024, 2048, 2500]);
    assert!(events.windows(2).all(|w| w[0].percentage < w[1].percentage));
    assert!(events.iter().all(|e| e.file_path == "docs/report.bin" && e.total_bytes == 2500));

    let last = events.last().unwrap();
    assert_eq!(last.percentage, 100.0);
    assert!(last.is_complete());
}

/// U3. Empty files produce no chunk writes and a single completion event
#[tokio::test]
async fn test_empty_file() {
    let store = create_store();
    let uploader = create_uploader(&store);

    let events = collect_progress(PhysicalFile::new("docs", "empty.txt", Bytes::new()), &uploader).await;

    assert_eq!(store.chunk_writes(BUCKET, "docs/empty.txt"), 0);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].percentage, 100.0);

    let stored = store.object(BUCKET, "docs/empty.txt").unwrap();
    assert!(stored.data.is_empty());
}

/// U4. Stored bytes equal the input, receipt carries the canonical path
#[tokio::test]
async fn test_round_trip_and_receipt() {
    let store = create_store();
    let uploader = create_uploader(&store);
    let data = payload(3000);

    let receipt = uploader
        .upload(PhysicalFile::new("my docs", "annual report.bin", data.clone()), None)
        .await
        .unwrap();

    assert_eq!(receipt.file_path, "my-docs/annual-report.bin");
    assert_eq!(receipt.file_name, "annual-report.bin");
    assert_eq!(receipt.file_url, "memory://media/my-docs/annual-report.bin");
    assert_eq!(receipt.size_bytes, 3000);
    assert!(receipt.file_content_type.is_none());

    let stored = store.download(BUCKET, "my-docs/annual-report.bin", None).await.unwrap();
    assert_eq!(stored, data);
}

/// U5. Metadata and sniffed content type reach the writer
#[tokio::test]
async fn test_metadata_and_content_type() {
    let store = create_store();
    let uploader = create_uploader(&store);

    let mut metadata = FileMetadata::new();
    metadata.insert("owner".to_string(), "alice".to_string());

    let png = Bytes::from_static(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0]);
    let receipt = uploader
        .upload(PhysicalFile::new("img", "dot.png", png).with_metadata(metadata), None)
        .await
        .unwrap();

    assert_eq!(receipt.file_type.as_deref(), Some("png"));
    assert_eq!(receipt.file_content_type.as_deref(), Some("image/png"));
    assert!(receipt.is_image());

    let stored = store.object(BUCKET, "img/dot.png").unwrap();
    assert_eq!(stored.content_type.as_deref(), Some("image/png"));
    assert_eq!(stored.metadata.get("owner").map(String::as_str), Some("alice"));
}

/// U6. Invalid names fail before any writer is opened
#[tokio::test]
async fn test_invalid_names_open_nothing() {
    let store = create_store();
    let uploader = create_uploader(&store);

    let err = uploader
        .upload(PhysicalFile::new("docs", "???", payload(10)), None)
        .await
        .unwrap_err();
    assert!(matches!(err, BucketError::InvalidName { kind: NameKind::File, .. }));

    let err = uploader
        .upload(PhysicalFile::new("@@", "file.txt", payload(10)), None)
        .await
        .unwrap_err();
    assert!(matches!(err, BucketError::InvalidName { kind: NameKind::Folder, .. }));
    assert!(err.is_validation());

    assert_eq!(store.writers_opened(), 0);
}

/// U7. A rejected chunk surfaces as UploadFailed naming the path
#[tokio::test]
async fn test_failed_write() {
    let store = create_store();
    store.fail_writes_to("docs/broken.bin");
    let uploader = create_uploader(&store);

    let err = uploader
        .upload(PhysicalFile::new("docs", "broken.bin", payload(2000)), None)
        .await
        .unwrap_err();

    match err {
        BucketError::UploadFailed { path, source } => {
            assert_eq!(path, "docs/broken.bin");
            assert!(matches!(*source, BucketError::Backend { .. }));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(store.object(BUCKET, "docs/broken.bin").is_none());
    assert_eq!(store.chunk_writes(BUCKET, "docs/broken.bin"), 1);
}

/// Which write a stalled store never acknowledges in time
#[derive(Clone, Copy)]
enum Stall {
    Chunk,
    Finish,
}

/// Store whose writes hang at one stage
struct StalledStore {
    inner: MemoryObjectStore,
    stall: Stall,
}

struct StalledWriter {
    stall: Stall,
}

#[async_trait]
impl ObjectWriter for StalledWriter {
    async fn write_chunk(&mut self, _chunk: Bytes) -> BucketResult<()> {
        if let Stall::Chunk = self.stall {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        Ok(())
    }

    async fn finish(self: Box<Self>) -> BucketResult<dog_bucket::WriteResult> {
        if let Stall::Finish = self.stall {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Ok(dog_bucket::WriteResult::default())
    }
}

#[async_trait]
impl ObjectStore for StalledStore {
    async fn bucket_exists(&self, bucket: &str) -> BucketResult<bool> {
        self.inner.bucket_exists(bucket).await
    }

    async fn open_writer(&self, _: &str, _: &str, _: WriteOptions) -> BucketResult<Box<dyn ObjectWriter>> {
        Ok(Box::new(StalledWriter { stall: self.stall }))
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        self.inner.public_url(bucket, path)
    }

    async fn get_metadata(&self, b: &str, p: &str, k: Option<&EncryptionKey>) -> BucketResult<FileMetadata> {
        self.inner.get_metadata(b, p, k).await
    }

    async fn set_metadata(
        &self,
        b: &str,
        p: &str,
        m: FileMetadata,
        k: Option<&EncryptionKey>,
    ) -> BucketResult<()> {
        self.inner.set_metadata(b, p, m, k).await
    }

    async fn delete(&self, b: &str, p: &str) -> BucketResult<()> {
        self.inner.delete(b, p).await
    }

    async fn download(&self, b: &str, p: &str, k: Option<&EncryptionKey>) -> BucketResult<Bytes> {
        self.inner.download(b, p, k).await
    }
}

/// U8. Unacknowledged writes time out
#[tokio::test(start_paused = true)]
async fn test_write_timeout() {
    let err = upload_to_stalled_store(Stall::Chunk).await;

    match err {
        BucketError::UploadFailed { source, .. } => {
            assert!(matches!(*source, BucketError::WriteTimeout(d) if d == Duration::from_millis(50)));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

async fn upload_to_stalled_store(stall: Stall) -> BucketError {
    let store = StalledStore {
        inner: create_store(),
        stall,
    };
    let config = BucketConfig::new(BUCKET).with_write_timeout(Duration::from_millis(50));
    let uploader = create_uploader_with(Arc::new(store), config);

    uploader
        .upload(PhysicalFile::new("docs", "slow.bin", payload(10)), None)
        .await
        .unwrap_err()
}

/// U8b. A commit that never completes also times out
#[tokio::test(start_paused = true)]
async fn test_finish_timeout() {
    let err = upload_to_stalled_store(Stall::Finish).await;

    match err {
        BucketError::UploadFailed { path, source } => {
            assert_eq!(path, "docs/slow.bin");
            assert!(matches!(*source, BucketError::WriteTimeout(d) if d == Duration::from_millis(50)));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

/// U9. Smaller chunk sizes are honored
#[test_log::test(tokio::test)]
async fn test_custom_chunk_size() {
    let store = create_store();
    let config = BucketConfig::new(BUCKET).with_chunk_size(100);
    let uploader = create_uploader_with(Arc::new(store.clone()), config);

    uploader
        .upload(PhysicalFile::new("docs", "small.bin", payload(250)), None)
        .await
        .unwrap();

    assert_eq!(uploader.chunk_size(), 100);
    assert_eq!(store.chunk_writes(BUCKET, "docs/small.bin"), 3);
}
