//! # dog-bucket: Object-storage bucket helper
//!
//! `dog-bucket` wraps one storage bucket behind a small facade. Services hand it
//! logical files (bytes, base64 text or a blob stream) and it takes care of the
//! routine work around them.
//!
//! ## Key Features
//!
//! - **Any input shape**: raw bytes, base64 text and async blob streams normalize to one buffer
//! - **Image variants**: one upsert can also store resized/re-encoded copies of an image
//! - **Chunked uploads**: fixed-size acknowledged writes with a per-file progress stream
//! - **Storage agnostic**: S3-compatible backends, an in-memory store, or your own [`ObjectStore`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dog_bucket::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> BucketResult<()> {
//! let store = MemoryObjectStore::new().with_bucket("media");
//! let bucket = Bucket::connect(store, BucketConfig::new("media")).await?;
//!
//! let file = LogicalFile::new("cats", "cat.png", FileData::from(std::fs::read("cat.png").unwrap()))
//!     .with_resize(ResizeSpec::new("thumb-").with_width(64).with_format(OutputFormat::new(ImageExtension::Webp)));
//!
//! let (tx, _progress) = progress_channel();
//! let receipts = bucket.upsert_one(file, Some(&tx)).await?;
//! drop(tx);
//!
//! // receipts[0] is the original, receipts[1] is `cats/thumb-cat.webp`
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │      Bucket      │  ← readiness, fan-out, download/delete
//! ├──────────────────┤
//! │ VariantExpander  │  ← logical file → physical files
//! │ ChunkedUploader  │  ← physical file → acknowledged chunks
//! ├──────────────────┤
//! │   ObjectStore    │  ← storage primitives
//! └──────────────────┘
//! ```

mod bucket;
mod classify;
mod config;
mod error;
mod expand;
pub mod imaging;
mod memory_store;
pub mod naming;
mod progress;
mod receipt;
#[cfg(feature = "s3")]
mod s3_store;
pub mod source;
pub mod store;
mod types;
mod upload;

pub use bucket::Bucket;
pub use classify::{ContentSniffer, DetectedType, ImageClassifier, InferSniffer};
pub use config::{BucketConfig, EncryptionKey, DEFAULT_CHUNK_SIZE, DEFAULT_WRITE_TIMEOUT};
pub use error::{BucketError, BucketResult, NameKind};
pub use expand::VariantExpander;
pub use imaging::{ImageMetadata, ImageProcessor, RasterProcessor, ScaledImage};
pub use memory_store::{MemoryObjectStore, StoredObject};
pub use naming::ObjectPath;
pub use progress::{progress_channel, ProgressSender, ProgressStream, UploadProgress};
pub use receipt::UploadReceipt;
#[cfg(feature = "s3")]
pub use s3_store::{S3Config, S3ObjectStore};
pub use store::{ObjectStore, ObjectWriter, WriteOptions, WriteResult};
pub use types::{
    metadata_from_json, ByteStream, FileData, FileMetadata, Fit, FormatOptions, ImageExtension,
    LogicalFile, OutputFormat, PhysicalFile, ResizeOptions, ResizeSpec,
};
pub use upload::ChunkedUploader;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        progress_channel, Bucket, BucketConfig, BucketError, BucketResult, FileData, Fit, ImageExtension,
        LogicalFile, MemoryObjectStore, ObjectStore, OutputFormat, ResizeOptions, ResizeSpec, UploadProgress,
        UploadReceipt,
    };
}
