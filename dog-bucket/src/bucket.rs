use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::try_join_all;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn, Instrument, Span};
use uuid::Uuid;

use crate::imaging::{scaled_dimensions, ImageMetadata, ScaledImage};
use crate::naming::ObjectPath;
use crate::{
    source, BucketConfig, BucketError, BucketResult, ContentSniffer, FileData, FileMetadata, Fit,
    ImageClassifier, ImageProcessor, LogicalFile, ObjectStore, PhysicalFile, ProgressSender,
    RasterProcessor, ResizeOptions, UploadReceipt, VariantExpander,
};
use crate::upload::ChunkedUploader;

/// The bucket facade - upserts, downloads and deletes files in one bucket.
///
/// Build it with [`Bucket::connect`], or with [`Bucket::new`] followed by
/// [`Bucket::ready`]. Until the bucket has been verified every operation
/// fails with `NotReady`.
pub struct Bucket {
    store: Arc<dyn ObjectStore>,
    classifier: ImageClassifier,
    processor: Arc<dyn ImageProcessor>,
    expander: VariantExpander,
    uploader: Arc<ChunkedUploader>,
    config: BucketConfig,
    verified: OnceCell<bool>,
}

impl Bucket {
    /// Create an unverified bucket facade
    pub fn new<S: ObjectStore + 'static>(store: S, config: BucketConfig) -> BucketResult<Self> {
        Self::with_parts(
            Arc::new(store),
            ImageClassifier::default(),
            Arc::new(RasterProcessor::new()),
            config,
        )
    }

    /// Create an unverified facade from explicit collaborators
    pub fn with_parts(
        store: Arc<dyn ObjectStore>,
        classifier: ImageClassifier,
        processor: Arc<dyn ImageProcessor>,
        config: BucketConfig,
    ) -> BucketResult<Self> {
        config.validate()?;

        let expander = VariantExpander::new(classifier.clone(), processor.clone())
            .with_default_fit(config.default_fit);
        let uploader = Arc::new(ChunkedUploader::new(store.clone(), classifier.clone(), &config));

        Ok(Self {
            store,
            classifier,
            processor,
            expander,
            uploader,
            config,
            verified: OnceCell::new(),
        })
    }

    /// Swap the content sniffer used for classification. Readiness carries over.
    pub fn with_sniffer<C: ContentSniffer + 'static>(self, sniffer: C) -> BucketResult<Self> {
        let verified = self.verified;
        let rebuilt = Self::with_parts(self.store, ImageClassifier::new(sniffer), self.processor, self.config)?;
        Ok(Self { verified, ..rebuilt })
    }

    /// Swap the image processor used for variants. Readiness carries over.
    pub fn with_processor<P: ImageProcessor + 'static>(self, processor: P) -> BucketResult<Self> {
        let verified = self.verified;
        let rebuilt = Self::with_parts(self.store, self.classifier, Arc::new(processor), self.config)?;
        Ok(Self { verified, ..rebuilt })
    }

    /// Create a facade and wait until the bucket is verified
    pub async fn connect<S: ObjectStore + 'static>(store: S, config: BucketConfig) -> BucketResult<Self> {
        let bucket = Self::new(store, config)?;
        bucket.ready().await?;
        Ok(bucket)
    }

    /// Verify that the bucket exists. Resolves once; later calls reuse the answer.
    #[instrument(skip(self), fields(bucket = %self.config.bucket_name))]
    pub async fn ready(&self) -> BucketResult<()> {
        let exists = *self
            .verified
            .get_or_try_init(|| async {
                let exists = self.store.bucket_exists(&self.config.bucket_name).await?;
                if exists {
                    info!("Bucket verified");
                } else {
                    warn!("Storage bucket does not exist");
                }
                Ok::<_, BucketError>(exists)
            })
            .await?;

        self.check_verified(exists)
    }

    /// True once `ready` has confirmed the bucket
    pub fn is_ready(&self) -> bool {
        self.verified.get().copied().unwrap_or(false)
    }

    fn ensure_ready(&self) -> BucketResult<()> {
        match self.verified.get() {
            Some(exists) => self.check_verified(*exists),
            None => Err(BucketError::NotReady {
                bucket: self.config.bucket_name.clone(),
            }),
        }
    }

    fn check_verified(&self, exists: bool) -> BucketResult<()> {
        if exists {
            Ok(())
        } else {
            Err(BucketError::BucketNotFound {
                bucket: self.config.bucket_name.clone(),
            })
        }
    }

    /// Upsert one logical file. Receipts follow the expansion order:
    /// the original first, then one per resize spec.
    #[instrument(skip(self, file, progress), fields(bucket = %self.config.bucket_name))]
    pub async fn upsert_one(
        &self,
        file: LogicalFile,
        progress: Option<&ProgressSender>,
    ) -> BucketResult<Vec<UploadReceipt>> {
        self.upsert_many(vec![file], progress).await
    }

    /// Upsert many logical files.
    ///
    /// Every file is expanded first; nothing is written if any expansion or
    /// name check fails, or if two physical files resolve to the same path. Uploads then run concurrently. The returned receipts
    /// line up index-for-index with the flattened physical files. A failed
    /// upload surfaces as soon as it is observed, while uploads already in
    /// flight keep running.
    #[instrument(skip(self, files, progress), fields(bucket = %self.config.bucket_name, batch = %Uuid::new_v4()))]
    pub async fn upsert_many(
        &self,
        files: Vec<LogicalFile>,
        progress: Option<&ProgressSender>,
    ) -> BucketResult<Vec<UploadReceipt>> {
        self.ensure_ready()?;

        let logical_count = files.len();
        let expanded = try_join_all(files.into_iter().map(|file| self.expander.expand(file))).await?;
        let physical: Vec<PhysicalFile> = expanded.into_iter().flatten().collect();

        let mut targets = HashSet::with_capacity(physical.len());
        for file in &physical {
            let target = ObjectPath::new(&file.folder_name, &file.file_name)?;
            if !targets.insert(target.path.clone()) {
                return Err(BucketError::invalid(format!(
                    "more than one file in the batch targets {}",
                    target.path
                )));
            }
        }

        debug!(logical = logical_count, physical = physical.len(), "Expanded files");

        let handles = physical.into_iter().map(|file| {
            let uploader = self.uploader.clone();
            let progress = progress.cloned();
            tokio::spawn(async move { uploader.upload(file, progress.as_ref()).await }.instrument(Span::current()))
        });

        let receipts = try_join_all(handles.map(|handle| async move {
            handle
                .await
                .map_err(|e| BucketError::internal(format!("Upload task failed: {e}")))?
        }))
        .await?;

        info!(count = receipts.len(), "Upserted files");
        Ok(receipts)
    }

    /// Delete an object
    #[instrument(skip(self), fields(bucket = %self.config.bucket_name))]
    pub async fn delete_file(&self, path: &str) -> BucketResult<()> {
        self.ensure_ready()?;
        self.store.delete(&self.config.bucket_name, path).await?;
        info!(path, "Deleted file");
        Ok(())
    }

    /// Download an object, merging `metadata_patch` into its metadata first
    #[instrument(skip(self, metadata_patch), fields(bucket = %self.config.bucket_name))]
    pub async fn download(&self, path: &str, metadata_patch: Option<FileMetadata>) -> BucketResult<Bytes> {
        self.ensure_ready()?;
        let bucket = &self.config.bucket_name;
        let key = self.config.encrypt_key.as_ref();

        if let Some(patch) = metadata_patch.filter(|p| !p.is_empty()) {
            let mut metadata = self.store.get_metadata(bucket, path, key).await?;
            metadata.extend(patch);
            self.store.set_metadata(bucket, path, metadata, key).await?;
            debug!(path, "Merged metadata");
        }

        self.store.download(bucket, path, key).await
    }

    /// Check whether content is an image
    pub async fn is_image(&self, data: FileData) -> BucketResult<bool> {
        let buffer = source::normalize(data).await?;
        Ok(self.classifier.is_image(&buffer))
    }

    /// Resize/re-encode an image without uploading it
    pub async fn get_image(&self, data: FileData, options: ResizeOptions) -> BucketResult<Bytes> {
        let buffer = self.image_buffer(data).await?;
        let mut options = options;
        options.fit.get_or_insert(self.config.default_fit);
        self.processor.resize_encode(buffer, &options).await
    }

    /// Scale an image by `scale_factor`, flooring the new dimensions
    pub async fn get_image_size_by_factor(
        &self,
        data: FileData,
        scale_factor: f64,
        fit: Option<Fit>,
    ) -> BucketResult<ScaledImage> {
        let buffer = self.image_buffer(data).await?;
        let original = self.processor.metadata(buffer.clone()).await?;
        let (width, height) = scaled_dimensions(original.width, original.height, scale_factor)?;

        let options = ResizeOptions {
            width: Some(width),
            height: Some(height),
            fit: Some(fit.unwrap_or(self.config.default_fit)),
            format: None,
        };
        let data = self.processor.resize_encode(buffer, &options).await?;

        Ok(ScaledImage { width, height, data })
    }

    /// Read dimensions and format of an image
    pub async fn get_image_metadata(&self, data: FileData) -> BucketResult<ImageMetadata> {
        let buffer = self.image_buffer(data).await?;
        self.processor.metadata(buffer).await
    }

    async fn image_buffer(&self, data: FileData) -> BucketResult<Bytes> {
        let buffer = source::normalize(data).await?;
        if !self.classifier.is_image(&buffer) {
            return Err(BucketError::ResizeOnNonImage {
                file_name: String::from("<inline>"),
            });
        }
        Ok(buffer)
    }

    /// Get configuration
    pub fn config(&self) -> &BucketConfig {
        &self.config
    }

    /// Name of the bucket
    pub fn name(&self) -> &str {
        &self.config.bucket_name
    }

    /// Public URL an object at `path` would have
    pub fn public_url(&self, path: &str) -> String {
        self.store.public_url(&self.config.bucket_name, path)
    }
}

impl std::fmt::Debug for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bucket")
            .field("config", &self.config)
            .field("ready", &self.is_ready())
            .finish_non_exhaustive()
    }
}
