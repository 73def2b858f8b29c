use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::try_join_all;
use tracing::{debug, instrument};

use crate::naming::derive_variant_name;
use crate::{
    source, BucketError, BucketResult, Fit, ImageClassifier, ImageProcessor, LogicalFile, PhysicalFile,
    ResizeSpec,
};

/// Turns one logical file into the ordered set of physical files to upload.
///
/// Output order is the original first, then one variant per resize spec in
/// input order. Expansion is all-or-nothing.
#[derive(Clone)]
pub struct VariantExpander {
    classifier: ImageClassifier,
    processor: Arc<dyn ImageProcessor>,
    default_fit: Fit,
}

impl VariantExpander {
    pub fn new(classifier: ImageClassifier, processor: Arc<dyn ImageProcessor>) -> Self {
        Self {
            classifier,
            processor,
            default_fit: Fit::Contain,
        }
    }

    pub fn with_default_fit(mut self, fit: Fit) -> Self {
        self.default_fit = fit;
        self
    }

    #[instrument(skip(self, file), fields(folder = %file.folder_name, file = %file.file_name, variants = file.resize_options.len()))]
    pub async fn expand(&self, file: LogicalFile) -> BucketResult<Vec<PhysicalFile>> {
        let LogicalFile {
            folder_name,
            file_name,
            file_data,
            file_metadata,
            resize_options,
        } = file;

        let buffer = source::normalize(file_data).await?;
        let metadata = file_metadata.unwrap_or_default();

        if resize_options.is_empty() {
            return Ok(vec![
                PhysicalFile::new(folder_name, file_name, buffer).with_metadata(metadata)
            ]);
        }

        if !self.classifier.is_image(&buffer) {
            return Err(BucketError::ResizeOnNonImage { file_name });
        }

        let variants = try_join_all(
            resize_options
                .iter()
                .map(|spec| self.variant(&folder_name, &file_name, &metadata, buffer.clone(), spec)),
        )
        .await?;

        debug!(count = variants.len(), "Derived variants");

        let mut files = Vec::with_capacity(variants.len() + 1);
        files.push(PhysicalFile::new(folder_name, file_name, buffer).with_metadata(metadata));
        files.extend(variants);
        Ok(files)
    }

    async fn variant(
        &self,
        folder_name: &str,
        file_name: &str,
        metadata: &crate::FileMetadata,
        original: Bytes,
        spec: &ResizeSpec,
    ) -> BucketResult<PhysicalFile> {
        let variant_name = derive_variant_name(
            &spec.file_resize_prefix,
            file_name,
            spec.file_name.as_deref(),
            spec.resize.format.as_ref().map(|f| f.extension.as_str()),
        );

        let mut options = spec.resize.clone();
        options.fit.get_or_insert(self.default_fit);

        let data = self.processor.resize_encode(original, &options).await?;

        Ok(PhysicalFile::new(folder_name, variant_name, data).with_metadata(metadata.clone()))
    }
}

impl std::fmt::Debug for VariantExpander {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariantExpander")
            .field("classifier", &self.classifier)
            .field("default_fit", &self.default_fit)
            .finish_non_exhaustive()
    }
}
