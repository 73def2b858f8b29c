use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// File type detected from content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedType {
    pub extension: String,
    pub mime_type: String,
}

impl DetectedType {
    pub fn new<E: Into<String>, M: Into<String>>(extension: E, mime_type: M) -> Self {
        Self {
            extension: extension.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

/// Content sniffing capability (magic bytes, never file names)
pub trait ContentSniffer: Send + Sync {
    fn detect(&self, data: &[u8]) -> Option<DetectedType>;
}

/// Magic-byte sniffer backed by the `infer` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct InferSniffer;

impl ContentSniffer for InferSniffer {
    fn detect(&self, data: &[u8]) -> Option<DetectedType> {
        infer::get(data).map(|kind| DetectedType::new(kind.extension(), kind.mime_type()))
    }
}

/// Decides whether a normalized buffer is an image and which format it is.
///
/// Cloning shares the underlying sniffer.
#[derive(Clone)]
pub struct ImageClassifier {
    sniffer: Arc<dyn ContentSniffer>,
}

impl ImageClassifier {
    pub fn new<S: ContentSniffer + 'static>(sniffer: S) -> Self {
        Self {
            sniffer: Arc::new(sniffer),
        }
    }

    pub fn from_shared(sniffer: Arc<dyn ContentSniffer>) -> Self {
        Self { sniffer }
    }

    pub fn detect_type(&self, data: &[u8]) -> Option<DetectedType> {
        self.sniffer.detect(data)
    }

    pub fn is_image(&self, data: &[u8]) -> bool {
        self.detect_type(data).map_or(false, |t| t.is_image())
    }
}

impl Default for ImageClassifier {
    fn default() -> Self {
        Self::new(InferSniffer)
    }
}

impl std::fmt::Debug for ImageClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageClassifier").finish_non_exhaustive()
    }
}
