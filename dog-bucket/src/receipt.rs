use serde::{Deserialize, Serialize};

use crate::DetectedType;

/// Receipt returned after successfully storing a physical file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    pub file_url: String,
    pub file_path: String,
    pub file_name: String,
    pub file_type: Option<String>,
    pub file_content_type: Option<String>,
    pub size_bytes: u64,
    pub uploaded_at: i64,
}

impl UploadReceipt {
    /// Create a new receipt
    pub fn new(file_url: String, file_path: String, file_name: String, size_bytes: u64) -> Self {
        Self {
            file_url,
            file_path,
            file_name,
            file_type: None,
            file_content_type: None,
            size_bytes,
            uploaded_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Set type and content type from a sniffed type
    pub fn with_detected_type(mut self, detected: DetectedType) -> Self {
        self.file_type = Some(detected.extension);
        self.file_content_type = Some(detected.mime_type);
        self
    }

    /// Check if the stored content was recognized as an image
    pub fn is_image(&self) -> bool {
        self.file_content_type
            .as_deref()
            .map_or(false, |ct| ct.starts_with("image/"))
    }
}
