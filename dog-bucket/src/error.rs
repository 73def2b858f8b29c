use std::time::Duration;

use thiserror::Error;

/// Result type for bucket operations
pub type BucketResult<T> = Result<T, BucketError>;

/// Which part of an object path failed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Folder,
    File,
}

impl std::fmt::Display for NameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NameKind::Folder => write!(f, "folderName"),
            NameKind::File => write!(f, "fileName"),
        }
    }
}

/// Errors that can occur during bucket operations
#[derive(Error, Debug)]
pub enum BucketError {
    #[error("Invalid input: {message}. Provide bytes, base64 text or a blob stream")]
    InvalidInputKind { message: String },

    #[error("Failed to read blob into a buffer: {source}")]
    BlobRead {
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot resize a non-image file: {file_name}")]
    ResizeOnNonImage { file_name: String },

    #[error("Unsupported image format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Failed to decode image: {message}")]
    Decode { message: String },

    #[error("Invalid metadata value for key {key}: metadata values must be strings")]
    InvalidMetadata { key: String },

    #[error("{kind}=[{name}] contains invalid characters")]
    InvalidName { kind: NameKind, name: String },

    #[error("File upload failed for {path}: {source}")]
    UploadFailed {
        path: String,
        #[source]
        source: Box<BucketError>,
    },

    #[error("Write was not acknowledged within {0:?}")]
    WriteTimeout(Duration),

    #[error("Storage bucket does not exist: {bucket}")]
    BucketNotFound { bucket: String },

    #[error("Bucket {bucket} has not been verified yet; await readiness first")]
    NotReady { bucket: String },

    #[error("Object not found: {path}")]
    NotFound { path: String },

    #[error("Invalid request: {message}")]
    Invalid { message: String },

    #[error("Storage backend error: {source}")]
    Backend {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl BucketError {
    /// Create a backend error from any error type
    pub fn backend<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend {
            source: Box::new(error),
        }
    }

    /// Create an invalid request error
    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create an invalid input kind error
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInputKind {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(path: S) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Create a decode error
    pub fn decode<S: Into<String>>(message: S) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create an unsupported format error
    pub fn unsupported_format<S: Into<String>>(format: S) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    /// Wrap a store error raised while writing `path`
    pub fn upload_failed<S: Into<String>>(path: S, source: BucketError) -> Self {
        Self::UploadFailed {
            path: path.into(),
            source: Box::new(source),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Validation errors are raised before any network I/O happens
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidInputKind { .. }
                | Self::ResizeOnNonImage { .. }
                | Self::InvalidName { .. }
                | Self::InvalidMetadata { .. }
                | Self::Invalid { .. }
        )
    }
}
