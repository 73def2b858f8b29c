use std::env;
use std::time::Duration;

use crate::{BucketError, BucketResult, Fit};

/// Default chunk size for uploads (bytes)
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Default time to wait for a single chunk acknowledgment
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(5000);

/// Required length of a customer-supplied AES-256 key
pub const ENCRYPTION_KEY_LEN: usize = 32;

/// Customer-supplied encryption key applied to every write and read
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey(Vec<u8>);

impl EncryptionKey {
    /// Build a key from raw bytes (must be 32 bytes long)
    pub fn new(bytes: impl Into<Vec<u8>>) -> BucketResult<Self> {
        let bytes = bytes.into();
        if bytes.len() != ENCRYPTION_KEY_LEN {
            return Err(BucketError::invalid(format!(
                "Encryption key must be {} bytes, got {}",
                ENCRYPTION_KEY_LEN,
                bytes.len()
            )));
        }
        Ok(Self(bytes))
    }

    /// Get the raw key bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

/// Configuration for a bucket facade
#[derive(Debug, Clone)]
pub struct BucketConfig {
    /// Name of the target bucket (required)
    pub bucket_name: String,

    /// Optional encryption key, applied when writers and reads are opened
    pub encrypt_key: Option<EncryptionKey>,

    /// Size of each sequential chunk write
    pub chunk_size: usize,

    /// How long a single chunk write may wait for its acknowledgment
    pub write_timeout: Duration,

    /// Fit used for variants that don't specify one
    pub default_fit: Fit,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            bucket_name: String::new(),
            encrypt_key: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            default_fit: Fit::Contain,
        }
    }
}

impl BucketConfig {
    /// Create a new config for the given bucket with defaults
    pub fn new<S: Into<String>>(bucket_name: S) -> Self {
        Self {
            bucket_name: bucket_name.into(),
            ..Self::default()
        }
    }

    /// Set the encryption key
    pub fn with_encrypt_key(mut self, key: EncryptionKey) -> Self {
        self.encrypt_key = Some(key);
        self
    }

    /// Set the chunk size
    pub fn with_chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes;
        self
    }

    /// Set the per-chunk write timeout
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the fit used when a variant doesn't specify one
    pub fn with_default_fit(mut self, fit: Fit) -> Self {
        self.default_fit = fit;
        self
    }

    /// Check the config before a facade is built from it
    pub fn validate(&self) -> BucketResult<()> {
        if self.bucket_name.trim().is_empty() {
            return Err(BucketError::invalid("bucketName is required"));
        }
        if self.chunk_size == 0 {
            return Err(BucketError::invalid("chunkSize must be greater than zero"));
        }
        if self.write_timeout.is_zero() {
            return Err(BucketError::invalid("writeTimeout must be greater than zero"));
        }
        Ok(())
    }

    /// Load config from environment variables.
    ///
    /// Reads `{prefix}BUCKET_NAME` (required), `{prefix}ENCRYPT_KEY`,
    /// `{prefix}CHUNK_SIZE` and `{prefix}WRITE_TIMEOUT_MS`.
    pub fn from_env(prefix: &str) -> BucketResult<Self> {
        fn get_env(key: &str) -> Option<String> {
            env::var(key).ok().filter(|v| !v.is_empty())
        }

        let name_key = format!("{prefix}BUCKET_NAME");
        let bucket_name = get_env(&name_key)
            .ok_or_else(|| BucketError::invalid(format!("{name_key} environment variable required")))?;

        let mut config = Self::new(bucket_name);

        if let Some(key) = get_env(&format!("{prefix}ENCRYPT_KEY")) {
            config = config.with_encrypt_key(EncryptionKey::new(key.into_bytes())?);
        }

        if let Some(raw) = get_env(&format!("{prefix}CHUNK_SIZE")) {
            let size = raw
                .parse::<usize>()
                .map_err(|_| BucketError::invalid(format!("Invalid {prefix}CHUNK_SIZE: {raw}")))?;
            config = config.with_chunk_size(size);
        }

        if let Some(raw) = get_env(&format!("{prefix}WRITE_TIMEOUT_MS")) {
            let millis = raw
                .parse::<u64>()
                .map_err(|_| BucketError::invalid(format!("Invalid {prefix}WRITE_TIMEOUT_MS: {raw}")))?;
            config = config.with_write_timeout(Duration::from_millis(millis));
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BucketConfig::new("media");
        assert_eq!(config.chunk_size, 1024);
        assert_eq!(config.write_timeout, Duration::from_millis(5000));
        assert_eq!(config.default_fit, Fit::Contain);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_bucket_name_rejected() {
        assert!(BucketConfig::new("  ").validate().is_err());
        assert!(BucketConfig::default().validate().is_err());
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let config = BucketConfig::new("media").with_chunk_size(0);
        assert!(matches!(config.validate(), Err(BucketError::Invalid { .. })));
    }

    #[test]
    fn test_encryption_key_length() {
        assert!(EncryptionKey::new(vec![7u8; 32]).is_ok());
        assert!(EncryptionKey::new(b"too-short".to_vec()).is_err());
        let key = EncryptionKey::new(vec![1u8; 32]).unwrap();
        assert_eq!(format!("{key:?}"), "EncryptionKey(<redacted>)");
    }

    #[test]
    fn test_from_env() {
        env::set_var("DOGBUCKET_TEST__BUCKET_NAME", "avatars");
        env::set_var("DOGBUCKET_TEST__CHUNK_SIZE", "4096");
        env::set_var("DOGBUCKET_TEST__WRITE_TIMEOUT_MS", "250");

        let config = BucketConfig::from_env("DOGBUCKET_TEST__").unwrap();
        assert_eq!(config.bucket_name, "avatars");
        assert_eq!(config.chunk_size, 4096);
        assert_eq!(config.write_timeout, Duration::from_millis(250));
        assert!(config.encrypt_key.is_none());

        assert!(BucketConfig::from_env("DOGBUCKET_MISSING__").is_err());
    }
}
