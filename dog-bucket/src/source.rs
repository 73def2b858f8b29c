//! Buffer normalization: every supported input representation becomes `Bytes`.

use base64::Engine;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;

use crate::{BucketError, BucketResult, ByteStream, FileData};

/// Convert any supported file representation into a canonical byte buffer.
///
/// Bytes pass through without a copy. Base64 text is decoded leniently
/// (whitespace, missing padding and the URL-safe alphabet are accepted).
/// Blob streams are drained; a read failure surfaces as `BlobRead`.
pub async fn normalize(data: FileData) -> BucketResult<Bytes> {
    match data {
        FileData::Bytes(bytes) => Ok(bytes),
        FileData::Base64(text) => decode_base64(&text),
        FileData::Blob(stream) => read_blob(stream).await,
    }
}

/// Decode base64 text the way browsers and Node buffers accept it
pub fn decode_base64(text: &str) -> BucketResult<Bytes> {
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    let cleaned = cleaned.trim_end_matches('=');

    base64::engine::general_purpose::STANDARD_NO_PAD
        .decode(cleaned)
        .map(Bytes::from)
        .map_err(|e| BucketError::invalid_input(format!("text is not valid base64 ({e})")))
}

async fn read_blob(mut stream: ByteStream) -> BucketResult<Bytes> {
    let mut buffer = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|source| BucketError::BlobRead { source })?;
        buffer.extend_from_slice(&chunk);
    }
    Ok(buffer.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bytes_pass_through() {
        let original = Bytes::from_static(b"raw-bytes");
        let normalized = normalize(FileData::Bytes(original.clone())).await.unwrap();
        assert_eq!(normalized, original);
        assert_eq!(normalized.as_ptr(), original.as_ptr());
    }

    #[tokio::test]
    async fn test_base64_variants() {
        let padded = normalize(FileData::base64("aGVsbG8gd29ybGQ=")).await.unwrap();
        assert_eq!(&padded[..], b"hello world");

        let unpadded = normalize(FileData::base64("aGVsbG8gd29ybGQ")).await.unwrap();
        assert_eq!(unpadded, padded);

        let wrapped = normalize(FileData::base64("aGVsbG8g\nd29ybGQ=")).await.unwrap();
        assert_eq!(wrapped, padded);

        let url_safe = decode_base64("-_8").unwrap();
        assert_eq!(&url_safe[..], &[0xfb, 0xff]);
    }

    #[tokio::test]
    async fn test_invalid_base64() {
        let err = normalize(FileData::base64("not base64 !!")).await.unwrap_err();
        assert!(matches!(err, BucketError::InvalidInputKind { .. }));
    }

    #[tokio::test]
    async fn test_blob_is_drained() {
        let chunks = vec![
            Ok(Bytes::from_static(b"hello ")),
            Ok(Bytes::from_static(b"blob")),
        ];
        let stream: ByteStream = Box::pin(futures::stream::iter(chunks));
        let normalized = normalize(FileData::blob(stream)).await.unwrap();
        assert_eq!(&normalized[..], b"hello blob");
    }

    #[tokio::test]
    async fn test_blob_read_error() {
        let chunks = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "reader closed")),
        ];
        let stream: ByteStream = Box::pin(futures::stream::iter(chunks));
        let err = normalize(FileData::blob(stream)).await.unwrap_err();
        assert!(matches!(err, BucketError::BlobRead { .. }));
    }
}
