use std::collections::HashMap;
use std::env;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::{primitives::ByteStream as AwsByteStream, types::MetadataDirective, Client};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::{Bytes, BytesMut};
use md5::{Digest, Md5};
use tracing::debug;

use crate::{
    BucketError, BucketResult, EncryptionKey, FileMetadata, ObjectStore, ObjectWriter, WriteOptions,
    WriteResult,
};

const SSE_ALGORITHM: &str = "AES256";

/// Connection settings for an S3-compatible endpoint
#[derive(Debug, Clone)]
pub struct S3Config {
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Custom endpoint for S3-compatible services (MinIO, RustFS, ...)
    pub endpoint_url: Option<String>,
    /// Base used for public object URLs, e.g. a CDN
    pub public_base_url: Option<String>,
    pub force_path_style: bool,
}

impl S3Config {
    /// Read `{prefix}REGION`, `{prefix}ACCESS_KEY_ID`, `{prefix}SECRET_ACCESS_KEY`
    /// and the optional `{prefix}ENDPOINT_URL` / `{prefix}PUBLIC_BASE_URL`.
    pub fn from_env(prefix: &str) -> BucketResult<Self> {
        let get_env = |key: &str| -> BucketResult<String> {
            let name = format!("{prefix}{key}");
            env::var(&name).map_err(|_| BucketError::invalid(format!("{name} environment variable required")))
        };
        let get_optional = |key: &str| env::var(format!("{prefix}{key}")).ok().filter(|v| !v.is_empty());

        let endpoint_url = get_optional("ENDPOINT_URL");
        Ok(Self {
            region: get_env("REGION")?,
            access_key_id: get_env("ACCESS_KEY_ID")?,
            secret_access_key: get_env("SECRET_ACCESS_KEY")?,
            force_path_style: endpoint_url.is_some(),
            endpoint_url,
            public_base_url: get_optional("PUBLIC_BASE_URL"),
        })
    }
}

/// Object store backed by the AWS SDK, usable with any S3-compatible service.
///
/// Customer-supplied encryption keys map to SSE-C.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    config: S3Config,
}

impl S3ObjectStore {
    pub async fn new(config: S3Config) -> Self {
        let client = Self::create_client(&config).await;
        Self { client, config }
    }

    pub async fn from_env(prefix: &str) -> BucketResult<Self> {
        Ok(Self::new(S3Config::from_env(prefix)?).await)
    }

    async fn create_client(config: &S3Config) -> Client {
        let credentials = Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            "dog-bucket",
        );

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials);
        if let Some(endpoint) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let aws_config = loader.load().await;

        Client::from_conf(
            aws_sdk_s3::config::Builder::from(&aws_config)
                .force_path_style(config.force_path_style)
                .build(),
        )
    }

    fn map_aws_error(err: impl std::error::Error + Send + Sync + 'static) -> BucketError {
        BucketError::backend(err)
    }

    async fn head(
        &self,
        bucket: &str,
        path: &str,
        encryption: Option<&EncryptionKey>,
    ) -> BucketResult<aws_sdk_s3::operation::head_object::HeadObjectOutput> {
        let sse = encryption.map(SseHeaders::from);
        self.client
            .head_object()
            .bucket(bucket)
            .key(path)
            .set_sse_customer_algorithm(sse.as_ref().map(|_| SSE_ALGORITHM.to_string()))
            .set_sse_customer_key(sse.as_ref().map(|s| s.key.clone()))
            .set_sse_customer_key_md5(sse.as_ref().map(|s| s.key_md5.clone()))
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().map_or(false, |se| se.is_not_found()) {
                    BucketError::not_found(path)
                } else {
                    Self::map_aws_error(e)
                }
            })
    }
}

/// `CopySource` value for an in-place copy; the key must be URL-encoded
fn copy_source(bucket: &str, path: &str) -> String {
    format!("{}/{}", bucket, urlencoding::encode(path))
}

/// Base64 key and key digest sent with SSE-C requests
struct SseHeaders {
    key: String,
    key_md5: String,
}

impl From<&EncryptionKey> for SseHeaders {
    fn from(key: &EncryptionKey) -> Self {
        Self {
            key: STANDARD.encode(key.as_bytes()),
            key_md5: STANDARD.encode(Md5::digest(key.as_bytes())),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn bucket_exists(&self, bucket: &str) -> BucketResult<bool> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().map_or(false, |se| se.is_not_found()) => Ok(false),
            Err(e) => Err(Self::map_aws_error(e)),
        }
    }

    async fn open_writer(
        &self,
        bucket: &str,
        path: &str,
        options: WriteOptions,
    ) -> BucketResult<Box<dyn ObjectWriter>> {
        Ok(Box::new(S3ObjectWriter {
            client: self.client.clone(),
            bucket: bucket.to_string(),
            path: path.to_string(),
            options,
            buffer: BytesMut::new(),
        }))
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        match (&self.config.public_base_url, &self.config.endpoint_url) {
            (Some(base), _) => format!("{}/{}", base.trim_end_matches('/'), path),
            (None, Some(endpoint)) => format!("{}/{}/{}", endpoint.trim_end_matches('/'), bucket, path),
            (None, None) => format!("https://{}.s3.{}.amazonaws.com/{}", bucket, self.config.region, path),
        }
    }

    async fn get_metadata(
        &self,
        bucket: &str,
        path: &str,
        encryption: Option<&EncryptionKey>,
    ) -> BucketResult<FileMetadata> {
        let head = self.head(bucket, path, encryption).await?;
        Ok(head
            .metadata()
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn set_metadata(
        &self,
        bucket: &str,
        path: &str,
        metadata: FileMetadata,
        encryption: Option<&EncryptionKey>,
    ) -> BucketResult<()> {
        // Replacing metadata drops the content type unless it is sent again
        let head = self.head(bucket, path, encryption).await?;
        let sse = encryption.map(SseHeaders::from);
        let algorithm = sse.as_ref().map(|_| SSE_ALGORITHM.to_string());

        self.client
            .copy_object()
            .bucket(bucket)
            .key(path)
            .copy_source(copy_source(bucket, path))
            .metadata_directive(MetadataDirective::Replace)
            .set_metadata(Some(metadata.into_iter().collect::<HashMap<_, _>>()))
            .set_content_type(head.content_type)
            .set_sse_customer_algorithm(algorithm.clone())
            .set_sse_customer_key(sse.as_ref().map(|s| s.key.clone()))
            .set_sse_customer_key_md5(sse.as_ref().map(|s| s.key_md5.clone()))
            .set_copy_source_sse_customer_algorithm(algorithm)
            .set_copy_source_sse_customer_key(sse.as_ref().map(|s| s.key.clone()))
            .set_copy_source_sse_customer_key_md5(sse.as_ref().map(|s| s.key_md5.clone()))
            .send()
            .await
            .map_err(Self::map_aws_error)?;
        Ok(())
    }

    async fn delete(&self, bucket: &str, path: &str) -> BucketResult<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(path)
            .send()
            .await
            .map_err(Self::map_aws_error)?;
        Ok(())
    }

    async fn download(
        &self,
        bucket: &str,
        path: &str,
        encryption: Option<&EncryptionKey>,
    ) -> BucketResult<Bytes> {
        let sse = encryption.map(SseHeaders::from);
        let result = self
            .client
            .get_object()
            .bucket(bucket)
            .key(path)
            .set_sse_customer_algorithm(sse.as_ref().map(|_| SSE_ALGORITHM.to_string()))
            .set_sse_customer_key(sse.as_ref().map(|s| s.key.clone()))
            .set_sse_customer_key_md5(sse.as_ref().map(|s| s.key_md5.clone()))
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().map_or(false, |se| se.is_no_such_key()) {
                    BucketError::not_found(path)
                } else {
                    Self::map_aws_error(e)
                }
            })?;

        let body = result.body.collect().await.map_err(Self::map_aws_error)?;
        Ok(body.into_bytes())
    }
}

/// Collects acknowledged chunks and sends a single PUT on finish
struct S3ObjectWriter {
    client: Client,
    bucket: String,
    path: String,
    options: WriteOptions,
    buffer: BytesMut,
}

#[async_trait]
impl ObjectWriter for S3ObjectWriter {
    async fn write_chunk(&mut self, chunk: Bytes) -> BucketResult<()> {
        self.buffer.extend_from_slice(&chunk);
        Ok(())
    }

    async fn finish(self: Box<Self>) -> BucketResult<WriteResult> {
        let this = *self;
        let size_bytes = this.buffer.len() as u64;
        let sse = this.options.encryption_key.as_ref().map(SseHeaders::from);

        let result = this
            .client
            .put_object()
            .bucket(&this.bucket)
            .key(&this.path)
            .body(AwsByteStream::from(this.buffer.freeze()))
            .set_content_type(this.options.content_type)
            .set_metadata(Some(this.options.metadata.into_iter().collect::<HashMap<_, _>>()))
            .set_sse_customer_algorithm(sse.as_ref().map(|_| SSE_ALGORITHM.to_string()))
            .set_sse_customer_key(sse.as_ref().map(|s| s.key.clone()))
            .set_sse_customer_key_md5(sse.as_ref().map(|s| s.key_md5.clone()))
            .send()
            .await
            .map_err(S3ObjectStore::map_aws_error)?;

        debug!(bucket = %this.bucket, path = %this.path, size_bytes, "Object stored");

        Ok(WriteResult {
            etag: result.e_tag,
            size_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> S3Config {
        S3Config {
            region: "eu-west-1".to_string(),
            access_key_id: "key".to_string(),
            secret_access_key: "secret".to_string(),
            endpoint_url: None,
            public_base_url: None,
            force_path_style: false,
        }
    }

    #[test]
    fn test_copy_source_encodes_key() {
        assert_eq!(copy_source("media", "cats/cat.png"), "media/cats%2Fcat.png");
        assert_eq!(
            copy_source("media", "docs/50%+off ü.txt"),
            "media/docs%2F50%25%2Boff%20%C3%BC.txt"
        );
    }

    #[test]
    fn test_sse_headers() {
        let key = EncryptionKey::new(vec![0u8; 32]).unwrap();
        let headers = SseHeaders::from(&key);

        assert_eq!(headers.key, STANDARD.encode([0u8; 32]));
        assert_eq!(STANDARD.decode(&headers.key_md5).unwrap().len(), 16);
    }

    #[tokio::test]
    async fn test_public_urls() {
        let store = S3ObjectStore::new(config()).await;
        assert_eq!(
            store.public_url("media", "cats/cat.jpg"),
            "https://media.s3.eu-west-1.amazonaws.com/cats/cat.jpg"
        );

        let mut with_endpoint = config();
        with_endpoint.endpoint_url = Some("http://localhost:9000/".to_string());
        let store = S3ObjectStore::new(with_endpoint).await;
        assert_eq!(
            store.public_url("media", "cats/cat.jpg"),
            "http://localhost:9000/media/cats/cat.jpg"
        );

        let mut with_cdn = config();
        with_cdn.public_base_url = Some("https://cdn.example.com".to_string());
        let store = S3ObjectStore::new(with_cdn).await;
        assert_eq!(store.public_url("media", "a/b.png"), "https://cdn.example.com/a/b.png");
    }
}
