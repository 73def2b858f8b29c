use bytes::Bytes;
use futures_core::Stream;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::pin::Pin;
use std::str::FromStr;

use crate::{BucketError, BucketResult};

/// Stream of bytes for blob-like file content
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Object metadata. Cloud object stores only keep string values.
pub type FileMetadata = BTreeMap<String, String>;

/// Build metadata from an untyped JSON object, rejecting non-string values
pub fn metadata_from_json(value: serde_json::Value) -> BucketResult<FileMetadata> {
    match value {
        serde_json::Value::Null => Ok(FileMetadata::new()),
        serde_json::Value::Object(map) => map
            .into_iter()
            .map(|(key, value)| match value {
                serde_json::Value::String(s) => Ok((key, s)),
                _ => Err(BucketError::InvalidMetadata { key }),
            })
            .collect(),
        _ => Err(BucketError::invalid("metadata must be a JSON object")),
    }
}

/// Content of a file before normalization
pub enum FileData {
    /// Raw bytes, used as-is
    Bytes(Bytes),
    /// Base64 encoded text
    Base64(String),
    /// Blob-like source read asynchronously
    Blob(ByteStream),
}

impl FileData {
    pub fn base64<S: Into<String>>(text: S) -> Self {
        Self::Base64(text.into())
    }

    pub fn blob(stream: ByteStream) -> Self {
        Self::Blob(stream)
    }
}

impl std::fmt::Debug for FileData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileData::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            FileData::Base64(s) => f.debug_tuple("Base64").field(&s.len()).finish(),
            FileData::Blob(_) => f.write_str("Blob(..)"),
        }
    }
}

impl From<Bytes> for FileData {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for FileData {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

impl From<&'static [u8]> for FileData {
    fn from(bytes: &'static [u8]) -> Self {
        Self::Bytes(Bytes::from_static(bytes))
    }
}

impl TryFrom<serde_json::Value> for FileData {
    type Error = BucketError;

    /// Strings are treated as base64, arrays as raw byte values
    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        match value {
            serde_json::Value::String(s) => Ok(Self::Base64(s)),
            serde_json::Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_u64()
                        .and_then(|n| u8::try_from(n).ok())
                        .ok_or_else(|| BucketError::invalid_input("byte arrays may only hold values 0-255"))
                })
                .collect::<BucketResult<Vec<u8>>>()
                .map(Self::from),
            other => Err(BucketError::invalid_input(format!(
                "unsupported JSON value {}",
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Containment strategy used when both width and height are given
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fit {
    /// Preserve aspect ratio, letterbox into the exact box
    #[default]
    Contain,
    /// Preserve aspect ratio, crop to cover the exact box
    Cover,
    /// Ignore aspect ratio, stretch to the exact box
    Fill,
    /// Preserve aspect ratio, as large as possible within the box
    Inside,
    /// Preserve aspect ratio, as small as possible covering the box
    Outside,
}

impl FromStr for Fit {
    type Err = BucketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "contain" => Ok(Fit::Contain),
            "cover" => Ok(Fit::Cover),
            "fill" => Ok(Fit::Fill),
            "inside" => Ok(Fit::Inside),
            "outside" => Ok(Fit::Outside),
            other => Err(BucketError::invalid(format!("Unknown fit: {other}"))),
        }
    }
}

/// Output format a variant can be re-encoded into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageExtension {
    Webp,
    Png,
    Avif,
    Heif,
    Jxl,
    Jp2,
    Raw,
    Tif,
    Tiff,
    Svg,
    Gif,
    Jpg,
    Jpeg,
}

impl ImageExtension {
    /// Extension as written into derived file names
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageExtension::Webp => "webp",
            ImageExtension::Png => "png",
            ImageExtension::Avif => "avif",
            ImageExtension::Heif => "heif",
            ImageExtension::Jxl => "jxl",
            ImageExtension::Jp2 => "jp2",
            ImageExtension::Raw => "raw",
            ImageExtension::Tif => "tif",
            ImageExtension::Tiff => "tiff",
            ImageExtension::Svg => "svg",
            ImageExtension::Gif => "gif",
            ImageExtension::Jpg => "jpg",
            ImageExtension::Jpeg => "jpeg",
        }
    }
}

impl std::fmt::Display for ImageExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageExtension {
    type Err = BucketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ext = match s.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "webp" => ImageExtension::Webp,
            "png" => ImageExtension::Png,
            "avif" => ImageExtension::Avif,
            "heif" => ImageExtension::Heif,
            "jxl" => ImageExtension::Jxl,
            "jp2" => ImageExtension::Jp2,
            "raw" => ImageExtension::Raw,
            "tif" => ImageExtension::Tif,
            "tiff" => ImageExtension::Tiff,
            "svg" => ImageExtension::Svg,
            "gif" => ImageExtension::Gif,
            "jpg" => ImageExtension::Jpg,
            "jpeg" => ImageExtension::Jpeg,
            other => return Err(BucketError::unsupported_format(other)),
        };
        Ok(ext)
    }
}

/// Codec-specific encoder options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatOptions {
    /// 1-100, used by jpeg and avif
    pub quality: Option<u8>,
    /// 1-10, used by avif
    pub speed: Option<u8>,
    /// Favour size over speed, used by png
    pub compression: Option<bool>,
}

/// Target format for a variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFormat {
    pub extension: ImageExtension,
    #[serde(default)]
    pub options: FormatOptions,
}

impl OutputFormat {
    pub fn new(extension: ImageExtension) -> Self {
        Self {
            extension,
            options: FormatOptions::default(),
        }
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.options.quality = Some(quality);
        self
    }

    pub fn with_speed(mut self, speed: u8) -> Self {
        self.options.speed = Some(speed);
        self
    }

    pub fn with_compression(mut self, best: bool) -> Self {
        self.options.compression = Some(best);
        self
    }
}

/// Dimensions, fit and format for one resize/encode request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeOptions {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fit: Option<Fit>,
    pub format: Option<OutputFormat>,
}

impl ResizeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_width(mut self, width: u32) -> Self {
        self.width = Some(width);
        self
    }

    pub fn with_height(mut self, height: u32) -> Self {
        self.height = Some(height);
        self
    }

    pub fn with_fit(mut self, fit: Fit) -> Self {
        self.fit = Some(fit);
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = Some(format);
        self
    }
}

/// One derived variant of a logical file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeSpec {
    /// Prepended to the variant's file name
    pub file_resize_prefix: String,
    /// Replaces the logical file's name before the prefix is applied
    pub file_name: Option<String>,
    #[serde(flatten)]
    pub resize: ResizeOptions,
}

impl ResizeSpec {
    pub fn new<S: Into<String>>(file_resize_prefix: S) -> Self {
        Self {
            file_resize_prefix: file_resize_prefix.into(),
            file_name: None,
            resize: ResizeOptions::default(),
        }
    }

    pub fn with_file_name<S: Into<String>>(mut self, file_name: S) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn with_width(mut self, width: u32) -> Self {
        self.resize.width = Some(width);
        self
    }

    pub fn with_height(mut self, height: u32) -> Self {
        self.resize.height = Some(height);
        self
    }

    pub fn with_fit(mut self, fit: Fit) -> Self {
        self.resize.fit = Some(fit);
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.resize.format = Some(format);
        self
    }
}

/// Caller's description of a file to store, before variant expansion
#[derive(Debug)]
pub struct LogicalFile {
    pub folder_name: String,
    pub file_name: String,
    pub file_data: FileData,
    pub file_metadata: Option<FileMetadata>,
    pub resize_options: Vec<ResizeSpec>,
}

impl LogicalFile {
    pub fn new<F, N, D>(folder_name: F, file_name: N, file_data: D) -> Self
    where
        F: Into<String>,
        N: Into<String>,
        D: Into<FileData>,
    {
        Self {
            folder_name: folder_name.into(),
            file_name: file_name.into(),
            file_data: file_data.into(),
            file_metadata: None,
            resize_options: Vec::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: FileMetadata) -> Self {
        self.file_metadata = Some(metadata);
        self
    }

    pub fn with_metadata_entry<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.file_metadata
            .get_or_insert_with(FileMetadata::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn with_resize(mut self, spec: ResizeSpec) -> Self {
        self.resize_options.push(spec);
        self
    }

    pub fn with_resizes<I: IntoIterator<Item = ResizeSpec>>(mut self, specs: I) -> Self {
        self.resize_options.extend(specs);
        self
    }
}

/// One concrete byte sequence destined for one object path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalFile {
    pub folder_name: String,
    pub file_name: String,
    pub file_data: Bytes,
    pub file_metadata: FileMetadata,
}

impl PhysicalFile {
    pub fn new<F: Into<String>, N: Into<String>>(folder_name: F, file_name: N, file_data: Bytes) -> Self {
        Self {
            folder_name: folder_name.into(),
            file_name: file_name.into(),
            file_data,
            file_metadata: FileMetadata::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: FileMetadata) -> Self {
        self.file_metadata = metadata;
        self
    }

    pub fn size_bytes(&self) -> u64 {
        self.file_data.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metadata_rejects_non_strings() {
        let ok = metadata_from_json(json!({"owner": "ana", "kind": "avatar"})).unwrap();
        assert_eq!(ok.get("owner").map(String::as_str), Some("ana"));

        let err = metadata_from_json(json!({"owner": "ana", "age": 3})).unwrap_err();
        assert!(matches!(err, BucketError::InvalidMetadata { key } if key == "age"));

        assert!(metadata_from_json(json!(null)).unwrap().is_empty());
        assert!(metadata_from_json(json!(["a"])).is_err());
    }

    #[test]
    fn test_file_data_from_json() {
        assert!(matches!(FileData::try_from(json!("aGk=")), Ok(FileData::Base64(_))));
        assert!(matches!(FileData::try_from(json!([104, 105])), Ok(FileData::Bytes(b)) if &b[..] == b"hi"));
        assert!(matches!(
            FileData::try_from(json!({"data": 1})),
            Err(BucketError::InvalidInputKind { .. })
        ));
        assert!(matches!(
            FileData::try_from(json!([1, 300])),
            Err(BucketError::InvalidInputKind { .. })
        ));
    }

    #[test]
    fn test_resize_spec_deserializes_flat() {
        let spec: ResizeSpec = serde_json::from_value(json!({
            "file_resize_prefix": "small-",
            "width": 64,
            "fit": "cover",
            "format": {"extension": "webp"}
        }))
        .unwrap();

        assert_eq!(spec.file_resize_prefix, "small-");
        assert_eq!(spec.resize.width, Some(64));
        assert_eq!(spec.resize.fit, Some(Fit::Cover));
        assert_eq!(spec.resize.format, Some(OutputFormat::new(ImageExtension::Webp)));
    }

    #[test]
    fn test_extension_parsing() {
        assert_eq!(".JPG".parse::<ImageExtension>().unwrap(), ImageExtension::Jpg);
        assert!("bmpx".parse::<ImageExtension>().is_err());
        assert_eq!("Outside".parse::<Fit>().unwrap(), Fit::Outside);
    }
}
