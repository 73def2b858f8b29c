//! Resize/reformat boundary.
//!
//! The pipeline only shapes requests; pixel work happens behind
//! [`ImageProcessor`]. [`RasterProcessor`] is the default implementation and
//! runs the `image` crate on the blocking pool.

use std::io::Cursor;

use async_trait::async_trait;
use bytes::Bytes;
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, PngEncoder};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageError, ImageFormat};
use serde::{Deserialize, Serialize};

use crate::{BucketError, BucketResult, Fit, ImageExtension, OutputFormat, ResizeOptions};

/// Basic facts about an encoded image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub width: u32,
    pub height: u32,
    pub format: Option<String>,
    pub has_alpha: bool,
}

/// Result of a factor-based resize
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaledImage {
    pub width: u32,
    pub height: u32,
    pub data: Bytes,
}

/// Image-processing capability consumed by the variant pipeline
#[async_trait]
pub trait ImageProcessor: Send + Sync {
    /// Resize and optionally re-encode an image
    async fn resize_encode(&self, data: Bytes, options: &ResizeOptions) -> BucketResult<Bytes>;

    /// Read dimensions and format without resizing
    async fn metadata(&self, data: Bytes) -> BucketResult<ImageMetadata>;
}

/// Dimensions after scaling by `factor`, floored and never below one pixel
pub fn scaled_dimensions(width: u32, height: u32, factor: f64) -> BucketResult<(u32, u32)> {
    if !factor.is_finite() || factor <= 0.0 {
        return Err(BucketError::invalid(format!(
            "scaleFactor must be a positive number, got {factor}"
        )));
    }
    let scale = |dim: u32| ((dim as f64 * factor).floor() as u32).max(1);
    Ok((scale(width), scale(height)))
}

/// `image`-crate backed processor
#[derive(Debug, Clone, Copy)]
pub struct RasterProcessor {
    filter: FilterType,
}

impl RasterProcessor {
    pub fn new() -> Self {
        Self {
            filter: FilterType::Lanczos3,
        }
    }

    pub fn with_filter(mut self, filter: FilterType) -> Self {
        self.filter = filter;
        self
    }

    fn process(data: &[u8], options: &ResizeOptions, filter: FilterType) -> BucketResult<Bytes> {
        let input_format = image::guess_format(data).map_err(map_image_error)?;
        let img = image::load_from_memory_with_format(data, input_format).map_err(map_image_error)?;

        let resized = resize(img, options, filter);

        match &options.format {
            Some(format) => encode(&resized, format),
            None => encode_as(&resized, input_format),
        }
    }

    fn read_metadata(data: &[u8]) -> BucketResult<ImageMetadata> {
        let format = image::guess_format(data).map_err(map_image_error)?;
        let img = image::load_from_memory_with_format(data, format).map_err(map_image_error)?;
        let (width, height) = img.dimensions();

        Ok(ImageMetadata {
            width,
            height,
            format: format.extensions_str().first().map(|ext| ext.to_string()),
            has_alpha: img.color().has_alpha(),
        })
    }
}

impl Default for RasterProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageProcessor for RasterProcessor {
    async fn resize_encode(&self, data: Bytes, options: &ResizeOptions) -> BucketResult<Bytes> {
        let options = options.clone();
        let filter = self.filter;
        tokio::task::spawn_blocking(move || Self::process(&data, &options, filter))
            .await
            .map_err(|e| BucketError::internal(format!("Image task panicked: {e}")))?
    }

    async fn metadata(&self, data: Bytes) -> BucketResult<ImageMetadata> {
        tokio::task::spawn_blocking(move || Self::read_metadata(&data))
            .await
            .map_err(|e| BucketError::internal(format!("Image task panicked: {e}")))?
    }
}

fn resize(img: DynamicImage, options: &ResizeOptions, filter: FilterType) -> DynamicImage {
    let (src_w, src_h) = img.dimensions();

    match (options.width, options.height) {
        (None, None) => img,
        // A single dimension keeps the aspect ratio, fit doesn't apply
        (Some(w), None) => {
            let h = proportional(src_h, w, src_w);
            img.resize_exact(w.max(1), h, filter)
        }
        (None, Some(h)) => {
            let w = proportional(src_w, h, src_h);
            img.resize_exact(w, h.max(1), filter)
        }
        (Some(w), Some(h)) => {
            let (w, h) = (w.max(1), h.max(1));
            match options.fit.unwrap_or_default() {
                Fit::Fill => img.resize_exact(w, h, filter),
                Fit::Cover => img.resize_to_fill(w, h, filter),
                Fit::Inside => img.resize(w, h, filter),
                Fit::Outside => {
                    let scale = f64::max(w as f64 / src_w as f64, h as f64 / src_h as f64);
                    let out_w = ((src_w as f64 * scale).round() as u32).max(w);
                    let out_h = ((src_h as f64 * scale).round() as u32).max(h);
                    img.resize_exact(out_w, out_h, filter)
                }
                Fit::Contain => letterbox(img.resize(w, h, filter), w, h),
            }
        }
    }
}

/// `target * numerator / denominator`, rounded, at least one pixel
fn proportional(numerator: u32, target: u32, denominator: u32) -> u32 {
    if denominator == 0 {
        return target.max(1);
    }
    ((numerator as f64 * target as f64 / denominator as f64).round() as u32).max(1)
}

/// Center `img` on a transparent `w`x`h` canvas
fn letterbox(img: DynamicImage, w: u32, h: u32) -> DynamicImage {
    let (img_w, img_h) = img.dimensions();
    if img_w == w && img_h == h {
        return img;
    }

    let mut canvas = image::RgbaImage::new(w, h);
    let x = (w.saturating_sub(img_w) / 2) as i64;
    let y = (h.saturating_sub(img_h) / 2) as i64;
    image::imageops::overlay(&mut canvas, &img.to_rgba8(), x, y);
    DynamicImage::ImageRgba8(canvas)
}

fn encode(img: &DynamicImage, format: &OutputFormat) -> BucketResult<Bytes> {
    let options = &format.options;
    let mut buffer = Vec::new();

    match format.extension {
        ImageExtension::Jpg | ImageExtension::Jpeg => {
            let quality = options.quality.unwrap_or(80).clamp(1, 100);
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buffer, quality))
                .map_err(map_image_error)?;
        }
        ImageExtension::Webp if options.quality.is_some() => {
            // the bundled webp encoder is lossless only
            tracing::debug!("Ignoring webp quality, encoding lossless");
            return encode_as(img, ImageFormat::WebP);
        }
        ImageExtension::Png => {
            let compression = match options.compression {
                Some(true) => CompressionType::Best,
                Some(false) => CompressionType::Fast,
                None => CompressionType::Default,
            };
            let encoder = PngEncoder::new_with_quality(
                &mut buffer,
                compression,
                image::codecs::png::FilterType::Adaptive,
            );
            img.write_with_encoder(encoder).map_err(map_image_error)?;
        }
        ImageExtension::Avif => {
            let quality = options.quality.unwrap_or(50).clamp(1, 100);
            let speed = options.speed.unwrap_or(4).clamp(1, 10);
            let encoder = AvifEncoder::new_with_speed_quality(&mut buffer, speed, quality);
            img.write_with_encoder(encoder).map_err(map_image_error)?;
        }
        ImageExtension::Raw => {
            return Ok(Bytes::from(img.as_bytes().to_vec()));
        }
        ImageExtension::Webp => return encode_as(img, ImageFormat::WebP),
        ImageExtension::Gif => return encode_as(img, ImageFormat::Gif),
        ImageExtension::Tif | ImageExtension::Tiff => return encode_as(img, ImageFormat::Tiff),
        ImageExtension::Heif | ImageExtension::Jxl | ImageExtension::Jp2 | ImageExtension::Svg => {
            return Err(BucketError::unsupported_format(format.extension.as_str()));
        }
    }

    Ok(Bytes::from(buffer))
}

fn encode_as(img: &DynamicImage, format: ImageFormat) -> BucketResult<Bytes> {
    // Jpeg has no alpha and webp only takes 8-bit rgb(a)
    let converted;
    let img = match (format, img) {
        (ImageFormat::Jpeg, DynamicImage::ImageRgb8(_) | DynamicImage::ImageLuma8(_)) => img,
        (ImageFormat::Jpeg, _) => {
            converted = DynamicImage::ImageRgb8(img.to_rgb8());
            &converted
        }
        (ImageFormat::WebP, DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_)) => img,
        (ImageFormat::WebP, _) => {
            converted = DynamicImage::ImageRgba8(img.to_rgba8());
            &converted
        }
        _ => img,
    };

    let mut cursor = Cursor::new(Vec::new());
    img.write_to(&mut cursor, format).map_err(map_image_error)?;
    Ok(Bytes::from(cursor.into_inner()))
}

fn map_image_error(err: ImageError) -> BucketError {
    match err {
        ImageError::Unsupported(e) => BucketError::unsupported_format(e.to_string()),
        ImageError::Decoding(e) => BucketError::decode(e.to_string()),
        other => BucketError::decode(other.to_string()),
    }
}
