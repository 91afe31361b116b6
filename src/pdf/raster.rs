//! Page rasterization for vision models
//!
//! Converts document pages into sized, encoded images suitable for vision
//! LLM requests. PDF rendering requires the `render` feature (pdfium); image
//! files are handled directly.

use crate::error::{ExtractionError, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Output encoding for page images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
        }
    }
}

impl Default for ImageFormat {
    fn default() -> Self {
        Self::Jpeg
    }
}

/// Rasterization parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RasterConfig {
    /// Rendering DPI (PDF base resolution is 72)
    pub dpi: u32,

    /// Maximum output width in pixels
    pub max_width: u32,

    /// Maximum output height in pixels
    pub max_height: u32,

    /// Output format
    pub format: ImageFormat,

    /// JPEG quality in 1..=100
    pub jpeg_quality: u8,
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            max_width: 4000,
            max_height: 4000,
            format: ImageFormat::Jpeg,
            jpeg_quality: 85,
        }
    }
}

/// One rasterized page
#[derive(Debug, Clone)]
pub struct PageImage {
    pub data: Vec<u8>,
    pub format: ImageFormat,
    pub page_number: u32,
    pub width: u32,
    pub height: u32,
}

impl PageImage {
    /// Base64-encode the image bytes
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }

    /// Build a data URI for OpenAI-style image_url parts
    pub fn to_data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.format.mime_type(),
            self.to_base64()
        )
    }
}

/// Converts a document into a list of page images
#[async_trait]
pub trait Rasterizer: Send + Sync {
    async fn rasterize(&self, file_path: &str) -> Result<Vec<PageImage>>;
}

/// Rasterizer for image-file inputs (single page)
pub struct ImageFileRasterizer {
    config: RasterConfig,
}

impl ImageFileRasterizer {
    pub fn new(config: RasterConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Rasterizer for ImageFileRasterizer {
    async fn rasterize(&self, file_path: &str) -> Result<Vec<PageImage>> {
        if !Path::new(file_path).exists() {
            return Err(ExtractionError::InputNotFound(file_path.to_string()).into());
        }

        let ext = Path::new(file_path)
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_lowercase();
        if !matches!(ext.as_str(), "jpg" | "jpeg" | "png" | "webp" | "bmp" | "tiff" | "tif") {
            return Err(ExtractionError::InvalidFormat(ext).into());
        }

        let config = self.config.clone();
        let path = file_path.to_string();
        let image = tokio::task::spawn_blocking(move || -> Result<PageImage> {
            let img = image::open(&path)
                .map_err(|e| ExtractionError::Rasterization(e.to_string()))?;
            encode_image(img, 1, &config)
        })
        .await
        .map_err(|e| ExtractionError::Rasterization(e.to_string()))??;

        Ok(vec![image])
    }
}

/// PDF rasterizer backed by pdfium
#[cfg(feature = "render")]
pub struct PdfiumRasterizer {
    config: RasterConfig,
}

#[cfg(feature = "render")]
impl PdfiumRasterizer {
    pub fn new(config: RasterConfig) -> Self {
        Self { config }
    }
}

#[cfg(feature = "render")]
#[async_trait]
impl Rasterizer for PdfiumRasterizer {
    async fn rasterize(&self, file_path: &str) -> Result<Vec<PageImage>> {
        use pdfium_render::prelude::*;

        if !Path::new(file_path).exists() {
            return Err(ExtractionError::InputNotFound(file_path.to_string()).into());
        }

        let config = self.config.clone();
        let path = file_path.to_string();

        tokio::task::spawn_blocking(move || -> Result<Vec<PageImage>> {
            let pdfium = Pdfium::new(
                Pdfium::bind_to_system_library()
                    .map_err(|e| ExtractionError::Rasterization(e.to_string()))?,
            );
            let document = pdfium
                .load_pdf_from_file(&path, None)
                .map_err(|e| ExtractionError::Rasterization(e.to_string()))?;

            let scale = config.dpi as f32 / 72.0;
            let mut images = Vec::new();

            for (index, page) in document.pages().iter().enumerate() {
                let width = (page.width().value * scale) as i32;
                let height = (page.height().value * scale) as i32;
                let render_config = PdfRenderConfig::new()
                    .set_target_width(width)
                    .set_maximum_height(height);

                let bitmap = page
                    .render_with_config(&render_config)
                    .map_err(|e| ExtractionError::Rasterization(e.to_string()))?;
                let img = bitmap.as_image();

                images.push(encode_image(img, index as u32 + 1, &config)?);
            }

            Ok(images)
        })
        .await
        .map_err(|e| ExtractionError::Rasterization(e.to_string()))?
    }
}

/// Clamp to the configured bounds (aspect preserved) and encode
fn encode_image(
    img: image::DynamicImage,
    page_number: u32,
    config: &RasterConfig,
) -> Result<PageImage> {
    let img = resize_to_fit(img, config.max_width, config.max_height);
    let (width, height) = (img.width(), img.height());

    let mut data = Vec::new();
    match config.format {
        ImageFormat::Jpeg => {
            let rgb = img.to_rgb8();
            let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
                &mut data,
                config.jpeg_quality,
            );
            rgb.write_with_encoder(encoder)
                .map_err(|e| ExtractionError::Rasterization(e.to_string()))?;
        }
        ImageFormat::Png => {
            img.write_to(
                &mut std::io::Cursor::new(&mut data),
                image::ImageFormat::Png,
            )
            .map_err(|e| ExtractionError::Rasterization(e.to_string()))?;
        }
    }

    debug!(
        "Encoded page {} at {}x{} ({} bytes)",
        page_number,
        width,
        height,
        data.len()
    );

    Ok(PageImage {
        data,
        format: config.format,
        page_number,
        width,
        height,
    })
}

/// Shrink an image to fit within bounds, preserving aspect ratio
fn resize_to_fit(img: image::DynamicImage, max_width: u32, max_height: u32) -> image::DynamicImage {
    let (width, height) = (img.width(), img.height());
    if width <= max_width && height <= max_height {
        return img;
    }

    let aspect = width as f64 / height as f64;
    let (new_width, new_height) = if width > height {
        let w = max_width;
        (w, (w as f64 / aspect).round() as u32)
    } else {
        let h = max_height;
        ((h as f64 * aspect).round() as u32, h)
    };

    img.resize(
        new_width.max(1),
        new_height.max(1),
        image::imageops::FilterType::Lanczos3,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resize_preserves_aspect_ratio() {
        let img = image::DynamicImage::new_rgb8(8000, 4000);
        let resized = resize_to_fit(img, 4000, 4000);
        assert_eq!(resized.width(), 4000);
        assert_eq!(resized.height(), 2000);
    }

    #[test]
    fn test_resize_noop_when_within_bounds() {
        let img = image::DynamicImage::new_rgb8(800, 1200);
        let resized = resize_to_fit(img, 4000, 4000);
        assert_eq!((resized.width(), resized.height()), (800, 1200));
    }

    #[test]
    fn test_encode_jpeg() {
        let img = image::DynamicImage::new_rgb8(100, 50);
        let config = RasterConfig::default();
        let page = encode_image(img, 3, &config).unwrap();

        assert_eq!(page.page_number, 3);
        assert_eq!(page.format, ImageFormat::Jpeg);
        assert!(!page.data.is_empty());
        assert!(page.to_data_uri().starts_with("data:image/jpeg;base64,"));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let rasterizer = ImageFileRasterizer::new(RasterConfig::default());
        let result = rasterizer.rasterize("/nonexistent/picture.png").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_unsupported_extension() {
        // Existing file with an extension no rasterizer accepts
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "hello").unwrap();

        let rasterizer = ImageFileRasterizer::new(RasterConfig::default());
        let result = rasterizer.rasterize(path.to_str().unwrap()).await;
        assert!(result.is_err());
    }
}
