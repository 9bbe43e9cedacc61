//! Image payload normalization.
//!
//! Every image entering or leaving the server is held as one in-memory byte
//! buffer. [`ImageSource`] names where caller-supplied bytes come from and
//! [`ImageSource::load`] is the single place they are normalized.

use azure_image_mcp_common::error::Error;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use image::ImageFormat;
use serde::Serialize;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// MIME type assumed when the bytes do not identify themselves.
pub const DEFAULT_MIME_TYPE: &str = "image/png";

/// How an image reached the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    /// Read from a local file path
    Path,
    /// Raw base64 text
    Base64,
    /// `data:<mime>;base64,<data>` URL
    DataUrl,
    /// Bytes produced in-process (upstream responses, resized output)
    Bytes,
}

/// A caller-supplied image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Local file path
    Path(String),
    /// Raw base64 data
    Base64(String),
    /// Data URL
    DataUrl(String),
}

impl ImageSource {
    /// Tag inline image data: `data:` URLs are told apart from raw base64.
    pub fn inline(data: impl Into<String>) -> Self {
        let data = data.into();
        if data.trim_start().starts_with("data:") {
            ImageSource::DataUrl(data)
        } else {
            ImageSource::Base64(data)
        }
    }

    /// Basename of the source file, for path sources only.
    pub fn file_name(&self) -> Option<String> {
        match self {
            ImageSource::Path(path) => Path::new(path)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
            _ => None,
        }
    }

    /// Normalize the source into an [`ImagePayload`].
    ///
    /// # Errors
    /// Returns `Error::InvalidParams` when the file does not exist or the
    /// inline data is not valid base64, and `Error::Io` for other read failures.
    pub async fn load(self) -> Result<ImagePayload, Error> {
        match self {
            ImageSource::Path(path) => {
                let bytes = tokio::fs::read(&path).await.map_err(|e| {
                    if e.kind() == std::io::ErrorKind::NotFound {
                        Error::invalid_params(format!("Image file not found: {}", path))
                    } else {
                        Error::Io(e)
                    }
                })?;
                Ok(ImagePayload::from_bytes(bytes, Encoding::Path))
            }
            ImageSource::Base64(data) => {
                let bytes = decode_base64(&data)?;
                Ok(ImagePayload::from_bytes(bytes, Encoding::Base64))
            }
            ImageSource::DataUrl(url) => {
                let (declared_mime, data) = split_data_url(&url)?;
                let bytes = decode_base64(data)?;
                let mut payload = ImagePayload::from_bytes(bytes, Encoding::DataUrl);
                if sniff_format(&payload.bytes).is_none() && !declared_mime.is_empty() {
                    payload.mime_type = declared_mime.to_string();
                }
                Ok(payload)
            }
        }
    }
}

fn split_data_url(url: &str) -> Result<(&str, &str), Error> {
    let rest = url.trim().strip_prefix("data:").unwrap_or(url);
    let (header, data) = rest
        .split_once(',')
        .ok_or_else(|| Error::invalid_params("Malformed data URL: missing ','"))?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or_else(|| Error::invalid_params("Data URL must be base64-encoded"))?;
    Ok((mime, data))
}

fn decode_base64(data: &str) -> Result<Vec<u8>, Error> {
    let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if compact.is_empty() {
        return Err(Error::invalid_params("Image data is empty"));
    }
    BASE64
        .decode(compact.as_bytes())
        .map_err(|e| Error::invalid_params(format!("Invalid base64 image data: {}", e)))
}

fn sniff_format(bytes: &[u8]) -> Option<ImageFormat> {
    image::guess_format(bytes).ok()
}

fn mime_for(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::Gif => "image/gif",
        ImageFormat::WebP => "image/webp",
        ImageFormat::Bmp => "image/bmp",
        ImageFormat::Tiff => "image/tiff",
        _ => DEFAULT_MIME_TYPE,
    }
}

/// An image in flight.
#[derive(Clone)]
pub struct ImagePayload {
    bytes: Vec<u8>,
    mime_type: String,
    encoding: Encoding,
    dimensions: OnceLock<Option<(u32, u32)>>,
}

impl std::fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImagePayload")
            .field("len", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .field("encoding", &self.encoding)
            .finish()
    }
}

impl ImagePayload {
    /// Wrap a byte buffer, inferring the MIME type from its magic bytes.
    pub fn from_bytes(bytes: Vec<u8>, encoding: Encoding) -> Self {
        let mime_type = sniff_format(&bytes)
            .map(mime_for)
            .unwrap_or(DEFAULT_MIME_TYPE)
            .to_string();
        Self {
            bytes,
            mime_type,
            encoding,
            dimensions: OnceLock::new(),
        }
    }

    /// The image bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of bytes in the image.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// MIME type of the image, `image/png` when it cannot be detected.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// How the image arrived.
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// File extension matching the detected format.
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/jpeg" => "jpg",
            "image/gif" => "gif",
            "image/webp" => "webp",
            "image/bmp" => "bmp",
            "image/tiff" => "tiff",
            _ => "png",
        }
    }

    /// Pixel dimensions, read from the image header on first use.
    ///
    /// Returns `None` if the bytes are not a readable image.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        *self.dimensions.get_or_init(|| {
            image::io::Reader::new(Cursor::new(&self.bytes))
                .with_guessed_format()
                .ok()?
                .into_dimensions()
                .ok()
        })
    }

    /// Base64 encoding of the bytes.
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    /// Write the bytes to `path`, creating parent directories.
    pub async fn save(&self, path: &Path) -> Result<PathBuf, Error> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(path, &self.bytes).await?;
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
pub(crate) mod test_images {
    use image::{ImageOutputFormat, Rgb, RgbImage};
    use std::io::Cursor;

    /// Encode a solid image of the given size.
    pub fn solid(width: u32, height: u32, format: ImageOutputFormat) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([200, 30, 30]));
        let mut buf = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, format)
            .unwrap();
        buf.into_inner()
    }

    pub fn png(width: u32, height: u32) -> Vec<u8> {
        solid(width, height, ImageOutputFormat::Png)
    }
}
