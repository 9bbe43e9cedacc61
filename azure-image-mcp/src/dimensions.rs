//! Target size resolution for image requests.
//!
//! The upstream API only renders the canvases listed in [`ImageSize`]. When an
//! edit source has some other shape, the request goes out at the canvas with
//! the nearest aspect ratio and the result is resized back to the source's
//! exact dimensions by [`conform`].

use crate::payload::{Encoding, ImagePayload};
use azure_image_mcp_common::error::Error;
use azure_image_mcp_common::models::ImageSize;
use image::ImageOutputFormat;
use image::imageops::FilterType;
use std::io::Cursor;
use tracing::debug;

/// Longest edge accepted for an edit source.
pub const MAX_SOURCE_EDGE: u32 = 4096;

/// Most elongated aspect ratio accepted for an edit source (long edge / short edge).
pub const MAX_ASPECT_RATIO: f64 = 4.0;

/// Where a request is sent and what the caller gets back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetSize {
    /// Canvas requested from the upstream API
    pub request: ImageSize,
    /// Width of the image returned to the caller
    pub width: u32,
    /// Height of the image returned to the caller
    pub height: u32,
}

impl TargetSize {
    /// Output exactly at the requested canvas.
    pub fn exact(size: ImageSize) -> Self {
        let (width, height) = size.dimensions();
        Self {
            request: size,
            width,
            height,
        }
    }

    /// Returns true if the output dimensions equal the requested canvas.
    pub fn is_exact(&self) -> bool {
        self.request.dimensions() == (self.width, self.height)
    }
}

/// Resolve the size to request and the dimensions to return.
///
/// An explicit size always wins. Otherwise an edit source decides, and the
/// generate path falls back to `default`.
///
/// # Errors
/// Returns `Error::UnsupportedDimensions` when the source's dimensions cannot
/// be read or fall outside what the API can reproduce.
pub fn resolve_target_size(
    explicit: Option<ImageSize>,
    source: Option<&ImagePayload>,
    default: ImageSize,
) -> Result<TargetSize, Error> {
    if let Some(size) = explicit {
        return Ok(TargetSize::exact(size));
    }
    match source {
        Some(payload) => {
            let (width, height) = payload.dimensions().ok_or_else(|| {
                Error::unsupported_dimensions(0, 0, "could not read image dimensions")
            })?;
            resolve_for_dimensions(width, height)
        }
        None => Ok(TargetSize::exact(default)),
    }
}

/// Resolve the target for a source of `width` x `height` pixels.
pub fn resolve_for_dimensions(width: u32, height: u32) -> Result<TargetSize, Error> {
    if width == 0 || height == 0 {
        return Err(Error::unsupported_dimensions(width, height, "image has no pixels"));
    }
    if width > MAX_SOURCE_EDGE || height > MAX_SOURCE_EDGE {
        return Err(Error::unsupported_dimensions(
            width,
            height,
            format!("edges larger than {} px are not supported", MAX_SOURCE_EDGE),
        ));
    }
    let (long, short) = (width.max(height) as f64, width.min(height) as f64);
    if long / short > MAX_ASPECT_RATIO {
        return Err(Error::unsupported_dimensions(
            width,
            height,
            format!("aspect ratios beyond {}:1 are not supported", MAX_ASPECT_RATIO),
        ));
    }

    if let Some(size) = ImageSize::from_dimensions(width, height) {
        return Ok(TargetSize::exact(size));
    }

    let request = nearest_size(width, height);
    debug!(width, height, request = %request, "Source has no matching canvas, will resize result");
    Ok(TargetSize {
        request,
        width,
        height,
    })
}

/// The supported canvas whose aspect ratio is closest to `width` / `height`.
///
/// Distance is measured on the log of the ratio so that 2:1 and 1:2 are
/// equally far from 1:1.
pub fn nearest_size(width: u32, height: u32) -> ImageSize {
    let ratio = (width as f64 / height as f64).ln();
    let distance = |size: &ImageSize| {
        let (w, h) = size.dimensions();
        (ratio - (w as f64 / h as f64).ln()).abs()
    };
    ImageSize::ALL
        .into_iter()
        .min_by(|a, b| distance(a).total_cmp(&distance(b)))
        .unwrap_or_default()
}

/// Make `payload` match the target's output dimensions.
///
/// Images already at the target size are returned untouched; anything else is
/// resized and re-encoded as PNG.
///
/// # Errors
/// Returns `Error::Decode` if the payload is not a decodable image.
pub fn conform(payload: ImagePayload, target: &TargetSize) -> Result<ImagePayload, Error> {
    let decoded = image::load_from_memory(payload.bytes())
        .map_err(|e| Error::decode(format!("Failed to decode image: {}", e)))?;

    if (decoded.width(), decoded.height()) == (target.width, target.height) {
        return Ok(payload);
    }

    debug!(
        from_width = decoded.width(),
        from_height = decoded.height(),
        to_width = target.width,
        to_height = target.height,
        "Resizing image to target"
    );
    let resized = decoded.resize_exact(target.width, target.height, FilterType::Lanczos3);
    let mut buf = Cursor::new(Vec::new());
    resized
        .write_to(&mut buf, ImageOutputFormat::Png)
        .map_err(|e| Error::decode(format!("Failed to encode image: {}", e)))?;
    Ok(ImagePayload::from_bytes(buf.into_inner(), Encoding::Bytes))
}
