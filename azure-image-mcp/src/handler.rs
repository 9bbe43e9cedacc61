//! Image tool handlers.
//!
//! This module provides the `ImageHandler`, which runs `generate_image` and
//! `edit_image` once their arguments have been validated, and the
//! [`ImageResult`] both tools return.

use crate::audit::{AuditHandle, AuditRecorder, ImageRole};
use crate::client::ImageClient;
use crate::dimensions::{TargetSize, conform, resolve_target_size};
use crate::payload::ImagePayload;
use crate::tools::{EditImageArgs, GenerateImageArgs};
use azure_image_mcp_common::config::Config;
use azure_image_mcp_common::error::Error;
use azure_image_mcp_common::models::ImageSize;
use rmcp::model::{CallToolResult, Content};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Outcome of a successful image tool call.
#[derive(Debug, Clone)]
pub struct ImageResult {
    /// The image returned to the caller
    pub image: ImagePayload,
    /// Pixel dimensions of `image`
    pub width: u32,
    pub height: u32,
    /// Where the image was also written, if the caller asked for it
    pub saved_to: Option<PathBuf>,
}

impl ImageResult {
    /// `WIDTHxHEIGHT` of the returned image.
    pub fn size_label(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    /// Convert into the MCP tool result: a text summary, the image itself,
    /// and structured metadata.
    pub fn to_call_tool_result(&self, action: &str) -> CallToolResult {
        let mut summary = format!("Image {} successfully ({})", action, self.size_label());
        if let Some(path) = &self.saved_to {
            summary.push_str(&format!(". Saved to: {}", path.display()));
        }

        let mut structured = json!({
            "mime_type": self.image.mime_type(),
            "width": self.width,
            "height": self.height,
            "size": self.size_label(),
        });
        if let Some(path) = &self.saved_to {
            structured["saved_to"] = json!(path.display().to_string());
        }

        let mut result = CallToolResult::success(vec![
            Content::text(summary),
            Content::image(self.image.to_base64(), self.image.mime_type().to_string()),
        ]);
        result.structured_content = Some(structured);
        result
    }
}

/// Runs image tools against the upstream API and records their images.
pub struct ImageHandler {
    client: ImageClient,
    audit: AuditRecorder,
    default_size: ImageSize,
}

impl ImageHandler {
    /// Create a new ImageHandler with the given configuration.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    #[instrument(level = "debug", name = "image_handler_new", skip_all)]
    pub fn new(config: Arc<Config>, audit: AuditRecorder) -> Result<Self, Error> {
        debug!("Initializing ImageHandler");
        let default_size = config.default_size;
        Ok(Self {
            client: ImageClient::new(config)?,
            audit,
            default_size,
        })
    }

    /// Generate an image from a text prompt.
    #[instrument(level = "info", name = "generate_image", skip(self, args, audit), fields(audit_id = %audit.id()))]
    pub async fn generate_image(
        &self,
        args: GenerateImageArgs,
        audit: &AuditHandle,
    ) -> Result<ImageResult, Error> {
        let size = args.size.unwrap_or(self.default_size);
        info!(size = %size, "Generating image");

        let image = self.client.generate(&args.prompt, size).await?;
        let (width, height) = image
            .dimensions()
            .ok_or_else(|| Error::decode("Generated image could not be decoded"))?;

        self.finish(image, width, height, args.output_path.as_deref(), audit)
            .await
    }

    /// Edit an image, preserving its dimensions unless a size is requested.
    #[instrument(level = "info", name = "edit_image", skip(self, args, audit), fields(audit_id = %audit.id()))]
    pub async fn edit_image(&self, args: EditImageArgs, audit: &AuditHandle) -> Result<ImageResult, Error> {
        let source = args.source();
        let input_name = source.file_name();
        let payload = source.load().await?;
        debug!(
            len = payload.len(),
            mime_type = payload.mime_type(),
            encoding = ?payload.encoding(),
            "Loaded source image"
        );

        self.audit
            .record_image(
                audit,
                ImageRole::Input,
                payload.bytes(),
                input_name.as_deref(),
                payload.extension(),
            )
            .await;

        let target = resolve_target_size(args.size, Some(&payload), self.default_size)?;
        info!(
            request = %target.request,
            width = target.width,
            height = target.height,
            "Editing image"
        );

        let edited = self.client.edit(&payload, &args.prompt, target.request).await?;
        let image = conform_off_thread(edited, target).await?;

        self.finish(image, target.width, target.height, args.output_path.as_deref(), audit)
            .await
    }

    async fn finish(
        &self,
        image: ImagePayload,
        width: u32,
        height: u32,
        output_path: Option<&str>,
        audit: &AuditHandle,
    ) -> Result<ImageResult, Error> {
        let saved_to = match output_path {
            Some(path) => {
                let saved = image.save(Path::new(path)).await?;
                info!(path = %saved.display(), "Saved image");
                Some(saved)
            }
            None => None,
        };

        self.audit
            .record_image(audit, ImageRole::Output, image.bytes(), output_path, image.extension())
            .await;

        Ok(ImageResult {
            image,
            width,
            height,
            saved_to,
        })
    }
}

/// Resizing is CPU-bound, so it runs on the blocking pool.
async fn conform_off_thread(image: ImagePayload, target: TargetSize) -> Result<ImagePayload, Error> {
    tokio::task::spawn_blocking(move || conform(image, &target))
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))?
}
