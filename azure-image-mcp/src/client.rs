//! Client for the Azure AI Foundry image generation endpoints.
//!
//! One call per operation, bounded by the configured request timeout. There
//! are no retries: a failed call surfaces directly as an [`Error`].

use crate::payload::{Encoding, ImagePayload};
use azure_image_mcp_common::config::Config;
use azure_image_mcp_common::error::Error;
use azure_image_mcp_common::models::ImageSize;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Appended to every edit prompt so the model leaves the rest of the image alone.
pub const EDIT_PROMPT_SUFFIX: &str = " (and all other elements exactly the same)";

/// Request body for `images/generations`.
#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    prompt: &'a str,
    size: ImageSize,
    n: u8,
    model: &'a str,
}

/// Response body shared by both endpoints.
#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    #[serde(default)]
    b64_json: Option<String>,
}

/// HTTP client for the image API.
#[derive(Clone)]
pub struct ImageClient {
    config: Arc<Config>,
    http: reqwest::Client,
}

impl ImageClient {
    /// Create a client whose every request is bounded by the configured timeout.
    pub fn new(config: Arc<Config>) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;
        Ok(Self { config, http })
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Generate an image from a text prompt.
    #[instrument(level = "info", name = "image_generate", skip(self, prompt), fields(size = %size))]
    pub async fn generate(&self, prompt: &str, size: ImageSize) -> Result<ImagePayload, Error> {
        let endpoint = self.config.images_endpoint("generations");
        let body = GenerationRequest {
            prompt,
            size,
            n: 1,
            model: &self.config.model,
        };
        debug!(endpoint = %endpoint, "Calling image generation API");

        let request = self
            .http
            .post(&endpoint)
            .query(&[("api-version", self.config.api_version.as_str())])
            .bearer_auth(&self.config.api_key)
            .json(&body);

        self.execute(&endpoint, request).await
    }

    /// Edit `source` according to `prompt`, rendering at `size`.
    ///
    /// The edit prompt suffix is appended here.
    #[instrument(level = "info", name = "image_edit", skip(self, source, prompt), fields(size = %size, source_len = source.len()))]
    pub async fn edit(
        &self,
        source: &ImagePayload,
        prompt: &str,
        size: ImageSize,
    ) -> Result<ImagePayload, Error> {
        let endpoint = self.config.images_endpoint("edits");
        let image_part = Part::bytes(source.bytes().to_vec())
            .file_name(format!("image.{}", source.extension()))
            .mime_str(source.mime_type())
            .map_err(|e| Error::invalid_params(format!("Unsupported image MIME type: {}", e)))?;
        let form = Form::new()
            .text("model", self.config.model.clone())
            .text("prompt", format!("{}{}", prompt, EDIT_PROMPT_SUFFIX))
            .text("size", size.as_str())
            .part("image", image_part);
        debug!(endpoint = %endpoint, "Calling image edit API");

        let request = self
            .http
            .post(&endpoint)
            .query(&[("api-version", self.config.api_version.as_str())])
            .bearer_auth(&self.config.api_key)
            .multipart(form);

        self.execute(&endpoint, request).await
    }

    async fn execute(
        &self,
        endpoint: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<ImagePayload, Error> {
        let response = request
            .send()
            .await
            .map_err(|e| self.transport_error(endpoint, e))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(endpoint, e))?;

        if !status.is_success() {
            let text = String::from_utf8_lossy(&body).into_owned();
            return Err(Error::upstream(endpoint, status.as_u16(), text));
        }

        let parsed: ImagesResponse = serde_json::from_slice(&body)
            .map_err(|e| Error::decode(format!("Failed to parse response: {}", e)))?;
        let encoded = parsed
            .data
            .into_iter()
            .find_map(|datum| datum.b64_json.filter(|b64| !b64.is_empty()))
            .ok_or_else(|| Error::decode("No image data in response"))?;
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| Error::decode(format!("Invalid base64 in response: {}", e)))?;
        if bytes.is_empty() {
            return Err(Error::decode("Response image is empty"));
        }

        let payload = ImagePayload::from_bytes(bytes, Encoding::Bytes);
        info!(len = payload.len(), mime_type = payload.mime_type(), "Received image from API");
        Ok(payload)
    }

    fn transport_error(&self, endpoint: &str, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::timeout(self.config.request_timeout_secs)
        } else {
            Error::upstream(endpoint, 0, format!("Request failed: {}", err))
        }
    }
}
