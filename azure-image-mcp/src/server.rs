//! MCP service implementation for the image server.
//!
//! This module provides the service that exposes:
//! - `generate_image` tool for text-to-image generation
//! - `edit_image` tool for prompt-driven image editing
//!
//! Every `tools/call` is audited here, including calls that fail validation.

use crate::audit::{AuditHandle, AuditRecorder};
use crate::handler::ImageHandler;
use crate::tools::{EditImageArgs, GenerateImageArgs, HttpEditImageArgs, ToolKind, ToolRegistry};
use async_trait::async_trait;
use azure_image_mcp_common::config::Config;
use azure_image_mcp_common::error::Error;
use azure_image_mcp_common::jsonrpc::{JsonRpcResponse, McpService, ToolCall};
use azure_image_mcp_common::transport::TransportMode;
use rmcp::ErrorData as McpError;
use rmcp::model::{Implementation, ServerCapabilities, ServerInfo, Tool};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

/// Name reported in `initialize`.
pub const SERVER_NAME: &str = "azure-image-editor";

const INSTRUCTIONS: &str = "Azure Image Editor. Use generate_image to create an image from an \
English prompt and edit_image to modify an existing image. Edited images keep the source \
dimensions unless a size is given. Images are returned inline and can also be saved with output_path.";

/// MCP service for image generation and editing.
#[derive(Clone)]
pub struct ImageServer {
    handler: Arc<ImageHandler>,
    registry: Arc<ToolRegistry>,
    audit: AuditRecorder,
}

impl ImageServer {
    /// Create the server for `mode` from loaded configuration.
    pub fn new(config: Config, mode: TransportMode) -> Result<Self, Error> {
        let audit = AuditRecorder::from_config(&config);
        let registry = ToolRegistry::new(mode, config.default_size);
        let handler = ImageHandler::new(Arc::new(config), audit.clone())?;
        Ok(Self::with_parts(handler, registry, audit))
    }

    /// Assemble a server from already-built parts.
    pub fn with_parts(handler: ImageHandler, registry: ToolRegistry, audit: AuditRecorder) -> Self {
        Self {
            handler: Arc::new(handler),
            registry: Arc::new(registry),
            audit,
        }
    }

    /// The audit recorder shared with the handler.
    pub fn audit(&self) -> &AuditRecorder {
        &self.audit
    }

    async fn run_tool(
        &self,
        call: &ToolCall,
        audit: &AuditHandle,
    ) -> Result<Value, Error> {
        let name = call
            .name()
            .ok_or_else(|| Error::invalid_params("Missing tool name"))?;
        let (kind, schema) = self.registry.resolve(name)?;

        let result = match kind {
            ToolKind::Generate => {
                let args: GenerateImageArgs = schema.parse(call.arguments())?;
                self.handler
                    .generate_image(args, audit)
                    .await?
                    .to_call_tool_result("generated")
            }
            ToolKind::Edit => {
                let args: EditImageArgs = match self.registry.mode() {
                    TransportMode::Stdio => schema.parse(call.arguments())?,
                    TransportMode::Http => schema
                        .parse::<HttpEditImageArgs>(call.arguments())?
                        .into(),
                };
                self.handler
                    .edit_image(args, audit)
                    .await?
                    .to_call_tool_result("edited")
            }
        };

        serde_json::to_value(result)
            .map_err(|e| Error::Io(std::io::Error::other(format!("Failed to serialize result: {}", e))))
    }
}

#[async_trait]
impl McpService for ImageServer {
    fn server_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(INSTRUCTIONS.to_string()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn list_tools(&self) -> Vec<Tool> {
        self.registry.describe().map(|schema| schema.to_tool()).collect()
    }

    async fn call_tool(&self, call: ToolCall) -> Result<Value, McpError> {
        let handle = self
            .audit
            .begin(call.name(), call.caller_id.as_deref())
            .await;
        self.audit.record_request(&handle, &call.request).await;

        let outcome = self.run_tool(&call, &handle).await;
        match &outcome {
            Ok(_) => info!(
                tool = call.name().unwrap_or_default(),
                audit_id = handle.id(),
                "Tool call succeeded"
            ),
            Err(e) => warn!(
                tool = call.name().unwrap_or_default(),
                audit_id = handle.id(),
                error = %e,
                "Tool call failed"
            ),
        }

        let outcome = outcome.map_err(McpError::from);
        let response = JsonRpcResponse::from_result(call.response_id(), outcome.clone());
        match serde_json::to_value(&response) {
            Ok(value) => self.audit.record_response(&handle, &value).await,
            Err(e) => warn!(audit_id = handle.id(), error = %e, "Failed to serialize response for audit"),
        }

        outcome
    }
}
