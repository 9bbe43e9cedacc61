//! Azure Image Editor MCP Server Library
//!
//! This library provides image generation and editing over MCP, backed by the
//! Azure AI Foundry image API. Every tool call is recorded under the audit root.

pub mod audit;
pub mod client;
pub mod dimensions;
pub mod handler;
pub mod payload;
pub mod server;
pub mod tools;

pub use audit::{AuditHandle, AuditRecorder, ImageRole};
pub use client::ImageClient;
pub use dimensions::{TargetSize, conform, resolve_target_size};
pub use handler::{ImageHandler, ImageResult};
pub use payload::{Encoding, ImagePayload, ImageSource};
pub use server::{ImageServer, SERVER_NAME};
pub use tools::{
    EditImageArgs, EditSource, GenerateImageArgs, HttpEditImageArgs, ToolKind, ToolRegistry, ToolSchema,
};
