//! Azure Image Editor MCP Common Library
//!
//! Shared configuration, model definitions, error handling, JSON-RPC dispatch,
//! transports and tracing for the Azure Image Editor MCP server.

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod config;
pub mod error;
pub mod jsonrpc;
pub mod models;
pub mod server;
pub mod tracing;
pub mod transport;


pub use config::Config;
pub use error::{ConfigError, Error, Result};
pub use jsonrpc::{Dispatcher, JsonRpcResponse, McpService, Reply, Session, ToolCall};
pub use models::ImageSize;
pub use server::{McpServerBuilder, ServerError, http_router, serve_lines, shutdown_channel};
pub use transport::{Transport, TransportArgs, TransportMode};
