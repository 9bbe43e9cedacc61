//! Azure Image Editor MCP Server
//!
//! MCP server for image generation and editing using Azure AI Foundry.

use anyhow::{Context, Result};
use azure_image_mcp::ImageServer;
use azure_image_mcp_common::tracing::init_tracing_with_log_dir;
use azure_image_mcp_common::{Config, McpServerBuilder, TransportArgs};
use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the image server.
#[derive(Parser, Debug)]
#[command(name = "azure-image-mcp")]
#[command(about = "MCP server for image generation and editing using Azure AI Foundry")]
struct Args {
    /// Transport configuration
    #[command(flatten)]
    transport: TransportArgs,

    /// Also write logs to a daily file (mcp_server.YYYY-MM-DD.log) in this directory
    #[arg(long, env = "LOG_DIR")]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments first: they choose the log destinations
    let args = Args::parse();

    let _log_guard =
        init_tracing_with_log_dir(args.log_dir.as_deref()).context("Failed to initialize logging")?;

    tracing::info!(log_dir = ?args.log_dir, "azure-image-mcp server starting...");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(
        base_url = %config.base_url,
        deployment = %config.deployment_name,
        model = %config.model,
        api_key = %config.masked_api_key(),
        default_size = %config.default_size,
        audit_dir = %config.audit_dir.display(),
        audit_enabled = config.audit_enabled,
        "Configuration loaded"
    );

    let transport = args.transport.into_transport();
    let server =
        ImageServer::new(config, transport.mode()).context("Failed to initialize image server")?;

    tracing::info!(transport = %transport, "Starting MCP server");

    McpServerBuilder::new(server)
        .with_transport(transport)
        .run()
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}
