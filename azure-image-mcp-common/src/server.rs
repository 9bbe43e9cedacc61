//! MCP Server builder utilities.
//!
//! This module provides a consistent pattern for running an [`McpService`]
//! over either transport with graceful shutdown.
//!
//! # Example
//!
//! ```ignore
//! use azure_image_mcp_common::server::McpServerBuilder;
//! use azure_image_mcp_common::transport::Transport;
//!
//! let service = MyService::new();
//! McpServerBuilder::new(service)
//!     .with_transport(Transport::stdio())
//!     .run()
//!     .await?;
//! ```

use crate::jsonrpc::{Dispatcher, McpService, Reply, Session};
use crate::transport::Transport;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tower_http::cors::CorsLayer;

/// Header carrying the caller identity on the HTTP transport.
pub const CALLER_ID_HEADER: &str = "x-caller-id";

/// Errors that can occur when running an MCP server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to the specified address
    #[error("Failed to bind to {addr}: {message}")]
    BindFailed { addr: String, message: String },

    /// Transport error during communication
    #[error("Transport error: {0}")]
    Transport(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Builder for configuring and running MCP servers.
pub struct McpServerBuilder<S> {
    dispatcher: Dispatcher<S>,
    transport: Transport,
    shutdown_rx: Option<oneshot::Receiver<()>>,
}

impl<S: McpService> McpServerBuilder<S> {
    /// Create a new server builder with the given service.
    pub fn new(service: S) -> Self {
        Self {
            dispatcher: Dispatcher::new(Arc::new(service)),
            transport: Transport::default(),
            shutdown_rx: None,
        }
    }

    /// Set the transport mode for the server.
    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }

    /// Set a shutdown signal receiver for graceful shutdown.
    ///
    /// When the sender is dropped or a message is sent, the server
    /// will initiate graceful shutdown.
    pub fn with_shutdown(mut self, shutdown_rx: oneshot::Receiver<()>) -> Self {
        self.shutdown_rx = Some(shutdown_rx);
        self
    }

    /// Run the MCP server with the configured transport.
    ///
    /// This method blocks until the server is shut down (via signal, shutdown
    /// channel, or end of stdin).
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!(transport = %self.transport, "Starting MCP server");

        let shutdown = shutdown_future(self.shutdown_rx);
        match self.transport {
            Transport::Stdio => {
                let stdin = BufReader::new(tokio::io::stdin());
                serve_lines(self.dispatcher, stdin, tokio::io::stdout(), shutdown).await
            }
            Transport::Http { host, port } => {
                run_http(self.dispatcher, &host, port, shutdown).await
            }
        }
    }
}

/// Serve newline-delimited JSON-RPC messages from `reader`, writing replies to `writer`.
///
/// Each message is dispatched on its own task; replies are funneled through a
/// single writer task, one JSON document per line, in completion order.
/// Returns once the reader reaches EOF and every in-flight call has answered,
/// or as soon as `shutdown` resolves.
pub async fn serve_lines<S, R, W, F>(
    dispatcher: Dispatcher<S>,
    mut reader: R,
    writer: W,
    shutdown: F,
) -> Result<(), ServerError>
where
    S: McpService,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
    F: Future<Output = ()>,
{
    let (tx, rx) = mpsc::unbounded_channel::<String>();
    let writer_task = tokio::spawn(write_replies(writer, rx));
    let session = Arc::new(Session::new(None));
    let mut buf = Vec::new();
    tokio::pin!(shutdown);

    // Lines are read as raw bytes: a line that is not UTF-8 gets a parse
    // error reply instead of ending the loop.
    let outcome = loop {
        let read = tokio::select! {
            read = reader.read_until(b'\n', &mut buf) => read,
            _ = &mut shutdown => {
                tracing::info!("Received shutdown signal, stopping server");
                writer_task.abort();
                return Ok(());
            }
        };
        match read {
            Ok(0) => {
                tracing::info!("Input closed, waiting for in-flight calls");
                break Ok(());
            }
            Ok(_) => {
                let line = std::mem::take(&mut buf);
                if line.trim_ascii().is_empty() {
                    continue;
                }
                let dispatcher = dispatcher.clone();
                let session = Arc::clone(&session);
                let tx = tx.clone();
                tokio::spawn(async move {
                    if let Some(reply) = dispatcher.dispatch_slice(&line, &session).await {
                        send_reply(&tx, &reply);
                    }
                });
            }
            Err(e) => break Err(ServerError::Io(e)),
        }
    };

    drop(tx);
    if let Err(e) = writer_task.await {
        if !e.is_cancelled() {
            return Err(ServerError::Transport(e.to_string()));
        }
    }
    outcome
}

fn send_reply(tx: &mpsc::UnboundedSender<String>, reply: &Reply) {
    match serde_json::to_string(reply) {
        Ok(text) => {
            if tx.send(text).is_err() {
                tracing::warn!("Output closed before reply could be written");
            }
        }
        Err(e) => tracing::error!(error = %e, "Failed to serialize reply"),
    }
}

async fn write_replies<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<String>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(mut text) = rx.recv().await {
        text.push('\n');
        let written = async {
            writer.write_all(text.as_bytes()).await?;
            writer.flush().await
        };
        if let Err(e) = written.await {
            tracing::error!(error = %e, "Failed to write reply");
            break;
        }
    }
}

/// Build the HTTP router.
///
/// `POST /` carries JSON-RPC, `GET /` describes the server and `GET /health`
/// reports liveness. Cross-origin requests are allowed from any origin.
pub fn http_router<S: McpService>(dispatcher: Dispatcher<S>) -> Router {
    Router::new()
        .route("/", get(handle_info::<S>).post(handle_rpc::<S>))
        .route("/health", get(handle_health::<S>))
        .layer(CorsLayer::permissive())
        .with_state(dispatcher)
}

async fn handle_rpc<S: McpService>(
    State(dispatcher): State<Dispatcher<S>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let caller_id = headers
        .get(CALLER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);
    let session = Session::new(caller_id);

    match dispatcher.dispatch_slice(&body, &session).await {
        Some(reply) => axum::Json(reply).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn handle_info<S: McpService>(State(dispatcher): State<Dispatcher<S>>) -> Response {
    let info = dispatcher.service().server_info();
    let mut capabilities = Vec::new();
    if info.capabilities.tools.is_some() {
        capabilities.push("tools");
    }
    axum::Json(json!({
        "name": info.server_info.name,
        "version": info.server_info.version,
        "protocol": "MCP HTTP",
        "capabilities": capabilities,
        "status": "ready",
    }))
    .into_response()
}

async fn handle_health<S: McpService>(State(dispatcher): State<Dispatcher<S>>) -> Response {
    axum::Json(json!({
        "status": "healthy",
        "service": dispatcher.service().service_name(),
    }))
    .into_response()
}

async fn run_http<S, F>(
    dispatcher: Dispatcher<S>,
    host: &str,
    port: u16,
    shutdown: F,
) -> Result<(), ServerError>
where
    S: McpService,
    F: Future<Output = ()> + Send + 'static,
{
    let router = http_router(dispatcher);

    let bind_addr = format!("{}:{}", host, port);
    let tcp_listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| ServerError::BindFailed {
            addr: bind_addr.clone(),
            message: e.to_string(),
        })?;

    tracing::info!(addr = %bind_addr, "HTTP server listening");

    axum::serve(tcp_listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ServerError::Transport(e.to_string()))?;

    tracing::info!("HTTP server stopped");
    Ok(())
}

fn shutdown_future(shutdown_rx: Option<oneshot::Receiver<()>>) -> impl Future<Output = ()> + Send + 'static {
    async move {
        match shutdown_rx {
            Some(rx) => {
                let _ = rx.await;
            }
            None => wait_for_shutdown_signal().await,
        }
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => {
                        tracing::info!("Received SIGTERM");
                    }
                    _ = sigint.recv() => {
                        tracing::info!("Received SIGINT");
                    }
                }
            }
            _ => {
                tracing::warn!("Failed to register signal handlers, falling back to Ctrl+C");
                wait_for_ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C"),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to listen for Ctrl+C, running until input closes");
            std::future::pending::<()>().await;
        }
    }
}

/// Convenience function to set up graceful shutdown handling.
///
/// Returns a sender that can be used to trigger shutdown programmatically,
/// and a receiver to pass to the server builder.
pub fn shutdown_channel() -> (oneshot::Sender<()>, oneshot::Receiver<()>) {
    oneshot::channel()
}
