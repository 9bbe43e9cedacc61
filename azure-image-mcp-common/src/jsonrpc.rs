//! JSON-RPC 2.0 envelope handling and MCP method dispatch.
//!
//! The [`Dispatcher`] owns the protocol side of the server: it decodes
//! envelopes (single objects or batches), answers `initialize`, `ping` and
//! `tools/list` from the [`McpService`], and hands every `tools/call` to the
//! service as a [`ToolCall`]. Transports only move text in and out.
//!
//! # Example
//!
//! ```ignore
//! use azure_image_mcp_common::jsonrpc::{Dispatcher, Session};
//!
//! let dispatcher = Dispatcher::new(Arc::new(MyService::new()));
//! let session = Session::new(None);
//! let reply = dispatcher
//!     .dispatch_text(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#, &session)
//!     .await;
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Local};
use rmcp::ErrorData as McpError;
use rmcp::model::{ErrorCode, ServerInfo, Tool};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// The only protocol version accepted in the `jsonrpc` member.
pub const JSONRPC_VERSION: &str = "2.0";

/// The server side of the MCP tool surface.
///
/// Implementations describe themselves and their tools, and execute tool
/// calls. They never see malformed envelopes: those are answered by the
/// [`Dispatcher`] before the service is consulted.
#[async_trait]
pub trait McpService: Send + Sync + 'static {
    /// Metadata returned from `initialize`.
    fn server_info(&self) -> ServerInfo;

    /// Tools returned from `tools/list`, in a stable order.
    fn list_tools(&self) -> Vec<Tool>;

    /// Execute one `tools/call`.
    ///
    /// The returned value becomes the `result` member of the response.
    async fn call_tool(&self, call: ToolCall) -> Result<Value, McpError>;

    /// Name reported by the HTTP health endpoint.
    fn service_name(&self) -> String {
        format!("{}-mcp", self.server_info().server_info.name)
    }
}

/// One inbound `tools/call`.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Correlation id from the envelope; `None` for a notification.
    pub id: Option<Value>,
    /// The `params` member of the envelope.
    pub params: Value,
    /// The verbatim inbound envelope.
    pub request: Value,
    /// Identity of the caller, when the transport or client supplied one.
    pub caller_id: Option<String>,
    /// When the dispatcher accepted the call.
    pub received_at: DateTime<Local>,
}

impl ToolCall {
    /// The requested tool name, if `params.name` is a string.
    pub fn name(&self) -> Option<&str> {
        self.params.get("name").and_then(Value::as_str)
    }

    /// The `params.arguments` member, if present.
    pub fn arguments(&self) -> Option<&Value> {
        self.params.get("arguments")
    }

    /// The id to echo back, `null` for notifications.
    pub fn response_id(&self) -> Value {
        self.id.clone().unwrap_or(Value::Null)
    }
}

/// A JSON-RPC 2.0 response envelope.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    /// Always `"2.0"`.
    pub jsonrpc: &'static str,
    /// Echo of the request id (`null` when it could not be determined).
    pub id: Value,
    /// Success payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<McpError>,
}

impl JsonRpcResponse {
    /// Build a success envelope.
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Build an error envelope.
    pub fn failure(id: Value, error: McpError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Build the envelope for a handler outcome.
    pub fn from_result(id: Value, outcome: Result<Value, McpError>) -> Self {
        match outcome {
            Ok(result) => Self::success(id, result),
            Err(error) => Self::failure(id, error),
        }
    }

    /// Returns true if this envelope carries an error.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// What a transport writes back for one inbound message.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Reply {
    /// Answer to a single request object.
    Single(JsonRpcResponse),
    /// Answers to a batch, in the order the requests appeared.
    Batch(Vec<JsonRpcResponse>),
}

/// Per-connection state shared by the messages of one client.
#[derive(Debug, Default)]
pub struct Session {
    caller_id: RwLock<Option<String>>,
}

impl Session {
    /// Create a session, optionally with a caller id supplied by the transport.
    pub fn new(caller_id: Option<String>) -> Self {
        Self {
            caller_id: RwLock::new(caller_id),
        }
    }

    /// The caller id currently associated with the session.
    pub async fn caller_id(&self) -> Option<String> {
        self.caller_id.read().await.clone()
    }

    /// Record the client's self-reported name unless an id is already set.
    async fn adopt_client_name(&self, name: &str) {
        let mut caller = self.caller_id.write().await;
        if caller.is_none() && !name.trim().is_empty() {
            *caller = Some(name.trim().to_string());
        }
    }
}

/// Routes decoded envelopes to an [`McpService`].
pub struct Dispatcher<S> {
    service: Arc<S>,
}

impl<S> Clone for Dispatcher<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
        }
    }
}

impl<S: McpService> Dispatcher<S> {
    /// Create a dispatcher for the given service.
    pub fn new(service: Arc<S>) -> Self {
        Self { service }
    }

    /// The service requests are routed to.
    pub fn service(&self) -> &S {
        &self.service
    }

    /// Decode and dispatch one raw message.
    ///
    /// Returns `None` when nothing must be written back (notifications, or
    /// a batch consisting only of notifications).
    pub async fn dispatch_text(&self, text: &str, session: &Session) -> Option<Reply> {
        self.dispatch_slice(text.as_bytes(), session).await
    }

    /// Decode and dispatch one raw message that may not be valid UTF-8.
    ///
    /// Bytes that are not a JSON document, including invalid UTF-8, are
    /// answered with a parse error.
    pub async fn dispatch_slice(&self, bytes: &[u8], session: &Session) -> Option<Reply> {
        match serde_json::from_slice::<Value>(bytes) {
            Ok(message) => self.dispatch_value(message, session).await,
            Err(e) => {
                debug!(error = %e, "Rejecting unparsable message");
                Some(Reply::Single(JsonRpcResponse::failure(
                    Value::Null,
                    McpError::new(ErrorCode::PARSE_ERROR, format!("Parse error: {}", e), None),
                )))
            }
        }
    }

    /// Dispatch one decoded message, which may be a batch.
    pub async fn dispatch_value(&self, message: Value, session: &Session) -> Option<Reply> {
        match message {
            Value::Array(items) if items.is_empty() => Some(Reply::Single(invalid_request(
                Value::Null,
                "Empty batch",
            ))),
            Value::Array(items) => {
                let mut responses = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(response) = self.dispatch_single(item, session).await {
                        responses.push(response);
                    }
                }
                if responses.is_empty() {
                    None
                } else {
                    Some(Reply::Batch(responses))
                }
            }
            single => self.dispatch_single(single, session).await.map(Reply::Single),
        }
    }

    async fn dispatch_single(&self, message: Value, session: &Session) -> Option<JsonRpcResponse> {
        let Value::Object(envelope) = &message else {
            return Some(invalid_request(Value::Null, "Request must be a JSON object"));
        };

        let id = envelope.get("id").cloned();
        let echo_id = match &id {
            Some(v @ (Value::String(_) | Value::Number(_) | Value::Null)) => v.clone(),
            _ => Value::Null,
        };

        if envelope.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return Some(invalid_request(echo_id, "jsonrpc must be \"2.0\""));
        }
        if matches!(&id, Some(Value::Array(_) | Value::Object(_) | Value::Bool(_))) {
            return Some(invalid_request(echo_id, "id must be a string, number or null"));
        }
        let Some(method) = envelope.get("method").and_then(Value::as_str) else {
            return Some(invalid_request(echo_id, "method must be a string"));
        };
        let params = envelope.get("params").cloned().unwrap_or(Value::Null);
        let is_notification = id.is_none();

        debug!(method, notification = is_notification, "Dispatching request");

        let outcome = match method {
            "initialize" => {
                if let Some(name) = params.pointer("/clientInfo/name").and_then(Value::as_str) {
                    session.adopt_client_name(name).await;
                }
                to_result(self.service.server_info())
            }
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": self.service.list_tools() })),
            "tools/call" => {
                let call = ToolCall {
                    id: id.clone(),
                    params,
                    request: message.clone(),
                    caller_id: session.caller_id().await,
                    received_at: Local::now(),
                };
                info!(tool = call.name().unwrap_or("unknown"), "Tool call received");
                self.service.call_tool(call).await
            }
            m if is_notification && m.starts_with("notifications/") => {
                debug!(method = m, "Ignoring notification");
                return None;
            }
            other => {
                warn!(method = other, "Unknown method");
                Err(McpError::new(
                    ErrorCode::METHOD_NOT_FOUND,
                    format!("Method not found: {}", other),
                    None,
                ))
            }
        };

        if is_notification {
            return None;
        }
        Some(JsonRpcResponse::from_result(echo_id, outcome))
    }
}

fn invalid_request(id: Value, reason: &str) -> JsonRpcResponse {
    JsonRpcResponse::failure(
        id,
        McpError::new(
            ErrorCode::INVALID_REQUEST,
            format!("Invalid Request: {}", reason),
            None,
        ),
    )
}

fn to_result<T: Serialize>(value: T) -> Result<Value, McpError> {
    serde_json::to_value(value).map_err(|e| McpError::internal_error(e.to_string(), None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmcp::model::{Implementation, ServerCapabilities};
    use std::sync::Mutex;

    /// Records every call and answers with a fixed result.
    struct EchoService {
        calls: Mutex<Vec<ToolCall>>,
    }

    impl EchoService {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl McpService for EchoService {
        fn server_info(&self) -> ServerInfo {
            ServerInfo {
                capabilities: ServerCapabilities::builder().enable_tools().build(),
                server_info: Implementation {
                    name: "echo".to_string(),
                    version: "0.0.1".to_string(),
                    ..Default::default()
                },
                ..Default::default()
            }
        }

        fn list_tools(&self) -> Vec<Tool> {
            Vec::new()
        }

        async fn call_tool(&self, call: ToolCall) -> Result<Value, McpError> {
            let name = call.name().map(str::to_string);
            self.calls.lock().unwrap().push(call);
            match name.as_deref() {
                Some("fail") => Err(McpError::invalid_params("bad arguments", None)),
                _ => Ok(json!({ "echo": name })),
            }
        }
    }

    fn dispatcher() -> (Dispatcher<EchoService>, Arc<EchoService>) {
        let service = Arc::new(EchoService::new());
        (Dispatcher::new(Arc::clone(&service)), service)
    }

    async fn dispatch(text: &str) -> Value {
        let (dispatcher, _) = dispatcher();
        let reply = dispatcher.dispatch_text(text, &Session::new(None)).await.unwrap();
        serde_json::to_value(reply).unwrap()
    }

    #[tokio::test]
    async fn test_parse_error_has_null_id() {
        let reply = dispatch("{not json").await;
        assert_eq!(reply["id"], Value::Null);
        assert_eq!(reply["error"]["code"], -32700);
    }

    #[tokio::test]
    async fn test_missing_jsonrpc_is_invalid_request() {
        let reply = dispatch(r#"{"id":7,"method":"ping"}"#).await;
        assert_eq!(reply["id"], 7);
        assert_eq!(reply["error"]["code"], -32600);
    }

    #[tokio::test]
    async fn test_missing_method_is_invalid_request() {
        let reply = dispatch(r#"{"jsonrpc":"2.0","id":"a"}"#).await;
        assert_eq!(reply["id"], "a");
        assert_eq!(reply["error"]["code"], -32600);
    }

    #[tokio::test]
    async fn test_unknown_method_echoes_id() {
        let reply = dispatch(r#"{"jsonrpc":"2.0","id":42,"method":"resources/list"}"#).await;
        assert_eq!(reply["jsonrpc"], "2.0");
        assert_eq!(reply["id"], 42);
        assert_eq!(reply["error"]["code"], -32601);
        assert!(reply.get("result").is_none());
    }

    #[tokio::test]
    async fn test_ping_returns_empty_object() {
        let reply = dispatch(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).await;
        assert_eq!(reply["result"], json!({}));
    }

    #[tokio::test]
    async fn test_initialize_returns_server_info() {
        let reply = dispatch(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#).await;
        assert_eq!(reply["result"]["serverInfo"]["name"], "echo");
        assert!(reply["result"]["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn test_initialize_adopts_client_name() {
        let (dispatcher, service) = dispatcher();
        let session = Session::new(None);
        dispatcher
            .dispatch_text(
                r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"clientInfo":{"name":"desktop"}}}"#,
                &session,
            )
            .await;
        dispatcher
            .dispatch_text(
                r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"x","arguments":{}}}"#,
                &session,
            )
            .await;

        let calls = service.calls.lock().unwrap();
        assert_eq!(calls[0].caller_id.as_deref(), Some("desktop"));
    }

    #[tokio::test]
    async fn test_transport_caller_id_wins_over_client_name() {
        let (dispatcher, _) = dispatcher();
        let session = Session::new(Some("header-id".to_string()));
        dispatcher
            .dispatch_text(
                r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"clientInfo":{"name":"desktop"}}}"#,
                &session,
            )
            .await;
        assert_eq!(session.caller_id().await.as_deref(), Some("header-id"));
    }

    #[tokio::test]
    async fn test_tool_call_receives_raw_envelope() {
        let (dispatcher, service) = dispatcher();
        let text = r#"{"jsonrpc":"2.0","id":"req-1","method":"tools/call","params":{"name":"x","arguments":{"a":1}}}"#;
        let reply = dispatcher.dispatch_text(text, &Session::new(None)).await.unwrap();
        let reply = serde_json::to_value(reply).unwrap();
        assert_eq!(reply["result"]["echo"], "x");

        let calls = service.calls.lock().unwrap();
        assert_eq!(calls[0].request, serde_json::from_str::<Value>(text).unwrap());
        assert_eq!(calls[0].arguments(), Some(&json!({"a": 1})));
        assert_eq!(calls[0].response_id(), json!("req-1"));
    }

    #[tokio::test]
    async fn test_tool_error_becomes_error_envelope() {
        let reply = dispatch(
            r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"fail","arguments":{}}}"#,
        )
        .await;
        assert_eq!(reply["id"], 3);
        assert_eq!(reply["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn test_notifications_are_not_answered() {
        let (dispatcher, _) = dispatcher();
        let reply = dispatcher
            .dispatch_text(
                r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
                &Session::new(None),
            )
            .await;
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn test_notification_method_with_id_is_answered() {
        let reply = dispatch(r#"{"jsonrpc":"2.0","id":9,"method":"notifications/whatever"}"#).await;
        assert_eq!(reply["id"], 9);
        assert_eq!(reply["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_parse_error() {
        let (dispatcher, service) = dispatcher();
        let reply = dispatcher
            .dispatch_slice(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"\xff\"}", &Session::new(None))
            .await;
        let reply = serde_json::to_value(reply.unwrap()).unwrap();
        assert_eq!(reply["id"], Value::Null);
        assert_eq!(reply["error"]["code"], -32700);
        assert!(service.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tool_call_notification_runs_without_reply() {
        let (dispatcher, service) = dispatcher();
        let reply = dispatcher
            .dispatch_text(
                r#"{"jsonrpc":"2.0","method":"tools/call","params":{"name":"x"}}"#,
                &Session::new(None),
            )
            .await;
        assert!(reply.is_none());
        assert_eq!(service.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_batch_answers_each_request() {
        let reply = dispatch(
            r#"[
                {"jsonrpc":"2.0","id":1,"method":"ping"},
                {"jsonrpc":"2.0","method":"notifications/initialized"},
                {"jsonrpc":"2.0","id":2,"method":"nope"}
            ]"#,
        )
        .await;
        let responses = reply.as_array().unwrap();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[1]["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn test_empty_batch_is_invalid_request() {
        let reply = dispatch("[]").await;
        assert_eq!(reply["error"]["code"], -32600);
    }

    #[test]
    fn test_health_name_derives_from_server_name() {
        assert_eq!(EchoService::new().service_name(), "echo-mcp");
    }
}
