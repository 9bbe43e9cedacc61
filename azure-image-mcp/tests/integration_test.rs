//! Integration tests for the azure-image-mcp server.
//!
//! The upstream image API is replaced by a wiremock server and audit records
//! land in a temporary directory, so these tests run without credentials.
//!
//! Run with: `cargo test --package azure-image-mcp --test integration_test`

use axum::body::Body;
use axum::http::{Request, StatusCode};
use azure_image_mcp::ImageServer;
use azure_image_mcp_common::config::Config;
use azure_image_mcp_common::models::{DEFAULT_API_VERSION, DEFAULT_MODEL, ImageSize};
use azure_image_mcp_common::{Dispatcher, Session, TransportMode, http_router};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use image::{ImageOutputFormat, Rgb, RgbImage};
use serde_json::{Value, json};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GENERATIONS_PATH: &str = "/openai/deployments/flux/images/generations";
const EDITS_PATH: &str = "/openai/deployments/flux/images/edits";

/// A PNG of the given dimensions.
fn png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([40, 120, 200]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageOutputFormat::Png)
        .expect("encode test PNG");
    buf.into_inner()
}

fn image_response(bytes: &[u8]) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "created": 1,
        "data": [{ "b64_json": BASE64.encode(bytes) }]
    }))
}

/// Everything one test needs: mock upstream, scratch space and a dispatcher.
struct Harness {
    upstream: MockServer,
    dir: TempDir,
    dispatcher: Dispatcher<ImageServer>,
}

impl Harness {
    async fn start(mode: TransportMode) -> Self {
        let upstream = MockServer::start().await;
        let dir = tempfile::tempdir().expect("create temp dir");
        let config = Config {
            base_url: upstream.uri(),
            api_key: "integration-key".to_string(),
            deployment_name: "flux".to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            default_size: ImageSize::Square,
            request_timeout_secs: 10,
            audit_dir: dir.path().join("audit"),
            audit_enabled: true,
        };
        let server = ImageServer::new(config, mode).expect("build server");
        Self {
            upstream,
            dir,
            dispatcher: Dispatcher::new(Arc::new(server)),
        }
    }

    fn audit_root(&self) -> PathBuf {
        self.dir.path().join("audit")
    }

    fn audit_dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = std::fs::read_dir(self.audit_root())
            .map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.path()).collect())
            .unwrap_or_default();
        dirs.sort();
        dirs
    }

    async fn call(&self, id: u64, tool: &str, arguments: Value) -> Value {
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tools/call",
            "params": { "name": tool, "arguments": arguments }
        });
        self.send(&request.to_string()).await
    }

    async fn send(&self, text: &str) -> Value {
        let session = Session::new(Some("integration".to_string()));
        let reply = self
            .dispatcher
            .dispatch_text(text, &session)
            .await
            .expect("request should be answered");
        serde_json::to_value(reply).expect("serialize reply")
    }
}

fn read_json(path: &Path) -> Value {
    serde_json::from_slice(&std::fs::read(path).expect("read audit file")).expect("parse audit file")
}

fn decoded_dimensions(result: &Value) -> (u32, u32) {
    let data = result["content"][1]["data"].as_str().expect("image content");
    let bytes = BASE64.decode(data).expect("valid base64");
    let img = image::load_from_memory(&bytes).expect("decodable image");
    (img.width(), img.height())
}

#[tokio::test]
async fn test_generate_image_is_returned_and_audited() {
    let harness = Harness::start(TransportMode::Stdio).await;
    Mock::given(method("POST"))
        .and(path(GENERATIONS_PATH))
        .respond_with(image_response(&png(8, 8)))
        .expect(1)
        .mount(&harness.upstream)
        .await;

    let response = harness
        .call(1, "generate_image", json!({ "prompt": "a lighthouse at dusk" }))
        .await;
    assert_eq!(response["id"], 1);
    let result = &response["result"];
    assert_eq!(result["content"][0]["type"], "text");
    assert_eq!(result["content"][1]["type"], "image");
    assert_eq!(result["content"][1]["mimeType"], "image/png");

    let dirs = harness.audit_dirs();
    assert_eq!(dirs.len(), 1);
    let dir = &dirs[0];
    assert!(
        dir.file_name().unwrap().to_string_lossy().ends_with("_integration_generate_image"),
        "unexpected audit dir {:?}",
        dir
    );
    assert!(dir.join("result.png").is_file());

    let request = read_json(&dir.join("request.json"));
    assert_eq!(request["params"]["arguments"]["prompt"], "a lighthouse at dusk");
    let recorded = read_json(&dir.join("response.json"));
    assert_eq!(recorded["id"], 1);
    assert!(recorded.get("result").is_some());
}

#[tokio::test]
async fn test_edit_preserves_source_dimensions() {
    let harness = Harness::start(TransportMode::Stdio).await;
    Mock::given(method("POST"))
        .and(path(EDITS_PATH))
        .respond_with(image_response(&png(16, 28)))
        .expect(1)
        .mount(&harness.upstream)
        .await;

    let source = harness.dir.path().join("source.png");
    std::fs::write(&source, png(512, 768)).unwrap();
    let output = harness.dir.path().join("nested").join("out.jpg");

    let response = harness
        .call(
            2,
            "edit_image",
            json!({
                "prompt": "make the sky purple",
                "image_path": source.display().to_string(),
                "output_path": output.display().to_string()
            }),
        )
        .await;
    let result = &response["result"];
    assert_eq!(decoded_dimensions(result), (512, 768));
    assert_eq!(result["structuredContent"]["size"], "512x768");
    assert_eq!(result["structuredContent"]["saved_to"], output.display().to_string());

    let saved = image::load_from_memory(&std::fs::read(&output).unwrap()).unwrap();
    assert_eq!((saved.width(), saved.height()), (512, 768));

    let dirs = harness.audit_dirs();
    assert_eq!(dirs.len(), 1);
    assert!(dirs[0].join("input_source.png").is_file());
    assert!(dirs[0].join("output_out.jpg").is_file());
}

#[tokio::test]
async fn test_edit_with_explicit_size_uses_that_size() {
    let harness = Harness::start(TransportMode::Stdio).await;
    Mock::given(method("POST"))
        .and(path(EDITS_PATH))
        .respond_with(image_response(&png(32, 18)))
        .expect(1)
        .mount(&harness.upstream)
        .await;

    let response = harness
        .call(
            3,
            "edit_image",
            json!({
                "prompt": "add a boat",
                "image_data_base64": BASE64.encode(png(64, 64)),
                "size": "1792x1024"
            }),
        )
        .await;
    assert_eq!(decoded_dimensions(&response["result"]), (1792, 1024));

    let dirs = harness.audit_dirs();
    assert!(dirs[0].join("input_base64_data.png").is_file());
    assert!(dirs[0].join("result.png").is_file());
}

#[tokio::test]
async fn test_upstream_failure_is_recorded() {
    let harness = Harness::start(TransportMode::Stdio).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model overloaded"))
        .mount(&harness.upstream)
        .await;

    let response = harness
        .call(4, "generate_image", json!({ "prompt": "a forest" }))
        .await;
    assert_eq!(response["error"]["code"], -32003);
    assert_eq!(response["error"]["data"]["status"], 500);

    let dirs = harness.audit_dirs();
    let recorded = read_json(&dirs[0].join("response.json"));
    assert_eq!(recorded["error"]["code"], -32003);
    assert!(!dirs[0].join("result.png").exists());
}

#[tokio::test]
async fn test_generate_with_undecodable_image_is_decode_error() {
    let harness = Harness::start(TransportMode::Stdio).await;
    Mock::given(method("POST"))
        .and(path(GENERATIONS_PATH))
        .respond_with(image_response(b"definitely not an image"))
        .expect(1)
        .mount(&harness.upstream)
        .await;

    let response = harness
        .call(6, "generate_image", json!({ "prompt": "a glitch" }))
        .await;
    assert_eq!(response["error"]["code"], -32004);
    assert!(
        response["error"]["message"].as_str().unwrap().contains("could not be decoded"),
        "got {}",
        response
    );

    let dirs = harness.audit_dirs();
    assert_eq!(dirs.len(), 1);
    assert!(!dirs[0].join("result.png").exists());
}

#[tokio::test]
async fn test_http_tools_list_advertises_inline_data_only() {
    let harness = Harness::start(TransportMode::Http).await;
    let listed = harness
        .send(r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#)
        .await;
    let edit = &listed["result"]["tools"][1]["inputSchema"];
    assert!(edit["properties"].get("image_data_base64").is_some());
    assert!(!edit.to_string().contains("image_path"));
}

#[tokio::test]
async fn test_tools_list_and_unknown_method() {
    let harness = Harness::start(TransportMode::Stdio).await;

    let listed = harness
        .send(r#"{"jsonrpc":"2.0","id":"a","method":"tools/list"}"#)
        .await;
    let tools = listed["result"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 2);
    assert_eq!(tools[0]["name"], "generate_image");
    assert_eq!(tools[1]["name"], "edit_image");
    let sources: Vec<&Value> = tools[1]["inputSchema"]["anyOf"]
        .as_array()
        .expect("stdio edit offers alternative sources")
        .iter()
        .flat_map(|branch| branch["required"].as_array().into_iter().flatten())
        .collect();
    assert_eq!(sources, vec!["image_path", "image_data_base64"]);

    let unknown = harness
        .send(r#"{"jsonrpc":"2.0","id":"b","method":"resources/list"}"#)
        .await;
    assert_eq!(unknown["id"], "b");
    assert_eq!(unknown["error"]["code"], -32601);
    assert!(harness.audit_dirs().is_empty());
}

#[tokio::test]
async fn test_http_edit_rejects_image_path() {
    let harness = Harness::start(TransportMode::Http).await;
    let router = http_router(harness.dispatcher.clone());

    let body = json!({
        "jsonrpc": "2.0",
        "id": 5,
        "method": "tools/call",
        "params": {
            "name": "edit_image",
            "arguments": { "prompt": "x", "image_path": "/etc/hosts" }
        }
    });
    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/")
                .header("content-type", "application/json")
                .header("x-caller-id", "web-client")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let reply: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(reply["error"]["code"], -32602);

    let dirs = harness.audit_dirs();
    assert_eq!(dirs.len(), 1);
    assert!(dirs[0].to_string_lossy().ends_with("_web-client_edit_image"));
}

#[tokio::test]
async fn test_concurrent_calls_get_distinct_audit_dirs() {
    let harness = Harness::start(TransportMode::Stdio).await;
    Mock::given(method("POST"))
        .and(path(GENERATIONS_PATH))
        .respond_with(image_response(&png(4, 4)))
        .mount(&harness.upstream)
        .await;

    let mut tasks = Vec::new();
    for id in 0..8u64 {
        let dispatcher = harness.dispatcher.clone();
        tasks.push(tokio::spawn(async move {
            let request = json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": "tools/call",
                "params": { "name": "generate_image", "arguments": { "prompt": "tile" } }
            });
            let session = Session::new(Some("integration".to_string()));
            dispatcher.dispatch_text(&request.to_string(), &session).await
        }));
    }
    for task in tasks {
        let reply = serde_json::to_value(task.await.unwrap().unwrap()).unwrap();
        assert!(reply.get("result").is_some(), "got {}", reply);
    }

    let dirs = harness.audit_dirs();
    assert_eq!(dirs.len(), 8);
    for dir in dirs {
        assert!(dir.join("request.json").is_file());
        assert!(dir.join("response.json").is_file());
    }
}
