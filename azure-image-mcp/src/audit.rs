//! Per-call audit records.
//!
//! Each tool call gets its own directory under the audit root:
//!
//! ```text
//! {YYYYMMDD_HHMMSS}_{token}_{caller_id|anonymous}_{tool_name}/
//!     request.json
//!     input_base64_data.png | input_<basename>
//!     result.png | output_<basename>
//!     response.json
//! ```
//!
//! Directories are created exclusively, so two calls can never share one; a
//! name collision draws a fresh token. Recording is best-effort: every failure
//! is logged and swallowed, and never reaches the tool result.

use azure_image_mcp_common::config::Config;
use chrono::{DateTime, Local};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Caller segment used when no caller id is known.
pub const ANONYMOUS_CALLER: &str = "anonymous";

/// Tool segment used when the call did not name a tool.
pub const UNKNOWN_TOOL: &str = "unknown";

/// Length of the random token in directory names.
pub const TOKEN_LEN: usize = 8;

const MAX_CREATE_ATTEMPTS: usize = 8;
const MAX_SEGMENT_LEN: usize = 64;

/// Source of timestamps for directory names.
pub type Clock = Arc<dyn Fn() -> DateTime<Local> + Send + Sync>;

/// Source of random tokens for directory names.
pub type TokenSource = Arc<dyn Fn() -> String + Send + Sync>;

/// Audit write failures. Never surfaced to callers.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Failed to create audit directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Audit directory name still taken after {0} attempts")]
    Exhausted(usize),

    #[error("Failed to write audit file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize audit payload: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Which side of the call an image belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageRole {
    Input,
    Output,
}

/// The audit record of one in-flight call.
#[derive(Debug, Clone)]
pub struct AuditHandle {
    id: String,
    dir: Option<PathBuf>,
}

impl AuditHandle {
    /// The audit id, which is also the directory name.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The record's directory, `None` when auditing is off or creation failed.
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }
}

/// Writes audit records under a root directory.
#[derive(Clone)]
pub struct AuditRecorder {
    root: PathBuf,
    enabled: bool,
    clock: Clock,
    tokens: TokenSource,
}

impl std::fmt::Debug for AuditRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditRecorder")
            .field("root", &self.root)
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl AuditRecorder {
    /// Create an enabled recorder writing under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            enabled: true,
            clock: Arc::new(Local::now),
            tokens: Arc::new(random_token),
        }
    }

    /// Create a recorder from the audit settings in `config`.
    pub fn from_config(config: &Config) -> Self {
        let mut recorder = Self::new(&config.audit_dir);
        recorder.enabled = config.audit_enabled;
        recorder
    }

    /// A recorder that never touches the file system.
    pub fn disabled() -> Self {
        let mut recorder = Self::new(PathBuf::new());
        recorder.enabled = false;
        recorder
    }

    /// Replace the clock used for directory timestamps.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the random token source.
    pub fn with_token_source(mut self, tokens: TokenSource) -> Self {
        self.tokens = tokens;
        self
    }

    /// Directory under which per-call directories are created.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether calls are recorded at all.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Create the directory for a new call.
    ///
    /// Always returns a handle; if the directory could not be created the
    /// failure is logged and later writes through the handle are skipped.
    pub async fn begin(&self, tool_name: Option<&str>, caller_id: Option<&str>) -> AuditHandle {
        let tool = sanitize_segment(tool_name.unwrap_or(UNKNOWN_TOOL), UNKNOWN_TOOL);
        let caller = sanitize_segment(caller_id.unwrap_or(ANONYMOUS_CALLER), ANONYMOUS_CALLER);

        if !self.enabled {
            return AuditHandle {
                id: self.next_id(&caller, &tool),
                dir: None,
            };
        }

        match self.create_unique_dir(&caller, &tool).await {
            Ok(handle) => {
                debug!(audit_id = %handle.id, "Audit record started");
                handle
            }
            Err(e) => {
                warn!(error = %e, "Audit directory could not be created");
                AuditHandle {
                    id: self.next_id(&caller, &tool),
                    dir: None,
                }
            }
        }
    }

    /// Write `request.json`.
    pub async fn record_request(&self, handle: &AuditHandle, payload: &Value) {
        self.record_json(handle, "request.json", payload).await;
    }

    /// Write `response.json`.
    pub async fn record_response(&self, handle: &AuditHandle, payload: &Value) {
        self.record_json(handle, "response.json", payload).await;
    }

    /// Write an image under the name given by [`image_file_name`].
    pub async fn record_image(
        &self,
        handle: &AuditHandle,
        role: ImageRole,
        bytes: &[u8],
        suggested_name: Option<&str>,
        extension: &str,
    ) {
        let name = image_file_name(role, suggested_name, extension);
        self.record_bytes(handle, &name, bytes).await;
    }

    async fn record_json(&self, handle: &AuditHandle, name: &str, payload: &Value) {
        match serde_json::to_vec_pretty(payload) {
            Ok(bytes) => self.record_bytes(handle, name, &bytes).await,
            Err(e) => warn!(error = %AuditError::from(e), file = name, "Audit payload skipped"),
        }
    }

    async fn record_bytes(&self, handle: &AuditHandle, name: &str, bytes: &[u8]) {
        let Some(dir) = handle.dir() else {
            return;
        };
        if let Err(e) = write_atomic(&dir.join(name), bytes).await {
            warn!(audit_id = %handle.id, error = %e, "Audit write failed");
        }
    }

    async fn create_unique_dir(&self, caller: &str, tool: &str) -> Result<AuditHandle, AuditError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| AuditError::CreateDir {
                path: self.root.clone(),
                source,
            })?;

        for attempt in 1..=MAX_CREATE_ATTEMPTS {
            let id = self.next_id(caller, tool);
            let dir = self.root.join(&id);
            match tokio::fs::create_dir(&dir).await {
                Ok(()) => return Ok(AuditHandle { id, dir: Some(dir) }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    debug!(audit_id = %id, attempt, "Audit directory collision, drawing new token");
                }
                Err(source) => return Err(AuditError::CreateDir { path: dir, source }),
            }
        }
        Err(AuditError::Exhausted(MAX_CREATE_ATTEMPTS))
    }

    fn next_id(&self, caller: &str, tool: &str) -> String {
        let timestamp = (self.clock)().format("%Y%m%d_%H%M%S");
        let token = sanitize_segment(&(self.tokens)(), "token");
        format!("{}_{}_{}_{}", timestamp, token, caller, tool)
    }
}

/// File name for an audited image.
///
/// Inputs are `input_<basename>` for path sources and
/// `input_base64_data.<extension>` for inline data; outputs are
/// `output_<basename>` when the caller chose an output path, `result.png`
/// otherwise.
pub fn image_file_name(role: ImageRole, suggested_name: Option<&str>, extension: &str) -> String {
    let basename = suggested_name
        .and_then(|name| Path::new(name).file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty());

    match (role, basename) {
        (ImageRole::Input, Some(name)) => format!("input_{}", name),
        (ImageRole::Input, None) => format!("input_base64_data.{}", extension),
        (ImageRole::Output, Some(name)) => format!("output_{}", name),
        (ImageRole::Output, None) => "result.png".to_string(),
    }
}

/// Reduce `raw` to `[A-Za-z0-9_-]`, falling back to `fallback` when nothing is left.
pub fn sanitize_segment(raw: &str, fallback: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .take(MAX_SEGMENT_LEN)
        .collect();
    if cleaned.trim_matches('_').is_empty() {
        fallback.to_string()
    } else {
        cleaned
    }
}

fn random_token() -> String {
    uuid::Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(TOKEN_LEN)
        .collect()
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), AuditError> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let partial = path.with_file_name(format!(".{}.partial", file_name));
    let write_err = |source: std::io::Error| AuditError::Write {
        path: path.to_path_buf(),
        source,
    };

    tokio::fs::write(&partial, bytes).await.map_err(write_err)?;
    tokio::fs::rename(&partial, path).await.map_err(write_err)
}
