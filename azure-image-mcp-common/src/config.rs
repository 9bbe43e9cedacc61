//! Configuration module for loading environment variables and settings.

use crate::error::ConfigError;
use crate::models::{DEFAULT_API_VERSION, DEFAULT_MODEL, ImageSize};
use std::path::PathBuf;
use std::time::Duration;

/// Default per-request deadline for the upstream image API, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

/// Default root directory for audit records.
pub const DEFAULT_AUDIT_DIR: &str = "audit";

/// Minimum accepted API key length.
const MIN_API_KEY_LEN: usize = 10;

/// Application configuration loaded from environment variables.
#[derive(Clone)]
pub struct Config {
    /// Base URL of the Azure AI service (required)
    pub base_url: String,
    /// API key for the Azure AI service (required)
    pub api_key: String,
    /// Deployment name (required)
    pub deployment_name: String,
    /// Model name sent with each request
    pub model: String,
    /// Azure OpenAI API version query parameter
    pub api_version: String,
    /// Size used by `generate_image` when the caller omits one
    pub default_size: ImageSize,
    /// Per-request deadline for the upstream call, in seconds
    pub request_timeout_secs: u64,
    /// Root directory for audit records
    pub audit_dir: PathBuf,
    /// Whether audit records are written at all
    pub audit_enabled: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("base_url", &self.base_url)
            .field("api_key", &self.masked_api_key())
            .field("deployment_name", &self.deployment_name)
            .field("model", &self.model)
            .field("api_version", &self.api_version)
            .field("default_size", &self.default_size)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("audit_dir", &self.audit_dir)
            .field("audit_enabled", &self.audit_enabled)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables and .env file.
    ///
    /// # Errors
    /// Returns `ConfigError::MissingEnvVar` if `AZURE_BASE_URL`, `AZURE_API_KEY`
    /// or `AZURE_DEPLOYMENT_NAME` is not set, and `ConfigError::InvalidValue`
    /// if any value fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    ///
    /// Blank values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |name: &str| get(name).ok_or_else(|| ConfigError::missing_env_var(name));

        let base_url = require("AZURE_BASE_URL")?;
        let api_key = require("AZURE_API_KEY")?;
        let deployment_name = require("AZURE_DEPLOYMENT_NAME")?;

        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::invalid_value(
                "AZURE_BASE_URL",
                "must be a valid HTTP/HTTPS URL",
            ));
        }

        if api_key.len() < MIN_API_KEY_LEN {
            return Err(ConfigError::invalid_value(
                "AZURE_API_KEY",
                "is too short, please check the API key",
            ));
        }

        let model = get("AZURE_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let api_version = get("AZURE_API_VERSION").unwrap_or_else(|| DEFAULT_API_VERSION.to_string());

        let default_size = match get("DEFAULT_IMAGE_SIZE") {
            Some(raw) => raw
                .parse::<ImageSize>()
                .map_err(|e| ConfigError::invalid_value("DEFAULT_IMAGE_SIZE", e.to_string()))?,
            None => ImageSize::default(),
        };

        let request_timeout_secs = match get("REQUEST_TIMEOUT_SECS") {
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    return Err(ConfigError::invalid_value(
                        "REQUEST_TIMEOUT_SECS",
                        format!("expected a positive number of seconds, got '{}'", raw),
                    ));
                }
            },
            None => DEFAULT_REQUEST_TIMEOUT_SECS,
        };

        let audit_dir = get("AUDIT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_AUDIT_DIR));

        let audit_enabled = match get("AUDIT_ENABLED") {
            Some(raw) => parse_bool(&raw)
                .ok_or_else(|| ConfigError::invalid_value("AUDIT_ENABLED", format!("expected true or false, got '{}'", raw)))?,
            None => true,
        };

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            deployment_name,
            model,
            api_version,
            default_size,
            request_timeout_secs,
            audit_dir,
            audit_enabled,
        })
    }

    /// Get the image API endpoint for an operation (`generations` or `edits`).
    pub fn images_endpoint(&self, operation: &str) -> String {
        format!(
            "{}/openai/deployments/{}/images/{}",
            self.base_url, self.deployment_name, operation
        )
    }

    /// The upstream deadline as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// API key with everything but the last four characters masked.
    pub fn masked_api_key(&self) -> String {
        let total = self.api_key.chars().count();
        let masked = total.saturating_sub(4);
        let tail: String = self.api_key.chars().skip(masked).collect();
        format!("{}{}", "*".repeat(masked), tail)
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
