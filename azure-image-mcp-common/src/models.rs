//! Model and canvas definitions for the Azure image deployment.
//!
//! The deployment only renders onto a fixed set of canvases, so every size that
//! crosses the wire is expressed as an [`ImageSize`] rather than a free-form
//! `WIDTHxHEIGHT` string.

use schemars::JsonSchema;
use schemars::r#gen::SchemaGenerator;
use schemars::schema::{InstanceType, Schema, SchemaObject};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default model sent alongside every request.
pub const DEFAULT_MODEL: &str = "flux.1-kontext-pro";

/// Default Azure OpenAI API version.
pub const DEFAULT_API_VERSION: &str = "2025-04-01-preview";

/// Canvas sizes accepted by the upstream image API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ImageSize {
    /// 1024x1024
    #[default]
    #[serde(rename = "1024x1024")]
    Square,
    /// 1792x1024
    #[serde(rename = "1792x1024")]
    Landscape,
    /// 1024x1792
    #[serde(rename = "1024x1792")]
    Portrait,
}

impl ImageSize {
    /// All supported sizes, in the order they are advertised.
    pub const ALL: [ImageSize; 3] = [ImageSize::Square, ImageSize::Landscape, ImageSize::Portrait];

    /// Wire representation, e.g. `"1792x1024"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageSize::Square => "1024x1024",
            ImageSize::Landscape => "1792x1024",
            ImageSize::Portrait => "1024x1792",
        }
    }

    /// Width and height in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            ImageSize::Square => (1024, 1024),
            ImageSize::Landscape => (1792, 1024),
            ImageSize::Portrait => (1024, 1792),
        }
    }

    /// Returns the size whose canvas is exactly `width` x `height`.
    pub fn from_dimensions(width: u32, height: u32) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|size| size.dimensions() == (width, height))
    }

    /// Wire names of all supported sizes.
    pub fn names() -> [&'static str; 3] {
        Self::ALL.map(|size| size.as_str())
    }
}

// Advertised as a plain string enum of wire names, inlined at every use.
impl JsonSchema for ImageSize {
    fn schema_name() -> String {
        "ImageSize".to_string()
    }

    fn is_referenceable() -> bool {
        false
    }

    fn json_schema(_: &mut SchemaGenerator) -> Schema {
        SchemaObject {
            instance_type: Some(InstanceType::String.into()),
            enum_values: Some(Self::names().into_iter().map(Into::into).collect()),
            ..Default::default()
        }
        .into()
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unsupported size string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownImageSize(pub String);

impl fmt::Display for UnknownImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Unsupported image size '{}'. Supported sizes: {}",
            self.0,
            ImageSize::names().join(", ")
        )
    }
}

impl std::error::Error for UnknownImageSize {}

impl FromStr for ImageSize {
    type Err = UnknownImageSize;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|size| size.as_str() == s.trim())
            .ok_or_else(|| UnknownImageSize(s.to_string()))
    }
}
