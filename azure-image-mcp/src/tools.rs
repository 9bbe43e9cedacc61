//! Tool registry and declarative parameter validation.
//!
//! The registry is built once at startup for a given transport and is
//! read-only afterwards. Advertised schemas are derived from the argument
//! types; every argument check happens here, before a tool body runs, and
//! every violation is reported as `Error::InvalidParams`.

use crate::payload::ImageSource;
use azure_image_mcp_common::error::Error;
use azure_image_mcp_common::models::ImageSize;
use azure_image_mcp_common::transport::TransportMode;
use rmcp::model::Tool;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::borrow::Cow;
use std::sync::Arc;

/// Name of the text-to-image tool.
pub const GENERATE_IMAGE: &str = "generate_image";

/// Name of the image editing tool.
pub const EDIT_IMAGE: &str = "edit_image";

/// JSON type of a declared parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
}

impl ParamType {
    fn json_name(&self) -> &'static str {
        match self {
            ParamType::String => "string",
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
        }
    }
}

/// Validation rule for one tool parameter.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub param_type: ParamType,
    pub required: bool,
    /// Closed set of accepted values, if any.
    pub allowed: Option<Vec<&'static str>>,
    /// Reject blank strings.
    pub non_empty: bool,
}

impl ParamSpec {
    fn string(name: &'static str) -> Self {
        Self {
            name,
            param_type: ParamType::String,
            required: false,
            allowed: None,
            non_empty: false,
        }
    }

    fn required(mut self) -> Self {
        self.required = true;
        self.non_empty = true;
        self
    }

    fn non_empty(mut self) -> Self {
        self.non_empty = true;
        self
    }

    fn sizes(mut self) -> Self {
        self.allowed = Some(ImageSize::names().to_vec());
        self
    }

    fn check(&self, value: &Value) -> Result<(), Error> {
        if !self.param_type.accepts(value) {
            return Err(Error::invalid_params(format!(
                "'{}' must be a {}",
                self.name,
                self.param_type.json_name()
            )));
        }
        let text = value.as_str().unwrap_or_default();
        if self.non_empty && text.trim().is_empty() {
            return Err(Error::invalid_params(format!("'{}' cannot be empty", self.name)));
        }
        if let Some(allowed) = &self.allowed {
            if !allowed.iter().any(|candidate| *candidate == text) {
                return Err(Error::invalid_params(format!(
                    "Invalid {} '{}'. Supported values: {}",
                    self.name,
                    text,
                    allowed.join(", ")
                )));
            }
        }
        Ok(())
    }
}

/// Static description of one tool's contract.
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: &'static str,
    pub description: &'static str,
    /// JSON Schema advertised as `inputSchema`.
    pub input_schema: Map<String, Value>,
    pub params: Vec<ParamSpec>,
    /// Parameters of which exactly one must be present.
    pub one_of: Vec<&'static str>,
    /// Parameters refused on this transport, with the reason.
    pub rejected: Vec<(&'static str, &'static str)>,
}

impl ToolSchema {
    /// The JSON Schema advertised as `inputSchema`.
    pub fn input_schema(&self) -> &Map<String, Value> {
        &self.input_schema
    }

    /// The MCP tool descriptor.
    pub fn to_tool(&self) -> Tool {
        Tool {
            name: Cow::Borrowed(self.name),
            description: Some(Cow::Borrowed(self.description)),
            input_schema: Arc::new(self.input_schema.clone()),
            annotations: None,
            icons: None,
            meta: None,
            output_schema: None,
            title: None,
        }
    }

    /// Check `arguments` against the declared parameters.
    ///
    /// Returns the arguments with `null` members removed.
    pub fn validate(&self, arguments: Option<&Value>) -> Result<Map<String, Value>, Error> {
        let mut args = match arguments {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(_) => return Err(Error::invalid_params("'arguments' must be an object")),
        };
        args.retain(|_, value| !value.is_null());

        for (name, reason) in &self.rejected {
            if args.contains_key(*name) {
                return Err(Error::invalid_params(format!("'{}' is not accepted: {}", name, reason)));
            }
        }

        for param in &self.params {
            match args.get(param.name) {
                Some(value) => param.check(value)?,
                None if param.required => {
                    return Err(Error::invalid_params(format!(
                        "Missing required parameter '{}'",
                        param.name
                    )));
                }
                None => {}
            }
        }

        if !self.one_of.is_empty() {
            let present = self.one_of.iter().filter(|name| args.contains_key(**name)).count();
            if present != 1 {
                return Err(Error::invalid_params(format!(
                    "Exactly one of {} must be provided",
                    self.one_of.join(", ")
                )));
            }
        }

        Ok(args)
    }

    /// Validate and deserialize into typed arguments.
    pub fn parse<T: DeserializeOwned>(&self, arguments: Option<&Value>) -> Result<T, Error> {
        let args = self.validate(arguments)?;
        serde_json::from_value(Value::Object(args))
            .map_err(|e| Error::invalid_params(format!("Invalid parameters: {}", e)))
    }
}

/// Which handler a tool name resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Generate,
    Edit,
}

/// Generate images from text prompts.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GenerateImageArgs {
    /// English description for image generation
    pub prompt: String,

    /// Image size
    pub size: Option<ImageSize>,

    /// Optional output file path (saved server-side). Image data is always returned to the client.
    pub output_path: Option<String>,
}

/// Where `edit_image` reads its source image from.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum EditSource {
    /// Read the source image from a file.
    Path {
        /// Path to the image file to edit
        image_path: String,
    },
    /// Decode the source image from the request.
    Inline {
        /// Base64 encoded image data. Supports both raw base64 (iVBORw0K...) and Data URL format (data:image/png;base64,iVBORw0K...)
        image_data_base64: String,
    },
}

/// Edit an existing image, keeping its dimensions unless a size is given.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct EditImageArgs {
    /// English description of how to edit the image
    pub prompt: String,

    #[serde(flatten)]
    pub source: EditSource,

    /// Optional size for the edited image; if not specified the original image dimensions are kept
    pub size: Option<ImageSize>,

    /// Optional output file path (saved server-side). Image data is always returned to the client.
    pub output_path: Option<String>,
}

impl EditImageArgs {
    /// The tagged image source.
    pub fn source(&self) -> ImageSource {
        match &self.source {
            EditSource::Path { image_path } => ImageSource::Path(image_path.clone()),
            EditSource::Inline { image_data_base64 } => ImageSource::inline(image_data_base64.clone()),
        }
    }
}

/// Edit an uploaded image, keeping its dimensions unless a size is given.
///
/// The HTTP transport only takes inline image data.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct HttpEditImageArgs {
    /// English description of how to edit the image
    pub prompt: String,

    /// Base64 encoded image data. Supports both raw base64 (iVBORw0K...) and Data URL format (data:image/png;base64,iVBORw0K...)
    pub image_data_base64: String,

    /// Optional size for the edited image; if not specified the original image dimensions are kept
    pub size: Option<ImageSize>,

    /// Optional output file path (saved server-side). Image data is always returned to the client.
    pub output_path: Option<String>,
}

impl From<HttpEditImageArgs> for EditImageArgs {
    fn from(args: HttpEditImageArgs) -> Self {
        Self {
            prompt: args.prompt,
            source: EditSource::Inline {
                image_data_base64: args.image_data_base64,
            },
            size: args.size,
            output_path: args.output_path,
        }
    }
}

/// The fixed set of tools for one transport.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    mode: TransportMode,
    entries: Vec<(ToolKind, ToolSchema)>,
}

impl ToolRegistry {
    /// Build the registry for `mode`, advertising `default_size` for generation.
    pub fn new(mode: TransportMode, default_size: ImageSize) -> Self {
        Self {
            mode,
            entries: vec![
                (ToolKind::Generate, generate_schema(default_size)),
                (ToolKind::Edit, edit_schema(mode)),
            ],
        }
    }

    /// The transport these tools were built for.
    pub fn mode(&self) -> TransportMode {
        self.mode
    }

    /// All tool schemas, in advertised order.
    pub fn describe(&self) -> impl Iterator<Item = &ToolSchema> {
        self.entries.iter().map(|(_, schema)| schema)
    }

    /// Look up a tool by name.
    pub fn resolve(&self, name: &str) -> Result<(ToolKind, &ToolSchema), Error> {
        self.entries
            .iter()
            .find(|(_, schema)| schema.name == name)
            .map(|(kind, schema)| (*kind, schema))
            .ok_or_else(|| Error::not_found(format!("Unknown tool: {}", name)))
    }
}

/// JSON Schema object for a parameter type.
fn input_schema_for<T: JsonSchema>() -> Map<String, Value> {
    use schemars::schema_for;

    let schema = schema_for!(T);
    match serde_json::to_value(&schema).unwrap_or_default() {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn generate_schema(default_size: ImageSize) -> ToolSchema {
    let mut input_schema = input_schema_for::<GenerateImageArgs>();
    if let Some(size) = input_schema
        .get_mut("properties")
        .and_then(|properties| properties.get_mut("size"))
        .and_then(Value::as_object_mut)
    {
        size.insert(
            "description".into(),
            json!(format!(
                "Image size, supports {}, default: {}",
                ImageSize::names().join(", "),
                default_size
            )),
        );
        size.insert("default".into(), json!(default_size));
    }

    ToolSchema {
        name: GENERATE_IMAGE,
        description: "Generate images from text prompts using Azure AI Foundry (English prompts only)",
        input_schema,
        params: vec![
            ParamSpec::string("prompt").required(),
            ParamSpec::string("size").sizes(),
            ParamSpec::string("output_path"),
        ],
        one_of: Vec::new(),
        rejected: Vec::new(),
    }
}

fn edit_schema(mode: TransportMode) -> ToolSchema {
    let mut params = vec![
        ParamSpec::string("prompt").required(),
        ParamSpec::string("size").sizes(),
        ParamSpec::string("output_path"),
    ];

    match mode {
        TransportMode::Stdio => {
            params.push(ParamSpec::string("image_path").non_empty());
            params.push(ParamSpec::string("image_data_base64").non_empty());
            ToolSchema {
                name: EDIT_IMAGE,
                description: "Edit an existing image using Azure AI Foundry with dimension preservation (English prompts only)",
                input_schema: input_schema_for::<EditImageArgs>(),
                params,
                one_of: vec!["image_path", "image_data_base64"],
                rejected: Vec::new(),
            }
        }
        TransportMode::Http => {
            params.push(ParamSpec::string("image_data_base64").required());
            ToolSchema {
                name: EDIT_IMAGE,
                description: "Edit an existing image with dimension preservation. Upload image data using base64 encoding.",
                input_schema: input_schema_for::<HttpEditImageArgs>(),
                params,
                one_of: Vec::new(),
                rejected: vec![(
                    "image_path",
                    "the HTTP transport cannot read the caller's file system, send image_data_base64 instead",
                )],
            }
        }
    }
}
