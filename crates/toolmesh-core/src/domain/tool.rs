//! Tool and resource surface types.

use serde::{Deserialize, Serialize};

/// Tool definition discovered from a tool server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDef {
    /// Tool name (function name).
    pub name: String,

    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// JSON Schema for input parameters. Adapters normalize this to
    /// always be present (an empty object schema when the server
    /// declared none).
    #[serde(rename = "inputSchema", skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<serde_json::Value>,
}

impl ToolDef {
    /// Create a new tool definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema: None,
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Set the input schema.
    #[must_use]
    pub fn with_input_schema(mut self, schema: serde_json::Value) -> Self {
        self.input_schema = Some(schema);
        self
    }
}

/// Readable resource exposed by a tool server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDef {
    /// Resource URI, unique within its server.
    pub uri: String,

    /// Human-readable name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// MIME type of the resource contents.
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl ResourceDef {
    /// Create a new resource definition.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            name: None,
            description: None,
            mime_type: None,
        }
    }
}

/// Normalized result of a tool invocation.
///
/// Every adapter produces exactly one variant; failures below the manager
/// boundary become `Error` rather than propagating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolCallResult {
    /// Plain text payload.
    Text {
        /// Result text (often JSON produced by the tool).
        value: String,
    },
    /// Image payload referenced by URL.
    Image {
        /// MIME type of the image.
        mime: String,
        /// Location of the image data.
        url: String,
    },
    /// Reference to a server resource.
    Resource {
        /// Resource URI.
        #[serde(rename = "ref")]
        reference: String,
    },
    /// The call failed; `message` is a short human-readable reason.
    Error {
        /// Failure description.
        message: String,
    },
}

impl ToolCallResult {
    /// Create a text result.
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text {
            value: value.into(),
        }
    }

    /// Create an image result.
    pub fn image(mime: impl Into<String>, url: impl Into<String>) -> Self {
        Self::Image {
            mime: mime.into(),
            url: url.into(),
        }
    }

    /// Create a resource result.
    pub fn resource(reference: impl Into<String>) -> Self {
        Self::Resource {
            reference: reference.into(),
        }
    }

    /// Create an error result.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Whether this result is the error variant.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// The text payload, if this is a text result.
    #[must_use]
    pub fn text_value(&self) -> Option<&str> {
        match self {
            Self::Text { value } => Some(value),
            _ => None,
        }
    }
}
