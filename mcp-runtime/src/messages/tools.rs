//! Tool discovery and invocation message types.
//!
//! Tools are server-offered operations. A `tools/call` on a synchronous tool
//! returns content directly; on an asynchronous tool it returns a task
//! descriptor immediately and the content is fetched later via `tasks/result`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::tasks::Task;

/// Tool definition as exposed by `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    /// Unique name of the tool
    pub name: String,

    /// Human-readable description of what the tool does
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// JSON Schema for the tool's input parameters
    #[serde(rename = "inputSchema", skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
}

impl Tool {
    /// Create a new tool definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema: None,
        }
    }

    /// Set the description for this tool.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the input schema for this tool.
    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = Some(schema);
        self
    }
}

/// Result payload of `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListToolsResponse {
    /// The registered tools
    pub tools: Vec<Tool>,
}

/// Parameters of `tools/call`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallToolRequest {
    /// Name of the tool to call
    pub name: String,

    /// Arguments to pass to the tool, as a JSON object
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

/// Result payload of `tools/call`.
///
/// For asynchronous tools `content` may be empty and `task` carries the
/// descriptor the client polls with `tasks/*`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallToolResponse {
    /// Content produced by the tool
    #[serde(default)]
    pub content: Vec<ToolContent>,

    /// Whether the content describes a tool-level failure
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,

    /// Task descriptor, present when the tool runs asynchronously
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<Task>,
}

impl CallToolResponse {
    /// A synchronous success response carrying the given content.
    pub fn content(content: Vec<ToolContent>) -> Self {
        Self {
            content,
            is_error: Some(false),
            task: None,
        }
    }
}

/// One content item produced by a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ToolContent {
    /// Plain text content
    #[serde(rename = "text")]
    Text {
        /// The text payload
        text: String,
    },

    /// Image content
    #[serde(rename = "image")]
    Image {
        /// Base64-encoded image data
        data: String,

        /// MIME type of the image
        #[serde(rename = "mimeType")]
        mime_type: String,
    },

    /// Embedded resource content
    #[serde(rename = "resource")]
    Resource {
        /// The embedded resource
        resource: super::resources::ResourceContent,
    },
}

impl ToolContent {
    /// Create a text content item.
    pub fn text(text: impl Into<String>) -> Self {
        ToolContent::Text { text: text.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_call_tool_response_wire_shape() {
        let response = CallToolResponse::content(vec![ToolContent::text("hi")]);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(
            json,
            json!({"content": [{"type": "text", "text": "hi"}], "isError": false})
        );
    }

    #[test]
    fn test_call_tool_request_omits_absent_arguments() {
        let request = CallToolRequest {
            name: "echo".to_string(),
            arguments: None,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(json, r#"{"name":"echo"}"#);
    }

    #[test]
    fn test_tool_round_trip() {
        let tool = Tool::new("echo")
            .with_description("Echo the input back")
            .with_input_schema(json!({
                "type": "object",
                "properties": {"text": {"type": "string"}},
                "required": ["text"]
            }));

        let json = serde_json::to_string(&tool).unwrap();
        let back: Tool = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tool);
    }

    #[test]
    fn test_image_content_uses_camel_case_mime_type() {
        let content = ToolContent::Image {
            data: "aGk=".to_string(),
            mime_type: "image/png".to_string(),
        };
        let json = serde_json::to_value(&content).unwrap();
        assert_eq!(json["mimeType"], "image/png");
    }
}
