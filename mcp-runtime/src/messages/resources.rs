//! Resource listing, reading, template, and subscription message types.
//!
//! Resources are addressable data exposed by the server, either under exact
//! URIs or under URI templates (`file:///notes/{id}`) that are matched at
//! read time. Clients may subscribe to individual URIs to receive
//! `notifications/resources/updated`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Resource definition as exposed by `resources/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Exact URI of the resource
    pub uri: String,

    /// Human-readable name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Description of the resource contents
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// MIME type of the resource contents
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl Resource {
    /// Create a new resource definition.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            name: None,
            description: None,
            mime_type: None,
        }
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the MIME type.
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

/// Resource template definition as exposed by `resources/templates/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceTemplate {
    /// URI template with `{var}` placeholders
    #[serde(rename = "uriTemplate")]
    pub uri_template: String,

    /// Human-readable name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Description of the matched resources
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// MIME type of the matched resources
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl ResourceTemplate {
    /// Create a new resource template definition.
    pub fn new(uri_template: impl Into<String>) -> Self {
        Self {
            uri_template: uri_template.into(),
            name: None,
            description: None,
            mime_type: None,
        }
    }
}

/// Result payload of `resources/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListResourcesResponse {
    /// The registered exact-URI resources
    pub resources: Vec<Resource>,
}

/// Result payload of `resources/templates/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListResourceTemplatesResponse {
    /// The registered resource templates, in registration order
    #[serde(rename = "resourceTemplates")]
    pub resource_templates: Vec<ResourceTemplate>,
}

/// Parameters of `resources/read`, `resources/subscribe`, and
/// `resources/unsubscribe` all carry a single URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadResourceRequest {
    /// URI of the resource to read
    pub uri: String,
}

/// Parameters of `resources/subscribe`.
pub type SubscribeRequest = ReadResourceRequest;

/// Parameters of `resources/unsubscribe`.
pub type UnsubscribeRequest = ReadResourceRequest;

/// Result payload of `resources/read`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadResourceResponse {
    /// Contents of the resource
    pub contents: Vec<ResourceContent>,
}

/// One content item of a read resource.
///
/// Exactly one of `text` and `blob` is set; the distinction is carried by
/// field presence rather than a tag, matching the wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceContent {
    /// URI the content was read from
    pub uri: String,

    /// MIME type of this content item
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    /// Text contents
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Base64-encoded binary contents
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob: Option<String>,
}

impl ResourceContent {
    /// Create a text content item for the given URI.
    pub fn text(uri: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            mime_type: None,
            text: Some(text.into()),
            blob: None,
        }
    }

    /// Create a binary content item for the given URI.
    pub fn blob(uri: impl Into<String>, blob: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            mime_type: None,
            text: None,
            blob: Some(blob.into()),
        }
    }
}

/// Parameters of `notifications/resources/updated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUpdatedParams {
    /// URI of the resource that changed
    pub uri: String,
}

/// Variable bindings extracted from a URI-template match.
pub type TemplateVariables = HashMap<String, String>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_read_resource_response_wire_shape() {
        let response = ReadResourceResponse {
            contents: vec![ResourceContent::text("file:///notes/42", "note:42")],
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(
            json,
            json!({"contents": [{"uri": "file:///notes/42", "text": "note:42"}]})
        );
    }

    #[test]
    fn test_resource_template_uses_camel_case() {
        let template = ResourceTemplate::new("file:///notes/{id}");
        let json = serde_json::to_value(&template).unwrap();
        assert_eq!(json, json!({"uriTemplate": "file:///notes/{id}"}));
    }

    #[test]
    fn test_resource_round_trip() {
        let resource = Resource::new("file:///readme")
            .with_name("Readme")
            .with_mime_type("text/plain");
        let json = serde_json::to_string(&resource).unwrap();
        let back: Resource = serde_json::from_str(&json).unwrap();
        assert_eq!(back, resource);
    }

    #[test]
    fn test_blob_content_omits_text() {
        let content = ResourceContent::blob("file:///logo", "aGk=");
        let json = serde_json::to_value(&content).unwrap();
        assert!(json.get("text").is_none());
        assert_eq!(json["blob"], "aGk=");
    }
}
