//! Prompt template message types.
//!
//! Prompts are parameterized message templates the server renders on demand.
//! `prompts/get` arguments are a string-to-string map, unlike tool arguments
//! which are arbitrary JSON.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Prompt definition as exposed by `prompts/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    /// Unique name of the prompt
    pub name: String,

    /// Human-readable description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Arguments the prompt accepts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Vec<PromptArgument>>,
}

impl Prompt {
    /// Create a new prompt definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            arguments: None,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add an argument declaration.
    pub fn with_argument(mut self, argument: PromptArgument) -> Self {
        self.arguments.get_or_insert_with(Vec::new).push(argument);
        self
    }
}

/// Declaration of one prompt argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptArgument {
    /// Argument name
    pub name: String,

    /// What the argument controls
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Whether the argument must be supplied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
}

/// Result payload of `prompts/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListPromptsResponse {
    /// The registered prompts
    pub prompts: Vec<Prompt>,
}

/// Parameters of `prompts/get`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetPromptRequest {
    /// Name of the prompt to render
    pub name: String,

    /// Argument values, all strings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<HashMap<String, String>>,
}

/// Result payload of `prompts/get`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetPromptResponse {
    /// Description of the rendered prompt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// The rendered messages
    pub messages: Vec<PromptMessage>,
}

/// One message of a rendered prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    /// Speaker of the message
    pub role: PromptRole,

    /// Message content
    pub content: PromptContent,
}

impl PromptMessage {
    /// Create a user-role text message.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: PromptRole::User,
            content: PromptContent::Text { text: text.into() },
        }
    }
}

/// Role of a prompt message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    /// End-user turn
    User,
    /// Assistant turn
    Assistant,
}

/// Content of a prompt message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PromptContent {
    /// Plain text content
    #[serde(rename = "text")]
    Text {
        /// The text payload
        text: String,
    },

    /// Embedded resource content
    #[serde(rename = "resource")]
    Resource {
        /// The embedded resource
        resource: super::resources::ResourceContent,
    },
}
