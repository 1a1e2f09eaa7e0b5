//! Sampling and completion message types.
//!
//! `sampling/createMessage` is the role-reversed request: the server asks the
//! client's host application to run an LLM completion. The engine only
//! carries these payloads; it never interprets them.
//!
//! `completion/complete` is the argument-completion request a client sends
//! while the user is typing a prompt argument or resource URI.

use serde::{Deserialize, Serialize};

/// Parameters of `sampling/createMessage` (server → client).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateMessageRequest {
    /// Conversation to sample from
    pub messages: Vec<SamplingMessage>,

    /// Model selection hints
    #[serde(rename = "modelPreferences", skip_serializing_if = "Option::is_none")]
    pub model_preferences: Option<ModelPreferences>,

    /// System prompt to apply
    #[serde(rename = "systemPrompt", skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Token budget for the completion
    #[serde(rename = "maxTokens", skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
}

/// Result payload of `sampling/createMessage`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateMessageResponse {
    /// Role of the sampled message
    pub role: SamplingRole,

    /// Sampled content
    pub content: SamplingContent,

    /// Model that produced the completion
    pub model: String,

    /// Why sampling stopped
    #[serde(rename = "stopReason", skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

/// One message in a sampling conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingMessage {
    /// Speaker of the message
    pub role: SamplingRole,

    /// Message content
    pub content: SamplingContent,
}

impl SamplingMessage {
    /// Create a user-role text message.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: SamplingRole::User,
            content: SamplingContent::Text { text: text.into() },
        }
    }
}

/// Role of a sampling message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingRole {
    /// End-user turn
    User,
    /// Assistant turn
    Assistant,
}

/// Content of a sampling message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SamplingContent {
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
}

/// Model selection hints for sampling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ModelPreferences {
    /// Ordered name hints, most preferred first
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hints: Option<Vec<ModelHint>>,

    /// Relative priority of low cost, 0.0 to 1.0
    #[serde(rename = "costPriority", skip_serializing_if = "Option::is_none")]
    pub cost_priority: Option<f64>,

    /// Relative priority of low latency, 0.0 to 1.0
    #[serde(rename = "speedPriority", skip_serializing_if = "Option::is_none")]
    pub speed_priority: Option<f64>,

    /// Relative priority of capability, 0.0 to 1.0
    #[serde(
        rename = "intelligencePriority",
        skip_serializing_if = "Option::is_none"
    )]
    pub intelligence_priority: Option<f64>,
}

/// A single model name hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelHint {
    /// Suggested model name or family
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Parameters of `completion/complete`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteRequest {
    /// What is being completed
    #[serde(rename = "ref")]
    pub reference: CompletionRef,

    /// The argument under completion
    pub argument: CompletionArgument,
}

/// Reference to the prompt or resource whose argument is being completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CompletionRef {
    /// A prompt argument
    #[serde(rename = "ref/prompt")]
    Prompt {
        /// Name of the prompt
        name: String,
    },

    /// A resource template variable
    #[serde(rename = "ref/resource")]
    Resource {
        /// URI or URI template of the resource
        uri: String,
    },
}

/// The argument name/value pair under completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionArgument {
    /// Argument name
    pub name: String,

    /// Current partial value
    pub value: String,
}

/// Result payload of `completion/complete`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteResponse {
    /// The completion values
    pub completion: CompletionResult,
}

/// The completion values and pagination hints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionResult {
    /// Candidate values
    pub values: Vec<String>,

    /// Total number of candidates available
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,

    /// Whether more candidates exist beyond `values`
    #[serde(rename = "hasMore", skip_serializing_if = "Option::is_none")]
    pub has_more: Option<bool>,
}
