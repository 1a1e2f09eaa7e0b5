//! Root message types.
//!
//! Roots are URIs the client declares as filesystem or workspace anchors the
//! server may operate within. The server fetches them with the role-reversed
//! `roots/list` request and learns about changes through
//! `notifications/roots/list_changed`.

use serde::{Deserialize, Serialize};

/// One client-declared root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Root {
    /// URI of the root, typically a `file://` URI
    pub uri: String,

    /// Human-readable name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Root {
    /// Create a new root for the given URI.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            name: None,
        }
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Result payload of `roots/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRootsResponse {
    /// The declared roots
    pub roots: Vec<Root>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_root_omits_absent_name() {
        let root = Root::new("file:///workspace");
        let json = serde_json::to_value(&root).unwrap();
        assert_eq!(json, json!({"uri": "file:///workspace"}));
    }

    #[test]
    fn test_list_roots_round_trip() {
        let response = ListRootsResponse {
            roots: vec![Root::new("file:///workspace").with_name("workspace")],
        };
        let json = serde_json::to_string(&response).unwrap();
        let back: ListRootsResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back, response);
    }
}
