//! Chat history items exchanged with an active session.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One turn of a chat transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChatHistoryItem {
    /// System prompt
    System {
        /// Prompt text
        text: String,
    },
    /// Message typed by the user
    User {
        /// Message text
        text: String,
    },
    /// Response produced by the model, as the segments it was generated in
    Model {
        /// Response segments
        response: Vec<String>,
    },
}

impl ChatHistoryItem {
    /// Create a system prompt item.
    pub fn system(text: impl Into<String>) -> Self {
        ChatHistoryItem::System { text: text.into() }
    }

    /// Create a user message item.
    pub fn user(text: impl Into<String>) -> Self {
        ChatHistoryItem::User { text: text.into() }
    }

    /// Create a model response item from a single segment.
    pub fn model(response: impl Into<String>) -> Self {
        ChatHistoryItem::Model {
            response: vec![response.into()],
        }
    }

    /// Full text of this item.
    pub fn text(&self) -> String {
        match self {
            ChatHistoryItem::System { text } | ChatHistoryItem::User { text } => text.clone(),
            ChatHistoryItem::Model { response } => response.concat(),
        }
    }
}
