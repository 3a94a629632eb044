//! Payload types exchanged on the live destinations
//!
//! Field names follow the server's camelCase JSON.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// An incoming message body
///
/// Bodies that parse as JSON arrive structured; anything else is passed
/// through untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Structured(serde_json::Value),
    Raw(String),
}

impl Payload {
    /// Classify a frame body
    pub fn parse(body: &str) -> Self {
        match serde_json::from_str(body) {
            Ok(value) => Payload::Structured(value),
            Err(_) => Payload::Raw(body.to_string()),
        }
    }

    pub fn as_structured(&self) -> Option<&serde_json::Value> {
        match self {
            Payload::Structured(value) => Some(value),
            Payload::Raw(_) => None,
        }
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, Payload::Raw(_))
    }

    /// Decode a structured payload into a typed message
    pub fn decode<T: DeserializeOwned>(&self) -> Option<T> {
        self.as_structured()
            .and_then(|value| T::deserialize(value).ok())
    }
}

/// Chat message broadcast on the chat topics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub sender: String,
    pub content: String,
    /// "user", "assistant", or "notification"
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

/// Per-user or broadcast notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub title: String,
    pub message: String,
    /// "ORDER", "DELIVERY", "PRODUCT", or "PROMOTION"
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// "UNREAD" or "READ"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
}

impl Notification {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: None,
            user_id: None,
            title: title.into(),
            message: message.into(),
            kind: None,
            status: None,
            created_at: None,
            action_url: None,
        }
    }
}

/// Entity change broadcast on the order, product, and inventory topics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealTimeUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_id: Option<String>,
    /// "ORDER", "PRODUCT", "INVENTORY", or "PRICE"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    pub entity_id: String,
    pub action: String,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Comma-separated user ids or "ALL"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affected_users: Option<String>,
}

/// Outgoing chat message or assistant query
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest<'a> {
    pub sender: &'a str,
    pub content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<&'a str>,
    pub timestamp: String,
}

/// Outgoing entity update
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityUpdateRequest<'a, T: Serialize + ?Sized> {
    pub entity_id: &'a str,
    pub action: &'a str,
    pub data: &'a T,
    pub affected_users: &'a str,
}

/// ISO-8601 UTC timestamp with millisecond precision
pub(crate) fn client_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
