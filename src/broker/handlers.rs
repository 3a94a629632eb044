//! Server-side handlers for application destinations

use serde::de::DeserializeOwned;
use serde::Serialize;
use skinme_live_client::destinations::{
    CHAT_MESSAGE, CHAT_QUERY, CHAT_TOPIC, INVENTORY_TOPIC, INVENTORY_UPDATE, ORDERS_TOPIC,
    ORDERS_UPDATE, PRODUCTS_TOPIC, PRODUCTS_UPDATE,
};
use skinme_live_client::{ChatMessage, RealTimeUpdate, TransportError};
use tracing::{debug, warn};
use uuid::Uuid;

/// Reply sent when the responder has no answer
pub const FALLBACK_REPLY: &str = "Sorry, I encountered an error. Please try again.";

/// Sender name on assistant replies
pub const ASSISTANT: &str = "assistant";

/// Answers chat queries
///
/// `None` means the assistant failed; the sender gets [`FALLBACK_REPLY`].
pub trait ChatResponder: Send + Sync {
    fn respond(&self, query: &str) -> Option<String>;
}

impl<F> ChatResponder for F
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn respond(&self, query: &str) -> Option<String> {
        self(query)
    }
}

/// Where a handled message goes next
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// Fan out to every subscriber of the destination
    Broadcast {
        destination: &'static str,
        body: String,
    },
    /// Deliver to the sender's user-scoped form of the destination
    ToSender {
        destination: &'static str,
        body: String,
    },
    /// No handler for the destination
    Dropped,
}

/// Handle a SEND to an `/app/...` destination
pub fn handle_app_message(
    destination: &str,
    body: &str,
    responder: &dyn ChatResponder,
) -> Result<Dispatch, TransportError> {
    match destination {
        CHAT_MESSAGE => {
            let mut message: ChatMessage = decode(destination, body)?;
            message.id = Some(Uuid::new_v4().to_string());
            message.timestamp = Some(server_timestamp());
            message.kind = Some("user".to_string());

            Ok(Dispatch::Broadcast {
                destination: CHAT_TOPIC,
                body: encode(&message)?,
            })
        }
        CHAT_QUERY => {
            let query: ChatMessage = decode(destination, body)?;
            let content = responder.respond(&query.content).unwrap_or_else(|| {
                warn!(sender = %query.sender, "Chat responder gave no answer");
                FALLBACK_REPLY.to_string()
            });

            let reply = ChatMessage {
                id: Some(Uuid::new_v4().to_string()),
                sender: ASSISTANT.to_string(),
                content,
                kind: Some(ASSISTANT.to_string()),
                timestamp: Some(server_timestamp()),
                conversation_id: query.conversation_id,
            };

            Ok(Dispatch::ToSender {
                destination: CHAT_TOPIC,
                body: encode(&reply)?,
            })
        }
        ORDERS_UPDATE => entity_update(destination, body, "ORDER", ORDERS_TOPIC),
        PRODUCTS_UPDATE => entity_update(destination, body, "PRODUCT", PRODUCTS_TOPIC),
        INVENTORY_UPDATE => entity_update(destination, body, "INVENTORY", INVENTORY_TOPIC),
        _ => {
            debug!(destination = destination, "No handler for application destination");
            Ok(Dispatch::Dropped)
        }
    }
}

fn entity_update(
    destination: &str,
    body: &str,
    entity_type: &str,
    topic: &'static str,
) -> Result<Dispatch, TransportError> {
    let mut update: RealTimeUpdate = decode(destination, body)?;
    update.update_id = Some(Uuid::new_v4().to_string());
    update.timestamp = Some(server_timestamp());
    update.entity_type = Some(entity_type.to_string());

    Ok(Dispatch::Broadcast {
        destination: topic,
        body: encode(&update)?,
    })
}

fn decode<T: DeserializeOwned>(destination: &str, body: &str) -> Result<T, TransportError> {
    serde_json::from_str(body)
        .map_err(|e| TransportError::Rejected(format!("invalid body for {}: {}", destination, e)))
}

fn encode<T: Serialize>(value: &T) -> Result<String, TransportError> {
    serde_json::to_string(value).map_err(|e| TransportError::Rejected(e.to_string()))
}

/// Server clock, ISO-8601 UTC with milliseconds
pub(crate) fn server_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
