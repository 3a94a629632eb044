//! Destination routing and message fan-out

use crate::broker::connections::{ConnectionManager, Delivery};
use skinme_live_client::{Frame, Headers};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Routes messages to subscribed clients
#[derive(Clone)]
pub struct TopicRouter {
    connections: Arc<ConnectionManager>,
    user_prefix: String,
}

impl TopicRouter {
    pub fn new(connections: Arc<ConnectionManager>, user_prefix: impl Into<String>) -> Self {
        Self {
            connections,
            user_prefix: user_prefix.into(),
        }
    }

    /// Route a message to every subscription on `destination`
    pub fn route(&self, destination: &str, body: &str) -> usize {
        let subscribers = self.connections.find_subscribers(destination);

        if subscribers.is_empty() {
            debug!(destination = destination, "No subscribers for destination");
            return 0;
        }

        let mut count = 0;
        for (conn, subscription_ids) in subscribers {
            for subscription_id in subscription_ids {
                let delivery = Delivery {
                    frame: message_frame(destination, &subscription_id, body),
                    subscription_id,
                };
                match conn.send(delivery) {
                    Ok(()) => count += 1,
                    Err(e) => debug!(
                        connection_id = %conn.id,
                        error = %e,
                        "Failed to queue message for subscriber (buffer full or disconnected)"
                    ),
                }
            }
        }

        debug!(destination = destination, delivered = count, "Routed message");
        count
    }

    /// Route a message to the user-scoped form of `destination` for one principal
    ///
    /// `/topic/chat` for `alice` lands on alice's `/user/topic/chat` subscriptions.
    pub fn route_to_user(&self, principal: &str, destination: &str, body: &str) -> usize {
        let connections = self.connections.find_by_principal(principal);

        if connections.is_empty() {
            debug!(principal = principal, "No connections for principal");
            return 0;
        }

        let user_destination = format!("{}{}", self.user_prefix, destination);
        let mut count = 0;

        for conn in connections {
            for subscription_id in conn.subscriptions_to(&user_destination) {
                let delivery = Delivery {
                    frame: message_frame(&user_destination, &subscription_id, body),
                    subscription_id,
                };
                if conn.send(delivery).is_ok() {
                    count += 1;
                }
            }
        }

        debug!(
            principal = principal,
            destination = %user_destination,
            delivered = count,
            "Routed user message"
        );
        count
    }

    /// Get the number of active connections
    pub fn connection_count(&self) -> usize {
        self.connections.count()
    }
}

fn message_frame(destination: &str, subscription_id: &str, body: &str) -> Frame {
    let mut headers = Headers::new();
    headers.insert("subscription".to_string(), subscription_id.to_string());
    headers.insert("message-id".to_string(), Uuid::new_v4().to_string());
    headers.insert("content-type".to_string(), "application/json".to_string());

    Frame {
        destination: destination.to_string(),
        headers,
        body: body.to_string(),
    }
}
