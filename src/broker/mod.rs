//! In-process broker for the live destinations
//!
//! Plays the server side of the routing contract: topic fan-out, the
//! `/app/...` handlers, user-scoped delivery, and server pushes. Sessions
//! reach it through [`LocalBroker::connector`].

mod connections;
mod frame_log;
mod handlers;
mod router;
mod transport;

pub use connections::{ClientConnection, ConnectionManager, Delivery};
pub use frame_log::{FrameLog, LoggedFrame};
pub use handlers::{handle_app_message, ChatResponder, Dispatch, ASSISTANT, FALLBACK_REPLY};
pub use router::TopicRouter;
pub use transport::{LocalClient, LocalConnector, LocalSubscription};

use crate::destinations::{Destination, DestinationError, DestinationKind};
use serde::Serialize;
use skinme_live_client::destinations::{DEFAULT_ENDPOINT, NOTIFICATIONS_TOPIC, USER_PREFIX};
use skinme_live_client::{Notification, TransportError};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("invalid destination: {0}")]
    InvalidDestination(#[from] DestinationError),

    #[error("cannot publish to {0}")]
    NotPublishable(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BrokerError>;

/// Broker configuration
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// The only endpoint connects succeed against
    pub endpoint: String,
    /// Frames queued per connection before new ones are dropped
    pub delivery_buffer: usize,
    /// Client SENDs retained in the frame log
    pub frame_log_capacity: usize,
    /// Prefix of user-scoped destinations
    pub user_prefix: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            delivery_buffer: 100,
            frame_log_capacity: 1024,
            user_prefix: USER_PREFIX.to_string(),
        }
    }
}

/// State shared by the broker handle, its connector, and its clients
pub(crate) struct BrokerState {
    config: BrokerConfig,
    connections: Arc<ConnectionManager>,
    router: TopicRouter,
    frame_log: FrameLog,
    responder: Arc<dyn ChatResponder>,
    pending_failures: AtomicU32,
    unreachable: AtomicBool,
}

impl BrokerState {
    /// Consume one injected connect failure, if any are pending
    fn take_injected_failure(&self) -> bool {
        self.pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Check whether a connect to `endpoint` may proceed
    pub(crate) fn admit(&self, endpoint: &str) -> std::result::Result<(), TransportError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(TransportError::Connection("endpoint unreachable".to_string()));
        }

        if self.take_injected_failure() {
            return Err(TransportError::Connection("connection refused".to_string()));
        }

        if endpoint != self.config.endpoint {
            return Err(TransportError::Connection(format!("no broker at {}", endpoint)));
        }

        Ok(())
    }

    /// Handle a SEND from a connected client
    pub(crate) fn handle_send(
        &self,
        conn: &ClientConnection,
        destination: &str,
        body: &str,
    ) -> std::result::Result<(), TransportError> {
        self.frame_log.push(conn.id, destination, body);

        let destination = Destination::parse(destination)
            .map_err(|e| TransportError::Rejected(e.to_string()))?;

        match destination.kind() {
            DestinationKind::Topic | DestinationKind::Queue => {
                self.router.route(destination.as_str(), body);
            }
            DestinationKind::Application => {
                match handle_app_message(destination.as_str(), body, self.responder.as_ref())? {
                    Dispatch::Broadcast { destination, body } => {
                        self.router.route(destination, &body);
                    }
                    Dispatch::ToSender { destination, body } => {
                        self.router.route_to_user(&conn.principal(), destination, &body);
                    }
                    Dispatch::Dropped => {
                        warn!(
                            destination = %destination,
                            handler = destination.remainder(),
                            "Dropping message with no handler"
                        );
                    }
                }
            }
            DestinationKind::User => {
                return Err(TransportError::Rejected(format!(
                    "clients cannot send to {}",
                    destination
                )));
            }
        }

        Ok(())
    }

    /// Check that a client may subscribe to `destination`
    pub(crate) fn check_subscribe(&self, destination: &str) -> std::result::Result<(), TransportError> {
        let destination = Destination::parse(destination)
            .map_err(|e| TransportError::Rejected(e.to_string()))?;

        if destination.kind() == DestinationKind::Application {
            return Err(TransportError::Rejected(format!(
                "cannot subscribe to application destination {}",
                destination
            )));
        }

        Ok(())
    }
}

/// Handle to a running in-process broker
#[derive(Clone)]
pub struct LocalBroker {
    state: Arc<BrokerState>,
}

impl LocalBroker {
    /// Create a broker whose chat assistant never answers
    pub fn new(config: BrokerConfig) -> Self {
        Self::with_responder(config, |_: &str| -> Option<String> { None })
    }

    pub fn with_responder(config: BrokerConfig, responder: impl ChatResponder + 'static) -> Self {
        let connections = Arc::new(ConnectionManager::new());
        let router = TopicRouter::new(connections.clone(), config.user_prefix.clone());
        let frame_log = FrameLog::new(config.frame_log_capacity);

        Self {
            state: Arc::new(BrokerState {
                config,
                connections,
                router,
                frame_log,
                responder: Arc::new(responder),
                pending_failures: AtomicU32::new(0),
                unreachable: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.state.config
    }

    /// Connector for sessions that should talk to this broker
    pub fn connector(&self) -> Arc<LocalConnector> {
        Arc::new(LocalConnector::new(self.state.clone()))
    }

    /// Refuse the next `count` connects
    pub fn fail_next_connects(&self, count: u32) {
        self.state.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Refuse every connect until cleared
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Drop every live connection as a network failure would
    pub fn drop_all_connections(&self) -> usize {
        let dropped = self.state.connections.drain();
        for conn in &dropped {
            conn.fail(TransportError::Closed("connection dropped by broker".to_string()));
        }

        info!(count = dropped.len(), "Dropped all connections");
        dropped.len()
    }

    pub fn connection_count(&self) -> usize {
        self.state.connections.count()
    }

    /// Number of subscriptions on exactly `destination` across all connections
    pub fn subscription_count(&self, destination: &str) -> usize {
        self.state
            .connections
            .find_subscribers(destination)
            .iter()
            .map(|(_, ids)| ids.len())
            .sum()
    }

    /// Every retained client SEND, oldest first
    pub fn sent_frames(&self) -> Vec<LoggedFrame> {
        self.state.frame_log.get_after(0)
    }

    /// Retained client SENDs to exactly `destination`
    pub fn frames_for(&self, destination: &str) -> Vec<LoggedFrame> {
        self.state.frame_log.for_destination(destination)
    }

    pub fn frame_log(&self) -> &FrameLog {
        &self.state.frame_log
    }

    /// Push a message from the server side to a topic or queue
    pub fn publish<T: Serialize + ?Sized>(&self, destination: &str, payload: &T) -> Result<usize> {
        let destination = Destination::parse(destination)?;

        match destination.kind() {
            DestinationKind::Topic | DestinationKind::Queue => {}
            _ => return Err(BrokerError::NotPublishable(destination.to_string())),
        }

        let body = serde_json::to_string(payload)?;
        Ok(self.state.router.route(destination.as_str(), &body))
    }

    /// Deliver a notification to one user's `/user/topic/notifications`
    pub fn send_user_notification(&self, user: &str, mut notification: Notification) -> Result<usize> {
        notification.id = Some(Uuid::new_v4().to_string());
        notification.created_at = Some(handlers::server_timestamp());
        notification.status = Some("UNREAD".to_string());

        let body = serde_json::to_string(&notification)?;
        let delivered = self
            .state
            .router
            .route_to_user(user, NOTIFICATIONS_TOPIC, &body);

        debug!(user = user, delivered = delivered, "Sent user notification");
        Ok(delivered)
    }

    /// Deliver a notification to every `/topic/notifications` subscriber
    pub fn send_broadcast_notification(&self, mut notification: Notification) -> Result<usize> {
        notification.id = Some(Uuid::new_v4().to_string());
        notification.created_at = Some(handlers::server_timestamp());

        let body = serde_json::to_string(&notification)?;
        Ok(self.state.router.route(NOTIFICATIONS_TOPIC, &body))
    }
}

impl Default for LocalBroker {
    fn default() -> Self {
        Self::new(BrokerConfig::default())
    }
}
