//! Connection state management

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use skinme_live_client::{Frame, FrameHandler, TransportError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;
use uuid::Uuid;

/// Frame queued for one subscription of one connection
#[derive(Debug, Clone)]
pub struct Delivery {
    pub subscription_id: String,
    pub frame: Frame,
}

struct BrokerSubscription {
    destination: String,
    handler: FrameHandler,
}

/// A connected client
pub struct ClientConnection {
    /// Unique connection ID
    pub id: Uuid,
    /// User named by the `login` connect header
    pub user: Option<String>,
    /// Subscription id -> subscription
    subscriptions: RwLock<HashMap<String, BrokerSubscription>>,
    next_sub_id: AtomicU64,
    /// Queue drained by the connection's delivery task
    tx: mpsc::Sender<Delivery>,
    /// Fired when the broker drops the connection
    lost: Mutex<Option<oneshot::Sender<TransportError>>>,
}

impl ClientConnection {
    pub fn new(
        user: Option<String>,
        tx: mpsc::Sender<Delivery>,
        lost: oneshot::Sender<TransportError>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user,
            subscriptions: RwLock::new(HashMap::new()),
            next_sub_id: AtomicU64::new(0),
            tx,
            lost: Mutex::new(Some(lost)),
        }
    }

    /// Name user-scoped messages are addressed to
    pub fn principal(&self) -> String {
        self.user.clone().unwrap_or_else(|| self.id.to_string())
    }

    /// Add a subscription, returning its id
    pub fn subscribe(&self, destination: &str, handler: FrameHandler) -> String {
        let id = format!("sub-{}", self.next_sub_id.fetch_add(1, Ordering::SeqCst));
        self.subscriptions.write().insert(
            id.clone(),
            BrokerSubscription {
                destination: destination.to_string(),
                handler,
            },
        );
        id
    }

    /// Remove a subscription
    pub fn unsubscribe(&self, subscription_id: &str) -> bool {
        self.subscriptions.write().remove(subscription_id).is_some()
    }

    /// Ids of the subscriptions on exactly `destination`
    pub fn subscriptions_to(&self, destination: &str) -> Vec<String> {
        self.subscriptions
            .read()
            .iter()
            .filter(|(_, sub)| sub.destination == destination)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    fn handler(&self, subscription_id: &str) -> Option<FrameHandler> {
        self.subscriptions
            .read()
            .get(subscription_id)
            .map(|sub| sub.handler.clone())
    }

    /// Queue a frame for this client
    pub fn send(&self, delivery: Delivery) -> Result<(), mpsc::error::TrySendError<Delivery>> {
        self.tx.try_send(delivery)
    }

    /// Signal the client that its connection failed; false if already signalled
    pub fn fail(&self, cause: TransportError) -> bool {
        match self.lost.lock().take() {
            Some(lost) => lost.send(cause).is_ok(),
            None => false,
        }
    }

    /// Release the loss signal without firing it
    pub fn close(&self) {
        self.lost.lock().take();
    }
}

/// Run a connection's handlers one frame at a time
///
/// Ends once the connection is dropped.
pub fn spawn_delivery(conn: &Arc<ClientConnection>, mut rx: mpsc::Receiver<Delivery>) {
    let conn: Weak<ClientConnection> = Arc::downgrade(conn);
    tokio::spawn(async move {
        while let Some(delivery) = rx.recv().await {
            let Some(conn) = conn.upgrade() else { break };
            match conn.handler(&delivery.subscription_id) {
                Some(handler) => handler(delivery.frame),
                None => debug!(
                    subscription_id = %delivery.subscription_id,
                    "Subscription gone before delivery"
                ),
            }
        }
    });
}

/// Manages all active connections
#[derive(Clone)]
pub struct ConnectionManager {
    /// All active connections by ID
    connections: Arc<DashMap<Uuid, Arc<ClientConnection>>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(DashMap::new()),
        }
    }

    /// Register a new connection
    pub fn add(&self, conn: Arc<ClientConnection>) {
        self.connections.insert(conn.id, conn);
    }

    /// Remove a connection
    pub fn remove(&self, id: Uuid) -> Option<Arc<ClientConnection>> {
        self.connections.remove(&id).map(|(_, conn)| conn)
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.connections.contains_key(&id)
    }

    /// Find every connection subscribed to `destination`, with the matching subscription ids
    pub fn find_subscribers(&self, destination: &str) -> Vec<(Arc<ClientConnection>, Vec<String>)> {
        let mut result = Vec::new();

        for entry in self.connections.iter() {
            let ids = entry.value().subscriptions_to(destination);
            if !ids.is_empty() {
                result.push((entry.value().clone(), ids));
            }
        }

        result
    }

    /// Get connections belonging to a principal
    pub fn find_by_principal(&self, principal: &str) -> Vec<Arc<ClientConnection>> {
        self.connections
            .iter()
            .filter(|entry| entry.value().principal() == principal)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Remove and return every connection
    pub fn drain(&self) -> Vec<Arc<ClientConnection>> {
        let ids: Vec<Uuid> = self.connections.iter().map(|entry| *entry.key()).collect();
        ids.into_iter().filter_map(|id| self.remove(id)).collect()
    }

    /// Get total connection count
    pub fn count(&self) -> usize {
        self.connections.len()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}
