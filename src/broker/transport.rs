//! In-process transport between sessions and the broker

use crate::broker::connections::{spawn_delivery, ClientConnection};
use crate::broker::BrokerState;
use async_trait::async_trait;
use skinme_live_client::{
    ConnectedFrame, Connector, Established, FrameHandler, Headers, TransportClient, TransportError,
    TransportSubscription,
};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

/// Opens connections to a [`LocalBroker`](crate::broker::LocalBroker)
pub struct LocalConnector {
    state: Arc<BrokerState>,
}

impl LocalConnector {
    pub(crate) fn new(state: Arc<BrokerState>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl Connector for LocalConnector {
    async fn connect(&self, endpoint: &str, headers: &Headers) -> Result<Established, TransportError> {
        // Let the caller's task run before the handshake completes, as a network connect would
        tokio::task::yield_now().await;

        self.state.admit(endpoint)?;

        let (tx, rx) = mpsc::channel(self.state.config.delivery_buffer.max(1));
        let (lost_tx, lost_rx) = oneshot::channel();
        let conn = Arc::new(ClientConnection::new(headers.get("login").cloned(), tx, lost_tx));

        spawn_delivery(&conn, rx);
        self.state.connections.add(conn.clone());

        info!(conn_id = %conn.id, principal = %conn.principal(), "Client connected");

        let mut frame_headers = Headers::new();
        frame_headers.insert("user-name".to_string(), conn.principal());
        frame_headers.insert("session".to_string(), conn.id.to_string());

        Ok(Established {
            client: Arc::new(LocalClient {
                state: self.state.clone(),
                conn,
            }),
            frame: ConnectedFrame::new(frame_headers),
            lost: lost_rx,
        })
    }
}

/// A session's connection to the broker
pub struct LocalClient {
    state: Arc<BrokerState>,
    conn: Arc<ClientConnection>,
}

impl LocalClient {
    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.state.connections.contains(self.conn.id) {
            Ok(())
        } else {
            Err(TransportError::Closed("connection closed".to_string()))
        }
    }
}

#[async_trait]
impl TransportClient for LocalClient {
    fn subscribe(
        &self,
        destination: &str,
        handler: FrameHandler,
    ) -> Result<Box<dyn TransportSubscription>, TransportError> {
        self.ensure_open()?;
        self.state.check_subscribe(destination)?;

        let id = self.conn.subscribe(destination, handler);
        debug!(conn_id = %self.conn.id, destination = destination, subscription_id = %id, "Subscribed");

        Ok(Box::new(LocalSubscription {
            id,
            conn: Arc::downgrade(&self.conn),
        }))
    }

    fn send(&self, destination: &str, _headers: &Headers, body: String) -> Result<(), TransportError> {
        self.ensure_open()?;
        self.state.handle_send(&self.conn, destination, &body)
    }

    async fn disconnect(&self) {
        if self.state.connections.remove(self.conn.id).is_some() {
            self.conn.close();
            info!(conn_id = %self.conn.id, "Client disconnected");
        }
    }
}

/// One subscription held by a [`LocalClient`]
pub struct LocalSubscription {
    id: String,
    conn: Weak<ClientConnection>,
}

impl TransportSubscription for LocalSubscription {
    fn id(&self) -> &str {
        &self.id
    }

    fn unsubscribe(&self) {
        if let Some(conn) = self.conn.upgrade() {
            if conn.unsubscribe(&self.id) {
                debug!(conn_id = %conn.id, subscription_id = %self.id, "Unsubscribed");
            }
        }
    }
}
