//! The seam between a session and the messaging client that owns the wire
//!
//! A [`Connector`] opens one transport per connect attempt. Framing,
//! heartbeats, and acknowledgement belong to the implementation behind it.

use crate::error::TransportError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Frame headers
pub type Headers = BTreeMap<String, String>;

/// Descriptor returned by a successful connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectedFrame {
    pub command: String,
    pub headers: Headers,
}

impl ConnectedFrame {
    pub fn new(headers: Headers) -> Self {
        Self {
            command: "CONNECTED".to_string(),
            headers,
        }
    }
}

/// A message delivered on a subscribed destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub destination: String,
    pub headers: Headers,
    pub body: String,
}

/// Callback invoked for every frame on a subscription
pub type FrameHandler = Arc<dyn Fn(Frame) + Send + Sync>;

/// Handle to one transport subscription
pub trait TransportSubscription: Send + Sync {
    /// Transport-assigned subscription id
    fn id(&self) -> &str;

    /// Stop delivery; calling it on a dead connection is a no-op
    fn unsubscribe(&self);
}

/// A connected transport client
#[async_trait]
pub trait TransportClient: Send + Sync {
    fn subscribe(
        &self,
        destination: &str,
        handler: FrameHandler,
    ) -> Result<Box<dyn TransportSubscription>, TransportError>;

    fn send(&self, destination: &str, headers: &Headers, body: String) -> Result<(), TransportError>;

    async fn disconnect(&self);
}

/// Result of a successful connect
pub struct Established {
    pub client: Arc<dyn TransportClient>,
    pub frame: ConnectedFrame,
    /// Fires if the connection fails after being established. Dropped without
    /// a value on a clean disconnect.
    pub lost: oneshot::Receiver<TransportError>,
}

/// Opens transports to an endpoint
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, endpoint: &str, headers: &Headers) -> Result<Established, TransportError>;
}
