//! Scripted transport shared by the session tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use skinme_live_client::{
    ConnectedFrame, Connector, Established, Frame, FrameHandler, Headers, TransportClient,
    TransportError, TransportSubscription,
};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Connector that fails a scripted number of times, then hands out clients
#[derive(Default)]
pub struct ScriptedConnector {
    failures_remaining: AtomicU32,
    always_fail: AtomicBool,
    attempts: Mutex<Vec<Instant>>,
    clients: Mutex<Vec<Arc<ScriptedClient>>>,
    lost: Mutex<Option<oneshot::Sender<TransportError>>>,
}

impl ScriptedConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the next `n` connects
    pub fn failing(n: u32) -> Arc<Self> {
        let connector = Self::default();
        connector.failures_remaining.store(n, Ordering::SeqCst);
        Arc::new(connector)
    }

    pub fn unreachable() -> Arc<Self> {
        let connector = Self::default();
        connector.always_fail.store(true, Ordering::SeqCst);
        Arc::new(connector)
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.always_fail.store(unreachable, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().len()
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn last_client(&self) -> Arc<ScriptedClient> {
        self.clients.lock().last().cloned().expect("no client connected yet")
    }

    /// Fail the live connection as if the socket dropped
    pub fn drop_connection(&self) {
        if let Some(lost) = self.lost.lock().take() {
            let _ = lost.send(TransportError::Closed("socket dropped".to_string()));
        }
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, _endpoint: &str, headers: &Headers) -> Result<Established, TransportError> {
        self.attempts.lock().push(Instant::now());

        if self.always_fail.load(Ordering::SeqCst) {
            return Err(TransportError::Connection("connection refused".to_string()));
        }
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(TransportError::Connection("connection refused".to_string()));
        }

        let client = Arc::new(ScriptedClient::default());
        self.clients.lock().push(client.clone());

        let (lost_tx, lost_rx) = oneshot::channel();
        *self.lost.lock() = Some(lost_tx);

        let mut frame_headers = Headers::new();
        frame_headers.insert("version".to_string(), "1.2".to_string());
        if let Some(login) = headers.get("login") {
            frame_headers.insert("user-name".to_string(), login.clone());
        }

        Ok(Established {
            client,
            frame: ConnectedFrame::new(frame_headers),
            lost: lost_rx,
        })
    }
}

struct ScriptedEntry {
    destination: String,
    handler: FrameHandler,
    active: Arc<AtomicBool>,
}

/// Client that records sends and delivers frames on demand
#[derive(Default)]
pub struct ScriptedClient {
    entries: Mutex<Vec<ScriptedEntry>>,
    sent: Mutex<Vec<(String, String)>>,
    next_id: AtomicU32,
    disconnected: AtomicBool,
}

impl ScriptedClient {
    /// Deliver a body to every active subscription on `destination`
    pub fn deliver(&self, destination: &str, body: &str) -> usize {
        let handlers: Vec<FrameHandler> = self
            .entries
            .lock()
            .iter()
            .filter(|e| e.destination == destination && e.active.load(Ordering::SeqCst))
            .map(|e| e.handler.clone())
            .collect();

        for handler in &handlers {
            handler(Frame {
                destination: destination.to_string(),
                headers: Headers::new(),
                body: body.to_string(),
            });
        }
        handlers.len()
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().clone()
    }

    pub fn active_subscriptions(&self, destination: &str) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.destination == destination && e.active.load(Ordering::SeqCst))
            .count()
    }

    pub fn total_subscriptions(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }
}

struct ScriptedSubscription {
    id: String,
    active: Arc<AtomicBool>,
}

impl TransportSubscription for ScriptedSubscription {
    fn id(&self) -> &str {
        &self.id
    }

    fn unsubscribe(&self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl TransportClient for ScriptedClient {
    fn subscribe(
        &self,
        destination: &str,
        handler: FrameHandler,
    ) -> Result<Box<dyn TransportSubscription>, TransportError> {
        if self.is_disconnected() {
            return Err(TransportError::NotConnected);
        }

        let id = format!("sub-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let active = Arc::new(AtomicBool::new(true));
        self.entries.lock().push(ScriptedEntry {
            destination: destination.to_string(),
            handler,
            active: active.clone(),
        });

        Ok(Box::new(ScriptedSubscription { id, active }))
    }

    fn send(&self, destination: &str, _headers: &Headers, body: String) -> Result<(), TransportError> {
        if self.is_disconnected() {
            return Err(TransportError::NotConnected);
        }
        self.sent.lock().push((destination.to_string(), body));
        Ok(())
    }

    async fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }
}
