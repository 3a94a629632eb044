//! Live session implementation

use crate::config::SessionConfig;
use crate::destinations::{
    ALL_USERS, CHAT_MESSAGE, CHAT_QUERY, CHAT_TOPIC, INVENTORY_TOPIC, INVENTORY_UPDATE,
    NOTIFICATIONS_TOPIC, ORDERS_TOPIC, ORDERS_UPDATE, PRODUCTS_TOPIC, PRODUCTS_UPDATE,
};
use crate::error::{Result, SessionError, TransportError};
use crate::messages::{client_timestamp, ChatRequest, EntityUpdateRequest, Payload};
use crate::transport::{
    ConnectedFrame, Connector, FrameHandler, Headers, TransportClient, TransportSubscription,
};

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

/// Connection state of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected, or disconnected by the caller
    Disconnected,
    /// A connect attempt is in flight
    Connecting,
    /// Connected and ready
    Connected,
    /// Waiting out the delay before the next attempt
    Reconnecting,
    /// Retry budget exhausted; stays here until `connect` is called again
    Failed,
}

/// Handler for incoming messages
pub type MessageCallback = Arc<dyn Fn(Payload) + Send + Sync>;

type ConnectCallback = Arc<dyn Fn(&ConnectedFrame) + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(&SessionError) + Send + Sync>;

/// Snapshot returned by [`Session::status`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub connected: bool,
    pub reconnect_attempts: u32,
    pub subscriptions: Vec<String>,
}

#[derive(Clone)]
struct Callbacks {
    on_connect: ConnectCallback,
    on_error: ErrorCallback,
}

struct TrackedSubscription {
    callback: MessageCallback,
    handle: Box<dyn TransportSubscription>,
}

/// Internal session state
struct SessionInner {
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    state: watch::Sender<ConnectionState>,
    state_rx: watch::Receiver<ConnectionState>,

    // Replaced on every successful connect
    connection: Mutex<Option<Arc<dyn TransportClient>>>,
    // Bumped on connect and disconnect so stale loss signals are ignored
    generation: AtomicU64,
    // Bumped on caller teardown so in-flight attempts and timers stand down
    epoch: AtomicU64,
    reconnect_attempts: AtomicU32,

    // Destination -> subscription, in subscribe order
    subscriptions: Mutex<IndexMap<String, TrackedSubscription>>,
}

/// A destination-keyed pub/sub session with bounded reconnection
///
/// One session owns one transport connection at a time. Cheaply cloneable;
/// clones share the same connection and subscriptions.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Create a disconnected session
    pub fn new(config: SessionConfig, connector: Arc<dyn Connector>) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let inner = Arc::new(SessionInner {
            config,
            connector,
            state: state_tx,
            state_rx,
            connection: Mutex::new(None),
            generation: AtomicU64::new(0),
            epoch: AtomicU64::new(0),
            reconnect_attempts: AtomicU32::new(0),
            subscriptions: Mutex::new(IndexMap::new()),
        });

        Self { inner }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Get the current connection state
    pub fn connection_state(&self) -> ConnectionState {
        *self.inner.state_rx.borrow()
    }

    /// Get a receiver for connection state changes
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_rx.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    /// Start connecting and return immediately
    ///
    /// `on_connect` runs after every successful connect, including ones made
    /// by a retry or after a lost connection, not only the first. Failures are
    /// retried after the configured delay; `on_error` runs once when the retry
    /// budget is spent. Each call from `Disconnected` or `Failed` starts with a
    /// full budget.
    pub fn connect<C, E>(&self, on_connect: C, on_error: E)
    where
        C: Fn(&ConnectedFrame) + Send + Sync + 'static,
        E: Fn(&SessionError) + Send + Sync + 'static,
    {
        if matches!(
            self.connection_state(),
            ConnectionState::Disconnected | ConnectionState::Failed
        ) {
            self.inner.reconnect_attempts.store(0, Ordering::SeqCst);
        }

        let callbacks = Callbacks {
            on_connect: Arc::new(on_connect),
            on_error: Arc::new(on_error),
        };
        self.inner.start_attempt(callbacks);
    }

    /// Wait until the session is connected, failed, or disconnected
    pub async fn settled(&self) -> ConnectionState {
        let mut state_rx = self.inner.state_rx.clone();
        loop {
            let state = *state_rx.borrow_and_update();
            match state {
                ConnectionState::Connected
                | ConnectionState::Failed
                | ConnectionState::Disconnected => return state,
                ConnectionState::Connecting | ConnectionState::Reconnecting => {}
            }
            if state_rx.changed().await.is_err() {
                return *state_rx.borrow();
            }
        }
    }

    /// Subscribe to a destination
    ///
    /// Dropped with a warning when not connected. A second subscription to the
    /// same destination releases the first one before taking its place.
    pub fn subscribe<F>(&self, destination: &str, callback: F)
    where
        F: Fn(Payload) + Send + Sync + 'static,
    {
        self.subscribe_shared(destination, Arc::new(callback));
    }

    /// Subscribe to a destination scoped to the connected user
    pub fn subscribe_to_user<F>(&self, destination: &str, callback: F)
    where
        F: Fn(Payload) + Send + Sync + 'static,
    {
        let user_destination = format!("{}{}", self.inner.config.user_prefix, destination);
        self.subscribe(&user_destination, callback);
    }

    /// Subscribe with an already shared callback
    pub fn subscribe_shared(&self, destination: &str, callback: MessageCallback) {
        let Some(client) = self.inner.active_connection() else {
            warn!(destination = destination, "Not connected, subscription dropped");
            return;
        };

        let mut subs = self.inner.subscriptions.lock();

        if let Some(previous) = subs.get(destination) {
            previous.handle.unsubscribe();
            debug!(destination = destination, "Released previous subscription");
        }

        match client.subscribe(destination, frame_handler(destination, callback.clone())) {
            Ok(handle) => {
                subs.insert(destination.to_string(), TrackedSubscription { callback, handle });
                info!(destination = destination, "Subscribed");
            }
            Err(e) => {
                subs.shift_remove(destination);
                warn!(destination = destination, error = %e, "Subscribe failed");
            }
        }
    }

    /// Send a message; returns false when it could not be handed to the transport
    pub fn send_message<T: Serialize + ?Sized>(&self, destination: &str, message: &T) -> bool {
        match self.try_send(destination, message) {
            Ok(()) => {
                debug!(destination = destination, "Message sent");
                true
            }
            Err(e) => {
                error!(destination = destination, error = %e, "Message not sent");
                false
            }
        }
    }

    /// Send a message, reporting why it could not be sent
    pub fn try_send<T: Serialize + ?Sized>(&self, destination: &str, message: &T) -> Result<()> {
        let client = self.inner.active_connection().ok_or(SessionError::NotConnected)?;
        let body = serde_json::to_string(message)?;
        client.send(destination, &Headers::new(), body)?;
        Ok(())
    }

    /// Stop tracking a destination; no-op if it is not tracked
    pub fn unsubscribe(&self, destination: &str) {
        let removed = self.inner.subscriptions.lock().shift_remove(destination);
        if let Some(tracked) = removed {
            tracked.handle.unsubscribe();
            info!(destination = destination, "Unsubscribed");
        }
    }

    /// Close the connection; no-op unless connected
    pub async fn disconnect(&self) {
        let client = {
            let mut connection = self.inner.connection.lock();
            if self.connection_state() != ConnectionState::Connected {
                return;
            }
            self.inner.teardown();
            connection.take()
        };

        if let Some(client) = client {
            client.disconnect().await;
        }
        info!("Disconnected");
    }

    /// Tear the session down from any state: close the connection, abandon any
    /// in-flight attempt or pending retry, and restore the full retry budget
    pub async fn shutdown(&self) {
        let (previous, client) = {
            let mut connection = self.inner.connection.lock();
            let previous = self.connection_state();
            self.inner.teardown();
            self.inner.reconnect_attempts.store(0, Ordering::SeqCst);
            (previous, connection.take())
        };

        if let Some(client) = client {
            client.disconnect().await;
            info!("Disconnected");
        } else if matches!(previous, ConnectionState::Connecting | ConnectionState::Reconnecting) {
            debug!("Pending reconnect abandoned");
        }
    }

    /// Snapshot of connection and subscription state
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            connected: self.is_connected(),
            reconnect_attempts: self.inner.reconnect_attempts.load(Ordering::SeqCst),
            subscriptions: self.inner.subscriptions.lock().keys().cloned().collect(),
        }
    }

    pub fn subscribe_to_chat<F>(&self, callback: F)
    where
        F: Fn(Payload) + Send + Sync + 'static,
    {
        self.subscribe(CHAT_TOPIC, callback);
    }

    pub fn subscribe_to_notifications<F>(&self, callback: F)
    where
        F: Fn(Payload) + Send + Sync + 'static,
    {
        self.subscribe_to_user(NOTIFICATIONS_TOPIC, callback);
    }

    pub fn subscribe_to_orders<F>(&self, callback: F)
    where
        F: Fn(Payload) + Send + Sync + 'static,
    {
        self.subscribe(ORDERS_TOPIC, callback);
    }

    pub fn subscribe_to_products<F>(&self, callback: F)
    where
        F: Fn(Payload) + Send + Sync + 'static,
    {
        self.subscribe(PRODUCTS_TOPIC, callback);
    }

    pub fn subscribe_to_inventory<F>(&self, callback: F)
    where
        F: Fn(Payload) + Send + Sync + 'static,
    {
        self.subscribe(INVENTORY_TOPIC, callback);
    }

    /// Post a chat message to everyone on the chat topic
    pub fn send_chat_message(&self, sender: &str, content: &str, conversation_id: Option<&str>) -> bool {
        self.send_chat(CHAT_MESSAGE, sender, content, conversation_id)
    }

    /// Ask the assistant; the answer arrives on the user-scoped chat topic
    pub fn send_chat_query(&self, sender: &str, content: &str, conversation_id: Option<&str>) -> bool {
        self.send_chat(CHAT_QUERY, sender, content, conversation_id)
    }

    pub fn send_order_update<T: Serialize + ?Sized>(&self, entity_id: &str, action: &str, data: &T) -> bool {
        self.send_entity_update(ORDERS_UPDATE, entity_id, action, data)
    }

    pub fn send_product_update<T: Serialize + ?Sized>(&self, entity_id: &str, action: &str, data: &T) -> bool {
        self.send_entity_update(PRODUCTS_UPDATE, entity_id, action, data)
    }

    pub fn send_inventory_update<T: Serialize + ?Sized>(&self, entity_id: &str, action: &str, data: &T) -> bool {
        self.send_entity_update(INVENTORY_UPDATE, entity_id, action, data)
    }

    fn send_chat(&self, destination: &str, sender: &str, content: &str, conversation_id: Option<&str>) -> bool {
        let message = ChatRequest {
            sender,
            content,
            conversation_id,
            timestamp: client_timestamp(),
        };
        self.send_message(destination, &message)
    }

    fn send_entity_update<T: Serialize + ?Sized>(
        &self,
        destination: &str,
        entity_id: &str,
        action: &str,
        data: &T,
    ) -> bool {
        let update = EntityUpdateRequest {
            entity_id,
            action,
            data,
            affected_users: ALL_USERS,
        };
        self.send_message(destination, &update)
    }
}

impl SessionInner {
    fn set_state(&self, state: ConnectionState) {
        let _ = self.state.send(state);
    }

    /// Stand down attempts, timers, and loss watchers; caller holds `connection`
    fn teardown(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.set_state(ConnectionState::Disconnected);
    }

    fn active_connection(&self) -> Option<Arc<dyn TransportClient>> {
        if *self.state_rx.borrow() != ConnectionState::Connected {
            return None;
        }
        self.connection.lock().clone()
    }

    fn start_attempt(self: &Arc<Self>, callbacks: Callbacks) {
        let epoch = {
            let _connection = self.connection.lock();
            self.set_state(ConnectionState::Connecting);
            self.epoch.load(Ordering::SeqCst)
        };
        self.spawn_attempt(epoch, callbacks);
    }

    fn spawn_attempt(self: &Arc<Self>, epoch: u64, callbacks: Callbacks) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            inner.attempt(epoch, callbacks).await;
        });
    }

    async fn attempt(self: Arc<Self>, epoch: u64, callbacks: Callbacks) {
        debug!(endpoint = %self.config.endpoint, "Connecting");

        let established = match self
            .connector
            .connect(&self.config.endpoint, &self.config.connect_headers)
            .await
        {
            Ok(established) => established,
            Err(e) => {
                error!(error = %e, "Connection error");
                self.handle_connection_error(epoch, None, callbacks);
                return;
            }
        };

        // Teardown bumps the epoch under this lock, so checking it here and
        // publishing the connection cannot interleave with a shutdown
        let generation = {
            let mut connection = self.connection.lock();
            if self.epoch.load(Ordering::SeqCst) != epoch {
                None
            } else {
                let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                *connection = Some(established.client.clone());
                self.reconnect_attempts.store(0, Ordering::SeqCst);
                self.resubscribe(&established.client);
                self.set_state(ConnectionState::Connected);
                Some(generation)
            }
        };

        let Some(generation) = generation else {
            debug!("Session shut down during connect, closing new connection");
            established.client.disconnect().await;
            return;
        };
        info!(command = %established.frame.command, "Connected");

        self.watch_connection(epoch, generation, established.lost, callbacks.clone());
        (callbacks.on_connect)(&established.frame);
    }

    /// Retry or give up after a failed attempt or a lost connection
    ///
    /// Ignored when the session was torn down since `epoch`, or when
    /// `generation` no longer names the live connection.
    fn handle_connection_error(
        self: &Arc<Self>,
        epoch: u64,
        generation: Option<u64>,
        callbacks: Callbacks,
    ) {
        let exhausted = {
            let mut connection = self.connection.lock();
            if self.epoch.load(Ordering::SeqCst) != epoch {
                debug!("Session shut down, ignoring connection error");
                return;
            }
            if generation.is_some_and(|g| self.generation.load(Ordering::SeqCst) != g) {
                return;
            }
            *connection = None;

            let attempts = self.reconnect_attempts.load(Ordering::SeqCst);
            let max_attempts = self.config.max_reconnect_attempts;

            if attempts < max_attempts {
                let attempt = attempts + 1;
                self.reconnect_attempts.store(attempt, Ordering::SeqCst);
                info!(attempt = attempt, max_attempts = max_attempts, "Reconnecting...");
                self.set_state(ConnectionState::Reconnecting);
                self.schedule_reconnect(epoch, callbacks.clone());
                None
            } else {
                error!(attempts = attempts, "Max reconnection attempts reached");
                self.set_state(ConnectionState::Failed);
                Some(attempts)
            }
        };

        if let Some(attempts) = exhausted {
            (callbacks.on_error)(&SessionError::ReconnectExhausted { attempts });
        }
    }

    fn schedule_reconnect(self: &Arc<Self>, epoch: u64, callbacks: Callbacks) {
        let inner = Arc::clone(self);
        let delay = self.config.reconnect_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            {
                let _connection = inner.connection.lock();
                if inner.epoch.load(Ordering::SeqCst) != epoch
                    || *inner.state_rx.borrow() != ConnectionState::Reconnecting
                {
                    // Shut down or reconnected elsewhere while waiting
                    debug!("Reconnect cancelled");
                    return;
                }
                inner.set_state(ConnectionState::Connecting);
            }
            inner.spawn_attempt(epoch, callbacks);
        });
    }

    fn watch_connection(
        self: &Arc<Self>,
        epoch: u64,
        generation: u64,
        lost: oneshot::Receiver<TransportError>,
        callbacks: Callbacks,
    ) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            // A dropped sender means a clean close
            let Ok(cause) = lost.await else { return };

            if inner.generation.load(Ordering::SeqCst) != generation {
                return;
            }
            warn!(error = %cause, "Connection lost");
            inner.handle_connection_error(epoch, Some(generation), callbacks);
        });
    }

    fn resubscribe(&self, client: &Arc<dyn TransportClient>) {
        let mut subs = self.subscriptions.lock();
        if subs.is_empty() {
            return;
        }

        subs.retain(|destination, tracked| {
            tracked.handle.unsubscribe();
            match client.subscribe(destination, frame_handler(destination, tracked.callback.clone())) {
                Ok(handle) => {
                    tracked.handle = handle;
                    debug!(destination = destination.as_str(), "Resubscribed");
                    true
                }
                Err(e) => {
                    warn!(destination = destination.as_str(), error = %e, "Failed to resubscribe");
                    false
                }
            }
        });
    }
}

/// Wrap a message callback so malformed bodies still reach it as raw text
fn frame_handler(destination: &str, callback: MessageCallback) -> FrameHandler {
    let destination = destination.to_string();
    Arc::new(move |frame| {
        let payload = Payload::parse(&frame.body);
        if payload.is_raw() {
            warn!(destination = %destination, "Error parsing message, delivering raw body");
        }
        callback(payload);
    })
}
