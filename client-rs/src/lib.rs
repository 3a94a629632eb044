//! SkinMe live client
//!
//! A destination-keyed pub/sub session over an externally supplied transport,
//! with bounded fixed-delay reconnection, plus the storefront's pagination
//! click glue.
//!
//! # Example
//!
//! ```no_run
//! use skinme_live_client::{Connector, Payload, Session, SessionConfig};
//! use std::sync::Arc;
//!
//! async fn run(connector: Arc<dyn Connector>) {
//!     let session = Session::new(SessionConfig::new("/ws-endpoint"), connector);
//!
//!     session.connect(
//!         |frame| println!("connected: {}", frame.command),
//!         |err| eprintln!("giving up: {}", err),
//!     );
//!     session.settled().await;
//!
//!     session.subscribe_to_orders(|payload| match payload {
//!         Payload::Structured(value) => println!("order update: {}", value),
//!         Payload::Raw(text) => println!("unparsed order update: {}", text),
//!     });
//!
//!     session.send_order_update("order-42", "CREATED", &serde_json::json!({"qty": 3}));
//!     session.shutdown().await;
//! }
//! ```

mod config;
pub mod destinations;
mod error;
mod messages;
pub mod pagination;
mod session;
mod transport;

pub use config::SessionConfig;
pub use error::{Result, SessionError, TransportError};
pub use messages::{ChatMessage, ChatRequest, EntityUpdateRequest, Notification, Payload, RealTimeUpdate};
pub use session::{ConnectionState, MessageCallback, Session, SessionStatus};
pub use transport::{
    ConnectedFrame, Connector, Established, Frame, FrameHandler, Headers, TransportClient,
    TransportSubscription,
};
