//! SkinMe live - in-process broker for the storefront's live destinations
//!
//! Hosts the server side of the chat, notification, and entity-update
//! destinations so [`skinme_live_client::Session`]s can run end to end
//! without a network.

pub mod broker;
pub mod destinations;

pub use broker::{BrokerConfig, BrokerError, ChatResponder, LocalBroker, LocalConnector};
pub use destinations::{Destination, DestinationError, DestinationKind};
