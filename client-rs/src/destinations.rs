//! Fixed destinations forming the routing contract with the server

/// Default connection endpoint
pub const DEFAULT_ENDPOINT: &str = "/ws-endpoint";

/// Prefix the server uses to scope destinations to one user
pub const USER_PREFIX: &str = "/user";

/// Prefix of server-handled application destinations
pub const APP_PREFIX: &str = "/app";

pub const CHAT_TOPIC: &str = "/topic/chat";
/// Subscribed through the user prefix
pub const NOTIFICATIONS_TOPIC: &str = "/topic/notifications";
pub const ORDERS_TOPIC: &str = "/topic/orders";
pub const PRODUCTS_TOPIC: &str = "/topic/products";
pub const INVENTORY_TOPIC: &str = "/topic/inventory";

pub const CHAT_MESSAGE: &str = "/app/chat/message";
pub const CHAT_QUERY: &str = "/app/chat/query";
pub const ORDERS_UPDATE: &str = "/app/orders/update";
pub const PRODUCTS_UPDATE: &str = "/app/products/update";
pub const INVENTORY_UPDATE: &str = "/app/inventory/update";

/// `affectedUsers` value addressing everyone
pub const ALL_USERS: &str = "ALL";
