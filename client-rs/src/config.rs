//! Configuration for a live session

use crate::destinations::{DEFAULT_ENDPOINT, USER_PREFIX};
use crate::transport::Headers;
use std::time::Duration;

/// Configuration for a [`Session`](crate::Session)
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Connection target handed to the connector (e.g. "/ws-endpoint")
    pub endpoint: String,

    /// Headers sent with every connect attempt (e.g. `login`)
    pub connect_headers: Headers,

    /// Retries allowed after a failure before the session gives up
    pub max_reconnect_attempts: u32,

    /// Fixed delay before each retry
    pub reconnect_delay: Duration,

    /// Prefix prepended by user-scoped subscriptions
    pub user_prefix: String,
}

impl SessionConfig {
    /// Create a configuration for the given endpoint with the stock retry policy
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            connect_headers: Headers::new(),
            max_reconnect_attempts: 5,
            reconnect_delay: Duration::from_millis(3000),
            user_prefix: USER_PREFIX.to_string(),
        }
    }

    /// Add a header sent on connect
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.connect_headers.insert(name.into(), value.into());
        self
    }

    /// Identify the session's user to the broker
    pub fn login(self, user: impl Into<String>) -> Self {
        self.header("login", user)
    }

    /// Set how many retries are allowed before giving up
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Set the fixed retry delay
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Give up on the first failure
    pub fn no_reconnect(mut self) -> Self {
        self.max_reconnect_attempts = 0;
        self
    }

    /// Set the user-scope prefix
    pub fn user_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.user_prefix = prefix.into();
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT)
    }
}
