//! CLI command definitions

use clap::{Parser, Subcommand};
use skinme_live_client::SessionConfig;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "skinme-live")]
#[command(about = "Drive live sessions against an in-process broker", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Endpoint the session connects to
    #[arg(long, env = "SKINME_WS_ENDPOINT", default_value = "/ws-endpoint", global = true)]
    pub endpoint: String,

    /// User named in the connect headers
    #[arg(long, env = "SKINME_WS_LOGIN", default_value = "demo-user", global = true)]
    pub login: String,

    /// Retries after a failed connect before giving up
    #[arg(long, env = "SKINME_WS_MAX_RECONNECT_ATTEMPTS", default_value_t = 5, global = true)]
    pub max_reconnect_attempts: u32,

    /// Delay between retries in milliseconds
    #[arg(long, env = "SKINME_WS_RECONNECT_DELAY_MS", default_value_t = 3000, global = true)]
    pub reconnect_delay_ms: u64,
}

impl Cli {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::new(self.endpoint.clone())
            .login(self.login.clone())
            .max_reconnect_attempts(self.max_reconnect_attempts)
            .reconnect_delay(Duration::from_millis(self.reconnect_delay_ms))
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Subscribe to every live destination and exercise each send
    Demo,

    /// Watch a session recover from refused connects
    ///
    /// Examples:
    ///   skinme-live reconnect --failures 3
    ///   skinme-live reconnect --failures 6 --reconnect-delay-ms 500
    Reconnect {
        /// Connects the broker refuses before accepting
        #[arg(short, long, default_value_t = 2)]
        failures: u32,
    },
}
