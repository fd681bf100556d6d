use clap::{Args, Parser, Subcommand};
use std::time::Duration;

use crate::error::GatewayError;
use crate::upstream::DEFAULT_UPSTREAM_URL;

pub const DEFAULT_LISTEN_ADDRESS: &str = "localhost:8080";
pub const DEFAULT_RATE_LIMIT_COUNT: u32 = 5;
pub const DEFAULT_RATE_LIMIT_WINDOW_MS: u64 = 10_000;
pub const DEFAULT_UPSTREAM_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 5_000;

// one year
const MAX_WINDOW_MS: u64 = 365 * 24 * 60 * 60 * 1000;

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "message-gateway")]
#[command(about = "Rate limiting gateway in front of a message API")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the gateway server
    Serve(ServeArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    // Address for listening to clients
    #[arg(long, default_value = DEFAULT_LISTEN_ADDRESS)]
    pub listen_address: String,

    // Log level, empty keeps RUST_LOG or the default
    #[arg(long, default_value = "")]
    pub log_level: String,

    // Max requests a user can make inside one window
    #[arg(long, default_value_t = DEFAULT_RATE_LIMIT_COUNT)]
    pub rate_limit_count: u32,

    // Rate limit window in milliseconds
    #[arg(long, default_value_t = DEFAULT_RATE_LIMIT_WINDOW_MS)]
    pub rate_limit_window_ms: u64,

    // Message API base url
    #[arg(long, default_value = DEFAULT_UPSTREAM_URL)]
    pub upstream_url: String,

    // Timeout for one message API call in milliseconds
    #[arg(long, default_value_t = DEFAULT_UPSTREAM_TIMEOUT_MS)]
    pub upstream_timeout_ms: u64,

    // How long in-flight requests may take to drain on shutdown
    #[arg(long, default_value_t = DEFAULT_SHUTDOWN_GRACE_MS)]
    pub shutdown_grace_ms: u64,

    // Also serve prometheus metrics on /metrics
    #[arg(long, default_value_t = false)]
    pub expose_metrics: bool,
}

/// Validated settings the gateway is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub listen_address: String,
    pub rate_limit: u32,
    pub rate_window: Duration,
    pub upstream_url: String,
    pub upstream_timeout: Duration,
    pub shutdown_grace: Duration,
    pub expose_metrics: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_address: DEFAULT_LISTEN_ADDRESS.to_string(),
            rate_limit: DEFAULT_RATE_LIMIT_COUNT,
            rate_window: Duration::from_millis(DEFAULT_RATE_LIMIT_WINDOW_MS),
            upstream_url: DEFAULT_UPSTREAM_URL.to_string(),
            upstream_timeout: Duration::from_millis(DEFAULT_UPSTREAM_TIMEOUT_MS),
            shutdown_grace: Duration::from_millis(DEFAULT_SHUTDOWN_GRACE_MS),
            expose_metrics: false,
        }
    }
}

impl ServeArgs {
    pub fn validate(&self) -> Result<GatewayConfig, GatewayError> {
        if self.rate_limit_window_ms == 0 {
            return Err(GatewayError::Config(
                "rate limit window must be greater than zero".to_string(),
            ));
        }
        if self.rate_limit_window_ms > MAX_WINDOW_MS {
            return Err(GatewayError::Config(format!(
                "rate limit window must be at most {MAX_WINDOW_MS}ms"
            )));
        }
        if self.upstream_timeout_ms == 0 {
            return Err(GatewayError::Config(
                "upstream timeout must be greater than zero".to_string(),
            ));
        }
        if self.listen_address.trim().is_empty() {
            return Err(GatewayError::Config("listen address is empty".to_string()));
        }

        Ok(GatewayConfig {
            listen_address: self.listen_address.clone(),
            rate_limit: self.rate_limit_count,
            rate_window: Duration::from_millis(self.rate_limit_window_ms),
            upstream_url: self.upstream_url.clone(),
            upstream_timeout: Duration::from_millis(self.upstream_timeout_ms),
            shutdown_grace: Duration::from_millis(self.shutdown_grace_ms),
            expose_metrics: self.expose_metrics,
        })
    }
}
