//! Rate limiting gateway in front of a message API.
//!
//! Every caller identity gets a fixed window quota; admitted requests are
//! forwarded to a [`upstream::MessageProvider`] and every outcome is answered
//! with a JSON `{"message": ...}` body.

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod rate_limit;
pub mod server;
pub mod state;
pub mod upstream;

pub use config::{Cli, Command, GatewayConfig, ServeArgs};
pub use error::{ApiError, GatewayError, UpstreamError};
pub use rate_limit::{FixedWindowLimiter, Limiter};
pub use server::{Server, ServerHandle, router};
pub use upstream::MessageProvider;
