mod message;
mod metrics;

pub use message::{handle_message, message_handler};
pub use metrics::metrics_handler;

pub const MESSAGE_PATH: &str = "/message";
pub const METRICS_PATH: &str = "/metrics";
pub const USER_ID_HEADER: &str = "userId";
