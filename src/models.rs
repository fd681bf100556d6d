use serde::{Deserialize, Serialize};

// Body of every gateway response, success or not
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct MessageBody {
    pub message: String,
}

impl MessageBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// FOAAS API response format
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct UpstreamMessage {
    pub message: String,
    #[serde(default)]
    pub subtitle: String,
}
