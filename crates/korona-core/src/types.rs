//! Value types shared between the bot's components.

use serde::{Deserialize, Serialize};

/// A subscribed chat user and the county they selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTarget {
    /// Chat id on the transport (Telegram chat id as string).
    pub user_id: String,
    /// Selected county, `None` until the user picked one.
    pub region: Option<String>,
}

impl UserTarget {
    pub fn new(user_id: impl Into<String>, region: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            region,
        }
    }

    /// A user we know nothing about yet.
    pub fn unregistered(user_id: impl Into<String>) -> Self {
        Self::new(user_id, None)
    }
}

/// Latest known metric value for one region, as delivered by a metric source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionMetric {
    pub region: String,
    pub value: Option<f64>,
}

impl RegionMetric {
    pub fn new(region: impl Into<String>, value: Option<f64>) -> Self {
        Self {
            region: region.into(),
            value,
        }
    }
}

/// Incoming text message from a chat transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub channel: String,
    /// Conversation the reply goes to; doubles as the user id.
    pub chat_id: String,
    pub sender_id: String,
    pub sender_name: Option<String>,
    pub content: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}
