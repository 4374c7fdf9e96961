//! Collaborator interfaces. The bot core only talks to these traits; the
//! concrete SQLite store, RKI client, and Telegram transport live in their own
//! crates.

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{RegionMetric, UserTarget};

/// Durable store of subscribed users.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn list_users(&self) -> Result<Vec<UserTarget>>;

    async fn get_user(&self, user_id: &str) -> Result<Option<UserTarget>>;

    /// Insert or replace the record keyed by `user.user_id`.
    async fn upsert(&self, user: &UserTarget) -> Result<()>;

    async fn delete(&self, user: &UserTarget) -> Result<()>;
}

/// Remote source of per-region metric values.
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Fetch the full current dataset.
    async fn fetch_all(&self) -> Result<Vec<RegionMetric>>;
}

/// Read access to the latest metric per region, as used by the dispatcher.
#[async_trait]
pub trait MetricLookup: Send + Sync {
    /// Latest value for `region`; `Ok(None)` when there is no value.
    async fn value_for(&self, region: &str) -> Result<Option<f64>>;

    /// Re-fetch from the underlying source; returns the number of regions.
    async fn refresh(&self) -> Result<usize>;
}

/// Outbound side of a chat transport.
#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &str;

    async fn send_text(&self, user_id: &str, text: &str) -> Result<()>;

    /// Send the image at `path` with a caption.
    async fn send_image(&self, user_id: &str, path: &Path, caption: &str) -> Result<()>;
}
