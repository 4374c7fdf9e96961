//! # Korona Core
//! Shared error type, configuration, value types, and the traits the bot's
//! collaborators (user store, metric source, chat transport) implement.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::KoronaConfig;
pub use error::{KoronaError, Result};
pub use traits::{MetricLookup, MetricSource, Transport, UserStore};
pub use types::{IncomingMessage, RegionMetric, UserTarget};
