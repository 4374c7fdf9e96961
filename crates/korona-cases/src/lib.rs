//! # Korona Cases
//!
//! Everything between "a user typed a county name" and "this picture belongs
//! to that county today".
//!
//! ```text
//! RkiClient (MetricSource) ──fetch_all──▶ MetricCache
//!                                          ├── regions() ──▶ region::resolve  (county lookup)
//!                                          └── value_for() ─▶ asset::map_to_asset ─▶ Assets/<level>.jpg
//! SqliteUserStore (UserStore): chat id → selected county
//! ```

pub mod asset;
pub mod cache;
pub mod region;
pub mod rki;
pub mod users;

pub use asset::{AssetBucket, AssetCatalog, map_to_asset};
pub use cache::MetricCache;
pub use region::{MAX_MATCHES, resolve};
pub use rki::RkiClient;
pub use users::SqliteUserStore;
