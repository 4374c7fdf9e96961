//! # Korona Scheduler
//!
//! Daily trigger and per-user notification dispatch.
//!
//! ## Architecture
//! ```text
//! RecurringTrigger ("0 19 * * *", local time)
//!   └── on fire → Dispatcher::refresh_and_dispatch_all
//!                   ├── UserStore::list_users
//!                   └── per user (bounded concurrency, failures contained)
//!                         ├── no county  → region prompt (text)
//!                         └── county     → MetricLookup → map_to_asset → Transport::send_image
//! ```

pub mod cron;
pub mod dispatch;
pub mod trigger;

pub use cron::{Field, TimeExpression};
pub use dispatch::{DispatchOutcome, DispatchReport, Dispatcher, REGION_PROMPT};
pub use trigger::{RecurringTrigger, ScheduleState};
