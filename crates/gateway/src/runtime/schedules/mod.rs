//! Schedule store and runner — cron-based jobs that inject an agent turn.
//!
//! Schedules are persisted to `data/schedules.json`. The runner ticks every
//! 30 seconds and fires any due schedules.
//!
//! Split into submodules for maintainability:
//! - [`model`] — Data types, enums, config structs
//! - [`cron`] — Timezone-aware cron evaluation
//! - [`validation`] — Input validation (cron, timezones)
//! - [`store`] — Persistent `ScheduleStore` with event broadcasting
//! - [`runner`] — Ticker that fires due schedules into the turn runtime

pub mod cron;
pub mod model;
pub mod runner;
pub mod store;
pub mod validation;

pub use cron::{cron_matches, cron_next, cron_next_n, cron_next_n_tz, cron_next_tz, parse_tz};
pub use model::{MissedPolicy, Schedule, ScheduleEvent, ScheduleStatus, ScheduleView};
pub use runner::{InjectedUsage, ScheduleRunner, TurnInjector};
pub use store::ScheduleStore;
pub use validation::{validate_cron, validate_timezone};
