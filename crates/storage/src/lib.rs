//! SQLite persistence for lessons, settings, reschedule requests and
//! reminder state. Uniqueness invariants live in the schema as well as in
//! the store code, so concurrent writers cannot break them.

pub mod db;
pub mod error;
pub mod lessons;
pub mod reminders;
pub mod requests;
pub mod settings;

pub use db::{init_pool, memory_pool, migrate};
pub use error::StoreError;
pub use lessons::{ConflictPolicy, ScheduleStore, DEFAULT_DURATION_MINUTES};
pub use reminders::ReminderStore;
pub use requests::RequestStore;
pub use settings::SettingsStore;
pub use sqlx::SqlitePool;
