pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod lesson;
pub mod reminder;
pub mod reschedule;
pub mod slot;
pub mod time;

pub use cache::TtlCache;
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Config;
pub use error::*;
pub use lesson::*;
pub use reminder::*;
pub use reschedule::*;
pub use slot::*;
