//! External busy-calendar adapter.
//!
//! Downloads a single iCalendar feed, expands recurring events into a
//! bounded forward window, normalizes everything to one reference timezone
//! and answers per-date busy queries from a TTL cache. Feed problems are
//! logged and degrade to "nothing is busy".

pub mod adapter;
pub mod error;
pub mod expand;
pub mod fetch;
mod parse;

pub use adapter::{BusySource, CalendarAdapter, CalendarSettings, NoCalendar};
pub use error::CalendarError;
pub use expand::BusyEvent;
pub use fetch::{FeedFetcher, HttpFeedFetcher};
