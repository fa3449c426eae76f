use std::fmt;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::time::{format_hhmm, intervals_overlap};

/// A candidate free window of exactly the requested duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Slot {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl Slot {
    pub fn start_label(&self) -> String {
        format_hhmm(self.start)
    }

    pub fn end_label(&self) -> String {
        format_hhmm(self.end)
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start_label(), self.end_label())
    }
}

/// Externally sourced busy range on a single calendar date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusyInterval {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub title: String,
}

impl BusyInterval {
    pub fn overlaps(&self, start: NaiveTime, end: NaiveTime) -> bool {
        intervals_overlap(start, end, self.start, self.end)
    }
}

/// A day with at least one bookable slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailableDay {
    pub date: NaiveDate,
    pub weekday: u8,
    pub weekday_name: String,
    pub slot_count: usize,
}
