//! Reschedule settings and student reschedule requests.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TutorError};
use crate::lesson::{LessonId, StudentId};
use crate::time::{format_hhmm, MINUTES_PER_DAY};

/// Process-wide availability configuration used by the slot engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RescheduleSettings {
    pub work_start: NaiveTime,
    pub work_end: NaiveTime,
    /// Weekday indices (Monday = 0) on which reschedules may be booked.
    pub available_days: BTreeSet<u8>,
    pub max_weeks_ahead: u32,
    pub slot_interval_minutes: u32,
}

impl Default for RescheduleSettings {
    fn default() -> Self {
        Self {
            work_start: NaiveTime::from_hms_opt(10, 0, 0).unwrap_or(NaiveTime::MIN),
            work_end: NaiveTime::from_hms_opt(19, 0, 0).unwrap_or(NaiveTime::MIN),
            available_days: (0..=5).collect(),
            max_weeks_ahead: 2,
            slot_interval_minutes: 30,
        }
    }
}

impl RescheduleSettings {
    pub fn validate(&self) -> Result<()> {
        if self.work_start >= self.work_end {
            return Err(TutorError::validation(format!(
                "work_start {} must be before work_end {}",
                format_hhmm(self.work_start),
                format_hhmm(self.work_end)
            )));
        }
        if let Some(bad) = self.available_days.iter().find(|d| **d > 6) {
            return Err(TutorError::validation(format!(
                "available day {bad} out of range 0-6"
            )));
        }
        if self.slot_interval_minutes == 0 || self.slot_interval_minutes >= MINUTES_PER_DAY {
            return Err(TutorError::validation(format!(
                "slot_interval_minutes {} must be between 1 and {}",
                self.slot_interval_minutes,
                MINUTES_PER_DAY - 1
            )));
        }
        if self.max_weeks_ahead == 0 {
            return Err(TutorError::validation("max_weeks_ahead must be at least 1"));
        }
        Ok(())
    }

    pub fn is_day_available(&self, day: u8) -> bool {
        self.available_days.contains(&day)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Processed,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Processed => "processed",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = TutorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "processed" => Ok(RequestStatus::Processed),
            other => Err(TutorError::validation(format!(
                "unknown request status '{other}'"
            ))),
        }
    }
}

/// A student's proposal to move one lesson occurrence, awaiting an admin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RescheduleRequest {
    pub id: i64,
    pub student_id: StudentId,
    pub schedule_id: LessonId,
    pub original_date: NaiveDate,
    pub original_time: NaiveTime,
    pub requested_date: NaiveDate,
    pub requested_time: NaiveTime,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRescheduleRequest {
    pub student_id: StudentId,
    pub schedule_id: LessonId,
    pub original_date: NaiveDate,
    pub original_time: NaiveTime,
    pub requested_date: NaiveDate,
    pub requested_time: NaiveTime,
}
