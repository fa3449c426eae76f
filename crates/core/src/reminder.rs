//! Reminder records and the offset/retention policy that plans them.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::lesson::{LessonId, StudentId};

/// Persisted record of a planned reminder for one lesson occurrence.
///
/// `(student_id, schedule_id, reminder_time)` is unique, so re-planning the
/// same occurrence never produces a second row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledReminder {
    pub id: i64,
    pub student_id: StudentId,
    pub schedule_id: LessonId,
    pub reminder_time: NaiveDateTime,
    pub lesson_time: NaiveDateTime,
    pub is_sent: bool,
    pub created_at: DateTime<Utc>,
}

impl ScheduledReminder {
    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        !self.is_sent && self.reminder_time <= now
    }
}

/// When to remind and how long to keep reminder history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderPolicy {
    pub offset_minutes: u32,
    pub retention_days: u32,
}

impl Default for ReminderPolicy {
    fn default() -> Self {
        Self {
            offset_minutes: 15,
            retention_days: 7,
        }
    }
}

impl ReminderPolicy {
    pub fn reminder_time(&self, lesson_time: NaiveDateTime) -> NaiveDateTime {
        lesson_time - Duration::minutes(self.offset_minutes as i64)
    }

    /// Rows whose reminder time is before this instant are reapable.
    pub fn retention_cutoff(&self, now: NaiveDateTime) -> NaiveDateTime {
        now - Duration::days(self.retention_days as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn reminder_time_is_offset_before_lesson() {
        let lesson = NaiveDate::from_ymd_opt(2026, 10, 21)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        let policy = ReminderPolicy::default();
        assert_eq!(
            policy.reminder_time(lesson),
            lesson - Duration::minutes(15)
        );
        assert_eq!(policy.retention_cutoff(lesson), lesson - Duration::days(7));
    }
}
