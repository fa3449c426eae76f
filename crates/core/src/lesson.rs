//! Weekly lessons and their next concrete occurrence.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::time::{format_hhmm, intervals_overlap, minute_of_day, weekday_index, weekday_name};

pub type LessonId = i64;
pub type StudentId = i64;

/// A recurring weekly lesson slot owned by one student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyLesson {
    pub id: LessonId,
    pub student_id: StudentId,
    /// Monday = 0 .. Sunday = 6.
    pub day_of_week: u8,
    pub time: NaiveTime,
    pub duration_minutes: u32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WeeklyLesson {
    pub fn time_label(&self) -> String {
        format_hhmm(self.time)
    }

    pub fn weekday_name(&self) -> &'static str {
        weekday_name(self.day_of_week)
    }

    /// Start/end as minutes since midnight. The end may exceed 24:00 for
    /// legacy rows; comparisons stay correct because they are numeric.
    pub fn minute_range(&self) -> (u32, u32) {
        let start = minute_of_day(self.time);
        (start, start + self.duration_minutes)
    }

    /// Whether `[start, end)` (minutes since midnight) intersects this lesson.
    pub fn overlaps_minutes(&self, start: u32, end: u32) -> bool {
        let (own_start, own_end) = self.minute_range();
        intervals_overlap(start, end, own_start, own_end)
    }
}

/// Partial update applied by the Schedule Store. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LessonUpdate {
    pub day_of_week: Option<u8>,
    /// `"HH:MM"`.
    pub time: Option<String>,
    pub duration_minutes: Option<u32>,
    pub active: Option<bool>,
}

impl LessonUpdate {
    pub fn is_empty(&self) -> bool {
        self.day_of_week.is_none()
            && self.time.is_none()
            && self.duration_minutes.is_none()
            && self.active.is_none()
    }
}

/// The next concrete occurrence of one of a student's weekly lessons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NextLesson {
    pub lesson: WeeklyLesson,
    pub date: NaiveDate,
    pub weekday_name: String,
    pub time: String,
    pub duration_minutes: u32,
}

impl NextLesson {
    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.lesson.time)
    }
}

/// Pick the earliest active lesson whose `(day_of_week, time)` is strictly
/// after `now` within the current week, wrapping to the earliest lesson of
/// next week when none remain.
pub fn pick_next_occurrence(lessons: &[WeeklyLesson], now: NaiveDateTime) -> Option<NextLesson> {
    let mut active: Vec<&WeeklyLesson> = lessons.iter().filter(|l| l.active).collect();
    active.sort_by_key(|l| (l.day_of_week, l.time));

    let current_day = weekday_index(now.date());
    let current = (current_day, now.time());

    let (lesson, days_ahead) = match active.iter().find(|l| (l.day_of_week, l.time) > current) {
        Some(lesson) => (*lesson, lesson.day_of_week as i64 - current_day as i64),
        None => {
            let first = active.first()?;
            (*first, 7 - current_day as i64 + first.day_of_week as i64)
        }
    };

    Some(NextLesson {
        lesson: lesson.clone(),
        date: now.date() + Duration::days(days_ahead),
        weekday_name: lesson.weekday_name().to_string(),
        time: lesson.time_label(),
        duration_minutes: lesson.duration_minutes,
    })
}
