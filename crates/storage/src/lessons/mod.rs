//! Weekly lesson persistence with per-student conflict detection.

use chrono::{DateTime, NaiveDateTime, NaiveTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, info};
use tutor_core::time::{
    add_minutes, format_hhmm, minute_of_day, parse_hhmm, validate_duration, validate_weekday,
    weekday_name,
};
use tutor_core::{pick_next_occurrence, LessonId, LessonUpdate, NextLesson, StudentId, WeeklyLesson};

use crate::error::{Result, StoreError};

pub const DEFAULT_DURATION_MINUTES: u32 = 60;

/// How a new or moved lesson is checked against the student's other lessons.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Only an identical `(day_of_week, time)` start conflicts.
    #[default]
    ExactStart,
    /// Any intersection of `[time, time + duration)` on the same weekday
    /// conflicts, including an identical start.
    Overlap,
}

#[derive(sqlx::FromRow)]
struct LessonRow {
    id: i64,
    student_id: i64,
    day_of_week: i64,
    time: String,
    duration_minutes: i64,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<LessonRow> for WeeklyLesson {
    type Error = StoreError;

    fn try_from(row: LessonRow) -> Result<Self> {
        let corrupt = |what: &str| StoreError::Corrupt(format!("lesson {}: bad {what}", row.id));
        Ok(WeeklyLesson {
            id: row.id,
            student_id: row.student_id,
            day_of_week: u8::try_from(row.day_of_week).map_err(|_| corrupt("day_of_week"))?,
            time: parse_hhmm(&row.time).map_err(|_| corrupt("time"))?,
            duration_minutes: u32::try_from(row.duration_minutes)
                .map_err(|_| corrupt("duration_minutes"))?,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const LESSON_COLUMNS: &str =
    "id, student_id, day_of_week, time, duration_minutes, active, created_at, updated_at";

/// Owns the `weekly_lessons` table.
#[derive(Debug, Clone)]
pub struct ScheduleStore {
    pool: SqlitePool,
    policy: ConflictPolicy,
}

impl ScheduleStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            policy: ConflictPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ConflictPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// Insert an active lesson. Fails with `Conflict` when the student
    /// already has a lesson there, and with `Validation` on bad input.
    pub async fn add(
        &self,
        student_id: StudentId,
        day_of_week: u8,
        time: &str,
        duration_minutes: u32,
    ) -> Result<WeeklyLesson> {
        validate_weekday(day_of_week)?;
        let start = parse_hhmm(time)?;
        validate_duration(duration_minutes)?;
        add_minutes(start, duration_minutes)?;

        let mut tx = self.write_tx().await?;
        self.ensure_free(&mut tx, student_id, day_of_week, start, duration_minutes, None)
            .await?;

        let now = Utc::now();
        let sql = format!(
            "INSERT INTO weekly_lessons (student_id, day_of_week, time, duration_minutes, active, created_at, updated_at)
             VALUES (?, ?, ?, ?, 1, ?, ?)
             RETURNING {LESSON_COLUMNS}"
        );
        let row = sqlx::query_as::<_, LessonRow>(&sql)
            .bind(student_id)
            .bind(i64::from(day_of_week))
            .bind(format_hhmm(start))
            .bind(i64::from(duration_minutes))
            .bind(now)
            .bind(now)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| StoreError::from_write(e, slot_taken(student_id, day_of_week, start)))?;
        tx.commit().await?;

        let lesson = WeeklyLesson::try_from(row)?;
        info!(
            lesson_id = lesson.id,
            student_id,
            day = weekday_name(day_of_week),
            time = %lesson.time_label(),
            "Lesson added"
        );
        Ok(lesson)
    }

    /// Active lessons of one student ordered by `(day_of_week, time)`.
    pub async fn list(&self, student_id: StudentId) -> Result<Vec<WeeklyLesson>> {
        let sql = format!(
            "SELECT {LESSON_COLUMNS} FROM weekly_lessons
             WHERE student_id = ? AND active = 1
             ORDER BY day_of_week, time"
        );
        let rows = sqlx::query_as::<_, LessonRow>(&sql)
            .bind(student_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(WeeklyLesson::try_from).collect()
    }

    /// Active lessons of every student on one weekday, ordered by time.
    pub async fn list_for_weekday(&self, day_of_week: u8) -> Result<Vec<WeeklyLesson>> {
        let sql = format!(
            "SELECT {LESSON_COLUMNS} FROM weekly_lessons
             WHERE day_of_week = ? AND active = 1
             ORDER BY time, student_id"
        );
        let rows = sqlx::query_as::<_, LessonRow>(&sql)
            .bind(i64::from(day_of_week))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(WeeklyLesson::try_from).collect()
    }

    /// Students with at least one active lesson.
    pub async fn list_student_ids(&self) -> Result<Vec<StudentId>> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT DISTINCT student_id FROM weekly_lessons WHERE active = 1 ORDER BY student_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    /// Fetch a lesson by id, active or not.
    pub async fn get(&self, id: LessonId) -> Result<WeeklyLesson> {
        let sql = format!("SELECT {LESSON_COLUMNS} FROM weekly_lessons WHERE id = ?");
        let row = sqlx::query_as::<_, LessonRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("lesson", id))?;
        WeeklyLesson::try_from(row)
    }

    /// Apply a partial update atomically. A conflicting day/time leaves the
    /// lesson untouched and returns `Conflict`.
    pub async fn update(&self, id: LessonId, update: LessonUpdate) -> Result<WeeklyLesson> {
        if let Some(day) = update.day_of_week {
            validate_weekday(day)?;
        }
        let new_time = update.time.as_deref().map(parse_hhmm).transpose()?;
        if let Some(duration) = update.duration_minutes {
            validate_duration(duration)?;
        }

        let mut tx = self.write_tx().await?;
        let sql = format!("SELECT {LESSON_COLUMNS} FROM weekly_lessons WHERE id = ?");
        let current = sqlx::query_as::<_, LessonRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::not_found("lesson", id))?;
        let current = WeeklyLesson::try_from(current)?;

        if update.is_empty() {
            return Ok(current);
        }

        let day = update.day_of_week.unwrap_or(current.day_of_week);
        let time = new_time.unwrap_or(current.time);
        let duration = update.duration_minutes.unwrap_or(current.duration_minutes);
        let active = update.active.unwrap_or(current.active);
        add_minutes(time, duration)?;

        let placement_changed = day != current.day_of_week
            || time != current.time
            || duration != current.duration_minutes
            || (active && !current.active);
        if active && placement_changed {
            self.ensure_free(&mut tx, current.student_id, day, time, duration, Some(id))
                .await?;
        }

        let sql = format!(
            "UPDATE weekly_lessons
             SET day_of_week = ?, time = ?, duration_minutes = ?, active = ?, updated_at = ?
             WHERE id = ?
             RETURNING {LESSON_COLUMNS}"
        );
        let row = sqlx::query_as::<_, LessonRow>(&sql)
            .bind(i64::from(day))
            .bind(format_hhmm(time))
            .bind(i64::from(duration))
            .bind(active)
            .bind(Utc::now())
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| StoreError::from_write(e, slot_taken(current.student_id, day, time)))?;
        tx.commit().await?;

        let lesson = WeeklyLesson::try_from(row)?;
        debug!(lesson_id = id, student_id = lesson.student_id, "Lesson updated");
        Ok(lesson)
    }

    pub async fn delete(&self, id: LessonId) -> Result<()> {
        let result = sqlx::query("DELETE FROM weekly_lessons WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("lesson", id));
        }
        info!(lesson_id = id, "Lesson deleted");
        Ok(())
    }

    /// Remove every lesson of a student (reminders and requests cascade).
    pub async fn delete_for_student(&self, student_id: StudentId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM weekly_lessons WHERE student_id = ?")
            .bind(student_id)
            .execute(&self.pool)
            .await?;
        info!(student_id, removed = result.rows_affected(), "Student lessons deleted");
        Ok(result.rows_affected())
    }

    /// The student's next lesson strictly after `now`.
    pub async fn next_occurrence(&self, student_id: StudentId, now: NaiveDateTime) -> Result<Option<NextLesson>> {
        let lessons = self.list(student_id).await?;
        Ok(pick_next_occurrence(&lessons, now))
    }

    /// Writers take the database write lock up front, so concurrent adds
    /// queue on the busy timeout and re-check conflicts after the winner
    /// commits.
    async fn write_tx(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    async fn ensure_free(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        student_id: StudentId,
        day_of_week: u8,
        time: NaiveTime,
        duration_minutes: u32,
        exclude: Option<LessonId>,
    ) -> Result<()> {
        let sql = format!(
            "SELECT {LESSON_COLUMNS} FROM weekly_lessons
             WHERE student_id = ? AND day_of_week = ? AND active = 1 AND id <> ?"
        );
        let rows = sqlx::query_as::<_, LessonRow>(&sql)
            .bind(student_id)
            .bind(i64::from(day_of_week))
            .bind(exclude.unwrap_or(-1))
            .fetch_all(&mut **tx)
            .await?;

        let start = minute_of_day(time);
        let end = start + duration_minutes;
        for row in rows {
            let other = WeeklyLesson::try_from(row)?;
            let clash = match self.policy {
                ConflictPolicy::ExactStart => other.time == time,
                ConflictPolicy::Overlap => other.time == time || other.overlaps_minutes(start, end),
            };
            if clash {
                debug!(student_id, other = other.id, "Lesson slot conflict");
                return Err(StoreError::Conflict(format!(
                    "{} (lesson {} at {} for {} min)",
                    slot_taken(student_id, day_of_week, time),
                    other.id,
                    other.time_label(),
                    other.duration_minutes
                )));
            }
        }
        Ok(())
    }
}

fn slot_taken(student_id: StudentId, day_of_week: u8, time: NaiveTime) -> String {
    format!(
        "student {student_id} already has a lesson on {} at {}",
        weekday_name(day_of_week),
        format_hhmm(time)
    )
}

#[cfg(test)]
mod tests;
