//! Scheduled reminder rows: idempotent inserts, sent flag, reaping.

use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;
use tutor_core::{LessonId, ScheduledReminder, StudentId};

use crate::error::{Result, StoreError};

#[derive(sqlx::FromRow)]
struct ReminderRow {
    id: i64,
    student_id: i64,
    schedule_id: i64,
    reminder_time: NaiveDateTime,
    lesson_time: NaiveDateTime,
    is_sent: bool,
    created_at: DateTime<Utc>,
}

impl From<ReminderRow> for ScheduledReminder {
    fn from(row: ReminderRow) -> Self {
        ScheduledReminder {
            id: row.id,
            student_id: row.student_id,
            schedule_id: row.schedule_id,
            reminder_time: row.reminder_time,
            lesson_time: row.lesson_time,
            is_sent: row.is_sent,
            created_at: row.created_at,
        }
    }
}

const REMINDER_COLUMNS: &str =
    "id, student_id, schedule_id, reminder_time, lesson_time, is_sent, created_at";

/// Persisted reminder state: idempotency keys for planning and the sent flag.
#[derive(Debug, Clone)]
pub struct ReminderStore {
    pool: SqlitePool,
}

impl ReminderStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert the reminder unless one already exists for the same
    /// `(student_id, schedule_id, reminder_time)`. Returns the stored row and
    /// whether it was newly created.
    pub async fn insert_if_absent(
        &self,
        student_id: StudentId,
        schedule_id: LessonId,
        reminder_time: NaiveDateTime,
        lesson_time: NaiveDateTime,
    ) -> Result<(ScheduledReminder, bool)> {
        let result = sqlx::query(
            "INSERT INTO scheduled_reminders (student_id, schedule_id, reminder_time, lesson_time, is_sent, created_at)
             VALUES (?, ?, ?, ?, 0, ?)
             ON CONFLICT (student_id, schedule_id, reminder_time) DO NOTHING",
        )
        .bind(student_id)
        .bind(schedule_id)
        .bind(reminder_time)
        .bind(lesson_time)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                StoreError::not_found("lesson", schedule_id)
            }
            other => StoreError::Database(other),
        })?;
        let created = result.rows_affected() == 1;

        let sql = format!(
            "SELECT {REMINDER_COLUMNS} FROM scheduled_reminders
             WHERE student_id = ? AND schedule_id = ? AND reminder_time = ?"
        );
        let row = sqlx::query_as::<_, ReminderRow>(&sql)
            .bind(student_id)
            .bind(schedule_id)
            .bind(reminder_time)
            .fetch_one(&self.pool)
            .await?;
        if !created {
            debug!(reminder_id = row.id, student_id, "Reminder already planned");
        }
        Ok((row.into(), created))
    }

    pub async fn get(&self, id: i64) -> Result<ScheduledReminder> {
        let sql = format!("SELECT {REMINDER_COLUMNS} FROM scheduled_reminders WHERE id = ?");
        let row = sqlx::query_as::<_, ReminderRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("reminder", id))?;
        Ok(row.into())
    }

    /// Flip `is_sent` from false to true. Returns `false` when the reminder
    /// was already sent, so only one caller ever wins.
    pub async fn mark_sent(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE scheduled_reminders SET is_sent = 1 WHERE id = ? AND is_sent = 0")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 1 {
            return Ok(true);
        }
        // Distinguish "already sent" from "never existed".
        self.get(id).await?;
        Ok(false)
    }

    /// Unsent reminders of one student, soonest first.
    pub async fn list_unsent_for_student(&self, student_id: StudentId) -> Result<Vec<ScheduledReminder>> {
        let sql = format!(
            "SELECT {REMINDER_COLUMNS} FROM scheduled_reminders
             WHERE student_id = ? AND is_sent = 0
             ORDER BY reminder_time, id"
        );
        let rows = sqlx::query_as::<_, ReminderRow>(&sql)
            .bind(student_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn list_for_student(&self, student_id: StudentId) -> Result<Vec<ScheduledReminder>> {
        let sql = format!(
            "SELECT {REMINDER_COLUMNS} FROM scheduled_reminders
             WHERE student_id = ? ORDER BY reminder_time, id"
        );
        let rows = sqlx::query_as::<_, ReminderRow>(&sql)
            .bind(student_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM scheduled_reminders WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("reminder", id));
        }
        Ok(())
    }

    /// Delete reminders that are sent or scheduled before `cutoff`.
    pub async fn reap(&self, cutoff: NaiveDateTime) -> Result<u64> {
        let result = sqlx::query("DELETE FROM scheduled_reminders WHERE is_sent = 1 OR reminder_time < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
