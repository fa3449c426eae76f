//! Reschedule request persistence.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqlitePool;
use tracing::info;
use tutor_core::time::{format_hhmm, parse_hhmm};
use tutor_core::{NewRescheduleRequest, RequestStatus, RescheduleRequest, StudentId};

use crate::error::{Result, StoreError};

#[derive(sqlx::FromRow)]
struct RequestRow {
    id: i64,
    student_id: i64,
    schedule_id: i64,
    original_date: NaiveDate,
    original_time: String,
    requested_date: NaiveDate,
    requested_time: String,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<RequestRow> for RescheduleRequest {
    type Error = StoreError;

    fn try_from(row: RequestRow) -> Result<Self> {
        let corrupt = |what: &str| StoreError::Corrupt(format!("reschedule request {}: bad {what}", row.id));
        Ok(RescheduleRequest {
            id: row.id,
            student_id: row.student_id,
            schedule_id: row.schedule_id,
            original_date: row.original_date,
            original_time: parse_hhmm(&row.original_time).map_err(|_| corrupt("original_time"))?,
            requested_date: row.requested_date,
            requested_time: parse_hhmm(&row.requested_time).map_err(|_| corrupt("requested_time"))?,
            status: row.status.parse().map_err(|_| corrupt("status"))?,
            created_at: row.created_at,
        })
    }
}

const REQUEST_COLUMNS: &str = "id, student_id, schedule_id, original_date, original_time, \
     requested_date, requested_time, status, created_at";

/// Pending reschedule proposals awaiting an administrator.
#[derive(Debug, Clone)]
pub struct RequestStore {
    pool: SqlitePool,
}

impl RequestStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, request: &NewRescheduleRequest) -> Result<RescheduleRequest> {
        let sql = format!(
            "INSERT INTO reschedule_requests
                 (student_id, schedule_id, original_date, original_time, requested_date, requested_time, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING {REQUEST_COLUMNS}"
        );
        let row = sqlx::query_as::<_, RequestRow>(&sql)
            .bind(request.student_id)
            .bind(request.schedule_id)
            .bind(request.original_date)
            .bind(format_hhmm(request.original_time))
            .bind(request.requested_date)
            .bind(format_hhmm(request.requested_time))
            .bind(RequestStatus::Pending.as_str())
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                    StoreError::not_found("lesson", request.schedule_id)
                }
                other => StoreError::Database(other),
            })?;

        let created = RescheduleRequest::try_from(row)?;
        info!(
            request_id = created.id,
            student_id = created.student_id,
            lesson_id = created.schedule_id,
            requested = %format!("{} {}", created.requested_date, format_hhmm(created.requested_time)),
            "Reschedule request created"
        );
        Ok(created)
    }

    pub async fn get(&self, id: i64) -> Result<RescheduleRequest> {
        let sql = format!("SELECT {REQUEST_COLUMNS} FROM reschedule_requests WHERE id = ?");
        let row = sqlx::query_as::<_, RequestRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("reschedule request", id))?;
        RescheduleRequest::try_from(row)
    }

    /// Oldest first.
    pub async fn list_pending(&self) -> Result<Vec<RescheduleRequest>> {
        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM reschedule_requests
             WHERE status = ? ORDER BY created_at, id"
        );
        let rows = sqlx::query_as::<_, RequestRow>(&sql)
            .bind(RequestStatus::Pending.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(RescheduleRequest::try_from).collect()
    }

    pub async fn list_for_student(&self, student_id: StudentId) -> Result<Vec<RescheduleRequest>> {
        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM reschedule_requests
             WHERE student_id = ? ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, RequestRow>(&sql)
            .bind(student_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(RescheduleRequest::try_from).collect()
    }

    /// Record that an administrator resolved the request. Idempotent.
    pub async fn mark_processed(&self, id: i64) -> Result<RescheduleRequest> {
        let result = sqlx::query("UPDATE reschedule_requests SET status = ? WHERE id = ?")
            .bind(RequestStatus::Processed.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("reschedule request", id));
        }
        info!(request_id = id, "Reschedule request processed");
        self.get(id).await
    }
}
