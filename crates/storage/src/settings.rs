//! Single-row store for reschedule settings.

use std::collections::BTreeSet;

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::info;
use tutor_core::time::{format_hhmm, parse_hhmm};
use tutor_core::RescheduleSettings;

use crate::error::{Result, StoreError};

#[derive(sqlx::FromRow)]
struct SettingsRow {
    work_start: String,
    work_end: String,
    available_days: String,
    max_weeks_ahead: i64,
    slot_interval_minutes: i64,
}

impl TryFrom<SettingsRow> for RescheduleSettings {
    type Error = StoreError;

    fn try_from(row: SettingsRow) -> Result<Self> {
        let corrupt = |what: &str| StoreError::Corrupt(format!("reschedule settings: bad {what}"));
        let available_days: BTreeSet<u8> =
            serde_json::from_str(&row.available_days).map_err(|_| corrupt("available_days"))?;
        Ok(RescheduleSettings {
            work_start: parse_hhmm(&row.work_start).map_err(|_| corrupt("work_start"))?,
            work_end: parse_hhmm(&row.work_end).map_err(|_| corrupt("work_end"))?,
            available_days,
            max_weeks_ahead: u32::try_from(row.max_weeks_ahead).map_err(|_| corrupt("max_weeks_ahead"))?,
            slot_interval_minutes: u32::try_from(row.slot_interval_minutes)
                .map_err(|_| corrupt("slot_interval_minutes"))?,
        })
    }
}

/// The single `reschedule_settings` row, created with defaults on first read.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    pool: SqlitePool,
}

impl SettingsStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self) -> Result<RescheduleSettings> {
        let defaults = RescheduleSettings::default();
        sqlx::query(
            "INSERT OR IGNORE INTO reschedule_settings
                 (id, work_start, work_end, available_days, max_weeks_ahead, slot_interval_minutes, updated_at)
             VALUES (1, ?, ?, ?, ?, ?, ?)",
        )
        .bind(format_hhmm(defaults.work_start))
        .bind(format_hhmm(defaults.work_end))
        .bind(days_json(&defaults.available_days))
        .bind(i64::from(defaults.max_weeks_ahead))
        .bind(i64::from(defaults.slot_interval_minutes))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let row = sqlx::query_as::<_, SettingsRow>(
            "SELECT work_start, work_end, available_days, max_weeks_ahead, slot_interval_minutes
             FROM reschedule_settings WHERE id = 1",
        )
        .fetch_one(&self.pool)
        .await?;
        RescheduleSettings::try_from(row)
    }

    /// Replace the settings. Invalid settings are rejected before writing.
    pub async fn update(&self, settings: &RescheduleSettings) -> Result<RescheduleSettings> {
        settings.validate()?;
        sqlx::query(
            "INSERT INTO reschedule_settings
                 (id, work_start, work_end, available_days, max_weeks_ahead, slot_interval_minutes, updated_at)
             VALUES (1, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (id) DO UPDATE SET
                 work_start = excluded.work_start,
                 work_end = excluded.work_end,
                 available_days = excluded.available_days,
                 max_weeks_ahead = excluded.max_weeks_ahead,
                 slot_interval_minutes = excluded.slot_interval_minutes,
                 updated_at = excluded.updated_at",
        )
        .bind(format_hhmm(settings.work_start))
        .bind(format_hhmm(settings.work_end))
        .bind(days_json(&settings.available_days))
        .bind(i64::from(settings.max_weeks_ahead))
        .bind(i64::from(settings.slot_interval_minutes))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        info!(
            work_start = %format_hhmm(settings.work_start),
            work_end = %format_hhmm(settings.work_end),
            days = ?settings.available_days,
            interval = settings.slot_interval_minutes,
            "Reschedule settings updated"
        );
        Ok(settings.clone())
    }
}

fn days_json(days: &BTreeSet<u8>) -> String {
    serde_json::to_string(days).unwrap_or_else(|_| "[]".to_string())
}
