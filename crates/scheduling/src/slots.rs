//! Slot availability: free windows of a given length on a date, after
//! working hours, weekday availability, existing weekly lessons and the
//! external busy calendar have been taken into account.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, NaiveDate, NaiveTime, Timelike};
use tracing::debug;
use tutor_calendar::BusySource;
use tutor_core::time::{
    from_minute_of_day, minute_of_day, validate_duration, weekday_index, weekday_name, MINUTES_PER_DAY,
};
use tutor_core::{AvailableDay, BusyInterval, Clock, RescheduleSettings, Slot, TtlCache, WeeklyLesson};
use tutor_storage::{ScheduleStore, SettingsStore};

use crate::error::Result;

pub const DEFAULT_SLOT_CACHE_TTL: Duration = Duration::from_secs(600);
const SLOT_CACHE_CAPACITY: usize = 256;

/// `effective_start` folds "now" into the key for today's date, so a cached
/// answer never hides the moving same-day cutoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct SlotKey {
    date: NaiveDate,
    duration_minutes: u32,
    effective_start: u32,
}

pub struct SlotEngine {
    lessons: ScheduleStore,
    settings: SettingsStore,
    busy: Arc<dyn BusySource>,
    clock: Arc<dyn Clock>,
    cache: TtlCache<SlotKey, Arc<Vec<Slot>>>,
}

impl SlotEngine {
    pub fn new(
        lessons: ScheduleStore,
        settings: SettingsStore,
        busy: Arc<dyn BusySource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            lessons,
            settings,
            busy,
            clock,
            cache: TtlCache::new(SLOT_CACHE_CAPACITY, DEFAULT_SLOT_CACHE_TTL),
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache = TtlCache::new(SLOT_CACHE_CAPACITY, ttl);
        self
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub async fn settings(&self) -> Result<RescheduleSettings> {
        Ok(self.settings.get().await?)
    }

    /// Free slots of exactly `duration_minutes` on `date`, earliest first.
    ///
    /// On today's date no slot starts at or before one hour from now. Past
    /// dates and unavailable weekdays yield nothing.
    pub async fn get_available_slots(&self, date: NaiveDate, duration_minutes: u32) -> Result<Vec<Slot>> {
        validate_duration(duration_minutes)?;
        let settings = self.settings.get().await?;
        let weekday = weekday_index(date);
        if !settings.is_day_available(weekday) {
            debug!(%date, weekday = weekday_name(weekday), "Weekday not open for reschedules");
            return Ok(Vec::new());
        }

        let now = self.clock.now();
        if date < now.date() {
            return Ok(Vec::new());
        }

        let work_start = minute_of_day(settings.work_start);
        let (start, cutoff) = if date == now.date() {
            let cutoff = (now.hour() + 1) * 60 + now.minute();
            if cutoff >= MINUTES_PER_DAY {
                debug!(%date, "Same-day cutoff passes midnight");
                return Ok(Vec::new());
            }
            (work_start.max(cutoff), Some(cutoff))
        } else {
            (work_start, None)
        };

        let key = SlotKey {
            date,
            duration_minutes,
            effective_start: start,
        };
        if let Some(cached) = self.cache.get(&key) {
            debug!(%date, duration_minutes, "Slot cache hit");
            return Ok((*cached).clone());
        }

        let busy = self.busy.busy_intervals(date).await;
        let lessons = self.lessons.list_for_weekday(weekday).await?;
        let grid = SlotGrid {
            start,
            end: minute_of_day(settings.work_end),
            step: settings.slot_interval_minutes,
            duration: duration_minutes,
        };
        let slots: Vec<Slot> = grid
            .free_slots(&lessons, &busy)
            .into_iter()
            .filter(|slot| cutoff.map_or(true, |c| minute_of_day(slot.start) > c))
            .collect();

        debug!(
            %date,
            duration_minutes,
            slots = slots.len(),
            lessons = lessons.len(),
            busy = busy.len(),
            "Computed available slots"
        );
        self.cache.insert(key, Arc::new(slots.clone()));
        Ok(slots)
    }

    /// Days of the week starting at `week_start` that still have a bookable
    /// slot. Past days are skipped; today counts only if some slot starts
    /// after the current time.
    pub async fn get_available_days(&self, week_start: NaiveDate, duration_minutes: u32) -> Result<Vec<AvailableDay>> {
        let now = self.clock.now();
        let mut days = Vec::new();
        for offset in 0..7 {
            let date = week_start + ChronoDuration::days(offset);
            if date < now.date() {
                continue;
            }
            let slots = self.get_available_slots(date, duration_minutes).await?;
            let slot_count = if date == now.date() {
                slots.iter().filter(|s| s.start > now.time()).count()
            } else {
                slots.len()
            };
            if slot_count == 0 {
                continue;
            }
            let weekday = weekday_index(date);
            days.push(AvailableDay {
                date,
                weekday,
                weekday_name: weekday_name(weekday).to_string(),
                slot_count,
            });
        }
        Ok(days)
    }

    /// Drop every memoized answer. Call after lessons or settings change.
    pub fn invalidate_cache(&self) {
        self.cache.clear();
    }
}

/// Candidate starts from `start`, every `step` minutes, while the slot
/// still ends by `end`.
struct SlotGrid {
    start: u32,
    end: u32,
    step: u32,
    duration: u32,
}

impl SlotGrid {
    fn free_slots(&self, lessons: &[WeeklyLesson], busy: &[BusyInterval]) -> Vec<Slot> {
        let mut slots = Vec::new();
        if self.step == 0 {
            return slots;
        }
        let mut t = self.start;
        while t + self.duration <= self.end {
            let end = t + self.duration;
            if let (Some(start_time), Some(end_time)) = (from_minute_of_day(t), from_minute_of_day(end)) {
                let taken = lessons.iter().any(|l| l.active && l.overlaps_minutes(t, end));
                let blocked = busy.iter().any(|b| b.overlaps(start_time, end_time));
                if !taken && !blocked {
                    slots.push(Slot {
                        start: start_time,
                        end: end_time,
                    });
                }
            }
            t += self.step;
        }
        slots
    }
}

/// Whether a time appears among the given slots' start times.
pub fn slot_starting_at(slots: &[Slot], start: NaiveTime) -> Option<Slot> {
    slots.iter().copied().find(|s| s.start == start)
}
