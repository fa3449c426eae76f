//! Busy-time sources: the cached feed adapter and the empty fallback.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, NaiveDateTime, NaiveTime};
use chrono_tz::Tz;
use tracing::{debug, info, warn};
use tutor_core::config::CalendarConfig;
use tutor_core::time::{add_minutes, parse_hhmm, validate_duration};
use tutor_core::{BusyInterval, Clock, TtlCache};

use crate::error::CalendarError;
use crate::expand::{expand_events, BusyEvent, ExpandOptions};
use crate::fetch::{FeedFetcher, HttpFeedFetcher};
use crate::parse::parse_feed;

/// Answers "what is externally busy" for a calendar date.
///
/// Implementations never fail: an unavailable source reports no busy time.
#[async_trait]
pub trait BusySource: Send + Sync {
    async fn busy_intervals(&self, date: NaiveDate) -> Vec<BusyInterval>;

    /// Whether `[time, time + duration)` overlaps any busy interval on `date`.
    /// A duration that cannot be a lesson length is never busy; one running
    /// past midnight is clipped to the end of the day.
    async fn is_busy(&self, date: NaiveDate, time: NaiveTime, duration_minutes: u32) -> bool {
        if let Err(e) = validate_duration(duration_minutes) {
            debug!(error = %e, "Busy check with invalid duration");
            return false;
        }
        let end = add_minutes(time, duration_minutes).unwrap_or_else(|_| end_of_day());
        self.busy_intervals(date)
            .await
            .iter()
            .any(|busy| busy.overlaps(time, end))
    }
}

/// Used when no feed is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCalendar;

#[async_trait]
impl BusySource for NoCalendar {
    async fn busy_intervals(&self, _date: NaiveDate) -> Vec<BusyInterval> {
        Vec::new()
    }
}

#[derive(Debug, Clone)]
pub struct CalendarSettings {
    pub timezone: Tz,
    pub cache_ttl: Duration,
    pub fetch_timeout: Duration,
    /// Days after today that recurring events are expanded into.
    pub expand_days: u32,
    pub all_day_window: (NaiveTime, NaiveTime),
}

impl Default for CalendarSettings {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::Europe::Moscow,
            cache_ttl: Duration::from_secs(300),
            fetch_timeout: Duration::from_secs(10),
            expand_days: 30,
            all_day_window: (
                parse_hhmm("09:00").unwrap_or(NaiveTime::MIN),
                parse_hhmm("18:00").unwrap_or(NaiveTime::MIN),
            ),
        }
    }
}

impl CalendarSettings {
    pub fn from_config(config: &CalendarConfig) -> Result<Self, CalendarError> {
        Ok(Self {
            timezone: config.tz()?,
            cache_ttl: config.cache_ttl(),
            fetch_timeout: config.fetch_timeout(),
            expand_days: config.expand_days,
            all_day_window: config.all_day_window()?,
        })
    }
}

/// Fetches one external feed, expands it, and caches the busy blocks.
pub struct CalendarAdapter {
    fetcher: Arc<dyn FeedFetcher>,
    settings: CalendarSettings,
    clock: Arc<dyn Clock>,
    cache: TtlCache<(), Arc<Vec<BusyEvent>>>,
    /// Serializes refreshes so concurrent cache misses download once.
    refresh: tokio::sync::Mutex<()>,
}

impl CalendarAdapter {
    pub fn new(fetcher: Arc<dyn FeedFetcher>, settings: CalendarSettings, clock: Arc<dyn Clock>) -> Self {
        let cache = TtlCache::new(1, settings.cache_ttl);
        Self {
            fetcher,
            settings,
            clock,
            cache,
            refresh: tokio::sync::Mutex::new(()),
        }
    }

    /// Build the HTTP-backed adapter, or `None` when no feed URL is configured.
    pub fn from_config(config: &CalendarConfig, clock: Arc<dyn Clock>) -> Result<Option<Self>, CalendarError> {
        let Some(url) = config.feed_url.as_deref() else {
            info!("No calendar feed configured, external busy time disabled");
            return Ok(None);
        };
        let settings = CalendarSettings::from_config(config)?;
        let fetcher = HttpFeedFetcher::new(url, settings.fetch_timeout)?;
        info!(url = %fetcher.url(), timezone = %settings.timezone, "Calendar feed configured");
        Ok(Some(Self::new(Arc::new(fetcher), settings, clock)))
    }

    pub fn settings(&self) -> &CalendarSettings {
        &self.settings
    }

    /// Download, parse and expand the feed. Any failure yields an empty list.
    pub async fn fetch(&self) -> Vec<BusyEvent> {
        match self.try_fetch().await {
            Ok(events) => {
                debug!(count = events.len(), "Calendar feed expanded");
                events
            }
            Err(e) => {
                warn!(error = %e, "Calendar feed unavailable, treating as no busy time");
                Vec::new()
            }
        }
    }

    async fn try_fetch(&self) -> Result<Vec<BusyEvent>, CalendarError> {
        let timeout = self.settings.fetch_timeout;
        let text = tokio::time::timeout(timeout, self.fetcher.fetch_text())
            .await
            .map_err(|_| CalendarError::Timeout(timeout))??;
        let raw = parse_feed(&text, self.settings.timezone)?;

        let today = self.clock.today();
        let window_start = midnight(today - ChronoDuration::days(1));
        let window_end = midnight(today + ChronoDuration::days(i64::from(self.settings.expand_days) + 1));
        Ok(expand_events(
            &raw,
            &ExpandOptions {
                reference: self.settings.timezone,
                window_start,
                window_end,
                all_day_window: self.settings.all_day_window,
            },
        ))
    }

    /// Cached busy blocks. Failed fetches are cached too, so a dead feed is
    /// retried once per TTL rather than on every query.
    pub async fn events(&self) -> Arc<Vec<BusyEvent>> {
        if let Some(events) = self.cache.get(&()) {
            return events;
        }
        let _guard = self.refresh.lock().await;
        if let Some(events) = self.cache.get(&()) {
            return events;
        }
        let events = Arc::new(self.fetch().await);
        self.cache.insert((), Arc::clone(&events));
        events
    }

    /// Busy intervals overlapping `date`, clipped to that day. Blocks running
    /// past midnight end at 23:59:59.
    pub async fn get_busy_intervals(&self, date: NaiveDate) -> Vec<BusyInterval> {
        let events = self.events().await;
        intervals_for_date(&events, date)
    }

    pub async fn is_busy(&self, date: NaiveDate, time: NaiveTime, duration_minutes: u32) -> bool {
        BusySource::is_busy(self, date, time, duration_minutes).await
    }

    pub fn invalidate(&self) {
        debug!("Calendar cache invalidated");
        self.cache.clear();
    }
}

#[async_trait]
impl BusySource for CalendarAdapter {
    async fn busy_intervals(&self, date: NaiveDate) -> Vec<BusyInterval> {
        self.get_busy_intervals(date).await
    }
}

pub(crate) fn intervals_for_date(events: &[BusyEvent], date: NaiveDate) -> Vec<BusyInterval> {
    let day_start = midnight(date);
    let day_end = midnight(date + ChronoDuration::days(1));
    events
        .iter()
        .filter(|event| event.overlaps(day_start, day_end))
        .map(|event| BusyInterval {
            start: event.start.max(day_start).time(),
            end: if event.end >= day_end {
                end_of_day()
            } else {
                event.end.time()
            },
            title: event.title.clone(),
        })
        .collect()
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN)
}
