//! Recurring series expansion and busy-block construction.
//!
//! Series go through [`rrule::RRuleSet`] in the zone their DTSTART was
//! written in, bounded to the adapter window. One-off events are kept
//! wherever they fall.

use std::collections::{HashMap, HashSet};

use chrono::{Duration, NaiveDateTime, NaiveTime, TimeZone};
use chrono_tz::Tz;
use rrule::RRuleSet;
use tracing::{debug, warn};

use crate::error::CalendarError;
use crate::parse::{EventTime, RawEvent};

/// Cap on occurrences taken from one series per expansion.
const MAX_OCCURRENCES: u16 = 1000;

/// A concrete busy block in reference-zone wall-clock time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusyEvent {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub title: String,
    pub all_day: bool,
}

impl BusyEvent {
    /// Half-open overlap with `[from, to)`. Zero-length events count when
    /// their instant lies inside the range.
    pub fn overlaps(&self, from: NaiveDateTime, to: NaiveDateTime) -> bool {
        if self.start == self.end {
            return self.start >= from && self.start < to;
        }
        self.start < to && self.end > from
    }
}

pub(crate) struct ExpandOptions {
    pub reference: Tz,
    pub window_start: NaiveDateTime,
    pub window_end: NaiveDateTime,
    pub all_day_window: (NaiveTime, NaiveTime),
}

/// Turn parsed feed events into concrete busy blocks. Recurring series are
/// limited to the window; single events are always kept.
pub(crate) fn expand_events(raw: &[RawEvent], opts: &ExpandOptions) -> Vec<BusyEvent> {
    let overrides = collect_overrides(raw);
    let mut busy = Vec::new();

    for event in raw.iter().filter(|e| e.is_blocking()) {
        match series_starts(event, &overrides, opts) {
            Some(starts) => {
                let mut series = Vec::new();
                for start in starts {
                    push_occurrence(&mut series, event, start, opts);
                }
                busy.extend(
                    series
                        .into_iter()
                        .filter(|b| b.overlaps(opts.window_start, opts.window_end)),
                );
            }
            None => push_occurrence(&mut busy, event, event.start.time.anchor(), opts),
        }
    }

    busy.sort_by(|a, b| a.start.cmp(&b.start).then(a.end.cmp(&b.end)));
    busy
}

/// RECURRENCE-ID instances replace one occurrence of their master series,
/// whether the replacement itself is busy or cancelled.
fn collect_overrides(raw: &[RawEvent]) -> HashMap<&str, HashSet<NaiveDateTime>> {
    let mut overrides: HashMap<&str, HashSet<NaiveDateTime>> = HashMap::new();
    for event in raw {
        if let (Some(uid), Some(rid)) = (event.uid.as_deref(), event.recurrence_id) {
            overrides.entry(uid).or_default().insert(rid.anchor());
        }
    }
    overrides
}

/// Reference-local starts of a recurring series inside the window, or
/// `None` when the event is a single occurrence. A rule the expander
/// rejects degrades to the single DTSTART occurrence.
fn series_starts(
    event: &RawEvent,
    overrides: &HashMap<&str, HashSet<NaiveDateTime>>,
    opts: &ExpandOptions,
) -> Option<Vec<NaiveDateTime>> {
    let rule = match (&event.rrule, event.recurrence_id) {
        (Some(rule), None) => rule,
        _ => return None,
    };

    // Occurrences starting before the window may still run into it.
    let lookback = if event.is_all_day() {
        Duration::days(all_day_span(event))
    } else {
        timed_length(event)
    };
    let starts = match occurrences(event, rule, opts.window_start - lookback, opts) {
        Ok(starts) => starts,
        Err(e) => {
            warn!(uid = ?event.uid, error = %e, "Unparseable RRULE, using first occurrence only");
            return None;
        }
    };

    let replaced = event.uid.as_deref().and_then(|uid| overrides.get(uid));
    Some(
        starts
            .into_iter()
            .filter(|start| !excluded_by_date(*start, event))
            .filter(|start| !replaced.is_some_and(|set| set.contains(start)))
            .collect(),
    )
}

/// Expand the series in its own zone, then convert every occurrence to
/// reference wall-clock time.
fn occurrences(
    event: &RawEvent,
    rule: &str,
    after: NaiveDateTime,
    opts: &ExpandOptions,
) -> Result<Vec<NaiveDateTime>, CalendarError> {
    let rule = rule.strip_prefix("RRULE:").unwrap_or(rule);
    let mut text = format!(
        "{}\nRRULE:{rule}",
        event.start.content_line("DTSTART", opts.reference)
    );
    for exdate in event.exdates.iter().filter(|ex| !ex.time.is_date()) {
        text.push('\n');
        text.push_str(&exdate.content_line("EXDATE", opts.reference));
    }

    let set = text
        .parse::<RRuleSet>()
        .map_err(|e| CalendarError::Recurrence(e.to_string()))?;
    let result = set
        .after(bound(after, opts.reference))
        .before(bound(opts.window_end, opts.reference))
        .all(MAX_OCCURRENCES);
    if result.limited {
        debug!(uid = ?event.uid, limit = MAX_OCCURRENCES, "Series expansion truncated");
    }

    Ok(result
        .dates
        .into_iter()
        .map(|dt| dt.with_timezone(&opts.reference).naive_local())
        .collect())
}

/// A reference-local instant as an expander bound.
fn bound(naive: NaiveDateTime, reference: Tz) -> chrono::DateTime<rrule::Tz> {
    let utc = reference
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.naive_utc())
        .unwrap_or(naive);
    rrule::Tz::UTC.from_utc_datetime(&utc)
}

/// Date-form EXDATEs remove every occurrence on that day.
fn excluded_by_date(start: NaiveDateTime, event: &RawEvent) -> bool {
    event.exdates.iter().any(|ex| match ex.time {
        EventTime::Date(date) => start.date() == date,
        EventTime::DateTime(_) => false,
    })
}

fn push_occurrence(busy: &mut Vec<BusyEvent>, event: &RawEvent, start: NaiveDateTime, opts: &ExpandOptions) {
    if event.is_all_day() {
        let (from, to) = opts.all_day_window;
        for offset in 0..all_day_span(event) {
            let date = start.date() + Duration::days(offset);
            busy.push(BusyEvent {
                start: date.and_time(from),
                end: date.and_time(to),
                title: event.summary.clone(),
                all_day: true,
            });
        }
        return;
    }

    busy.push(BusyEvent {
        start,
        end: start + timed_length(event),
        title: event.summary.clone(),
        all_day: false,
    });
}

/// Number of calendar days an all-day event covers (DTEND is exclusive).
fn all_day_span(event: &RawEvent) -> i64 {
    let days = match (event.end, event.duration) {
        (Some(end), _) => (end.date() - event.start.time.date()).num_days(),
        (None, Some(duration)) => duration.num_days(),
        (None, None) => 1,
    };
    days.max(1)
}

/// Length of a timed event. Without DTEND or DURATION it is a zero-length
/// instant.
fn timed_length(event: &RawEvent) -> Duration {
    let length = match (event.end, event.duration) {
        (Some(end), _) => end.anchor() - event.start.time.anchor(),
        (None, Some(duration)) => duration,
        (None, None) => Duration::zero(),
    };
    length.max(Duration::zero())
}
