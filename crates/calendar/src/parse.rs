//! iCalendar text → raw events normalized to the reference timezone.
//!
//! DTSTART and EXDATE values also remember the zone they were written in,
//! so recurring series expand on their own wall clock.

use chrono::{Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use ical::parser::ical::component::IcalEvent;
use ical::property::Property;
use ical::IcalParser;
use tracing::{debug, warn};

use crate::error::CalendarError;

/// A DTSTART/DTEND/EXDATE value after timezone normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EventTime {
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl EventTime {
    /// Midnight for dates, the instant itself otherwise.
    pub(crate) fn anchor(&self) -> NaiveDateTime {
        match self {
            EventTime::Date(d) => d.and_time(chrono::NaiveTime::MIN),
            EventTime::DateTime(dt) => *dt,
        }
    }

    pub(crate) fn date(&self) -> NaiveDate {
        match self {
            EventTime::Date(d) => *d,
            EventTime::DateTime(dt) => dt.date(),
        }
    }

    pub(crate) fn is_date(&self) -> bool {
        matches!(self, EventTime::Date(_))
    }
}

/// The zone a date-time was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SourceZone {
    Utc,
    Named(Tz),
    /// No zone, an unknown TZID, or a plain date: reference-local.
    Floating,
}

/// A feed value in both forms: normalized to the reference zone, and as
/// written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Stamp {
    pub time: EventTime,
    pub zone: SourceZone,
    pub local: NaiveDateTime,
}

impl Stamp {
    /// Render as an iCalendar content line such as
    /// `DTSTART;TZID=Europe/Berlin:20261021T100000`.
    pub(crate) fn content_line(&self, name: &str, reference: Tz) -> String {
        let value = self.local.format("%Y%m%dT%H%M%S");
        match self.zone {
            SourceZone::Utc => format!("{name}:{value}Z"),
            SourceZone::Named(tz) => format!("{name};TZID={}:{value}", tz.name()),
            SourceZone::Floating => format!("{name};TZID={}:{value}", reference.name()),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RawEvent {
    pub uid: Option<String>,
    pub summary: String,
    pub start: Stamp,
    pub end: Option<EventTime>,
    pub duration: Option<Duration>,
    pub rrule: Option<String>,
    pub exdates: Vec<Stamp>,
    pub recurrence_id: Option<EventTime>,
    pub cancelled: bool,
    pub transparent: bool,
}

impl RawEvent {
    pub(crate) fn is_all_day(&self) -> bool {
        self.start.time.is_date()
    }

    /// Whether the event blocks time at all.
    pub(crate) fn is_blocking(&self) -> bool {
        !self.cancelled && !self.transparent
    }
}

pub(crate) fn parse_feed(text: &str, reference: Tz) -> Result<Vec<RawEvent>, CalendarError> {
    let mut events = Vec::new();
    for calendar in IcalParser::new(text.as_bytes()) {
        let calendar = calendar.map_err(|e| CalendarError::Parse(e.to_string()))?;
        for event in &calendar.events {
            match raw_event(event, reference) {
                Ok(Some(raw)) => events.push(raw),
                Ok(None) => debug!("Skipping event without DTSTART"),
                Err(e) => warn!(error = %e, "Skipping malformed calendar event"),
            }
        }
    }
    Ok(events)
}

fn raw_event(event: &IcalEvent, reference: Tz) -> Result<Option<RawEvent>, CalendarError> {
    let mut uid = None;
    let mut summary = String::new();
    let mut start = None;
    let mut end = None;
    let mut duration = None;
    let mut rrule = None;
    let mut exdates = Vec::new();
    let mut recurrence_id = None;
    let mut cancelled = false;
    let mut transparent = false;

    for prop in &event.properties {
        let value = prop.value.as_deref().unwrap_or("").trim();
        match prop.name.to_ascii_uppercase().as_str() {
            "UID" => uid = Some(value.to_string()),
            "SUMMARY" => summary = value.to_string(),
            "DTSTART" => start = Some(parse_event_time(prop, value, reference)?),
            "DTEND" => end = Some(parse_event_time(prop, value, reference)?.time),
            "DURATION" => {
                duration = Some(parse_duration(value).ok_or_else(|| {
                    CalendarError::Parse(format!("invalid DURATION '{value}'"))
                })?)
            }
            "RRULE" if !value.is_empty() => rrule = Some(value.to_string()),
            "EXDATE" => {
                for part in value.split(',').filter(|p| !p.trim().is_empty()) {
                    exdates.push(parse_event_time(prop, part.trim(), reference)?);
                }
            }
            "RECURRENCE-ID" => recurrence_id = Some(parse_event_time(prop, value, reference)?.time),
            "STATUS" => cancelled = value.eq_ignore_ascii_case("CANCELLED"),
            "TRANSP" => transparent = value.eq_ignore_ascii_case("TRANSPARENT"),
            _ => {}
        }
    }

    let Some(start) = start else {
        return Ok(None);
    };

    Ok(Some(RawEvent {
        uid,
        summary,
        start,
        end,
        duration,
        rrule,
        exdates,
        recurrence_id,
        cancelled,
        transparent,
    }))
}

fn param<'a>(prop: &'a Property, name: &str) -> Option<&'a str> {
    prop.params
        .as_ref()?
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .and_then(|(_, values)| values.first())
        .map(String::as_str)
}

/// Parse a date or date-time value, honouring `VALUE=DATE`, `TZID` and the
/// UTC `Z` suffix. Floating times are taken as reference-zone local time.
fn parse_event_time(prop: &Property, value: &str, reference: Tz) -> Result<Stamp, CalendarError> {
    let is_date = param(prop, "VALUE").is_some_and(|v| v.eq_ignore_ascii_case("DATE"))
        || (value.len() == 8 && !value.contains('T'));
    if is_date {
        let date = NaiveDate::parse_from_str(value, "%Y%m%d")
            .map_err(|e| CalendarError::Parse(format!("bad date '{value}': {e}")))?;
        return Ok(Stamp {
            time: EventTime::Date(date),
            zone: SourceZone::Floating,
            local: date.and_time(chrono::NaiveTime::MIN),
        });
    }

    if let Some(utc) = value.strip_suffix('Z') {
        let naive = parse_naive_datetime(utc)?;
        let local = Utc.from_utc_datetime(&naive).with_timezone(&reference);
        return Ok(Stamp {
            time: EventTime::DateTime(local.naive_local()),
            zone: SourceZone::Utc,
            local: naive,
        });
    }

    let naive = parse_naive_datetime(value)?;
    let zone = match param(prop, "TZID") {
        Some(tzid) => match tzid.parse::<Tz>() {
            Ok(source) => SourceZone::Named(source),
            Err(_) => {
                debug!(tzid, "Unknown TZID, treating time as reference-local");
                SourceZone::Floating
            }
        },
        None => SourceZone::Floating,
    };
    let time = match zone {
        SourceZone::Named(source) => convert_local(naive, source, reference),
        _ => naive,
    };
    Ok(Stamp {
        time: EventTime::DateTime(time),
        zone,
        local: naive,
    })
}

fn parse_naive_datetime(value: &str) -> Result<NaiveDateTime, CalendarError> {
    NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S")
        .map_err(|e| CalendarError::Parse(format!("bad date-time '{value}': {e}")))
}

/// Convert a wall-clock time in `source` into reference-zone wall-clock time.
/// Times inside a DST gap are shifted forward an hour.
pub(crate) fn convert_local(naive: NaiveDateTime, source: Tz, reference: Tz) -> NaiveDateTime {
    if source == reference {
        return naive;
    }
    let resolved = source
        .from_local_datetime(&naive)
        .earliest()
        .or_else(|| source.from_local_datetime(&(naive + Duration::hours(1))).earliest());
    match resolved {
        Some(dt) => dt.with_timezone(&reference).naive_local(),
        None => naive,
    }
}

/// Parse an RFC 5545 DURATION such as `PT1H30M`, `P1D` or `P2W`.
/// Negative durations are rejected since busy blocks cannot run backwards.
pub(crate) fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.strip_prefix('+').unwrap_or(value);
    let rest = value.strip_prefix('P')?;
    if rest.is_empty() {
        return None;
    }

    let mut total = Duration::zero();
    let mut number = String::new();
    let mut in_time = false;
    let mut saw_component = false;

    for ch in rest.chars() {
        match ch {
            'T' => {
                if !number.is_empty() || in_time {
                    return None;
                }
                in_time = true;
            }
            c if c.is_ascii_digit() => number.push(c),
            unit => {
                let n: i64 = number.parse().ok()?;
                number.clear();
                total += match (unit, in_time) {
                    ('W', false) => Duration::weeks(n),
                    ('D', false) => Duration::days(n),
                    ('H', true) => Duration::hours(n),
                    ('M', true) => Duration::minutes(n),
                    ('S', true) => Duration::seconds(n),
                    _ => return None,
                };
                saw_component = true;
            }
        }
    }

    if !number.is_empty() || !saw_component {
        return None;
    }
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Europe::Moscow;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn feed(body: &str) -> String {
        format!("BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//test//EN\r\n{body}END:VCALENDAR\r\n")
    }

    #[test]
    fn parses_utc_event_into_reference_zone() {
        let text = feed(
            "BEGIN:VEVENT\r\nUID:a\r\nSUMMARY:Call\r\nDTSTART:20261021T070000Z\r\nDTEND:20261021T080000Z\r\nEND:VEVENT\r\n",
        );
        let events = parse_feed(&text, Moscow).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].summary, "Call");
        assert_eq!(events[0].start.time, EventTime::DateTime(dt("2026-10-21 10:00")));
        assert_eq!(events[0].start.zone, SourceZone::Utc);
        assert_eq!(events[0].start.content_line("DTSTART", Moscow), "DTSTART:20261021T070000Z");
        assert_eq!(events[0].end, Some(EventTime::DateTime(dt("2026-10-21 11:00"))));
    }

    #[test]
    fn converts_tzid_times() {
        // Berlin is UTC+2 on 2026-10-21, Moscow UTC+3.
        let text = feed(
            "BEGIN:VEVENT\r\nUID:b\r\nDTSTART;TZID=Europe/Berlin:20261021T100000\r\nDURATION:PT45M\r\nEND:VEVENT\r\n",
        );
        let events = parse_feed(&text, Moscow).unwrap();
        assert_eq!(events[0].start.time, EventTime::DateTime(dt("2026-10-21 11:00")));
        assert_eq!(events[0].start.local, dt("2026-10-21 10:00"));
        assert_eq!(
            events[0].start.content_line("DTSTART", Moscow),
            "DTSTART;TZID=Europe/Berlin:20261021T100000"
        );
        assert_eq!(events[0].duration, Some(Duration::minutes(45)));
    }

    #[test]
    fn parses_all_day_and_flags() {
        let text = feed(
            "BEGIN:VEVENT\r\nUID:c\r\nDTSTART;VALUE=DATE:20261022\r\nDTEND;VALUE=DATE:20261024\r\nTRANSP:TRANSPARENT\r\nEND:VEVENT\r\n\
             BEGIN:VEVENT\r\nUID:d\r\nDTSTART:20261023T100000\r\nSTATUS:CANCELLED\r\nEND:VEVENT\r\n",
        );
        let events = parse_feed(&text, Moscow).unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[0].is_all_day());
        assert!(!events[0].is_blocking());
        assert_eq!(
            events[0].end,
            Some(EventTime::Date(NaiveDate::from_ymd_opt(2026, 10, 24).unwrap()))
        );
        assert!(events[1].cancelled);
    }

    #[test]
    fn collects_exdates_and_rrule() {
        let text = feed(
            "BEGIN:VEVENT\r\nUID:e\r\nDTSTART:20261019T120000\r\nDTEND:20261019T130000\r\nRRULE:FREQ=WEEKLY;COUNT=4\r\nEXDATE:20261026T120000,20261102T120000\r\nEND:VEVENT\r\n",
        );
        let events = parse_feed(&text, Moscow).unwrap();
        assert_eq!(events[0].rrule.as_deref(), Some("FREQ=WEEKLY;COUNT=4"));
        assert_eq!(events[0].exdates.len(), 2);
        assert_eq!(
            events[0].exdates[1].content_line("EXDATE", Moscow),
            "EXDATE;TZID=Europe/Moscow:20261102T120000"
        );
    }

    #[test]
    fn skips_malformed_event_but_keeps_others() {
        let text = feed(
            "BEGIN:VEVENT\r\nUID:bad\r\nDTSTART:not-a-date\r\nEND:VEVENT\r\n\
             BEGIN:VEVENT\r\nUID:good\r\nDTSTART:20261021T100000\r\nEND:VEVENT\r\n",
        );
        let events = parse_feed(&text, Moscow).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].uid.as_deref(), Some("good"));
    }

    #[test]
    fn empty_text_has_no_events() {
        assert!(parse_feed("", Moscow).unwrap().is_empty());
    }

    #[test]
    fn parses_durations() {
        assert_eq!(parse_duration("PT1H30M"), Some(Duration::minutes(90)));
        assert_eq!(parse_duration("P1D"), Some(Duration::days(1)));
        assert_eq!(parse_duration("P2W"), Some(Duration::weeks(2)));
        assert_eq!(parse_duration("P1DT2H"), Some(Duration::hours(26)));
        assert_eq!(parse_duration("PT"), None);
        assert_eq!(parse_duration("-PT15M"), None);
        assert_eq!(parse_duration("1H"), None);
        assert_eq!(parse_duration("PT5"), None);
    }
}
