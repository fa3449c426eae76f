mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tutor_calendar::{CalendarAdapter, CalendarError, CalendarSettings, FeedFetcher};
use tutor_core::time::minute_of_day;
use tutor_core::RescheduleSettings;

use common::{at, d, t, Harness, StaticBusy};

struct DownFeed;

#[async_trait]
impl FeedFetcher for DownFeed {
    async fn fetch_text(&self) -> Result<String, CalendarError> {
        Err(CalendarError::Status(503))
    }
}

#[tokio::test]
async fn first_slot_follows_existing_lesson() {
    // Sunday noon; the next Monday is 2026-10-19.
    let h = Harness::new(at("2026-10-18", "12:00")).await;
    h.open_every_day(15).await;
    h.lessons.add(1, 0, "10:00", 60).await.unwrap();

    let slots = h.slots.get_available_slots(d("2026-10-19"), 60).await.unwrap();
    assert_eq!(slots[0].to_string(), "11:00-12:00");
    assert_eq!(slots.last().unwrap().to_string(), "18:00-19:00");
    for slot in &slots {
        assert_eq!(slot.duration_minutes(), 60);
        assert!(slot.end <= t("19:00"));
    }
}

#[tokio::test]
async fn busy_interval_boundary_is_free() {
    let busy = StaticBusy::default().with("2026-10-19", "10:00", "11:00");
    let h = Harness::with_busy(at("2026-10-18", "12:00"), Arc::new(busy)).await;
    h.open_every_day(15).await;

    let slots = h.slots.get_available_slots(d("2026-10-19"), 45).await.unwrap();
    let starts: Vec<_> = slots.iter().map(|s| s.start_label()).collect();
    assert!(!starts.contains(&"10:30".to_string()));
    assert!(!starts.contains(&"10:15".to_string()));
    assert_eq!(slots[0].to_string(), "11:00-11:45");
}

#[tokio::test]
async fn same_day_slots_start_after_the_next_hour() {
    // Monday 12:20: nothing may start at or before 13:20.
    let h = Harness::new(at("2026-10-19", "12:20")).await;
    h.open_every_day(15).await;

    let slots = h.slots.get_available_slots(d("2026-10-19"), 60).await.unwrap();
    assert!(!slots.is_empty());
    let cutoff = minute_of_day(t("13:20"));
    assert!(slots.iter().all(|s| minute_of_day(s.start) > cutoff));
    assert_eq!(slots[0].start_label(), "13:35");
}

#[tokio::test]
async fn late_evening_has_nothing_left_today() {
    let h = Harness::new(at("2026-10-19", "23:10")).await;
    h.open_every_day(15).await;
    assert!(h.slots.get_available_slots(d("2026-10-19"), 30).await.unwrap().is_empty());
}

#[tokio::test]
async fn closed_weekdays_and_past_dates_are_empty() {
    let h = Harness::new(at("2026-10-21", "09:00")).await;
    // Defaults open Monday to Saturday only.
    assert!(h.slots.get_available_slots(d("2026-10-25"), 60).await.unwrap().is_empty());
    assert!(h.slots.get_available_slots(d("2026-10-19"), 60).await.unwrap().is_empty());
    assert!(!h.slots.get_available_slots(d("2026-10-24"), 60).await.unwrap().is_empty());
}

#[tokio::test]
async fn invalid_duration_is_rejected() {
    let h = Harness::new(at("2026-10-21", "09:00")).await;
    let err = h.slots.get_available_slots(d("2026-10-22"), 0).await.unwrap_err();
    assert!(err.is_validation());
}

#[tokio::test]
async fn feed_outage_still_checks_lessons() {
    let clock = Arc::new(tutor_core::FixedClock::new(at("2026-10-18", "12:00")));
    let adapter = CalendarAdapter::new(Arc::new(DownFeed), CalendarSettings::default(), clock);
    let h = Harness::with_busy(at("2026-10-18", "12:00"), Arc::new(adapter)).await;
    h.open_every_day(15).await;
    h.lessons.add(1, 0, "10:00", 60).await.unwrap();

    let slots = h.slots.get_available_slots(d("2026-10-19"), 60).await.unwrap();
    assert!(!slots.is_empty());
    assert_eq!(slots[0].start_label(), "11:00");
}

#[tokio::test]
async fn cached_answers_until_invalidated() {
    let h = Harness::new(at("2026-10-18", "12:00")).await;
    h.open_every_day(60).await;

    let before = h.slots.get_available_slots(d("2026-10-19"), 60).await.unwrap();
    assert_eq!(before[0].start_label(), "10:00");

    // Written behind the engine's back: the cached answer is still served.
    h.lessons.add(2, 0, "10:00", 60).await.unwrap();
    let stale = h.slots.get_available_slots(d("2026-10-19"), 60).await.unwrap();
    assert_eq!(stale, before);

    h.slots.invalidate_cache();
    let fresh = h.slots.get_available_slots(d("2026-10-19"), 60).await.unwrap();
    assert_eq!(fresh[0].start_label(), "11:00");
}

#[tokio::test]
async fn expired_cache_recomputes() {
    let pool_harness = Harness::new(at("2026-10-18", "12:00")).await;
    pool_harness.open_every_day(60).await;
    let engine = tutor_scheduling::SlotEngine::new(
        pool_harness.lessons.clone(),
        pool_harness.settings.clone(),
        Arc::new(tutor_calendar::NoCalendar),
        pool_harness.clock.clone(),
    )
    .with_cache_ttl(Duration::ZERO);

    engine.get_available_slots(d("2026-10-19"), 60).await.unwrap();
    pool_harness.lessons.add(2, 0, "10:00", 60).await.unwrap();
    let fresh = engine.get_available_slots(d("2026-10-19"), 60).await.unwrap();
    assert_eq!(fresh[0].start_label(), "11:00");
}

#[tokio::test]
async fn today_moves_with_the_clock_despite_cache() {
    let h = Harness::new(at("2026-10-19", "09:00")).await;
    h.open_every_day(60).await;

    let morning = h.slots.get_available_slots(d("2026-10-19"), 60).await.unwrap();
    assert_eq!(morning[0].start_label(), "11:00");

    h.clock.set(at("2026-10-19", "14:00"));
    let afternoon = h.slots.get_available_slots(d("2026-10-19"), 60).await.unwrap();
    assert!(afternoon.iter().all(|s| s.start > t("15:00")));
}

#[tokio::test]
async fn available_days_skip_past_and_exhausted_today() {
    // Monday 18:30: today is already out of working hours.
    let h = Harness::new(at("2026-10-19", "18:30")).await;
    h.open_every_day(15).await;

    let days = h.slots.get_available_days(d("2026-10-19"), 60).await.unwrap();
    let dates: Vec<_> = days.iter().map(|day| day.date).collect();
    assert_eq!(dates.first(), Some(&d("2026-10-20")));
    assert_eq!(days.len(), 6);
    assert_eq!(days[0].weekday_name, "Tuesday");
    // 10:00 through 18:00 every 15 minutes.
    assert_eq!(days[0].slot_count, 33);

    let next_week = h.slots.get_available_days(d("2026-10-26"), 60).await.unwrap();
    assert_eq!(next_week.len(), 7);
}

#[tokio::test]
async fn available_days_count_only_future_slots_today() {
    let h = Harness::new(at("2026-10-21", "09:00")).await;
    h.settings
        .update(&RescheduleSettings {
            available_days: [2].into_iter().collect(),
            slot_interval_minutes: 60,
            ..RescheduleSettings::default()
        })
        .await
        .unwrap();

    let days = h.slots.get_available_days(d("2026-10-19"), 60).await.unwrap();
    assert_eq!(days.len(), 1);
    assert_eq!(days[0].date, d("2026-10-21"));
    // Cutoff 10:00: 11:00 through 18:00.
    assert_eq!(days[0].slot_count, 8);
}
