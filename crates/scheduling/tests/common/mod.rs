//! Shared fixtures for scheduling integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tutor_calendar::{BusySource, NoCalendar};
use tutor_core::time::parse_hhmm;
use tutor_core::{BusyInterval, FixedClock, ReminderPolicy, RescheduleSettings};
use tutor_notify::{Dispatcher, Notification, Notifier, NotifyError, TemplateRenderer};
use tutor_scheduling::{LessonAdmin, ReminderScheduler, RescheduleWorkflow, SlotEngine, TimerJob, TimerQueue};
use tutor_storage::{memory_pool, ReminderStore, RequestStore, ScheduleStore, SettingsStore, SqlitePool};

pub const ADMIN_ID: i64 = 900;

pub fn t(s: &str) -> NaiveTime {
    parse_hhmm(s).unwrap()
}

pub fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn at(date: &str, time: &str) -> NaiveDateTime {
    d(date).and_time(t(time))
}

// ── Timer queue driven by hand ──────────────────────────────────────

#[derive(Default)]
pub struct ManualTimerQueue {
    jobs: Mutex<HashMap<String, (Duration, TimerJob)>>,
}

impl ManualTimerQueue {
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.jobs.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn delay(&self, key: &str) -> Option<Duration> {
        self.jobs.lock().unwrap().get(key).map(|(delay, _)| *delay)
    }

    /// Run a pending job now. Returns `false` if nothing was scheduled.
    pub async fn fire(&self, key: &str) -> bool {
        let job = self.jobs.lock().unwrap().remove(key);
        match job {
            Some((_, job)) => {
                job.await;
                true
            }
            None => false,
        }
    }
}

impl TimerQueue for ManualTimerQueue {
    fn schedule(&self, key: String, delay: Duration, job: TimerJob) {
        self.jobs.lock().unwrap().insert(key, (delay, job));
    }

    fn cancel(&self, key: &str) -> bool {
        self.jobs.lock().unwrap().remove(key).is_some()
    }

    fn is_scheduled(&self, key: &str) -> bool {
        self.jobs.lock().unwrap().contains_key(key)
    }
}

// ── Notifier that records deliveries ────────────────────────────────

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(notification.clone());
        if self.fail {
            return Err(NotifyError::Rejected("chat not found".into()));
        }
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "recording"
    }
}

// ── Fixed busy calendar ─────────────────────────────────────────────

#[derive(Default)]
pub struct StaticBusy {
    by_date: HashMap<NaiveDate, Vec<BusyInterval>>,
}

impl StaticBusy {
    pub fn with(mut self, date: &str, start: &str, end: &str) -> Self {
        self.by_date.entry(d(date)).or_default().push(BusyInterval {
            start: t(start),
            end: t(end),
            title: "busy".into(),
        });
        self
    }
}

#[async_trait]
impl BusySource for StaticBusy {
    async fn busy_intervals(&self, date: NaiveDate) -> Vec<BusyInterval> {
        self.by_date.get(&date).cloned().unwrap_or_default()
    }
}

// ── Harness ─────────────────────────────────────────────────────────

pub struct Harness {
    pub pool: SqlitePool,
    pub clock: Arc<FixedClock>,
    pub timers: Arc<ManualTimerQueue>,
    pub notifier: Arc<RecordingNotifier>,
    pub lessons: ScheduleStore,
    pub settings: SettingsStore,
    pub requests: RequestStore,
    pub reminder_rows: ReminderStore,
    pub slots: Arc<SlotEngine>,
    pub reminders: ReminderScheduler,
    pub workflow: RescheduleWorkflow,
    pub admin: LessonAdmin,
}

pub struct HarnessOptions {
    pub busy: Arc<dyn BusySource>,
    pub notifier: RecordingNotifier,
    pub page_size: usize,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            busy: Arc::new(NoCalendar),
            notifier: RecordingNotifier::default(),
            page_size: 4,
        }
    }
}

impl Harness {
    pub async fn new(now: NaiveDateTime) -> Self {
        Self::with_options(now, HarnessOptions::default()).await
    }

    pub async fn with_busy(now: NaiveDateTime, busy: Arc<dyn BusySource>) -> Self {
        Self::with_options(
            now,
            HarnessOptions {
                busy,
                ..HarnessOptions::default()
            },
        )
        .await
    }

    pub async fn with_options(now: NaiveDateTime, options: HarnessOptions) -> Self {
        let pool = memory_pool().await.unwrap();
        let clock = Arc::new(FixedClock::new(now));
        let timers = Arc::new(ManualTimerQueue::default());
        let notifier = Arc::new(options.notifier);
        let dispatcher = Arc::new(
            Dispatcher::with_defaults(vec![notifier.clone() as Arc<dyn Notifier>]).with_admins(vec![ADMIN_ID]),
        );
        let templates = Arc::new(TemplateRenderer::new());

        let lessons = ScheduleStore::new(pool.clone());
        let settings = SettingsStore::new(pool.clone());
        let requests = RequestStore::new(pool.clone());
        let reminder_rows = ReminderStore::new(pool.clone());

        let slots = Arc::new(SlotEngine::new(
            lessons.clone(),
            settings.clone(),
            options.busy,
            clock.clone(),
        ));
        let reminders = ReminderScheduler::new(
            lessons.clone(),
            reminder_rows.clone(),
            timers.clone(),
            dispatcher.clone(),
            templates.clone(),
            clock.clone(),
            ReminderPolicy::default(),
        );
        let workflow = RescheduleWorkflow::new(
            slots.clone(),
            lessons.clone(),
            requests.clone(),
            dispatcher,
            templates,
        )
        .with_page_size(options.page_size);
        let admin = LessonAdmin::new(
            lessons.clone(),
            settings.clone(),
            requests.clone(),
            slots.clone(),
            reminders.clone(),
        );

        Self {
            pool,
            clock,
            timers,
            notifier,
            lessons,
            settings,
            requests,
            reminder_rows,
            slots,
            reminders,
            workflow,
            admin,
        }
    }

    /// Work 10:00-19:00 every day of the week with the given step.
    pub async fn open_every_day(&self, slot_interval_minutes: u32) {
        self.settings
            .update(&RescheduleSettings {
                work_start: t("10:00"),
                work_end: t("19:00"),
                available_days: (0..=6).collect(),
                max_weeks_ahead: 2,
                slot_interval_minutes,
            })
            .await
            .unwrap();
    }
}
