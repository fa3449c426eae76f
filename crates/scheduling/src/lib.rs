//! Scheduling engine: slot availability, the reschedule workflow, lesson
//! reminders and the administrator facade, wired together over the
//! storage, calendar and notification crates.

pub mod admin;
pub mod error;
pub mod reminders;
pub mod slots;
pub mod timer;
pub mod workflow;

use std::sync::Arc;

use tutor_calendar::{BusySource, CalendarAdapter, NoCalendar};
use tutor_core::{Clock, Config, SystemClock};
use tutor_notify::{Dispatcher, TemplateRenderer};
use tutor_storage::{ReminderStore, RequestStore, ScheduleStore, SettingsStore, SqlitePool};

pub use admin::LessonAdmin;
pub use error::{Result, SchedulingError};
pub use reminders::{timer_key, ReminderScheduler};
pub use slots::SlotEngine;
pub use timer::{TimerJob, TimerQueue, TokioTimerQueue};
pub use workflow::{RescheduleWorkflow, SessionKey, WorkflowStep, WorkflowView};

/// Every scheduling component, sharing one pool, clock and busy source.
pub struct Services {
    pub slots: Arc<SlotEngine>,
    pub workflow: RescheduleWorkflow,
    pub reminders: ReminderScheduler,
    pub admin: LessonAdmin,
}

impl Services {
    /// Production wiring: system clock in the calendar timezone, the
    /// configured feed (if any), Telegram delivery and tokio timers.
    pub fn from_config(config: &Config, pool: SqlitePool) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(config.calendar.tz()?));
        let busy: Arc<dyn BusySource> = match CalendarAdapter::from_config(&config.calendar, Arc::clone(&clock))? {
            Some(adapter) => Arc::new(adapter),
            None => {
                tracing::info!("No calendar feed configured, external busy times ignored");
                Arc::new(NoCalendar)
            }
        };
        let dispatcher = Arc::new(Dispatcher::from_config(&config.telegram)?);
        Ok(Self::assemble(
            config,
            pool,
            busy,
            clock,
            dispatcher,
            Arc::new(TokioTimerQueue::new()),
        ))
    }

    pub fn assemble(
        config: &Config,
        pool: SqlitePool,
        busy: Arc<dyn BusySource>,
        clock: Arc<dyn Clock>,
        dispatcher: Arc<Dispatcher>,
        timers: Arc<dyn TimerQueue>,
    ) -> Self {
        let lessons = ScheduleStore::new(pool.clone());
        let settings = SettingsStore::new(pool.clone());
        let requests = RequestStore::new(pool.clone());
        let templates = Arc::new(TemplateRenderer::new());

        let slots = Arc::new(
            SlotEngine::new(lessons.clone(), settings.clone(), busy, Arc::clone(&clock))
                .with_cache_ttl(config.slots.cache_ttl()),
        );
        let reminders = ReminderScheduler::new(
            lessons.clone(),
            ReminderStore::new(pool),
            timers,
            Arc::clone(&dispatcher),
            Arc::clone(&templates),
            clock,
            config.reminders.policy(),
        );
        let workflow = RescheduleWorkflow::new(
            Arc::clone(&slots),
            lessons.clone(),
            requests.clone(),
            dispatcher,
            templates,
        )
        .with_page_size(config.slots.page_size);
        let admin = LessonAdmin::new(lessons, settings, requests, Arc::clone(&slots), reminders.clone());

        Self {
            slots,
            workflow,
            reminders,
            admin,
        }
    }
}
