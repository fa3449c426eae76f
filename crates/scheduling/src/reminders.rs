//! Lesson reminders: one persisted row and one timer per upcoming lesson
//! occurrence, fired at most once.
//!
//! Planning is derived from the weekly schedule, never from stored reminder
//! rows, so calling [`ReminderScheduler::plan_all`] after a restart re-arms
//! every timer that was lost. Stored rows only provide idempotency and the
//! sent flag.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, info, warn};
use tutor_core::time::{format_hhmm, next_occurrence, weekday_index, weekday_name};
use tutor_core::{Clock, LessonId, ReminderPolicy, ScheduledReminder, StudentId};
use tutor_notify::{Dispatcher, ReminderContext, TemplateRenderer};
use tutor_storage::{ReminderStore, ScheduleStore};

use crate::error::Result;
use crate::timer::TimerQueue;

/// Timer key for a stored reminder.
pub fn timer_key(reminder_id: i64) -> String {
    format!("reminder:{reminder_id}")
}

struct Inner {
    lessons: ScheduleStore,
    reminders: ReminderStore,
    timers: Arc<dyn TimerQueue>,
    dispatcher: Arc<Dispatcher>,
    templates: Arc<TemplateRenderer>,
    clock: Arc<dyn Clock>,
    policy: ReminderPolicy,
}

/// Owns the reminder timers. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ReminderScheduler {
    inner: Arc<Inner>,
}

impl ReminderScheduler {
    pub fn new(
        lessons: ScheduleStore,
        reminders: ReminderStore,
        timers: Arc<dyn TimerQueue>,
        dispatcher: Arc<Dispatcher>,
        templates: Arc<TemplateRenderer>,
        clock: Arc<dyn Clock>,
        policy: ReminderPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                lessons,
                reminders,
                timers,
                dispatcher,
                templates,
                clock,
                policy,
            }),
        }
    }

    pub fn policy(&self) -> ReminderPolicy {
        self.inner.policy
    }

    /// Plan reminders for the next occurrence of each active lesson of one
    /// student, and drop pending reminders that no longer match the schedule.
    ///
    /// Occurrences whose reminder time has already passed are skipped rather
    /// than fired late. Returns the armed reminders.
    pub async fn plan_for_student(&self, student_id: StudentId) -> Result<Vec<ScheduledReminder>> {
        let inner = &self.inner;
        let now = inner.clock.now();
        let lessons = inner.lessons.list(student_id).await?;

        let mut current = HashSet::new();
        let mut armed = Vec::new();
        for lesson in &lessons {
            let lesson_time = next_occurrence(now, lesson.day_of_week, lesson.time);
            let reminder_time = inner.policy.reminder_time(lesson_time);
            if reminder_time < now {
                debug!(
                    student_id,
                    lesson_id = lesson.id,
                    %lesson_time,
                    "Reminder time already passed, skipping"
                );
                continue;
            }

            let (reminder, created) = inner
                .reminders
                .insert_if_absent(student_id, lesson.id, reminder_time, lesson_time)
                .await?;
            current.insert(reminder.id);
            if reminder.is_sent {
                continue;
            }
            if created {
                info!(
                    reminder_id = reminder.id,
                    student_id,
                    lesson_id = lesson.id,
                    %reminder_time,
                    "Reminder planned"
                );
            }
            self.arm(&reminder);
            armed.push(reminder);
        }

        // Rows still in the future but not matching any current lesson
        // belong to a moved or removed lesson.
        for stale in inner.reminders.list_unsent_for_student(student_id).await? {
            if current.contains(&stale.id) || stale.reminder_time < now {
                continue;
            }
            inner.timers.cancel(&timer_key(stale.id));
            inner.reminders.delete(stale.id).await?;
            info!(reminder_id = stale.id, student_id, "Stale reminder dropped");
        }

        Ok(armed)
    }

    /// Plan every student that has active lessons. Per-student failures are
    /// logged and do not stop the others. Returns the number of armed timers.
    pub async fn plan_all(&self) -> Result<usize> {
        let students = self.inner.lessons.list_student_ids().await?;
        let mut armed = 0;
        for student_id in &students {
            match self.plan_for_student(*student_id).await {
                Ok(planned) => armed += planned.len(),
                Err(e) => warn!(student_id, error = %e, "Reminder planning failed"),
            }
        }
        info!(students = students.len(), armed, "Reminders planned");
        Ok(armed)
    }

    /// Cancel pending timers of one lesson, before the lesson is removed.
    pub async fn forget_lesson(&self, student_id: StudentId, lesson_id: LessonId) -> Result<()> {
        for reminder in self.inner.reminders.list_unsent_for_student(student_id).await? {
            if reminder.schedule_id == lesson_id {
                self.inner.timers.cancel(&timer_key(reminder.id));
            }
        }
        Ok(())
    }

    fn arm(&self, reminder: &ScheduledReminder) {
        let now = self.inner.clock.now();
        let delay = (reminder.reminder_time - now).to_std().unwrap_or(Duration::ZERO);
        let this = self.clone();
        let id = reminder.id;
        self.inner.timers.schedule(
            timer_key(id),
            delay,
            Box::pin(async move {
                if let Err(e) = this.on_fire(id).await {
                    warn!(reminder_id = id, error = %e, "Reminder firing failed");
                }
            }),
        );
    }

    /// Timer callback. Marks the reminder sent, then delivers it best-effort.
    ///
    /// Returns `false` when the reminder was already sent or no longer
    /// exists; nothing is delivered in that case.
    pub async fn on_fire(&self, reminder_id: i64) -> Result<bool> {
        let inner = &self.inner;
        match inner.reminders.mark_sent(reminder_id).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(reminder_id, "Reminder already sent");
                return Ok(false);
            }
            Err(e) if e.is_not_found() => {
                debug!(reminder_id, "Reminder vanished before firing");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        }

        let reminder = inner.reminders.get(reminder_id).await?;
        let duration_minutes = match inner.lessons.get(reminder.schedule_id).await {
            Ok(lesson) => lesson.duration_minutes,
            Err(e) => {
                warn!(reminder_id, error = %e, "Lesson lookup failed, reminder not delivered");
                return Ok(true);
            }
        };

        let weekday = weekday_index(reminder.lesson_time.date());
        let ctx = ReminderContext {
            student_id: reminder.student_id,
            lesson_id: reminder.schedule_id,
            date: reminder.lesson_time.date().to_string(),
            weekday: weekday_name(weekday).to_string(),
            time: format_hhmm(reminder.lesson_time.time()),
            duration_minutes,
            minutes_before: inner.policy.offset_minutes,
        };
        match inner.templates.reminder(&ctx) {
            Ok(notification) => {
                let results = inner.dispatcher.dispatch(&notification).await;
                let delivered = results.iter().filter(|r| r.success).count();
                info!(
                    reminder_id,
                    student_id = reminder.student_id,
                    delivered,
                    channels = results.len(),
                    "Reminder fired"
                );
            }
            Err(e) => warn!(reminder_id, error = %e, "Reminder rendering failed"),
        }
        Ok(true)
    }

    /// Delete sent reminders and those older than the retention window.
    pub async fn reap(&self) -> Result<u64> {
        let cutoff = self.inner.policy.retention_cutoff(self.inner.clock.now());
        let removed = self.inner.reminders.reap(cutoff).await?;
        if removed > 0 {
            info!(removed, %cutoff, "Reaped reminders");
        }
        Ok(removed)
    }

    /// Re-plan and reap every `interval` until `shutdown` is notified. The
    /// first pass runs immediately.
    pub async fn run_maintenance(&self, interval: Duration, shutdown: Arc<Notify>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.plan_all().await {
                        warn!(error = %e, "Reminder re-planning failed");
                    }
                    if let Err(e) = self.reap().await {
                        warn!(error = %e, "Reminder reaping failed");
                    }
                }
                _ = shutdown.notified() => {
                    info!("Reminder maintenance shutting down");
                    break;
                }
            }
        }
    }
}
