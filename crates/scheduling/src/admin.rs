//! Administrator entry points for lessons, availability settings and
//! reschedule requests.
//!
//! Every lesson mutation clears the slot cache and re-plans the student's
//! reminders. Re-planning failures are logged; the mutation itself has
//! already committed.

use std::sync::Arc;

use tracing::warn;
use tutor_core::{LessonId, LessonUpdate, RescheduleRequest, RescheduleSettings, StudentId, WeeklyLesson};
use tutor_storage::{RequestStore, ScheduleStore, SettingsStore};

use crate::error::Result;
use crate::reminders::ReminderScheduler;
use crate::slots::SlotEngine;

pub struct LessonAdmin {
    lessons: ScheduleStore,
    settings: SettingsStore,
    requests: RequestStore,
    slots: Arc<SlotEngine>,
    reminders: ReminderScheduler,
}

impl LessonAdmin {
    pub fn new(
        lessons: ScheduleStore,
        settings: SettingsStore,
        requests: RequestStore,
        slots: Arc<SlotEngine>,
        reminders: ReminderScheduler,
    ) -> Self {
        Self {
            lessons,
            settings,
            requests,
            slots,
            reminders,
        }
    }

    async fn after_change(&self, student_id: StudentId) {
        self.slots.invalidate_cache();
        if let Err(e) = self.reminders.plan_for_student(student_id).await {
            warn!(student_id, error = %e, "Reminder re-planning failed after lesson change");
        }
    }

    pub async fn add_lesson(
        &self,
        student_id: StudentId,
        day_of_week: u8,
        time: &str,
        duration_minutes: u32,
    ) -> Result<WeeklyLesson> {
        let lesson = self.lessons.add(student_id, day_of_week, time, duration_minutes).await?;
        self.after_change(student_id).await;
        Ok(lesson)
    }

    pub async fn update_lesson(&self, id: LessonId, update: LessonUpdate) -> Result<WeeklyLesson> {
        let lesson = self.lessons.update(id, update).await?;
        self.after_change(lesson.student_id).await;
        Ok(lesson)
    }

    pub async fn delete_lesson(&self, id: LessonId) -> Result<()> {
        let lesson = self.lessons.get(id).await?;
        if let Err(e) = self.reminders.forget_lesson(lesson.student_id, id).await {
            warn!(lesson_id = id, error = %e, "Could not cancel reminder timers");
        }
        self.lessons.delete(id).await?;
        self.after_change(lesson.student_id).await;
        Ok(())
    }

    /// Remove every lesson of a student (student removal).
    pub async fn delete_student_lessons(&self, student_id: StudentId) -> Result<u64> {
        for lesson in self.lessons.list(student_id).await? {
            if let Err(e) = self.reminders.forget_lesson(student_id, lesson.id).await {
                warn!(lesson_id = lesson.id, error = %e, "Could not cancel reminder timers");
            }
        }
        let removed = self.lessons.delete_for_student(student_id).await?;
        self.after_change(student_id).await;
        Ok(removed)
    }

    pub async fn list_lessons(&self, student_id: StudentId) -> Result<Vec<WeeklyLesson>> {
        Ok(self.lessons.list(student_id).await?)
    }

    pub async fn settings(&self) -> Result<RescheduleSettings> {
        Ok(self.settings.get().await?)
    }

    pub async fn update_settings(&self, settings: &RescheduleSettings) -> Result<RescheduleSettings> {
        let updated = self.settings.update(settings).await?;
        self.slots.invalidate_cache();
        Ok(updated)
    }

    pub async fn pending_requests(&self) -> Result<Vec<RescheduleRequest>> {
        Ok(self.requests.list_pending().await?)
    }

    pub async fn mark_request_processed(&self, id: i64) -> Result<RescheduleRequest> {
        Ok(self.requests.mark_processed(id).await?)
    }
}
