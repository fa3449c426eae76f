//! Student-driven reschedule conversation.
//!
//! Each session walks `ChooseLesson -> ChooseWeek -> ChooseDay -> ChooseTime
//! -> Confirm` and ends submitted or cancelled. Drafts live in memory only;
//! nothing is persisted until confirmation, and the weekly lesson itself is
//! never modified here. Any step reached without its prerequisites sends the
//! session back to lesson selection.

mod view;


use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{Duration, NaiveDate};
use tracing::{debug, info, warn};
use tutor_core::time::{format_hhmm, next_date_for_weekday, week_start, weekday_index, weekday_name};
use tutor_core::{LessonId, NewRescheduleRequest, RescheduleRequest, Slot, StudentId, WeeklyLesson};
use tutor_notify::{Dispatcher, RescheduleContext, TemplateRenderer};
use tutor_storage::{RequestStore, ScheduleStore};

use crate::error::{Result, SchedulingError};
use crate::slots::{slot_starting_at, SlotEngine};

pub use view::{
    page_token, RescheduleSummary, TimePage, WeekChoice, WorkflowStep, WorkflowView, PAGE_TOKEN_PREFIX,
};
use view::{paginate, TimeToken};

/// Opaque per-user conversation key (the chat id in practice).
pub type SessionKey = i64;

pub const DEFAULT_PAGE_SIZE: usize = 12;

#[derive(Debug, Clone)]
struct Draft {
    student_id: StudentId,
    step: WorkflowStep,
    /// Captured when chosen, never re-read.
    lesson: Option<WeeklyLesson>,
    original_date: Option<NaiveDate>,
    week_start: Option<NaiveDate>,
    date: Option<NaiveDate>,
    slots: Vec<Slot>,
    page: usize,
    chosen: Option<Slot>,
}

impl Draft {
    fn new(student_id: StudentId) -> Self {
        Self {
            student_id,
            step: WorkflowStep::ChooseLesson,
            lesson: None,
            original_date: None,
            week_start: None,
            date: None,
            slots: Vec::new(),
            page: 0,
            chosen: None,
        }
    }
}

pub struct RescheduleWorkflow {
    engine: Arc<SlotEngine>,
    lessons: ScheduleStore,
    requests: RequestStore,
    dispatcher: Arc<Dispatcher>,
    templates: Arc<TemplateRenderer>,
    page_size: usize,
    sessions: Mutex<HashMap<SessionKey, Draft>>,
}

impl RescheduleWorkflow {
    pub fn new(
        engine: Arc<SlotEngine>,
        lessons: ScheduleStore,
        requests: RequestStore,
        dispatcher: Arc<Dispatcher>,
        templates: Arc<TemplateRenderer>,
    ) -> Self {
        Self {
            engine,
            lessons,
            requests,
            dispatcher,
            templates,
            page_size: DEFAULT_PAGE_SIZE,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<SessionKey, Draft>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn draft(&self, session: SessionKey) -> Result<Draft> {
        self.sessions()
            .get(&session)
            .cloned()
            .ok_or(SchedulingError::SessionNotFound(session))
    }

    /// Write a draft back unless the session ended in the meantime.
    fn save(&self, session: SessionKey, draft: Draft) {
        if let Some(slot) = self.sessions().get_mut(&session) {
            *slot = draft;
        }
    }

    fn end(&self, session: SessionKey) -> Option<Draft> {
        self.sessions().remove(&session)
    }

    /// Step the session is waiting on, if one is open.
    pub fn current_step(&self, session: SessionKey) -> Option<WorkflowStep> {
        self.sessions().get(&session).map(|d| d.step)
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions().len()
    }

    /// Start (or restart) a reschedule for `student_id`.
    pub async fn request_reschedule(&self, session: SessionKey, student_id: StudentId) -> Result<WorkflowView> {
        let lessons = self.lessons.list(student_id).await?;
        if lessons.is_empty() {
            self.end(session);
            debug!(session, student_id, "No lessons to reschedule");
            return Ok(WorkflowView::NoLessons);
        }
        self.sessions().insert(session, Draft::new(student_id));
        debug!(session, student_id, lessons = lessons.len(), "Reschedule started");
        Ok(WorkflowView::ChooseLesson(lessons))
    }

    async fn back_to_start(&self, session: SessionKey, draft: &Draft) -> Result<WorkflowView> {
        debug!(session, step = ?draft.step, "Missing workflow state, restarting");
        let lessons = self.lessons.list(draft.student_id).await?;
        if lessons.is_empty() {
            self.end(session);
            return Ok(WorkflowView::NoLessons);
        }
        self.save(session, Draft::new(draft.student_id));
        Ok(WorkflowView::ChooseLesson(lessons))
    }

    pub async fn choose_lesson(&self, session: SessionKey, lesson_id: LessonId) -> Result<WorkflowView> {
        let mut draft = self.draft(session)?;
        let lessons = self.lessons.list(draft.student_id).await?;
        let Some(lesson) = lessons.iter().find(|l| l.id == lesson_id).cloned() else {
            return self.back_to_start(session, &draft).await;
        };

        let now = self.engine.clock().now();
        draft.original_date = Some(next_date_for_weekday(now, lesson.day_of_week, lesson.time));
        draft.lesson = Some(lesson);
        draft.step = WorkflowStep::ChooseWeek;
        self.save(session, draft);
        self.week_view().await
    }

    async fn week_view(&self) -> Result<WorkflowView> {
        let settings = self.engine.settings().await?;
        let this_week = week_start(self.engine.clock().today());
        let choices = (0..settings.max_weeks_ahead)
            .map(|offset| WeekChoice {
                offset,
                week_start: this_week + Duration::weeks(i64::from(offset)),
            })
            .collect();
        Ok(WorkflowView::ChooseWeek(choices))
    }

    /// `offset` 0 is the current week; offsets at or beyond
    /// `max_weeks_ahead` re-show the choice.
    pub async fn choose_week(&self, session: SessionKey, offset: u32) -> Result<WorkflowView> {
        let mut draft = self.draft(session)?;
        let Some(lesson) = draft.lesson.clone() else {
            return self.back_to_start(session, &draft).await;
        };
        let settings = self.engine.settings().await?;
        if offset >= settings.max_weeks_ahead {
            return self.week_view().await;
        }

        let start = week_start(self.engine.clock().today()) + Duration::weeks(i64::from(offset));
        let days = self.engine.get_available_days(start, lesson.duration_minutes).await?;
        if days.is_empty() {
            self.end(session);
            info!(session, %start, "No availability in chosen week");
            return Ok(WorkflowView::NoAvailability);
        }

        draft.week_start = Some(start);
        draft.step = WorkflowStep::ChooseDay;
        self.save(session, draft);
        Ok(WorkflowView::ChooseDay { week_start: start, days })
    }

    /// `weekday` is Monday = 0 within the chosen week.
    pub async fn choose_day(&self, session: SessionKey, weekday: u8) -> Result<WorkflowView> {
        let mut draft = self.draft(session)?;
        let (Some(lesson), Some(start)) = (draft.lesson.clone(), draft.week_start) else {
            return self.back_to_start(session, &draft).await;
        };

        let days = self.engine.get_available_days(start, lesson.duration_minutes).await?;
        if days.is_empty() {
            self.end(session);
            return Ok(WorkflowView::NoAvailability);
        }
        let Some(day) = days.iter().find(|d| d.weekday == weekday) else {
            return Ok(WorkflowView::ChooseDay { week_start: start, days });
        };

        let now = self.engine.clock().now();
        let slots: Vec<Slot> = self
            .engine
            .get_available_slots(day.date, lesson.duration_minutes)
            .await?
            .into_iter()
            .filter(|s| day.date > now.date() || s.start > now.time())
            .collect();
        if slots.is_empty() {
            return Ok(WorkflowView::ChooseDay { week_start: start, days });
        }

        draft.date = Some(day.date);
        draft.slots = slots;
        draft.page = 0;
        draft.chosen = None;
        draft.step = WorkflowStep::ChooseTime;
        let view = self.time_view(&draft, day.date);
        self.save(session, draft);
        Ok(view)
    }

    fn time_view(&self, draft: &Draft, date: NaiveDate) -> WorkflowView {
        let (slots, page, page_count) = paginate(&draft.slots, draft.page, self.page_size);
        WorkflowView::ChooseTime(TimePage {
            date,
            weekday_name: weekday_name(weekday_index(date)).to_string(),
            page,
            page_count,
            slots,
        })
    }

    /// Accepts `"HH:MM"` start times and `page:N` navigation tokens. Anything
    /// else, or a time that is not on offer, re-shows the current page.
    pub async fn choose_time(&self, session: SessionKey, token: &str) -> Result<WorkflowView> {
        let mut draft = self.draft(session)?;
        let (Some(lesson), Some(date)) = (draft.lesson.clone(), draft.date) else {
            return self.back_to_start(session, &draft).await;
        };
        if draft.slots.is_empty() {
            return self.back_to_start(session, &draft).await;
        }

        match TimeToken::parse(token) {
            TimeToken::Page(page) => {
                let (_, page, _) = paginate(&draft.slots, page, self.page_size);
                draft.page = page;
                let view = self.time_view(&draft, date);
                self.save(session, draft);
                Ok(view)
            }
            TimeToken::Time(time) => {
                let Some(slot) = slot_starting_at(&draft.slots, time) else {
                    return Ok(self.time_view(&draft, date));
                };
                let Some(summary) = summarize(&draft, &lesson, date, slot) else {
                    return self.back_to_start(session, &draft).await;
                };
                draft.chosen = Some(slot);
                draft.step = WorkflowStep::Confirm;
                self.save(session, draft);
                Ok(WorkflowView::Confirm(summary))
            }
            TimeToken::Invalid => {
                debug!(session, token, "Ignoring invalid time token");
                Ok(self.time_view(&draft, date))
            }
        }
    }

    /// Persist a pending request, alert administrators and close the session.
    pub async fn confirm(&self, session: SessionKey) -> Result<WorkflowView> {
        let draft = self.draft(session)?;
        let (Some(lesson), Some(date), Some(slot)) = (draft.lesson.clone(), draft.date, draft.chosen) else {
            return self.back_to_start(session, &draft).await;
        };
        let Some(summary) = summarize(&draft, &lesson, date, slot) else {
            return self.back_to_start(session, &draft).await;
        };

        let request = self
            .requests
            .create(&NewRescheduleRequest {
                student_id: draft.student_id,
                schedule_id: lesson.id,
                original_date: summary.original_date,
                original_time: summary.original_time,
                requested_date: summary.requested_date,
                requested_time: summary.requested_time,
            })
            .await?;
        self.end(session);
        self.alert_admins(&request).await;
        Ok(WorkflowView::Submitted(request))
    }

    async fn alert_admins(&self, request: &RescheduleRequest) {
        let ctx = RescheduleContext {
            request_id: request.id,
            student_id: request.student_id,
            lesson_id: request.schedule_id,
            original_date: request.original_date.to_string(),
            original_weekday: weekday_name(weekday_index(request.original_date)).to_string(),
            original_time: format_hhmm(request.original_time),
            requested_date: request.requested_date.to_string(),
            requested_weekday: weekday_name(weekday_index(request.requested_date)).to_string(),
            requested_time: format_hhmm(request.requested_time),
        };
        match self.templates.reschedule_request(&ctx) {
            Ok(notification) => {
                let results = self.dispatcher.notify_admins(&notification).await;
                debug!(request_id = request.id, deliveries = results.len(), "Admins notified");
            }
            Err(e) => warn!(request_id = request.id, error = %e, "Reschedule alert rendering failed"),
        }
    }

    /// Abandon the session at any step. Nothing is persisted.
    pub fn cancel(&self, session: SessionKey) -> WorkflowView {
        if self.end(session).is_some() {
            debug!(session, "Reschedule cancelled");
        }
        WorkflowView::Cancelled
    }
}

fn summarize(draft: &Draft, lesson: &WeeklyLesson, date: NaiveDate, slot: Slot) -> Option<RescheduleSummary> {
    Some(RescheduleSummary {
        lesson_id: lesson.id,
        duration_minutes: lesson.duration_minutes,
        original_date: draft.original_date?,
        original_time: lesson.time,
        requested_date: date,
        requested_time: slot.start,
    })
}
