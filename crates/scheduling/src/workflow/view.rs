use chrono::{NaiveDate, NaiveTime};
use tutor_core::time::{format_hhmm, parse_hhmm, weekday_index, weekday_name};
use tutor_core::{AvailableDay, LessonId, RescheduleRequest, Slot, WeeklyLesson};

/// Prefix of page-navigation tokens in the time picker (`page:2`).
pub const PAGE_TOKEN_PREFIX: &str = "page:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStep {
    ChooseLesson,
    ChooseWeek,
    ChooseDay,
    ChooseTime,
    Confirm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekChoice {
    /// 0 = this week.
    pub offset: u32,
    pub week_start: NaiveDate,
}

/// One page of the time picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimePage {
    pub date: NaiveDate,
    pub weekday_name: String,
    /// Zero-based.
    pub page: usize,
    pub page_count: usize,
    pub slots: Vec<Slot>,
}

impl TimePage {
    pub fn has_prev(&self) -> bool {
        self.page > 0
    }

    pub fn has_next(&self) -> bool {
        self.page + 1 < self.page_count
    }

    pub fn prev_token(&self) -> Option<String> {
        self.has_prev().then(|| page_token(self.page - 1))
    }

    pub fn next_token(&self) -> Option<String> {
        self.has_next().then(|| page_token(self.page + 1))
    }
}

pub fn page_token(page: usize) -> String {
    format!("{PAGE_TOKEN_PREFIX}{page}")
}

/// Before/after comparison shown before submitting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RescheduleSummary {
    pub lesson_id: LessonId,
    pub duration_minutes: u32,
    pub original_date: NaiveDate,
    pub original_time: NaiveTime,
    pub requested_date: NaiveDate,
    pub requested_time: NaiveTime,
}

impl RescheduleSummary {
    pub fn before_label(&self) -> String {
        occurrence_label(self.original_date, self.original_time)
    }

    pub fn after_label(&self) -> String {
        occurrence_label(self.requested_date, self.requested_time)
    }
}

fn occurrence_label(date: NaiveDate, time: NaiveTime) -> String {
    format!(
        "{} {} {}",
        weekday_name(weekday_index(date)),
        date,
        format_hhmm(time)
    )
}

/// What the conversation layer should show next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowView {
    ChooseLesson(Vec<WeeklyLesson>),
    /// The student has no active lessons; the session is closed.
    NoLessons,
    ChooseWeek(Vec<WeekChoice>),
    ChooseDay {
        week_start: NaiveDate,
        days: Vec<AvailableDay>,
    },
    /// Nothing bookable in the chosen week; the session is closed.
    NoAvailability,
    ChooseTime(TimePage),
    Confirm(RescheduleSummary),
    Submitted(RescheduleRequest),
    Cancelled,
}

impl WorkflowView {
    /// The step awaiting input, or `None` once the session has ended.
    pub fn step(&self) -> Option<WorkflowStep> {
        match self {
            WorkflowView::ChooseLesson(_) => Some(WorkflowStep::ChooseLesson),
            WorkflowView::ChooseWeek(_) => Some(WorkflowStep::ChooseWeek),
            WorkflowView::ChooseDay { .. } => Some(WorkflowStep::ChooseDay),
            WorkflowView::ChooseTime(_) => Some(WorkflowStep::ChooseTime),
            WorkflowView::Confirm(_) => Some(WorkflowStep::Confirm),
            WorkflowView::NoLessons
            | WorkflowView::NoAvailability
            | WorkflowView::Submitted(_)
            | WorkflowView::Cancelled => None,
        }
    }
}

/// A time-picker input: either page navigation or a start time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimeToken {
    Page(usize),
    Time(NaiveTime),
    Invalid,
}

impl TimeToken {
    pub(crate) fn parse(token: &str) -> Self {
        let token = token.trim();
        if let Some(page) = token.strip_prefix(PAGE_TOKEN_PREFIX) {
            return page.parse().map(TimeToken::Page).unwrap_or(TimeToken::Invalid);
        }
        parse_hhmm(token).map(TimeToken::Time).unwrap_or(TimeToken::Invalid)
    }
}

/// Slice out one page, clamping the page number into range.
pub(crate) fn paginate(slots: &[Slot], page: usize, page_size: usize) -> (Vec<Slot>, usize, usize) {
    let page_size = page_size.max(1);
    let page_count = slots.len().div_ceil(page_size).max(1);
    let page = page.min(page_count - 1);
    let items = slots.iter().skip(page * page_size).take(page_size).copied().collect();
    (items, page, page_count)
}
