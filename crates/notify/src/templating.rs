//! Minijinja templates for reminder and reschedule messages.
//!
//! The built-in templates are registered once per renderer. Operators may
//! override any of them with [`TemplateRenderer::set_template`]; overrides
//! are syntax-checked before they replace the default.

use minijinja::Environment;
use serde::Serialize;

use crate::traits::{Notification, NotificationKind, NotifyError, Recipient};

const REMINDER_SUBJECT: &str = "reminder_subject";
const REMINDER_BODY: &str = "reminder_body";
const RESCHEDULE_SUBJECT: &str = "reschedule_subject";
const RESCHEDULE_BODY: &str = "reschedule_body";

const DEFAULT_REMINDER_SUBJECT: &str = "Lesson in {{ minutes_before }} minutes";
const DEFAULT_REMINDER_BODY: &str = "Reminder: your lesson starts at {{ time }} \
({{ weekday }}, {{ date }}) and lasts {{ duration_minutes | duration }}.";
const DEFAULT_RESCHEDULE_SUBJECT: &str = "Reschedule request #{{ request_id }}";
const DEFAULT_RESCHEDULE_BODY: &str = "Student {{ student_id }} asks to move a lesson.\n\
Was: {{ original_weekday }} {{ original_date }} at {{ original_time }}\n\
Wants: {{ requested_weekday }} {{ requested_date }} at {{ requested_time }}";

/// Values available to reminder templates.
#[derive(Debug, Clone, Serialize)]
pub struct ReminderContext {
    pub student_id: i64,
    pub lesson_id: i64,
    /// `YYYY-MM-DD`.
    pub date: String,
    pub weekday: String,
    /// `HH:MM`.
    pub time: String,
    pub duration_minutes: u32,
    pub minutes_before: u32,
}

/// Values available to reschedule-request templates.
#[derive(Debug, Clone, Serialize)]
pub struct RescheduleContext {
    pub request_id: i64,
    pub student_id: i64,
    pub lesson_id: i64,
    pub original_date: String,
    pub original_weekday: String,
    pub original_time: String,
    pub requested_date: String,
    pub requested_weekday: String,
    pub requested_time: String,
}

/// Renders notification subjects and bodies.
#[derive(Debug)]
pub struct TemplateRenderer {
    env: Environment<'static>,
}

impl TemplateRenderer {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_filter("duration", duration_filter);
        for (name, source) in [
            (REMINDER_SUBJECT, DEFAULT_REMINDER_SUBJECT),
            (REMINDER_BODY, DEFAULT_REMINDER_BODY),
            (RESCHEDULE_SUBJECT, DEFAULT_RESCHEDULE_SUBJECT),
            (RESCHEDULE_BODY, DEFAULT_RESCHEDULE_BODY),
        ] {
            // Built-in sources are static and known to parse.
            if let Err(e) = env.add_template(name, source) {
                tracing::error!(template = name, error = %e, "Built-in template failed to parse");
            }
        }
        Self { env }
    }

    /// Replace a named template (`reminder_subject`, `reminder_body`,
    /// `reschedule_subject`, `reschedule_body`).
    pub fn set_template(&mut self, name: &str, source: String) -> Result<(), NotifyError> {
        let name = match name {
            REMINDER_SUBJECT => REMINDER_SUBJECT,
            REMINDER_BODY => REMINDER_BODY,
            RESCHEDULE_SUBJECT => RESCHEDULE_SUBJECT,
            RESCHEDULE_BODY => RESCHEDULE_BODY,
            other => return Err(NotifyError::Template(format!("unknown template '{other}'"))),
        };
        self.validate(&source)?;
        self.env
            .add_template_owned(name, source)
            .map_err(|e| NotifyError::Template(e.to_string()))
    }

    /// Check that a template string parses, without evaluating it.
    pub fn validate(&self, template_str: &str) -> Result<(), NotifyError> {
        Environment::new()
            .template_from_str(template_str)
            .map_err(|e| NotifyError::Template(e.to_string()))?;
        Ok(())
    }

    /// Render an ad-hoc template string with the renderer's filters.
    pub fn render_str<S: Serialize>(&self, template_str: &str, ctx: &S) -> Result<String, NotifyError> {
        self.env
            .render_str(template_str, ctx)
            .map_err(|e| NotifyError::Template(e.to_string()))
    }

    fn render_named<S: Serialize>(&self, name: &str, ctx: &S) -> Result<String, NotifyError> {
        self.env
            .get_template(name)
            .and_then(|t| t.render(ctx))
            .map_err(|e| NotifyError::Template(format!("{name}: {e}")))
    }

    pub fn reminder(&self, ctx: &ReminderContext) -> Result<Notification, NotifyError> {
        Ok(Notification::new(
            Recipient::Student(ctx.student_id),
            NotificationKind::LessonReminder,
            self.render_named(REMINDER_SUBJECT, ctx)?,
            self.render_named(REMINDER_BODY, ctx)?,
        ))
    }

    /// Admin alert for a new request. The recipient is a placeholder admin;
    /// the dispatcher readdresses it to every configured administrator.
    pub fn reschedule_request(&self, ctx: &RescheduleContext) -> Result<Notification, NotifyError> {
        Ok(Notification::new(
            Recipient::Admin(0),
            NotificationKind::RescheduleRequest,
            self.render_named(RESCHEDULE_SUBJECT, ctx)?,
            self.render_named(RESCHEDULE_BODY, ctx)?,
        ))
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// `90 | duration` renders as `1 h 30 min`.
fn duration_filter(minutes: u32) -> String {
    match (minutes / 60, minutes % 60) {
        (0, m) => format!("{m} min"),
        (h, 0) => format!("{h} h"),
        (h, m) => format!("{h} h {m} min"),
    }
}
