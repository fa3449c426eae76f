//! Notifier trait definition and shared types.

use std::fmt;

use serde::Serialize;
use tutor_core::StudentId;

/// Errors that can occur during notification delivery.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Template rendering failed: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Delivery rejected: {0}")]
    Rejected(String),
}

/// Who a notification is for. Ids double as chat ids on chat channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "role", content = "id", rename_all = "lowercase")]
pub enum Recipient {
    Student(StudentId),
    Admin(i64),
}

impl Recipient {
    pub fn chat_id(&self) -> i64 {
        match self {
            Recipient::Student(id) | Recipient::Admin(id) => *id,
        }
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recipient::Student(id) => write!(f, "student:{id}"),
            Recipient::Admin(id) => write!(f, "admin:{id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    LessonReminder,
    RescheduleRequest,
    Test,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::LessonReminder => "lesson_reminder",
            NotificationKind::RescheduleRequest => "reschedule_request",
            NotificationKind::Test => "test",
        }
    }
}

/// A rendered notification ready for delivery.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub recipient: Recipient,
    pub kind: NotificationKind,
    pub subject: String,
    pub body: String,
    /// Optional deep link appended by channels that support it.
    pub link: Option<String>,
}

impl Notification {
    pub fn new(recipient: Recipient, kind: NotificationKind, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            recipient,
            kind,
            subject: subject.into(),
            body: body.into(),
            link: None,
        }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    /// Same content addressed to someone else.
    pub fn to(&self, recipient: Recipient) -> Self {
        Self {
            recipient,
            ..self.clone()
        }
    }
}

/// Trait for notification channel implementations.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a notification through this channel.
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;

    /// Test connectivity with a sample notification.
    async fn test(&self, recipient: Recipient) -> Result<(), NotifyError> {
        let notification = Notification::new(
            recipient,
            NotificationKind::Test,
            "[TEST] Tutor notifications",
            "This is a test notification from the tutoring scheduler.",
        );
        self.send(&notification).await
    }

    /// Human-readable name for this channel (e.g., "telegram").
    fn channel_name(&self) -> &str;
}

/// Result of dispatching a notification to a single channel.
#[derive(Debug)]
pub struct DispatchResult {
    pub channel: String,
    pub recipient: Recipient,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}
