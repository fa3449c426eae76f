//! Outbound notifications for students and administrators.
//!
//! This crate provides:
//! - `Notifier` trait for pluggable delivery channels
//! - Telegram Bot API notifier
//! - Minijinja templates for lesson reminders and reschedule alerts
//! - Dispatcher that routes a notification to its channels and fans admin
//!   alerts out to every configured administrator

pub mod dispatcher;
pub mod telegram;
pub mod templating;
pub mod traits;

pub use dispatcher::Dispatcher;
pub use telegram::TelegramNotifier;
pub use templating::{ReminderContext, RescheduleContext, TemplateRenderer};
pub use traits::{DispatchResult, Notification, NotificationKind, Notifier, NotifyError, Recipient};
