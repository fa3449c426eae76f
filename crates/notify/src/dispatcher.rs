//! Routes notifications to configured channels.
//!
//! Each notification kind may have its own channels; kinds without a
//! mapping fall back to the default channels. Delivery is fire-and-forget:
//! individual channel failures are logged and reported in the results but
//! never block other channels or surface as errors.

use std::collections::HashMap;
use std::sync::Arc;

use tutor_core::config::TelegramConfig;

use crate::telegram::TelegramNotifier;
use crate::traits::{DispatchResult, Notification, NotificationKind, Notifier, NotifyError, Recipient};

/// Dispatches notifications to multiple channels, organized per kind.
#[derive(Default)]
pub struct Dispatcher {
    kind_channels: HashMap<NotificationKind, Vec<Arc<dyn Notifier>>>,
    /// Fallback channels used when no kind-specific channels exist.
    default_channels: Vec<Arc<dyn Notifier>>,
    /// Administrators receiving reschedule alerts.
    admin_ids: Vec<i64>,
}

impl Dispatcher {
    /// Create a dispatcher that drops everything (no channels configured).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a simple dispatcher with channels shared across all kinds.
    pub fn with_defaults(channels: Vec<Arc<dyn Notifier>>) -> Self {
        Self {
            default_channels: channels,
            ..Self::default()
        }
    }

    /// Telegram-backed dispatcher, or an empty one when no bot token is set.
    pub fn from_config(config: &TelegramConfig) -> Result<Self, NotifyError> {
        let dispatcher = match TelegramNotifier::from_config(config)? {
            Some(telegram) => Self::with_defaults(vec![Arc::new(telegram)]),
            None => {
                tracing::warn!("No Telegram bot token configured, notifications are disabled");
                Self::empty()
            }
        };
        Ok(dispatcher.with_admins(config.admin_ids.clone()))
    }

    pub fn with_admins(mut self, admin_ids: Vec<i64>) -> Self {
        self.admin_ids = admin_ids;
        self
    }

    pub fn admin_ids(&self) -> &[i64] {
        &self.admin_ids
    }

    /// Replace all channels for a specific kind.
    pub fn set_kind_channels(&mut self, kind: NotificationKind, channels: Vec<Arc<dyn Notifier>>) {
        self.kind_channels.insert(kind, channels);
    }

    fn channels_for(&self, kind: NotificationKind) -> &[Arc<dyn Notifier>] {
        self.kind_channels
            .get(&kind)
            .map(Vec::as_slice)
            .unwrap_or(&self.default_channels)
    }

    /// Deliver a notification to every channel for its kind.
    pub async fn dispatch(&self, notification: &Notification) -> Vec<DispatchResult> {
        let channels = self.channels_for(notification.kind);
        if channels.is_empty() {
            tracing::debug!(
                kind = notification.kind.as_str(),
                recipient = %notification.recipient,
                "No notification channels configured"
            );
            return Vec::new();
        }

        let mut results = Vec::with_capacity(channels.len());
        for channel in channels {
            let start = std::time::Instant::now();
            let result = channel.send(notification).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            let (success, error) = match result {
                Ok(()) => {
                    tracing::info!(
                        kind = notification.kind.as_str(),
                        recipient = %notification.recipient,
                        channel = channel.channel_name(),
                        duration_ms,
                        "Notification delivered"
                    );
                    (true, None)
                }
                Err(e) => {
                    tracing::warn!(
                        kind = notification.kind.as_str(),
                        recipient = %notification.recipient,
                        channel = channel.channel_name(),
                        error = %e,
                        duration_ms,
                        "Notification delivery failed"
                    );
                    (false, Some(e.to_string()))
                }
            };

            results.push(DispatchResult {
                channel: channel.channel_name().to_string(),
                recipient: notification.recipient,
                success,
                error,
                duration_ms,
            });
        }
        results
    }

    /// Send a copy of `notification` to every configured administrator.
    pub async fn notify_admins(&self, notification: &Notification) -> Vec<DispatchResult> {
        if self.admin_ids.is_empty() {
            tracing::warn!(kind = notification.kind.as_str(), "No administrators configured");
            return Vec::new();
        }
        let mut results = Vec::new();
        for admin in &self.admin_ids {
            results.extend(self.dispatch(&notification.to(Recipient::Admin(*admin))).await);
        }
        results
    }

    /// Send a test notification through one channel of a kind.
    pub async fn test_notify(
        &self,
        kind: NotificationKind,
        channel_index: usize,
        recipient: Recipient,
    ) -> Result<(), NotifyError> {
        let channel = self.channels_for(kind).get(channel_index).ok_or_else(|| {
            NotifyError::Config(format!(
                "Channel index {channel_index} out of range for {}",
                kind.as_str()
            ))
        })?;
        channel.test(recipient).await
    }
}
