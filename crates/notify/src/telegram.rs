//! Telegram Bot API notifier.
//!
//! Delivers notifications via the Telegram Bot API `sendMessage` endpoint.
//! The chat id is taken from the notification recipient, so one notifier
//! serves students and administrators alike.

use tutor_core::config::TelegramConfig;

use crate::traits::{Notification, Notifier, NotifyError};

const API_BASE: &str = "https://api.telegram.org";

/// Backslash-escape every character MarkdownV2 reserves.
pub fn escape_markdown_v2(text: &str) -> String {
    let special = ['_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!', '\\'];
    let mut result = String::with_capacity(text.len() * 2);
    for ch in text.chars() {
        if special.contains(&ch) {
            result.push('\\');
        }
        result.push(ch);
    }
    result
}

/// One bot, any chat: the chat id comes from the recipient.
#[derive(Debug)]
pub struct TelegramNotifier {
    bot_token: String,
    parse_mode: Option<String>,
    api_base: String,
    client: reqwest::Client,
}

impl TelegramNotifier {
    /// If `bot_token` looks like `${NAME}`, the token is read from the
    /// environment variable `NAME`. Returns [`NotifyError::Config`] if the
    /// token is empty or the variable is missing.
    pub fn new(bot_token: String, parse_mode: Option<String>) -> Result<Self, NotifyError> {
        let resolved_token = match bot_token.strip_prefix("${") {
            Some(rest) => {
                let var_name = rest.strip_suffix('}').ok_or_else(|| {
                    NotifyError::Config(format!("Malformed env var reference: {bot_token}"))
                })?;
                std::env::var(var_name).map_err(|_| {
                    NotifyError::Config(format!("Environment variable '{var_name}' is not set"))
                })?
            }
            None => bot_token,
        };

        if resolved_token.trim().is_empty() {
            return Err(NotifyError::Config(
                "Telegram bot token must not be empty".to_string(),
            ));
        }

        Ok(Self {
            bot_token: resolved_token,
            parse_mode: parse_mode.filter(|m| !m.trim().is_empty()),
            api_base: API_BASE.to_string(),
            client: reqwest::Client::new(),
        })
    }

    /// `None` when no bot token is configured.
    pub fn from_config(config: &TelegramConfig) -> Result<Option<Self>, NotifyError> {
        match &config.bot_token {
            Some(token) => Self::new(token.clone(), config.parse_mode.clone()).map(Some),
            None => Ok(None),
        }
    }

    /// Point the notifier at a different Bot API host (self-hosted servers).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn is_markdown_v2(&self) -> bool {
        self.parse_mode.as_deref() == Some("MarkdownV2")
    }

    /// Message text: body plus the optional link on its own line.
    fn message_text(&self, notification: &Notification) -> String {
        let escape = |s: &str| {
            if self.is_markdown_v2() {
                escape_markdown_v2(s)
            } else {
                s.to_string()
            }
        };
        let mut text = escape(&notification.body);
        if let Some(link) = &notification.link {
            text.push_str("\n\n");
            text.push_str(&escape(link));
        }
        text
    }
}

#[async_trait::async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        let chat_id = notification.recipient.chat_id();

        let mut body = serde_json::json!({
            "chat_id": chat_id,
            "text": self.message_text(notification),
        });

        if let Some(ref mode) = self.parse_mode {
            body["parse_mode"] = serde_json::Value::String(mode.clone());
        }

        tracing::debug!(
            chat_id,
            kind = notification.kind.as_str(),
            parse_mode = ?self.parse_mode,
            "Sending Telegram notification"
        );

        let response = self.client.post(&url).json(&body).send().await?;

        let status = response.status();
        let resp_body: serde_json::Value = response.json().await?;

        if resp_body.get("ok") == Some(&serde_json::Value::Bool(true)) {
            tracing::info!(chat_id, "Telegram notification sent");
            return Ok(());
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp_body
                .get("parameters")
                .and_then(|p| p.get("retry_after"))
                .and_then(|v| v.as_u64())
                .unwrap_or(30);
            return Err(NotifyError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        let description = resp_body
            .get("description")
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown Telegram API error");

        Err(NotifyError::Rejected(format!(
            "Telegram API error ({status}): {description}"
        )))
    }

    fn channel_name(&self) -> &str {
        "telegram"
    }
}
