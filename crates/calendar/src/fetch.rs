//! Feed download seam.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::CalendarError;

/// Source of raw iCalendar text.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch_text(&self) -> Result<String, CalendarError>;
}

/// Downloads the feed over HTTP(S) with a bounded timeout.
#[derive(Debug, Clone)]
pub struct HttpFeedFetcher {
    url: String,
    client: reqwest::Client,
}

impl HttpFeedFetcher {
    /// `webcal://` links are rewritten to `https://`.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, CalendarError> {
        let url = match url.strip_prefix("webcal://") {
            Some(rest) => format!("https://{rest}"),
            None => url.to_string(),
        };
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { url, client })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch_text(&self) -> Result<String, CalendarError> {
        debug!(url = %self.url, "Fetching calendar feed");
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CalendarError::Status(status.as_u16()));
        }
        Ok(response.text().await?)
    }
}
