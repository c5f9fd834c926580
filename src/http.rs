use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use tracing::debug;

/// Pause after every request to boardgamegeek.com. The site starts refusing
/// clients that go faster.
pub const POLITE_PAUSE: Duration = Duration::from_secs(5);

/// Status and body of one GET.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub status: StatusCode,
    pub body: Bytes,
}

impl Fetched {
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self {
            status: StatusCode::OK,
            body: body.into(),
        }
    }

    /// Turn a non-2xx status into an error naming `url`.
    pub fn error_for_status(self, url: &str) -> Result<Self> {
        if !self.status.is_success() {
            bail!("GET {} returned {}", url, self.status);
        }
        Ok(self)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// The one network operation every phase needs.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn get(&self, url: &str) -> Result<Fetched>;
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let http = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn get(&self, url: &str) -> Result<Fetched> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .with_context(|| format!("read body of {url}"))?;
        debug!(%url, %status, bytes = body.len(), "fetched");
        Ok(Fetched { status, body })
    }
}

/// Fixed pause taken after each external fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Throttle {
    pause: Duration,
}

impl Throttle {
    pub fn polite() -> Self {
        Self {
            pause: POLITE_PAUSE,
        }
    }

    /// No pause at all; for stubbed fetchers in tests.
    pub fn none() -> Self {
        Self {
            pause: Duration::ZERO,
        }
    }

    pub fn pause_duration(&self) -> Duration {
        self.pause
    }

    pub async fn pause(&self) {
        if !self.pause.is_zero() {
            tokio::time::sleep(self.pause).await;
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_success_status_names_url() {
        let err = testing::status(503)
            .error_for_status("https://example.test/x")
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "GET https://example.test/x returned 503 Service Unavailable"
        );
        assert!(Fetched::ok("ok").error_for_status("u").is_ok());
    }

    #[test]
    fn polite_throttle_is_five_seconds() {
        assert_eq!(Throttle::polite().pause_duration(), Duration::from_secs(5));
        assert!(Throttle::none().pause_duration().is_zero());
    }

    #[tokio::test]
    async fn http_fetcher_builds_with_timeout() {
        assert!(HttpFetcher::new(Duration::from_secs(1), "bgg-pull-test").is_ok());
    }
}
