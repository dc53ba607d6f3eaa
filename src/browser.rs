use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};
use spider_client::shapes::request::{ReturnFormat, ReturnFormatHandling};
use spider_client::{RequestParams, Spider};
use tracing::debug;

use crate::error::ScrapeError;

const USER_AGENT: &str = concat!("magazine_scraper/", env!("CARGO_PKG_VERSION"));

/// Renders pages. Implementations own their own transport.
#[async_trait]
pub trait Browser: Send + Sync {
    /// Load `url`, following redirects, within `timeout`.
    async fn navigate(&self, url: &str, timeout: Duration)
        -> Result<Box<dyn RenderedPage>, ScrapeError>;
}

/// A loaded page.
#[async_trait]
pub trait RenderedPage: Send + Sync {
    /// Where navigation actually ended.
    fn final_url(&self) -> &str;

    /// Wait until `selector` matches something in the page.
    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<(), ScrapeError>;

    /// Current DOM serialized as HTML.
    async fn content(&self) -> Result<String, ScrapeError>;
}

/// A page whose DOM never changes after load. Marker waits succeed or fail
/// immediately.
pub struct StaticPage {
    final_url: String,
    html: String,
}

impl StaticPage {
    pub fn new(final_url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            final_url: final_url.into(),
            html: html.into(),
        }
    }
}

#[async_trait]
impl RenderedPage for StaticPage {
    fn final_url(&self) -> &str {
        &self.final_url
    }

    async fn wait_for(&self, selector: &str, _timeout: Duration) -> Result<(), ScrapeError> {
        if contains(&self.html, selector)? {
            Ok(())
        } else {
            Err(ScrapeError::Navigation {
                url: self.final_url.clone(),
                final_url: Some(self.final_url.clone()),
                reason: format!("`{}` never appeared", selector),
            })
        }
    }

    async fn content(&self) -> Result<String, ScrapeError> {
        Ok(self.html.clone())
    }
}

fn contains(html: &str, selector: &str) -> Result<bool, ScrapeError> {
    let selector =
        Selector::parse(selector).map_err(|_| ScrapeError::InvalidSelector(selector.to_string()))?;
    Ok(Html::parse_document(html).select(&selector).next().is_some())
}

// ── Plain HTTP ──

/// Fetches server-rendered HTML with reqwest. No script execution.
pub struct HttpBrowser {
    client: reqwest::Client,
}

impl HttpBrowser {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Browser for HttpBrowser {
    async fn navigate(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<Box<dyn RenderedPage>, ScrapeError> {
        let failed = |reason: String| ScrapeError::Navigation {
            url: url.to_string(),
            final_url: None,
            reason,
        };

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ScrapeError::Timeout {
                        url: url.to_string(),
                        timeout,
                    }
                } else {
                    failed(e.to_string())
                }
            })?;

        let final_url = response.url().to_string();
        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::Navigation {
                url: url.to_string(),
                final_url: Some(final_url),
                reason: format!("HTTP {}", status),
            });
        }
        let html = response.text().await.map_err(|e| failed(e.to_string()))?;
        debug!("Fetched {} ({} bytes)", final_url, html.len());
        Ok(Box::new(StaticPage::new(final_url, html)))
    }
}

// ── spider.cloud ──

/// Renders through spider.cloud, which runs the page's scripts.
pub struct SpiderBrowser {
    spider: Spider,
}

impl SpiderBrowser {
    pub fn new(api_key: String) -> anyhow::Result<Self> {
        let spider = Spider::new(Some(api_key))
            .map_err(|e| anyhow::anyhow!("Failed to create Spider client: {}", e))?;
        Ok(Self { spider })
    }
}

#[async_trait]
impl Browser for SpiderBrowser {
    async fn navigate(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<Box<dyn RenderedPage>, ScrapeError> {
        let failed = |reason: String| ScrapeError::Navigation {
            url: url.to_string(),
            final_url: None,
            reason,
        };
        let params = RequestParams {
            return_format: Some(ReturnFormatHandling::Single(ReturnFormat::Raw)),
            ..Default::default()
        };

        let response = tokio::time::timeout(
            timeout,
            self.spider.scrape_url(url, Some(params), "application/json"),
        )
        .await
        .map_err(|_| ScrapeError::Timeout {
            url: url.to_string(),
            timeout,
        })?
        .map_err(|e| failed(e.to_string()))?;

        let parsed: serde_json::Value = match response.as_str() {
            Some(s) => serde_json::from_str(s).unwrap_or(response.clone()),
            None => response,
        };
        let first = parsed.as_array().and_then(|arr| arr.first());

        if let Some(err) = first.and_then(|obj| obj.get("error")).and_then(|e| e.as_str()) {
            return Err(failed(err.to_string()));
        }
        let status = first
            .and_then(|obj| obj.get("status"))
            .and_then(|s| s.as_i64())
            .unwrap_or(200);
        let final_url = first
            .and_then(|obj| obj.get("url"))
            .and_then(|u| u.as_str())
            .unwrap_or(url);
        if !(200..300).contains(&status) {
            return Err(ScrapeError::Navigation {
                url: url.to_string(),
                final_url: Some(final_url.to_string()),
                reason: format!("HTTP {}", status),
            });
        }

        let html = first
            .and_then(|obj| obj.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| failed("no content in spider response".to_string()))?;

        Ok(Box::new(StaticPage::new(final_url, html)))
    }
}
