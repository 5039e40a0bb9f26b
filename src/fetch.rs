use std::time::Duration;

use async_trait::async_trait;

use crate::error::ScrapeError;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/115.0";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Where page HTML comes from. The orchestrator only ever sees this trait,
/// so tests drive it from canned documents instead of the network.
#[async_trait]
pub trait PageSource {
    async fn fetch(&self, url: &str) -> Result<String, ScrapeError>;
}

/// Plain GET over a shared reqwest client.
pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new() -> Result<Self, ScrapeError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ScrapeError::fetch("client", e))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageSource for HttpSource {
    async fn fetch(&self, url: &str) -> Result<String, ScrapeError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ScrapeError::fetch(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::fetch(url, format!("HTTP {status}")));
        }

        response.text().await.map_err(|e| ScrapeError::fetch(url, e))
    }
}
