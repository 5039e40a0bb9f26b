use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use fantoccini::{Client, ClientBuilder, Locator};
use regex::Regex;
use tracing::debug;

use crate::error::ScrapeError;

static MAP_CENTER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"center=(-?\d+\.\d+),(-?\d+\.\d+)").unwrap());
static LANGUAGE_COUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(.*)\((\d[\d,]*)\)").unwrap());

// Anchors that only exist after client-side rendering.
const MAP_IMG: &str = "//span[@data-test-target='staticMapSnapshot']/img";
const LANGUAGE_LIST: &str = "//ul[@class='_2lcHrbTn']";
const LANGUAGE_ITEM: &str = "//li[@class='ui_radio _3gEj_Jb5']";
const LANGUAGE_LABEL: &str = ".//label[@class='bUKZfPPw']";
const PAGE_NUM: &str = "//div[@class='pageNumbers']//a[contains(@class, 'pageNum')]";

const RENDER_WAIT: Duration = Duration::from_secs(7);

/// Detail-page fields that only exist in the rendered DOM.
///
/// `pages` is `None` when the pagination block never appeared; the caller
/// owns the fallback (a single review page renders no pagination at all).
#[derive(Debug, Clone, Default)]
pub struct AttractionDetails {
    pub coords: Option<(f64, f64)>,
    pub num_reviews: Option<BTreeMap<String, u32>>,
    pub pages: Option<u32>,
}

/// Resolves an attraction's client-rendered detail fields.
#[async_trait]
pub trait DetailSource {
    async fn attraction_details(&mut self, url: &str) -> Result<AttractionDetails, ScrapeError>;
}

/// One WebDriver session for the whole run.
///
/// Acquired once by the orchestrator and handed back for an explicit
/// [`close`](Self::close) on every exit path; an unclosed session leaks a
/// browser process on the WebDriver host.
pub struct BrowserSession {
    client: Client,
}

impl BrowserSession {
    pub async fn connect(webdriver_url: &str) -> Result<Self, ScrapeError> {
        let client = ClientBuilder::native()
            .connect(webdriver_url)
            .await
            .map_err(|e| ScrapeError::Browser(e.to_string()))?;
        Ok(Self { client })
    }

    pub async fn close(self) -> Result<(), ScrapeError> {
        self.client
            .close()
            .await
            .map_err(|e| ScrapeError::Browser(e.to_string()))
    }

    /// Coordinates from the static map snapshot's tile URL, e.g.
    /// `…staticmap?center=51.5081,-0.0759&…`.
    async fn coordinates(&mut self) -> Option<(f64, f64)> {
        let img = self
            .client
            .wait()
            .at_most(RENDER_WAIT)
            .for_element(Locator::XPath(MAP_IMG))
            .await
            .ok()?;
        let src = img.attr("src").await.ok()??;
        let caps = MAP_CENTER_RE.captures(&src)?;
        let lat = caps[1].parse().ok()?;
        let lon = caps[2].parse().ok()?;
        Some((lat, lon))
    }

    /// Per-language review counts from the language filter, whose labels
    /// read `English (1,234)`. The first entry is the "all languages"
    /// aggregate and is skipped.
    async fn language_counts(&mut self) -> Option<BTreeMap<String, u32>> {
        self.client
            .wait()
            .at_most(RENDER_WAIT)
            .for_element(Locator::XPath(LANGUAGE_LIST))
            .await
            .ok()?;

        let items = self
            .client
            .find_all(Locator::XPath(LANGUAGE_ITEM))
            .await
            .ok()?;
        let mut counts = BTreeMap::new();
        for item in items.into_iter().skip(1) {
            let Ok(label) = item.find(Locator::XPath(LANGUAGE_LABEL)).await else {
                continue;
            };
            let Ok(text) = label.text().await else {
                continue;
            };
            if let Some(caps) = LANGUAGE_COUNT_RE.captures(&text) {
                if let Ok(n) = caps[2].replace(',', "").parse() {
                    counts.insert(caps[1].trim().to_string(), n);
                }
            }
        }
        (!counts.is_empty()).then_some(counts)
    }

    /// Review page count from the pagination control's last entry.
    async fn page_count(&mut self) -> Option<u32> {
        let nums = self.client.find_all(Locator::XPath(PAGE_NUM)).await.ok()?;
        let last = nums.last()?;
        last.text().await.ok()?.trim().parse().ok()
    }
}

#[async_trait]
impl DetailSource for BrowserSession {
    async fn attraction_details(&mut self, url: &str) -> Result<AttractionDetails, ScrapeError> {
        self.client
            .goto(url)
            .await
            .map_err(|e| ScrapeError::Browser(e.to_string()))?;

        // Each anchor waits and fails independently; a detail page with no
        // map still yields its language counts and page count.
        let coords = self.coordinates().await;
        if coords.is_none() {
            debug!("no map snapshot rendered at {url}");
        }
        let num_reviews = self.language_counts().await;
        if num_reviews.is_none() {
            debug!("no language filter rendered at {url}");
        }
        let pages = self.page_count().await;

        Ok(AttractionDetails {
            coords,
            num_reviews,
            pages,
        })
    }
}
