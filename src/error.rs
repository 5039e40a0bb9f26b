use std::fmt;

use thiserror::Error;

/// Failure classes of the scrape pipeline.
///
/// `AnchorNotFound` and `MalformedField` are downgraded to [`FieldWarning`]s
/// inside the extractor unless the field is load-bearing (review id, rating);
/// everything else aborts the current attraction and the run moves on.
#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("browser session error: {0}")]
    Browser(String),

    #[error("expected anchor '{anchor}' not found")]
    AnchorNotFound { anchor: &'static str },

    #[error("malformed {field}: {value:?}")]
    MalformedField { field: &'static str, value: String },

    #[error("no attraction id in url {url:?}")]
    IdFromUrl { url: String },

    #[error("invalid {kind} url {url:?}: missing {marker:?} marker")]
    InvalidTemplate {
        kind: &'static str,
        url: String,
        marker: &'static str,
    },

    #[error("persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("io error at {path}: {reason}")]
    Io { path: String, reason: String },
}

impl ScrapeError {
    pub fn fetch(url: &str, reason: impl fmt::Display) -> Self {
        Self::Fetch {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn anchor(anchor: &'static str) -> Self {
        Self::AnchorNotFound { anchor }
    }

    pub fn malformed(field: &'static str, value: &str) -> Self {
        Self::MalformedField {
            field,
            value: value.to_string(),
        }
    }

    pub fn io(path: impl fmt::Display, reason: impl fmt::Display) -> Self {
        Self::Io {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// A field that could not be extracted from an item block.
///
/// Carries enough context to locate the page by hand later. `item` is `None`
/// for page-level misses (e.g. a page with no item blocks at all).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldWarning {
    pub field: &'static str,
    pub item: Option<usize>,
    pub page: u32,
    pub url: String,
}

impl FieldWarning {
    pub fn new(field: &'static str, item: usize, page: u32, url: &str) -> Self {
        Self {
            field,
            item: Some(item),
            page,
            url: url.to_string(),
        }
    }

    pub fn page_level(field: &'static str, page: u32, url: &str) -> Self {
        Self {
            field,
            item: None,
            page,
            url: url.to_string(),
        }
    }
}

impl fmt::Display for FieldWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.item {
            Some(item) => write!(
                f,
                "no {} at page {}, item {} ({})",
                self.field, self.page, item, self.url
            ),
            None => write!(f, "no {} on page {} ({})", self.field, self.page, self.url),
        }
    }
}
