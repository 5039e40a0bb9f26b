use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::ScrapeError;

static ATTR_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/Attraction_Review-g\d+-d(\d+)-").unwrap());

/// Derive the numeric attraction id from its review-page URL.
///
/// The id lives in the `-d<digits>-` path segment; a URL without it is
/// rejected rather than producing a record with a stale or missing id.
pub fn attraction_id_from_url(url: &str) -> Result<i64, ScrapeError> {
    ATTR_ID_RE
        .captures(url)
        .and_then(|c| c[1].parse().ok())
        .ok_or_else(|| ScrapeError::IdFromUrl {
            url: url.to_string(),
        })
}

/// An attraction as listed for a place.
///
/// `id` is always derived from `url` at construction, so the two cannot
/// disagree. Coordinates and the per-language review counts stay `None`
/// until the detail page has been resolved.
#[derive(Debug, Clone, Serialize)]
pub struct Attraction {
    pub id: i64,
    pub name: Option<String>,
    pub url: String,
    pub attr_type: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub num_reviews: Option<BTreeMap<String, u32>>,
    pub scraped: bool,
}

impl Attraction {
    pub fn from_url(url: &str) -> Result<Self, ScrapeError> {
        let id = attraction_id_from_url(url)?;
        Ok(Self {
            id,
            name: None,
            url: url.to_string(),
            attr_type: None,
            lat: None,
            lon: None,
            num_reviews: None,
            scraped: false,
        })
    }
}

/// One review of one attraction. Insert-only: an id seen twice is a no-op.
///
/// `rating` is load-bearing and always in 1..=5; a block without a parsable
/// rating or site-assigned id never becomes a `Review`.
#[derive(Debug, Clone, Serialize)]
pub struct Review {
    pub id: String,
    pub title: Option<String>,
    pub rating: u8,
    pub date: Option<String>,
    pub full: Option<String>,
    pub attr_id: i64,
    pub user_profile: Option<String>,
}

/// A reviewer profile, keyed by its relative profile URL (the only stable
/// identifier the markup exposes). First write wins.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub profile: String,
    pub location: Option<String>,
    pub contributions: Option<u32>,
    pub helpful_votes: Option<u32>,
}
