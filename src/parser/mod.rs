pub mod adapter;
pub mod attractions;
pub mod reviews;

use std::sync::LazyLock;

use regex::Regex;

pub use adapter::{CurrentMarkup, SiteAdapter};

static WROTE_REVIEW_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r".*wrote a review (.*)").unwrap());

/// Where on the site a page came from; threaded through extraction so every
/// warning can name the page it happened on.
pub struct PageContext<'a> {
    pub page: u32,
    pub url: &'a str,
}

/// Decode a rating from its class-like token, e.g. `bubble_50` → 5.
///
/// The site encodes ratings as tenths in the token suffix. Anything that is
/// not `bubble_<digits>` mapping into 1..=5 is treated as missing.
pub fn decode_rating(token: &str) -> Option<u8> {
    let tenths: u32 = token.strip_prefix("bubble_")?.parse().ok()?;
    let rating = tenths / 10;
    (1..=5).contains(&rating).then_some(rating as u8)
}

/// Decode the free-text review date out of its two known wrappers:
/// `"<name> wrote a review <value>"` and `"Date of experience: <value>"`.
/// The extracted value is stored verbatim; date parsing is downstream's job.
pub fn decode_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if let Some(caps) = WROTE_REVIEW_RE.captures(raw) {
        return Some(caps[1].trim().to_string());
    }
    raw.strip_prefix("Date of experience:")
        .map(|v| v.trim().to_string())
}
