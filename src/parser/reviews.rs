use scraper::Html;

use crate::error::FieldWarning;
use crate::records::{Review, User};

use super::{decode_date, decode_rating, PageContext, SiteAdapter};

/// Parse every review block on one fetched page.
///
/// Field extraction is best-effort: each miss becomes a [`FieldWarning`] and
/// the record keeps a `None`. Only the two load-bearing fields void a block —
/// a review without a site id or a parsable 1..=5 rating cannot be persisted.
/// A page with no blocks at all yields a single page-level warning.
pub fn extract_reviews(
    doc: &Html,
    site: &dyn SiteAdapter,
    attr_id: i64,
    ctx: &PageContext<'_>,
) -> (Vec<(Review, Option<User>)>, Vec<FieldWarning>) {
    let blocks = site.review_blocks(doc);
    let mut out = Vec::with_capacity(blocks.len());
    let mut warnings = Vec::new();

    if blocks.is_empty() {
        warnings.push(FieldWarning::page_level("reviews", ctx.page, ctx.url));
        return (out, warnings);
    }

    for (idx, block) in blocks.into_iter().enumerate() {
        let id = match site.review_id(block) {
            Some(id) => id,
            None => {
                warnings.push(FieldWarning::new("review id", idx, ctx.page, ctx.url));
                continue;
            }
        };
        let rating = match site.rating_token(block).and_then(|t| decode_rating(&t)) {
            Some(r) => r,
            None => {
                warnings.push(FieldWarning::new("rating", idx, ctx.page, ctx.url));
                continue;
            }
        };

        let title = site.review_title(block);
        if title.is_none() {
            warnings.push(FieldWarning::new("title", idx, ctx.page, ctx.url));
        }

        let full = site.review_body(block).map(|t| strip_truncation(&t));
        if full.is_none() {
            warnings.push(FieldWarning::new("review text", idx, ctx.page, ctx.url));
        }

        let date = site.review_date_raw(block).and_then(|raw| decode_date(&raw));
        if date.is_none() {
            warnings.push(FieldWarning::new("date", idx, ctx.page, ctx.url));
        }

        let profile = site.reviewer_profile(block);
        if profile.is_none() {
            warnings.push(FieldWarning::new("user profile", idx, ctx.page, ctx.url));
        }

        let location = site.reviewer_location(block);
        if location.is_none() {
            warnings.push(FieldWarning::new("user location", idx, ctx.page, ctx.url));
        }

        let stats = site.reviewer_stats(block);
        let contributions = stats.first().and_then(|s| parse_count(s));
        if contributions.is_none() {
            warnings.push(FieldWarning::new(
                "user contributions",
                idx,
                ctx.page,
                ctx.url,
            ));
        }
        let helpful_votes = stats.get(1).and_then(|s| parse_count(s));
        if helpful_votes.is_none() {
            warnings.push(FieldWarning::new("helpful votes", idx, ctx.page, ctx.url));
        }

        let user = profile.clone().map(|profile| User {
            profile,
            location,
            contributions,
            helpful_votes,
        });

        let review = Review {
            id,
            title,
            rating,
            date,
            full,
            attr_id,
            user_profile: profile,
        };
        out.push((review, user));
    }

    (out, warnings)
}

fn parse_count(s: &str) -> Option<u32> {
    s.trim().replace(',', "").parse().ok()
}

/// The site truncates long bodies with a mojibake ellipsis (`â€¦`); strip it
/// so stored text ends cleanly.
fn strip_truncation(text: &str) -> String {
    text.replace("â€¦", "")
}
