use scraper::Html;

use crate::error::FieldWarning;
use crate::records::Attraction;

use super::{PageContext, SiteAdapter};

/// Parse every attraction card on one listing page.
///
/// The permalink is load-bearing: a card without an href, or with an href the
/// id cannot be derived from, is dropped with a warning. Name and category
/// degrade to `None`.
pub fn extract_attractions(
    doc: &Html,
    site: &dyn SiteAdapter,
    ctx: &PageContext<'_>,
) -> (Vec<Attraction>, Vec<FieldWarning>) {
    let blocks = site.attraction_blocks(doc);
    let mut out = Vec::with_capacity(blocks.len());
    let mut warnings = Vec::new();

    if blocks.is_empty() {
        warnings.push(FieldWarning::page_level("attractions", ctx.page, ctx.url));
        return (out, warnings);
    }

    for (idx, block) in blocks.into_iter().enumerate() {
        let url = match site.attraction_url(block) {
            Some(url) => url,
            None => {
                warnings.push(FieldWarning::new("attraction url", idx, ctx.page, ctx.url));
                continue;
            }
        };
        let mut attraction = match Attraction::from_url(&url) {
            Ok(a) => a,
            Err(_) => {
                warnings.push(FieldWarning::new("attraction id", idx, ctx.page, ctx.url));
                continue;
            }
        };

        attraction.name = site.attraction_name(block);
        if attraction.name.is_none() {
            warnings.push(FieldWarning::new("name", idx, ctx.page, ctx.url));
        }

        attraction.attr_type = site.attraction_category(block);
        if attraction.attr_type.is_none() {
            warnings.push(FieldWarning::new("category", idx, ctx.page, ctx.url));
        }

        out.push(attraction);
    }

    (out, warnings)
}
