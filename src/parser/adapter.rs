use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

macro_rules! selector {
    ($name:ident, $css:literal) => {
        static $name: LazyLock<Selector> = LazyLock::new(|| Selector::parse($css).unwrap());
    };
}

// Listing pages
selector!(ATTRACTION_BLOCK, "div._25PvF8uO._2X44Y8hm");
selector!(ATTRACTION_LINK, "div._2pZeTjmb a");
selector!(ATTRACTION_NAME, "a._1QKQOve4");
selector!(ATTRACTION_CATEGORY, "span._21qUqkJx");
selector!(PAGE_NUMBERS, "div.pageNumbers");

// Review pages
selector!(REVIEW_BLOCK, "div.Dq9MAugU.T870kzTX.LnVzGwUB");
selector!(REVIEW_PERMALINK, "[data-reviewid]");
selector!(REVIEW_TITLE, "div.glasR4aX");
selector!(REVIEW_BODY, "div.cPQsENeY");
selector!(REVIEW_DATE, "div._2fxQ4TOx");
selector!(RATING_BUBBLE, "span.ui_bubble_rating");
selector!(PROFILE_LINK, "a.ui_social_avatar");
selector!(USER_LOCATION, "span.default._3J15flPT.small");
selector!(USER_STAT, "span._1fk70GUn");
selector!(REVIEW_COUNT, "span._1yuvE2vR");
selector!(ANY_SPAN, "span");

/// Semantic lookups over one site markup revision.
///
/// Extraction code asks for "the rating element" or "the permalink of this
/// block" and never touches a CSS class itself; when the site ships new
/// markup, a second implementation of this trait is the whole change.
pub trait SiteAdapter {
    fn attraction_blocks<'a>(&self, doc: &'a Html) -> Vec<ElementRef<'a>>;
    fn attraction_url(&self, block: ElementRef<'_>) -> Option<String>;
    fn attraction_name(&self, block: ElementRef<'_>) -> Option<String>;
    fn attraction_category(&self, block: ElementRef<'_>) -> Option<String>;

    /// Text of the last leaf of the pagination control on a listing page.
    fn listing_page_count(&self, doc: &Html) -> Option<String>;

    fn review_blocks<'a>(&self, doc: &'a Html) -> Vec<ElementRef<'a>>;
    /// The site-assigned review id carried on the block's permalink node.
    fn review_id(&self, block: ElementRef<'_>) -> Option<String>;
    fn review_title(&self, block: ElementRef<'_>) -> Option<String>;
    /// The class-like token encoding the rating, e.g. `bubble_40`.
    fn rating_token(&self, block: ElementRef<'_>) -> Option<String>;
    fn review_body(&self, block: ElementRef<'_>) -> Option<String>;
    /// Raw text of the date wrapper; decoding is [`crate::parser::decode_date`]'s job.
    fn review_date_raw(&self, block: ElementRef<'_>) -> Option<String>;
    fn reviewer_profile(&self, block: ElementRef<'_>) -> Option<String>;
    fn reviewer_location(&self, block: ElementRef<'_>) -> Option<String>;
    /// Contribution-style counters in document order (contributions first,
    /// then helpful votes).
    fn reviewer_stats(&self, block: ElementRef<'_>) -> Vec<String>;

    /// Text of the labeled total-review counter on a review page.
    fn review_count(&self, doc: &Html) -> Option<String>;
}

/// The markup revision currently served by the site.
///
/// Class fingerprints are brittle by nature; they all live here and nowhere
/// else. Where the markup offers a stable hook (`data-reviewid`, the
/// `ui_bubble_rating` and `ui_social_avatar` widget classes) it is preferred
/// over generated class names.
#[derive(Debug, Default)]
pub struct CurrentMarkup;

impl CurrentMarkup {
    pub fn new() -> Self {
        Self
    }
}

fn text_of(el: ElementRef<'_>) -> Option<String> {
    let text: String = el.text().collect();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

impl SiteAdapter for CurrentMarkup {
    fn attraction_blocks<'a>(&self, doc: &'a Html) -> Vec<ElementRef<'a>> {
        doc.select(&ATTRACTION_BLOCK).collect()
    }

    fn attraction_url(&self, block: ElementRef<'_>) -> Option<String> {
        block
            .select(&ATTRACTION_LINK)
            .next()?
            .value()
            .attr("href")
            .map(str::to_string)
    }

    fn attraction_name(&self, block: ElementRef<'_>) -> Option<String> {
        block.select(&ATTRACTION_NAME).next().and_then(text_of)
    }

    fn attraction_category(&self, block: ElementRef<'_>) -> Option<String> {
        block.select(&ATTRACTION_CATEGORY).next().and_then(text_of)
    }

    fn listing_page_count(&self, doc: &Html) -> Option<String> {
        let container = doc.select(&PAGE_NUMBERS).next()?;
        let last = container
            .descendants()
            .filter_map(ElementRef::wrap)
            .last()
            .unwrap_or(container);
        text_of(last)
    }

    fn review_blocks<'a>(&self, doc: &'a Html) -> Vec<ElementRef<'a>> {
        doc.select(&REVIEW_BLOCK).collect()
    }

    fn review_id(&self, block: ElementRef<'_>) -> Option<String> {
        block
            .select(&REVIEW_PERMALINK)
            .next()?
            .value()
            .attr("data-reviewid")
            .map(str::to_string)
    }

    fn review_title(&self, block: ElementRef<'_>) -> Option<String> {
        block.select(&REVIEW_TITLE).next().and_then(text_of)
    }

    fn rating_token(&self, block: ElementRef<'_>) -> Option<String> {
        block
            .select(&RATING_BUBBLE)
            .next()?
            .value()
            .classes()
            .find(|c| c.starts_with("bubble_"))
            .map(str::to_string)
    }

    fn review_body(&self, block: ElementRef<'_>) -> Option<String> {
        block.select(&REVIEW_BODY).next().and_then(text_of)
    }

    fn review_date_raw(&self, block: ElementRef<'_>) -> Option<String> {
        if let Some(raw) = block.select(&REVIEW_DATE).next().and_then(text_of) {
            return Some(raw);
        }
        // Newer review cards drop the header wrapper and carry a bare
        // "Date of experience: …" span instead.
        block
            .select(&ANY_SPAN)
            .filter_map(text_of)
            .find(|t| t.starts_with("Date of experience:"))
    }

    fn reviewer_profile(&self, block: ElementRef<'_>) -> Option<String> {
        block
            .select(&PROFILE_LINK)
            .next()?
            .value()
            .attr("href")
            .map(str::to_string)
    }

    fn reviewer_location(&self, block: ElementRef<'_>) -> Option<String> {
        block.select(&USER_LOCATION).next().and_then(text_of)
    }

    fn reviewer_stats(&self, block: ElementRef<'_>) -> Vec<String> {
        block.select(&USER_STAT).filter_map(text_of).collect()
    }

    fn review_count(&self, doc: &Html) -> Option<String> {
        doc.select(&REVIEW_COUNT).next().and_then(text_of)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_last_leaf() {
        let html = r#"<div class="pageNumbers">
            <a class="pageNum">1</a><a class="pageNum">2</a><a class="pageNum">17</a>
        </div>"#;
        let doc = Html::parse_document(html);
        assert_eq!(
            CurrentMarkup.listing_page_count(&doc).as_deref(),
            Some("17")
        );
    }

    #[test]
    fn pagination_absent() {
        let doc = Html::parse_document("<div>no pager here</div>");
        assert_eq!(CurrentMarkup.listing_page_count(&doc), None);
    }

    #[test]
    fn rating_token_from_widget_classes() {
        let html = r#"<div class="Dq9MAugU T870kzTX LnVzGwUB">
            <span class="ui_bubble_rating bubble_30"></span>
        </div>"#;
        let doc = Html::parse_document(html);
        let block = CurrentMarkup.review_blocks(&doc)[0];
        assert_eq!(
            CurrentMarkup.rating_token(block).as_deref(),
            Some("bubble_30")
        );
    }

    #[test]
    fn date_of_experience_fallback() {
        let html = r#"<div class="Dq9MAugU T870kzTX LnVzGwUB">
            <span>Date of experience: July 2019</span>
        </div>"#;
        let doc = Html::parse_document(html);
        let block = CurrentMarkup.review_blocks(&doc)[0];
        assert_eq!(
            CurrentMarkup.review_date_raw(block).as_deref(),
            Some("Date of experience: July 2019")
        );
    }
}
