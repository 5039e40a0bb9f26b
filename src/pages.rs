use scraper::Html;

use crate::error::ScrapeError;
use crate::parser::SiteAdapter;

/// Listing pages advance in steps of 30 results per page.
pub const LISTING_PAGE_STEP: u32 = 30;

/// Reviews per review page. The site has shipped both 5 and 10 across
/// markup revisions; every division by page size goes through this constant.
pub const REVIEWS_PER_PAGE: u32 = 5;

/// The two paginated surfaces the site exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Listing,
    Reviews,
}

/// Extract the total page count from a rendered page.
///
/// Listing pages carry the count directly in the pagination control (last
/// leaf of the block); review pages only advertise the total review count,
/// which is converted via [`REVIEWS_PER_PAGE`] with a ceiling. Thousand
/// separators are stripped in both paths. An absent anchor is an error here:
/// whether "one page" is a safe assumption is the caller's decision.
pub fn resolve_page_count(
    doc: &Html,
    kind: PageKind,
    site: &dyn SiteAdapter,
) -> Result<u32, ScrapeError> {
    match kind {
        PageKind::Listing => {
            let label = site
                .listing_page_count(doc)
                .ok_or_else(|| ScrapeError::anchor("pagination control"))?;
            parse_count("page count", &label)
        }
        PageKind::Reviews => {
            let label = site
                .review_count(doc)
                .ok_or_else(|| ScrapeError::anchor("review counter"))?;
            let total = parse_count("review count", &label)?;
            Ok(total.div_ceil(REVIEWS_PER_PAGE))
        }
    }
}

fn parse_count(field: &'static str, label: &str) -> Result<u32, ScrapeError> {
    label
        .trim()
        .replace(',', "")
        .parse()
        .map_err(|_| ScrapeError::malformed(field, label))
}

/// Generate the URL for every page, in page order.
///
/// Page 0 is always the bare URL; later pages splice an offset token after
/// the kind's path marker (`-Activities-oa30-…`, `-Reviews-or5-…`). The
/// asymmetry is a site convention, not an optimization. A URL without the
/// kind's marker cannot be paginated and is rejected.
pub fn generate_links(count: u32, kind: PageKind, url: &str) -> Result<Vec<String>, ScrapeError> {
    let (marker, token, step) = match kind {
        PageKind::Listing => ("-Activities", "oa", LISTING_PAGE_STEP),
        PageKind::Reviews => ("-Reviews", "or", REVIEWS_PER_PAGE),
    };
    let splice = url
        .find(marker)
        .map(|pos| pos + marker.len())
        .ok_or_else(|| ScrapeError::InvalidTemplate {
            kind: match kind {
                PageKind::Listing => "listing",
                PageKind::Reviews => "reviews",
            },
            url: url.to_string(),
            marker,
        })?;

    Ok((0..count)
        .map(|i| {
            if i == 0 {
                url.to_string()
            } else {
                format!("{}-{}{}{}", &url[..splice], token, i * step, &url[splice..])
            }
        })
        .collect())
}

/// First listing page for a place: every other listing URL derives from it.
pub fn listing_entry_url(base_url: &str, place_id: u64) -> String {
    format!("{base_url}/Attractions-g{place_id}-Activities-a_allAttractions.true")
}

/// Resolve a stored relative attraction URL against the site base.
pub fn absolute_url(base_url: &str, relative: &str) -> Result<String, ScrapeError> {
    let base = url::Url::parse(base_url)
        .map_err(|e| ScrapeError::malformed("base url", &e.to_string()))?;
    let joined = base
        .join(relative)
        .map_err(|e| ScrapeError::malformed("attraction url", &e.to_string()))?;
    Ok(joined.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::CurrentMarkup;

    #[test]
    fn listing_links_have_offsets_after_page_zero() {
        let entry = listing_entry_url("https://www.tripadvisor.com", 186338);
        let links = generate_links(3, PageKind::Listing, &entry).unwrap();
        assert_eq!(links.len(), 3);
        assert_eq!(links[0], entry);
        assert!(!links[0].contains("-oa"));
        assert!(links[1].contains("-Activities-oa30-"));
        assert!(links[2].contains("-Activities-oa60-"));
    }

    #[test]
    fn review_links_step_by_page_size() {
        let url = "https://www.tripadvisor.com/Attraction_Review-g1-d2-Reviews-Spot.html";
        let links = generate_links(4, PageKind::Reviews, url).unwrap();
        assert_eq!(links.len(), 4);
        assert_eq!(links[0], url);
        for (i, link) in links.iter().enumerate().skip(1) {
            assert!(
                link.contains(&format!("-Reviews-or{}-", i as u32 * REVIEWS_PER_PAGE)),
                "page {i}: {link}"
            );
        }
    }

    #[test]
    fn single_page_is_just_the_bare_url() {
        let url = "https://t.example/Attraction_Review-g1-d2-Reviews-Spot.html";
        let links = generate_links(1, PageKind::Reviews, url).unwrap();
        assert_eq!(links, vec![url.to_string()]);
    }

    #[test]
    fn missing_reviews_marker_is_rejected() {
        let err = generate_links(2, PageKind::Reviews, "https://t.example/Tourism-g1-d2.html")
            .unwrap_err();
        assert!(matches!(err, ScrapeError::InvalidTemplate { marker: "-Reviews", .. }));
    }

    #[test]
    fn relative_urls_resolve_against_base() {
        let url = absolute_url(
            "https://www.tripadvisor.com",
            "/Attraction_Review-g1-d2-Reviews-Spot.html",
        )
        .unwrap();
        assert_eq!(
            url,
            "https://www.tripadvisor.com/Attraction_Review-g1-d2-Reviews-Spot.html"
        );
        assert!(absolute_url("not a base", "/x").is_err());
    }

    #[test]
    fn listing_count_from_pagination_control() {
        let html = r#"<div class="pageNumbers">
            <a class="pageNum">1</a><a class="pageNum">2</a><a class="pageNum">209</a>
        </div>"#;
        let doc = Html::parse_document(html);
        let n = resolve_page_count(&doc, PageKind::Listing, &CurrentMarkup).unwrap();
        assert_eq!(n, 209);
    }

    #[test]
    fn listing_count_missing_control_is_an_error() {
        let doc = Html::parse_document("<html><body></body></html>");
        let err = resolve_page_count(&doc, PageKind::Listing, &CurrentMarkup).unwrap_err();
        assert!(matches!(err, ScrapeError::AnchorNotFound { .. }));
    }

    #[test]
    fn review_count_divides_into_pages_with_ceiling() {
        let html = r#"<span class="_1yuvE2vR">12,345</span>"#;
        let doc = Html::parse_document(html);
        let n = resolve_page_count(&doc, PageKind::Reviews, &CurrentMarkup).unwrap();
        assert_eq!(n, 2469);
    }

    #[test]
    fn review_count_partial_last_page() {
        let html = r#"<span class="_1yuvE2vR">7</span>"#;
        let doc = Html::parse_document(html);
        let n = resolve_page_count(&doc, PageKind::Reviews, &CurrentMarkup).unwrap();
        assert_eq!(n, 2);
    }

    #[test]
    fn unparsable_count_is_malformed() {
        let html = r#"<span class="_1yuvE2vR">lots</span>"#;
        let doc = Html::parse_document(html);
        let err = resolve_page_count(&doc, PageKind::Reviews, &CurrentMarkup).unwrap_err();
        assert!(matches!(err, ScrapeError::MalformedField { .. }));
    }
}
