use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use scraper::Html;
use tracing::{info, warn};

use crate::browser::DetailSource;
use crate::db::{self, TypeFilter, WorkItem};
use crate::error::ScrapeError;
use crate::fetch::PageSource;
use crate::pages::{self, PageKind};
use crate::parser::{self, CurrentMarkup, PageContext};
use crate::records::Attraction;

/// Delay between page fetches: a fixed base plus uniform jitter, so request
/// rate stays bounded without a recognizable cadence. Injectable so tests
/// run with zero delay.
#[derive(Debug, Clone)]
pub struct Pacing {
    base: Duration,
    jitter: Duration,
}

impl Pacing {
    pub fn new(base: Duration, jitter: Duration) -> Self {
        Self { base, jitter }
    }

    /// The site's tolerated request rate: 1.3s plus up to a second.
    pub fn site_default() -> Self {
        Self::new(Duration::from_millis(1300), Duration::from_secs(1))
    }

    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub async fn pause(&self) {
        let delay = self.base + self.jitter.mul_f64(fastrand::f64());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Outcome of one run, summarized by the CLI when it finishes.
#[derive(Debug, Default)]
pub struct RunStats {
    pub attractions: usize,
    pub ok: usize,
    pub failed: usize,
    pub reviews: usize,
    pub users: usize,
    pub warnings: usize,
}

fn progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")
            .unwrap()
            .progress_chars("=> "),
    );
    pb
}

// ── Listing scrape ──

/// Walks every listing page for a place and records each attraction card.
pub struct AttractionScraper<'a, S> {
    conn: &'a Connection,
    source: S,
    site: CurrentMarkup,
    base_url: String,
    place_id: u64,
    pacing: Pacing,
}

impl<'a, S: PageSource> AttractionScraper<'a, S> {
    pub fn new(
        conn: &'a Connection,
        source: S,
        base_url: &str,
        place_id: u64,
        pacing: Pacing,
    ) -> Self {
        Self {
            conn,
            source,
            site: CurrentMarkup::new(),
            base_url: base_url.to_string(),
            place_id,
            pacing,
        }
    }

    pub async fn run(&self) -> Result<RunStats, ScrapeError> {
        let entry = pages::listing_entry_url(&self.base_url, self.place_id);
        let html = self.source.fetch(&entry).await?;
        let count = {
            let doc = Html::parse_document(&html);
            pages::resolve_page_count(&doc, PageKind::Listing, &self.site)?
        };
        let links = pages::generate_links(count, PageKind::Listing, &entry)?;
        info!("place {}: {} listing pages", self.place_id, count);

        let mut stats = RunStats::default();
        let pb = progress_bar(links.len() as u64);

        for (page, link) in links.iter().enumerate() {
            let html = match self.source.fetch(link).await {
                Ok(html) => html,
                Err(e) => {
                    warn!("listing page {page} failed, skipping: {e}");
                    stats.failed += 1;
                    pb.inc(1);
                    continue;
                }
            };
            let ctx = PageContext {
                page: page as u32,
                url: link,
            };
            let (attractions, warnings) = {
                let doc = Html::parse_document(&html);
                parser::attractions::extract_attractions(&doc, &self.site, &ctx)
            };
            for w in &warnings {
                warn!("{w}");
            }
            stats.warnings += warnings.len();

            for attraction in &attractions {
                if db::insert_attraction(self.conn, attraction)? {
                    stats.attractions += 1;
                }
            }
            stats.ok += 1;
            pb.inc(1);

            if page + 1 < links.len() {
                self.pacing.pause().await;
            }
        }

        pb.finish_and_clear();
        Ok(stats)
    }
}

// ── Review scrape ──

/// Drains the work queue of unscraped attractions: detail resolve, page
/// enumeration, page-by-page extraction, then the scraped flag.
pub struct ReviewScraper<'a, S, D> {
    conn: &'a Connection,
    source: S,
    details: &'a mut D,
    site: CurrentMarkup,
    base_url: String,
    pacing: Pacing,
}

impl<'a, S: PageSource, D: DetailSource> ReviewScraper<'a, S, D> {
    pub fn new(
        conn: &'a Connection,
        source: S,
        details: &'a mut D,
        base_url: &str,
        pacing: Pacing,
    ) -> Self {
        Self {
            conn,
            source,
            details,
            site: CurrentMarkup::new(),
            base_url: base_url.to_string(),
            pacing,
        }
    }

    /// Process every queued attraction; a failure aborts that attraction
    /// only and the queue moves on.
    pub async fn run(
        &mut self,
        filter: &TypeFilter,
        bounds: Option<(usize, usize)>,
    ) -> Result<RunStats, ScrapeError> {
        let queue = bounded(db::pending_attractions(self.conn, filter)?, bounds);
        info!("{} attractions queued", queue.len());

        let mut stats = RunStats::default();
        let pb = progress_bar(queue.len() as u64);

        for item in &queue {
            stats.attractions += 1;
            match self.scrape_attraction(item, &mut stats).await {
                Ok(()) => stats.ok += 1,
                Err(e) => {
                    warn!("attraction {} aborted: {e}", item.id);
                    stats.failed += 1;
                }
            }
            pb.inc(1);
        }

        pb.finish_and_clear();
        Ok(stats)
    }

    async fn scrape_attraction(
        &mut self,
        item: &WorkItem,
        stats: &mut RunStats,
    ) -> Result<(), ScrapeError> {
        let url = pages::absolute_url(&self.base_url, &item.url)?;

        let details = self.details.attraction_details(&url).await?;
        let mut attraction = Attraction::from_url(&item.url)?;
        attraction.lat = details.coords.map(|c| c.0);
        attraction.lon = details.coords.map(|c| c.1);
        attraction.num_reviews = details.num_reviews;
        db::update_attraction_details(self.conn, &attraction)?;

        let count = match details.pages {
            Some(n) => n,
            None => self.page_count_fallback(&url).await?,
        };
        let links = pages::generate_links(count, PageKind::Reviews, &url)?;
        info!("attraction {}: {} review pages", item.id, count);

        for (page, link) in links.iter().enumerate() {
            info!("scraping {link}");
            let html = self.source.fetch(link).await?;
            let ctx = PageContext {
                page: page as u32,
                url: link,
            };
            let (items, warnings) = {
                let doc = Html::parse_document(&html);
                parser::reviews::extract_reviews(&doc, &self.site, item.id, &ctx)
            };
            for w in &warnings {
                warn!("attraction {}: {w}", item.id);
            }
            stats.warnings += warnings.len();

            for (review, user) in &items {
                if let Some(user) = user {
                    if db::insert_user(self.conn, user)? {
                        stats.users += 1;
                    }
                }
                if db::insert_review(self.conn, review)? {
                    stats.reviews += 1;
                }
            }

            if page + 1 < links.len() {
                self.pacing.pause().await;
            }
        }

        db::set_scraped(self.conn, item.id, true)?;
        Ok(())
    }

    /// Pagination never rendered on the detail page. Fall back to the review
    /// counter on the plain-fetched page; if that anchor is gone too, assume
    /// a single page (attractions with few reviews render no pagination).
    async fn page_count_fallback(&self, url: &str) -> Result<u32, ScrapeError> {
        let html = self.source.fetch(url).await?;
        let doc = Html::parse_document(&html);
        match pages::resolve_page_count(&doc, PageKind::Reviews, &self.site) {
            Ok(n) => Ok(n.max(1)),
            Err(e) => {
                warn!("page count fallback for {url}: {e}; assuming 1 page");
                Ok(1)
            }
        }
    }
}

fn bounded(queue: Vec<WorkItem>, bounds: Option<(usize, usize)>) -> Vec<WorkItem> {
    match bounds {
        Some((start, end)) => {
            let start = start.min(queue.len());
            let end = end.min(queue.len());
            queue[start..end.max(start)].to_vec()
        }
        None => queue,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;

    use super::*;
    use crate::browser::AttractionDetails;
    use crate::error::ScrapeError;
    use crate::records::Attraction;

    /// Serves canned HTML; unknown URLs behave like network failures.
    pub(crate) struct StubSource {
        pub pages: HashMap<String, String>,
    }

    #[async_trait]
    impl PageSource for StubSource {
        async fn fetch(&self, url: &str) -> Result<String, ScrapeError> {
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| ScrapeError::fetch(url, "connection refused"))
        }
    }

    pub(crate) struct StubDetails {
        pub pages: Option<u32>,
    }

    #[async_trait]
    impl DetailSource for StubDetails {
        async fn attraction_details(
            &mut self,
            _url: &str,
        ) -> Result<AttractionDetails, ScrapeError> {
            Ok(AttractionDetails {
                coords: Some((51.5081, -0.0759)),
                num_reviews: Some([("English".to_string(), 8)].into()),
                pages: self.pages,
            })
        }
    }

    pub(crate) fn review_block(id: &str, rating: u8, with_date: bool) -> String {
        format!(
            r#"<div class="Dq9MAugU T870kzTX LnVzGwUB">
                 <div class="oETBfkHU" data-reviewid="{id}"></div>
                 {date}
                 <a class="_3x5_awTA ui_social_avatar inline" href="/Profile/user{id}"></a>
                 <span class="default _3J15flPT small">Lisbon, Portugal</span>
                 <span class="_1fk70GUn">12</span>
                 <span class="_1fk70GUn">3</span>
                 <div class="glasR4aX">Title {id}</div>
                 <span class="ui_bubble_rating bubble_{rating}0"></span>
                 <div class="cPQsENeY">Body of review {id}.</div>
               </div>"#,
            id = id,
            rating = rating,
            date = if with_date {
                r#"<div class="_2fxQ4TOx">Pat K wrote a review Jun 2021</div>"#.to_string()
            } else {
                String::new()
            },
        )
    }

    pub(crate) fn review_page(blocks: &[String]) -> String {
        format!("<html><body>{}</body></html>", blocks.join("\n"))
    }

    fn seed_attraction(conn: &Connection, d: i64) -> String {
        let rel = format!("/Attraction_Review-g1-d{d}-Reviews-Spot_{d}.html");
        let mut a = Attraction::from_url(&rel).unwrap();
        a.attr_type = Some("Sights & Landmarks".to_string());
        db::insert_attraction(conn, &a).unwrap();
        rel
    }

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        conn
    }

    #[tokio::test]
    async fn two_pages_eight_reviews_one_missing_date() {
        let conn = test_conn();
        let rel = seed_attraction(&conn, 2);
        let base = "https://t.example";
        let url = format!("{base}{rel}");

        let page1: Vec<String> = (1..=5).map(|i| review_block(&format!("a{i}"), 5, true)).collect();
        let mut page2: Vec<String> =
            (6..=7).map(|i| review_block(&format!("a{i}"), 3, true)).collect();
        page2.push(review_block("a8", 4, false)); // no date header

        let pages = HashMap::from([
            (url.clone(), review_page(&page1)),
            (
                url.replace("-Reviews-", "-Reviews-or5-"),
                review_page(&page2),
            ),
        ]);

        let mut details = StubDetails { pages: Some(2) };
        let mut scraper = ReviewScraper::new(
            &conn,
            StubSource { pages },
            &mut details,
            base,
            Pacing::none(),
        );
        let stats = scraper.run(&TypeFilter::All, None).await.unwrap();

        assert_eq!(stats.ok, 1);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.reviews, 8);
        assert_eq!(stats.warnings, 1);

        let reviews: usize = conn
            .query_row("SELECT COUNT(*) FROM reviews", [], |r| r.get(0))
            .unwrap();
        assert_eq!(reviews, 8);
        let dateless: usize = conn
            .query_row("SELECT COUNT(*) FROM reviews WHERE date IS NULL", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(dateless, 1);

        let scraped: bool = conn
            .query_row("SELECT scraped FROM attractions WHERE id = 2", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert!(scraped);

        let (lat, counts): (f64, String) = conn
            .query_row(
                "SELECT lat, num_reviews FROM attractions WHERE id = 2",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert!((lat - 51.5081).abs() < 1e-9);
        assert!(counts.contains("English"));
    }

    #[tokio::test]
    async fn failed_page_aborts_attraction_but_not_run() {
        let conn = test_conn();
        let rel_bad = seed_attraction(&conn, 9); // id DESC: processed first
        let rel_ok = seed_attraction(&conn, 5);
        let base = "https://t.example";

        // Both attractions report two pages; attraction 9 is missing its
        // second page while attraction 5 has both.
        let bad_url = format!("{base}{rel_bad}");
        let ok_url = format!("{base}{rel_ok}");
        let pages = HashMap::from([
            (bad_url, review_page(&[review_block("b1", 5, true)])),
            (ok_url.clone(), review_page(&[review_block("c1", 4, true)])),
            (
                ok_url.replace("-Reviews-", "-Reviews-or5-"),
                review_page(&[review_block("c2", 3, true)]),
            ),
        ]);

        let mut details = StubDetails { pages: Some(2) };
        let mut scraper = ReviewScraper::new(
            &conn,
            StubSource { pages },
            &mut details,
            base,
            Pacing::none(),
        );
        let stats = scraper.run(&TypeFilter::All, None).await.unwrap();

        assert_eq!(stats.attractions, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.ok, 1);

        let scraped_bad: bool = conn
            .query_row("SELECT scraped FROM attractions WHERE id = 9", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert!(!scraped_bad, "aborted attraction must stay unscraped");
        let scraped_ok: bool = conn
            .query_row("SELECT scraped FROM attractions WHERE id = 5", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert!(scraped_ok);
    }

    #[tokio::test]
    async fn listing_run_inserts_attraction_cards() {
        let conn = test_conn();
        let base = "https://t.example";
        let entry = pages::listing_entry_url(base, 77);

        let card = |d: i64, name: &str| {
            format!(
                r#"<div class="_25PvF8uO _2X44Y8hm">
                     <div class="_2pZeTjmb">
                       <a href="/Attraction_Review-g77-d{d}-Reviews-{name}.html">x</a>
                     </div>
                     <a class="_1QKQOve4">{name}</a>
                     <span class="_21qUqkJx">Museums</span>
                   </div>"#
            )
        };
        let pager = r#"<div class="pageNumbers"><a class="pageNum">1</a><a class="pageNum">2</a></div>"#;

        let page0 = format!(
            "<html><body>{}{}{}</body></html>",
            card(101, "First"),
            card(102, "Second"),
            pager
        );
        let page1 = format!("<html><body>{}</body></html>", card(103, "Third"));
        let second_url = entry.replace("-Activities-", "-Activities-oa30-");

        let pages = HashMap::from([(entry, page0), (second_url, page1)]);
        let scraper =
            AttractionScraper::new(&conn, StubSource { pages }, base, 77, Pacing::none());
        let stats = scraper.run().await.unwrap();

        assert_eq!(stats.attractions, 3);
        assert_eq!(stats.ok, 2);
        let ids: Vec<i64> = {
            let mut stmt = conn
                .prepare("SELECT id FROM attractions ORDER BY id")
                .unwrap();
            stmt.query_map([], |r| r.get(0))
                .unwrap()
                .collect::<Result<_, _>>()
                .unwrap()
        };
        assert_eq!(ids, vec![101, 102, 103]);
    }

    #[tokio::test]
    async fn bounds_restrict_queue_slice() {
        let conn = test_conn();
        for d in 1..=4 {
            seed_attraction(&conn, d);
        }
        // Queue order is id DESC: [4, 3, 2, 1]; bounds (1, 3) → ids 3 and 2.
        let rel = |d: i64| format!("https://t.example/Attraction_Review-g1-d{d}-Reviews-Spot_{d}.html");
        let pages = HashMap::from([
            (rel(3), review_page(&[review_block("d3", 4, true)])),
            (rel(2), review_page(&[review_block("d2", 4, true)])),
        ]);

        let mut details = StubDetails { pages: Some(1) };
        let mut scraper = ReviewScraper::new(
            &conn,
            StubSource { pages },
            &mut details,
            "https://t.example",
            Pacing::none(),
        );
        let stats = scraper.run(&TypeFilter::All, Some((1, 3))).await.unwrap();

        assert_eq!(stats.attractions, 2);
        assert_eq!(stats.ok, 2);
        let scraped: Vec<i64> = {
            let mut stmt = conn
                .prepare("SELECT id FROM attractions WHERE scraped = 1 ORDER BY id")
                .unwrap();
            stmt.query_map([], |r| r.get(0))
                .unwrap()
                .collect::<Result<_, _>>()
                .unwrap()
        };
        assert_eq!(scraped, vec![2, 3]);
    }
}
