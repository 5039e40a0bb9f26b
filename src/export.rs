use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rusqlite::Connection;
use scraper::Html;
use serde::Serialize;
use tracing::{info, warn};

use crate::browser::DetailSource;
use crate::db::{self, TypeFilter, WorkItem};
use crate::error::ScrapeError;
use crate::fetch::PageSource;
use crate::orchestrator::Pacing;
use crate::pages::{self, PageKind};
use crate::parser::{self, CurrentMarkup, PageContext};
use crate::records::Review;

/// The on-disk shape of one exported attraction: its resolved detail fields
/// with the full review list embedded.
#[derive(Debug, Serialize)]
struct AttractionDocument {
    id: i64,
    url: String,
    lat: Option<f64>,
    lon: Option<f64>,
    num_reviews: Option<BTreeMap<String, u32>>,
    exported_at: String,
    reviews: Vec<Review>,
}

#[derive(Debug, Default)]
pub struct ExportStats {
    pub written: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// File-based alternate output: one JSON document per attraction instead of
/// rows in the store. Documents are keyed by (place id, queue index); an
/// existing file short-circuits that attraction entirely, which makes
/// interrupted batch runs cheap to resume.
pub struct Exporter<'a, S, D> {
    conn: &'a Connection,
    source: S,
    details: &'a mut D,
    site: CurrentMarkup,
    base_url: String,
    out_dir: PathBuf,
    pacing: Pacing,
}

impl<'a, S: PageSource, D: DetailSource> Exporter<'a, S, D> {
    pub fn new(
        conn: &'a Connection,
        source: S,
        details: &'a mut D,
        base_url: &str,
        out_dir: &Path,
        pacing: Pacing,
    ) -> Self {
        Self {
            conn,
            source,
            details,
            site: CurrentMarkup::new(),
            base_url: base_url.to_string(),
            out_dir: out_dir.to_path_buf(),
            pacing,
        }
    }

    pub async fn run(
        &mut self,
        place_id: u64,
        filter: &TypeFilter,
    ) -> Result<ExportStats, ScrapeError> {
        let queue = db::pending_attractions(self.conn, filter)?;
        let dir = self.out_dir.join(place_id.to_string());
        std::fs::create_dir_all(&dir).map_err(|e| ScrapeError::io(dir.display(), e))?;

        let mut stats = ExportStats::default();
        for (index, item) in queue.iter().enumerate() {
            let path = dir.join(format!("{index}.json"));
            if path.exists() {
                stats.skipped += 1;
                continue;
            }
            match self.export_attraction(item, &path).await {
                Ok(()) => stats.written += 1,
                Err(e) => {
                    warn!("attraction {} not exported: {e}", item.id);
                    stats.failed += 1;
                }
            }
        }
        Ok(stats)
    }

    async fn export_attraction(&mut self, item: &WorkItem, path: &Path) -> Result<(), ScrapeError> {
        let url = pages::absolute_url(&self.base_url, &item.url)?;
        let details = self.details.attraction_details(&url).await?;

        let count = details.pages.unwrap_or(1);
        let links = pages::generate_links(count, PageKind::Reviews, &url)?;
        info!("attraction {}: exporting {} review pages", item.id, count);

        let mut reviews = Vec::new();
        for (page, link) in links.iter().enumerate() {
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
            reviews.extend(items.into_iter().map(|(review, _)| review));

            if page + 1 < links.len() {
                self.pacing.pause().await;
            }
        }

        let (lat, lon) = details.coords.map_or((None, None), |(lat, lon)| {
            (Some(lat), Some(lon))
        });
        let document = AttractionDocument {
            id: item.id,
            url,
            lat,
            lon,
            num_reviews: details.num_reviews,
            exported_at: chrono::Utc::now().to_rfc3339(),
            reviews,
        };
        let json = serde_json::to_string_pretty(&document)
            .map_err(|e| ScrapeError::malformed("export document", &e.to_string()))?;
        std::fs::write(path, json).map_err(|e| ScrapeError::io(path.display(), e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::orchestrator::tests::{review_block, review_page, StubDetails, StubSource};
    use crate::records::Attraction;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        conn
    }

    #[tokio::test]
    async fn writes_one_document_per_attraction_and_skips_existing() {
        let conn = test_conn();
        let rel = "/Attraction_Review-g9-d500-Reviews-Keep.html";
        let mut a = Attraction::from_url(rel).unwrap();
        a.attr_type = Some("Museums".to_string());
        db::insert_attraction(&conn, &a).unwrap();

        let base = "https://t.example";
        let url = format!("{base}{rel}");
        let pages = HashMap::from([(
            url,
            review_page(&[review_block("e1", 5, true), review_block("e2", 4, true)]),
        )]);

        let out = tempfile::tempdir().unwrap();
        let mut details = StubDetails { pages: Some(1) };
        let mut exporter = Exporter::new(
            &conn,
            StubSource { pages },
            &mut details,
            base,
            out.path(),
            Pacing::none(),
        );

        let stats = exporter.run(9, &TypeFilter::All).await.unwrap();
        assert_eq!(stats.written, 1);
        assert_eq!(stats.skipped, 0);

        let path = out.path().join("9").join("0.json");
        let raw = std::fs::read_to_string(&path).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(doc["id"], 500);
        assert_eq!(doc["reviews"].as_array().unwrap().len(), 2);
        assert_eq!(doc["reviews"][0]["rating"], 5);

        // Same (place id, index) pair again: the file short-circuits.
        let stats = exporter.run(9, &TypeFilter::All).await.unwrap();
        assert_eq!(stats.written, 0);
        assert_eq!(stats.skipped, 1);
    }
}
