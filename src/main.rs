mod browser;
mod config;
mod db;
mod error;
mod export;
mod fetch;
mod orchestrator;
mod pages;
mod parser;
mod records;

use std::time::Instant;

use clap::{Parser, Subcommand};
use tracing::warn;

use crate::browser::BrowserSession;
use crate::config::Config;
use crate::db::TypeFilter;
use crate::fetch::HttpSource;
use crate::orchestrator::{AttractionScraper, Pacing, ReviewScraper};

#[derive(Parser)]
#[command(name = "tripscrape", about = "Travel-review site scraper")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    Init,
    /// Scrape the attraction listing for a place
    Attractions {
        /// Place id (the -g<digits>- URL segment)
        #[arg(short, long)]
        place: u64,
    },
    /// Scrape reviews for attractions not yet marked scraped
    Reviews {
        /// Restrict to these category labels (repeatable); default is all
        #[arg(short, long)]
        types: Vec<String>,
        /// First queue index to process
        #[arg(long)]
        start: Option<usize>,
        /// Queue index to stop before
        #[arg(long)]
        end: Option<usize>,
    },
    /// Write one JSON document per attraction instead of database rows
    Export {
        /// Place id used to namespace the output directory
        #[arg(short, long)]
        place: u64,
        /// Restrict to these category labels (repeatable); default is all
        #[arg(short, long)]
        types: Vec<String>,
    },
    /// Show scraping statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let cfg = Config::from_env();

    if let Some(dir) = std::path::Path::new(&cfg.db_path).parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }

    let result = match cli.command {
        Commands::Init => {
            let conn = db::connect(&cfg.db_path)?;
            db::init_schema(&conn)?;
            println!("Schema ready at {}", cfg.db_path);
            Ok(())
        }
        Commands::Attractions { place } => {
            let conn = db::connect(&cfg.db_path)?;
            db::init_schema(&conn)?;
            let scraper = AttractionScraper::new(
                &conn,
                HttpSource::new()?,
                &cfg.base_url,
                place,
                Pacing::site_default(),
            );
            let stats = scraper.run().await?;
            println!(
                "Done: {} new attractions over {} pages ({} pages failed, {} warnings).",
                stats.attractions, stats.ok, stats.failed, stats.warnings
            );
            Ok(())
        }
        Commands::Reviews { types, start, end } => {
            let conn = db::connect(&cfg.db_path)?;
            db::init_schema(&conn)?;
            let filter = TypeFilter::from_args(types);
            let bounds = index_bounds(start, end);
            let http = HttpSource::new()?;

            let mut browser = BrowserSession::connect(&cfg.webdriver_url).await?;
            let run = {
                let mut scraper = ReviewScraper::new(
                    &conn,
                    http,
                    &mut browser,
                    &cfg.base_url,
                    Pacing::site_default(),
                );
                scraper.run(&filter, bounds).await
            };
            // The WebDriver session must die even when the run did not.
            if let Err(e) = browser.close().await {
                warn!("webdriver session close failed: {e}");
            }
            let stats = run?;
            println!(
                "Done: {}/{} attractions scraped ({} failed), {} new reviews, {} new users, {} warnings.",
                stats.ok, stats.attractions, stats.failed, stats.reviews, stats.users, stats.warnings
            );
            Ok(())
        }
        Commands::Export { place, types } => {
            let conn = db::connect(&cfg.db_path)?;
            db::init_schema(&conn)?;
            let filter = TypeFilter::from_args(types);
            let http = HttpSource::new()?;

            let mut browser = BrowserSession::connect(&cfg.webdriver_url).await?;
            let run = {
                let mut exporter = export::Exporter::new(
                    &conn,
                    http,
                    &mut browser,
                    &cfg.base_url,
                    &cfg.out_dir,
                    Pacing::site_default(),
                );
                exporter.run(place, &filter).await
            };
            if let Err(e) = browser.close().await {
                warn!("webdriver session close failed: {e}");
            }
            let stats = run?;
            println!(
                "Done: {} documents written, {} skipped (already on disk), {} failed.",
                stats.written, stats.skipped, stats.failed
            );
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect(&cfg.db_path)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Attractions: {}", s.attractions);
            println!("  scraped:   {}", s.scraped);
            println!("  pending:   {}", s.pending);
            println!("Reviews:     {}", s.reviews);
            println!("Users:       {}", s.users);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn index_bounds(start: Option<usize>, end: Option<usize>) -> Option<(usize, usize)> {
    match (start, end) {
        (None, None) => None,
        (s, e) => Some((s.unwrap_or(0), e.unwrap_or(usize::MAX))),
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
