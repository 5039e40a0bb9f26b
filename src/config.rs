use std::path::PathBuf;

/// Runtime configuration, read from the environment (a `.env` file is
/// honored when present). CLI flags carry the per-run values; everything
/// here is deployment plumbing with a sensible local default.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub base_url: String,
    pub webdriver_url: String,
    pub out_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self {
            db_path: var_or("TRIPSCRAPE_DB", "data/tripscrape.sqlite"),
            base_url: var_or("TRIPSCRAPE_BASE_URL", "https://www.tripadvisor.com"),
            webdriver_url: var_or("WEBDRIVER_URL", "http://localhost:4444"),
            out_dir: var_or("TRIPSCRAPE_OUT", "data/export").into(),
        }
    }
}

fn var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
