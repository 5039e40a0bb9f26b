use rusqlite::Connection;

use crate::error::ScrapeError;
use crate::records::{Attraction, Review, User};

pub fn connect(path: &str) -> Result<Connection, ScrapeError> {
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<(), ScrapeError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS attractions (
            id          INTEGER PRIMARY KEY,
            name        TEXT,
            url         TEXT,
            attr_type   TEXT,
            lat         REAL,
            lon         REAL,
            num_reviews TEXT,
            scraped     BOOLEAN NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_attractions_scraped ON attractions(scraped);
        CREATE INDEX IF NOT EXISTS idx_attractions_type ON attractions(attr_type);

        CREATE TABLE IF NOT EXISTS reviews (
            id           TEXT PRIMARY KEY,
            title        TEXT,
            rating       INTEGER NOT NULL CHECK(rating BETWEEN 1 AND 5),
            date         TEXT,
            full         TEXT,
            attr_id      INTEGER NOT NULL REFERENCES attractions(id),
            user_profile TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_reviews_attr ON reviews(attr_id);

        CREATE TABLE IF NOT EXISTS users (
            profile       TEXT PRIMARY KEY,
            location      TEXT,
            contributions INTEGER,
            helpful_votes INTEGER
        );
        ",
    )?;
    Ok(())
}

// ── Upserts ──
//
// Every write below is a single autocommitted statement. There is no
// page-level transaction on purpose: a crash mid-page leaves partial rows,
// which re-runs repair because inserts are conflict-safe and `scraped` is
// only flipped after an attraction's last page.

/// Insert an attraction if its id is new; an existing row wins.
/// Returns whether a row was written.
pub fn insert_attraction(conn: &Connection, attr: &Attraction) -> Result<bool, ScrapeError> {
    let n = conn.execute(
        "INSERT OR IGNORE INTO attractions (id, name, url, attr_type) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![attr.id, attr.name, attr.url, attr.attr_type],
    )?;
    Ok(n > 0)
}

/// Explicit update path for detail-page fields; never inserts.
pub fn update_attraction_details(conn: &Connection, attr: &Attraction) -> Result<(), ScrapeError> {
    let num_reviews = attr
        .num_reviews
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| ScrapeError::malformed("num_reviews", &e.to_string()))?;
    conn.execute(
        "UPDATE attractions SET lat = ?1, lon = ?2, num_reviews = ?3 WHERE id = ?4",
        rusqlite::params![attr.lat, attr.lon, num_reviews, attr.id],
    )?;
    Ok(())
}

pub fn set_scraped(conn: &Connection, id: i64, scraped: bool) -> Result<(), ScrapeError> {
    conn.execute(
        "UPDATE attractions SET scraped = ?1 WHERE id = ?2",
        rusqlite::params![scraped, id],
    )?;
    Ok(())
}

/// Insert-if-absent; a review id seen before is a no-op.
pub fn insert_review(conn: &Connection, review: &Review) -> Result<bool, ScrapeError> {
    let n = conn.execute(
        "INSERT OR IGNORE INTO reviews (id, title, rating, date, full, attr_id, user_profile)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            review.id,
            review.title,
            review.rating,
            review.date,
            review.full,
            review.attr_id,
            review.user_profile,
        ],
    )?;
    Ok(n > 0)
}

/// Insert-if-absent keyed on the profile URL; the first write wins and later
/// sightings of the same reviewer never overwrite fields.
pub fn insert_user(conn: &Connection, user: &User) -> Result<bool, ScrapeError> {
    let n = conn.execute(
        "INSERT OR IGNORE INTO users (profile, location, contributions, helpful_votes)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![
            user.profile,
            user.location,
            user.contributions,
            user.helpful_votes,
        ],
    )?;
    Ok(n > 0)
}

// ── Work queue ──

/// Which attraction categories a run covers.
#[derive(Debug, Clone)]
pub enum TypeFilter {
    All,
    Types(Vec<String>),
}

impl TypeFilter {
    pub fn from_args(types: Vec<String>) -> Self {
        if types.is_empty() {
            Self::All
        } else {
            Self::Types(types)
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkItem {
    pub id: i64,
    pub url: String,
}

/// Attractions still to scrape, newest id first, as a materialized batch
/// (no live cursor held across the run).
pub fn pending_attractions(
    conn: &Connection,
    filter: &TypeFilter,
) -> Result<Vec<WorkItem>, ScrapeError> {
    let mut sql = String::from("SELECT id, url FROM attractions WHERE scraped = 0");
    let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let TypeFilter::Types(types) = filter {
        let placeholders: Vec<String> = (1..=types.len()).map(|i| format!("?{i}")).collect();
        sql.push_str(&format!(" AND attr_type IN ({})", placeholders.join(", ")));
        for t in types {
            params.push(Box::new(t.clone()));
        }
    }
    sql.push_str(" ORDER BY id DESC");

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(param_refs.as_slice(), |row| {
            Ok(WorkItem {
                id: row.get(0)?,
                url: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Stats ──

pub struct Stats {
    pub attractions: usize,
    pub scraped: usize,
    pub pending: usize,
    pub reviews: usize,
    pub users: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats, ScrapeError> {
    let attractions: usize = conn.query_row("SELECT COUNT(*) FROM attractions", [], |r| r.get(0))?;
    let scraped: usize = conn.query_row(
        "SELECT COUNT(*) FROM attractions WHERE scraped = 1",
        [],
        |r| r.get(0),
    )?;
    let reviews: usize = conn.query_row("SELECT COUNT(*) FROM reviews", [], |r| r.get(0))?;
    let users: usize = conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?;
    Ok(Stats {
        attractions,
        scraped,
        pending: attractions - scraped,
        reviews,
        users,
    })
}
