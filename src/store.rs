//! SQLite persistence for forecasts, ratings and the training feature schema.
//!
//! Dates are stored as `YYYY-MM-DD` text. Every write is an upsert inside one
//! transaction, so re-running a forecast for the same dates overwrites rows.

use std::path::Path;

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use tracing::info;

use crate::frame::{FeatureSchema, NeighborhoodMatrix};
use crate::ratings::{RatingEntry, RatingTable};

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("schema JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("stored date '{0}' is not YYYY-MM-DD")]
    InvalidDate(String),
    #[error("{dates} dates for {values} city forecast values")]
    LengthMismatch { dates: usize, values: usize },
}

pub struct ForecastStore {
    conn: Connection,
}

impl ForecastStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA temp_store=MEMORY;
            ",
        )?;
        create_tables(&conn)?;

        info!(
            component = "store",
            event = "store.open",
            path = %path.display()
        );
        Ok(Self { conn })
    }

    pub fn upsert_city_forecast(
        &mut self,
        dates: &[NaiveDate],
        forecast: &[f64],
    ) -> Result<usize, StoreError> {
        if dates.len() != forecast.len() {
            return Err(StoreError::LengthMismatch {
                dates: dates.len(),
                values: forecast.len(),
            });
        }

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "
                INSERT INTO city_forecast (date, forecast) VALUES (?1, ?2)
                ON CONFLICT(date) DO UPDATE SET forecast = excluded.forecast
                ",
            )?;
            for (date, value) in dates.iter().zip(forecast) {
                stmt.execute(params![format_date(*date), value])?;
            }
        }
        tx.commit()?;

        log_write("city_forecast", dates.len());
        Ok(dates.len())
    }

    pub fn upsert_neighborhood_forecast(
        &mut self,
        forecast: &NeighborhoodMatrix,
    ) -> Result<usize, StoreError> {
        let tx = self.conn.transaction()?;
        let mut written = 0usize;
        {
            let mut stmt = tx.prepare(
                "
                INSERT INTO neighborhood_forecast (date, neighborhood, forecast)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(date, neighborhood) DO UPDATE SET forecast = excluded.forecast
                ",
            )?;
            for (date, row) in forecast.dates.iter().zip(&forecast.values) {
                let date = format_date(*date);
                for (neighborhood, value) in forecast.neighborhoods.iter().zip(row) {
                    stmt.execute(params![date, neighborhood, value])?;
                    written += 1;
                }
            }
        }
        tx.commit()?;

        log_write("neighborhood_forecast", written);
        Ok(written)
    }

    pub fn upsert_ratings(&mut self, ratings: &RatingTable) -> Result<usize, StoreError> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "
                INSERT INTO neighborhood_ratings (date, neighborhood, rating)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(date, neighborhood) DO UPDATE SET rating = excluded.rating
                ",
            )?;
            for entry in ratings.entries() {
                stmt.execute(params![
                    format_date(entry.date),
                    entry.neighborhood,
                    entry.rating
                ])?;
            }
        }
        tx.commit()?;

        log_write("neighborhood_ratings", ratings.len());
        Ok(ratings.len())
    }

    pub fn save_schema(&mut self, schema: &FeatureSchema) -> Result<(), StoreError> {
        let json = serde_json::to_string(schema)?;
        self.conn.execute(
            "
            INSERT INTO feature_schema (id, version, fingerprint, json) VALUES (1, ?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET
                version = excluded.version,
                fingerprint = excluded.fingerprint,
                json = excluded.json
            ",
            params![schema.version, schema.fingerprint, json],
        )?;
        log_write("feature_schema", 1);
        Ok(())
    }

    pub fn load_schema(&self) -> Result<Option<FeatureSchema>, StoreError> {
        let json: Option<String> = self
            .conn
            .query_row("SELECT json FROM feature_schema WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub fn load_city_forecast(&self) -> Result<Vec<(NaiveDate, f64)>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT date, forecast FROM city_forecast ORDER BY date")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (date, value) = row?;
            out.push((parse_stored_date(&date)?, value));
        }
        Ok(out)
    }

    pub fn load_ratings(&self, start: NaiveDate, end: NaiveDate) -> Result<RatingTable, StoreError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT date, neighborhood, rating
            FROM neighborhood_ratings
            WHERE date >= ?1 AND date <= ?2
            ORDER BY date, neighborhood
            ",
        )?;
        let rows = stmt.query_map(params![format_date(start), format_date(end)], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (date, neighborhood, rating) = row?;
            entries.push(RatingEntry {
                date: parse_stored_date(&date)?,
                neighborhood,
                rating,
            });
        }
        Ok(RatingTable::from_entries(entries))
    }
}

fn create_tables(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS city_forecast (
            date TEXT NOT NULL PRIMARY KEY,
            forecast REAL NOT NULL
        ) WITHOUT ROWID;

        CREATE TABLE IF NOT EXISTS neighborhood_forecast (
            date TEXT NOT NULL,
            neighborhood TEXT NOT NULL,
            forecast REAL NOT NULL,
            PRIMARY KEY(date, neighborhood)
        ) WITHOUT ROWID;

        CREATE TABLE IF NOT EXISTS neighborhood_ratings (
            date TEXT NOT NULL,
            neighborhood TEXT NOT NULL,
            rating REAL NOT NULL,
            PRIMARY KEY(date, neighborhood)
        ) WITHOUT ROWID;

        CREATE TABLE IF NOT EXISTS feature_schema (
            id INTEGER NOT NULL PRIMARY KEY,
            version INTEGER NOT NULL,
            fingerprint TEXT NOT NULL,
            json TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn parse_stored_date(raw: &str) -> Result<NaiveDate, StoreError> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|_| StoreError::InvalidDate(raw.to_string()))
}

fn log_write(table: &'static str, rows: usize) {
    info!(
        component = "store",
        event = "store.upsert",
        table,
        rows
    );
}
