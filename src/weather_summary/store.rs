// weather_summary - Daily weather summaries for a fixed set of cities
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

//! Append-only storage of daily per-city summaries in SQLite.
//!
//! A connection is opened for each operation and closed when it completes so
//! no operation ever runs against a stale connection. Rows are never updated
//! or deleted and nothing prevents more than one row for the same city and
//! date; see [`SummaryStore::daily_series`] for a view that collapses them.

use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OpenFlags, Row};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

const DATE_FORMAT: &str = "%Y-%m-%d";

const CREATE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS weather_summary (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    date TEXT NOT NULL,
    city TEXT NOT NULL,
    avg_temp REAL NOT NULL,
    max_temp REAL NOT NULL,
    min_temp REAL NOT NULL,
    dominant_condition TEXT NOT NULL
);
"#;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Aggregate weather for one city on one day, temperatures in celsius.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySummary {
    /// Assigned by the store on insert, `None` for rows not yet written.
    pub id: Option<i64>,
    pub date: NaiveDate,
    pub city: String,
    pub avg_temp: f64,
    pub max_temp: f64,
    pub min_temp: f64,
    pub dominant_condition: String,
}

#[derive(Debug, Clone)]
pub struct SummaryStore {
    path: PathBuf,
}

impl SummaryStore {
    /// Create a store backed by the SQLite file at `path`, creating the file and
    /// the schema if they don't exist yet.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let store = SummaryStore {
            path: path.as_ref().to_path_buf(),
        };

        store.connect(OpenFlags::default())?.execute_batch(CREATE_SCHEMA)?;
        tracing::debug!(message = "initialized summary schema", path = %store.path.display());
        Ok(store)
    }

    /// Append a summary, returning the id assigned to it.
    pub fn insert(&self, summary: &DailySummary) -> Result<i64, StoreError> {
        let conn = self.connect(OpenFlags::SQLITE_OPEN_READ_WRITE)?;
        conn.execute(
            "INSERT INTO weather_summary (date, city, avg_temp, max_temp, min_temp, dominant_condition)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                summary.date.format(DATE_FORMAT).to_string(),
                summary.city,
                summary.avg_temp,
                summary.max_temp,
                summary.min_temp,
                summary.dominant_condition,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// All summaries for `city` in insertion order. Empty if there are none.
    pub fn query_by_city(&self, city: &str) -> Result<Vec<DailySummary>, StoreError> {
        let conn = self.connect(OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        let mut stmt = conn.prepare(
            "SELECT id, date, city, avg_temp, max_temp, min_temp, dominant_condition
             FROM weather_summary
             WHERE city = ?1
             ORDER BY id ASC",
        )?;

        let rows = stmt.query_map(params![city], row_to_summary)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// One summary per date for `city` in date order, the most recently inserted
    /// row winning when a date was ingested more than once.
    pub fn daily_series(&self, city: &str) -> Result<Vec<DailySummary>, StoreError> {
        let mut latest = std::collections::BTreeMap::new();
        for summary in self.query_by_city(city)? {
            latest.insert(summary.date, summary);
        }

        Ok(latest.into_values().collect())
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        let conn = self.connect(OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM weather_summary", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Run blocking store operations off of the async runtime.
    pub async fn run<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: FnOnce(&SummaryStore) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || op(&store)).await?
    }

    fn connect(&self, flags: OpenFlags) -> Result<Connection, StoreError> {
        let flags = flags | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        Ok(Connection::open_with_flags(&self.path, flags)?)
    }
}

fn row_to_summary(row: &Row) -> rusqlite::Result<DailySummary> {
    let raw_date: String = row.get(1)?;
    let date = NaiveDate::parse_from_str(&raw_date, DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;

    Ok(DailySummary {
        id: Some(row.get(0)?),
        date,
        city: row.get(2)?,
        avg_temp: row.get(3)?,
        max_temp: row.get(4)?,
        min_temp: row.get(5)?,
        dominant_condition: row.get(6)?,
    })
}
