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

//! Daily ingestion: fetch, convert, and persist one summary per tracked city.
//!
//! Live runs and historical backfills share the same per-city unit of work and
//! differ only in where the date comes from. Each city's result is captured in
//! a [`CityOutcome`] so that, under [`FailurePolicy::Continue`], one bad
//! response never prevents the remaining cities from being stored.

use crate::client::{ClientError, FieldMissing, WeatherSample, WeatherSource};
use crate::convert::{kelvin_to_celsius, round_to};
use crate::metrics::IngestMetrics;
use crate::store::{DailySummary, StoreError, SummaryStore};
use chrono::{Local, NaiveDate};
use std::sync::Arc;
use thiserror::Error;
use tracing::{Instrument, Level};

/// Decimal places kept for stored temperatures.
const TEMP_PRECISION: i32 = 2;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("provider request failed: {0}")]
    Provider(#[from] ClientError),
    #[error("{0}")]
    Fields(#[from] FieldMissing),
    #[error("unable to persist summary: {0}")]
    Store(#[from] StoreError),
    #[error("start date {start} is after end date {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },
}

/// Where the date of a run comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateSource {
    /// Current conditions, dated with the local process clock.
    Today,
    /// Conditions for a caller-supplied day, sent to the provider and stored on the row.
    Fixed(NaiveDate),
}

impl DateSource {
    fn resolve(&self) -> NaiveDate {
        match self {
            DateSource::Today => Local::now().date_naive(),
            DateSource::Fixed(d) => *d,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop the run at the first city that fails.
    FailFast,
    /// Log the failure and move on to the next city.
    #[default]
    Continue,
}

#[derive(Debug)]
pub struct CityOutcome {
    pub city: String,
    pub date: NaiveDate,
    pub result: Result<DailySummary, IngestError>,
}

#[derive(Debug, Default)]
pub struct IngestReport {
    pub outcomes: Vec<CityOutcome>,
    /// Set when a failure under `FailFast` stopped the run early.
    pub aborted: bool,
}

impl IngestReport {
    pub fn stored(&self) -> impl Iterator<Item = &DailySummary> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = &CityOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }

    pub fn is_complete(&self) -> bool {
        !self.aborted && self.failures().next().is_none()
    }
}

/// Build the summary persisted for a sample, converting to celsius.
pub fn summarize(sample: &WeatherSample, date: NaiveDate) -> DailySummary {
    let celsius = |k: f64| round_to(kelvin_to_celsius(k), TEMP_PRECISION);

    DailySummary {
        id: None,
        date,
        city: sample.city.clone(),
        avg_temp: celsius(sample.temp),
        max_temp: celsius(sample.temp_max),
        min_temp: celsius(sample.temp_min),
        dominant_condition: sample.condition.clone(),
    }
}

#[derive(Debug, Clone)]
pub struct Ingestor {
    source: Arc<dyn WeatherSource>,
    store: SummaryStore,
    cities: Vec<String>,
    metrics: Option<IngestMetrics>,
}

impl Ingestor {
    pub fn new(source: Arc<dyn WeatherSource>, store: SummaryStore, cities: Vec<String>) -> Self {
        Ingestor {
            source,
            store,
            cities,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: IngestMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn cities(&self) -> &[String] {
        &self.cities
    }

    /// Ingest every tracked city once for a single date.
    pub async fn run(&self, date: DateSource, policy: FailurePolicy) -> IngestReport {
        let mut report = IngestReport::default();
        let day = date.resolve();
        self.ingest_day(date, day, policy, &mut report)
            .instrument(tracing::span!(Level::INFO, "ingest", date = %day))
            .await;

        self.finish(&report);
        report
    }

    /// Ingest every tracked city for each day from `start` to `end`, inclusive.
    pub async fn backfill(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        policy: FailurePolicy,
    ) -> Result<IngestReport, IngestError> {
        if start > end {
            return Err(IngestError::InvalidRange { start, end });
        }

        let mut report = IngestReport::default();
        for date in start.iter_days().take_while(|d| *d <= end) {
            self.ingest_day(DateSource::Fixed(date), date, policy, &mut report)
                .instrument(tracing::span!(Level::INFO, "backfill", date = %date))
                .await;

            if report.aborted {
                break;
            }
        }

        self.finish(&report);
        Ok(report)
    }

    /// Ingest every tracked city, storing rows under `day`, which is `date` already resolved.
    async fn ingest_day(&self, date: DateSource, day: NaiveDate, policy: FailurePolicy, report: &mut IngestReport) {
        for city in &self.cities {
            let result = self.ingest_city(city, date, day).await;
            let failed = result.is_err();

            match &result {
                Ok(s) => {
                    tracing::info!(message = "stored daily summary", city = %city, date = %day, avg_temp = s.avg_temp);
                    self.observe(|m| m.stored(city));
                }
                Err(e) => {
                    tracing::warn!(message = "unable to ingest city", city = %city, date = %day, error = %e);
                    self.observe(|m| m.failed(city));
                }
            }

            report.outcomes.push(CityOutcome {
                city: city.clone(),
                date: day,
                result,
            });

            if failed && policy == FailurePolicy::FailFast {
                tracing::error!(message = "aborting ingestion run", city = %city, date = %day);
                report.aborted = true;
                return;
            }
        }
    }

    async fn ingest_city(&self, city: &str, date: DateSource, day: NaiveDate) -> Result<DailySummary, IngestError> {
        let response = match date {
            DateSource::Today => self.source.current(city).await?,
            DateSource::Fixed(d) => self.source.historical(city, d).await?,
        };

        let mut summary = summarize(&response.sample(city)?, day);
        let row = summary.clone();
        summary.id = Some(self.store.run(move |s| s.insert(&row)).await?);
        Ok(summary)
    }

    fn finish(&self, report: &IngestReport) {
        let stored = report.stored().count();
        let failed = report.failures().count();
        tracing::info!(message = "ingestion finished", stored = stored, failed = failed, aborted = report.aborted);
        self.observe(|m| m.run_finished(chrono::Utc::now().timestamp()));
    }

    fn observe<F: FnOnce(&IngestMetrics)>(&self, f: F) {
        if let Some(m) = &self.metrics {
            f(m);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{summarize, DateSource, FailurePolicy, IngestError, Ingestor};
    use crate::client::WeatherSample;
    use crate::store::SummaryStore;
    use crate::testing::StubSource;
    use chrono::{Local, NaiveDate};
    use std::collections::HashSet;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn cities(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn setup(source: StubSource, names: &[&str]) -> (TempDir, SummaryStore, Ingestor) {
        let dir = tempfile::tempdir().unwrap();
        let store = SummaryStore::open(dir.path().join("weather.db")).unwrap();
        let ingestor = Ingestor::new(Arc::new(source), store.clone(), cities(names));
        (dir, store, ingestor)
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
    }

    #[test]
    fn test_summarize_converts_and_rounds() {
        let sample = WeatherSample {
            city: "Delhi".to_owned(),
            temp: 308.123,
            temp_min: 305.0,
            temp_max: 310.456,
            condition: "Haze".to_owned(),
        };

        let s = summarize(&sample, date(1));
        assert_eq!(None, s.id);
        assert_eq!(34.97, s.avg_temp);
        assert_eq!(37.31, s.max_temp);
        assert_eq!(31.85, s.min_temp);
        assert_eq!("Haze", s.dominant_condition);
    }

    #[tokio::test]
    async fn test_live_one_row_per_city() {
        let source = StubSource::new().city("Delhi", 310.15).city("Mumbai", 303.15);
        let (_dir, store, ingestor) = setup(source, &["Delhi", "Mumbai"]);

        let report = ingestor.run(DateSource::Today, FailurePolicy::Continue).await;
        assert!(report.is_complete());

        let today = report.outcomes[0].date;
        let delhi = store.query_by_city("Delhi").unwrap();
        let mumbai = store.query_by_city("Mumbai").unwrap();

        assert_eq!(1, delhi.len());
        assert_eq!(1, mumbai.len());
        assert_eq!(today, delhi[0].date);
        assert_eq!(37.0, delhi[0].avg_temp);
        assert_eq!(39.0, delhi[0].max_temp);
        assert_eq!(35.0, delhi[0].min_temp);
        assert_eq!("Clear", delhi[0].dominant_condition);
        assert_eq!(30.0, mumbai[0].avg_temp);
    }

    #[tokio::test]
    async fn test_live_failure_isolated() {
        let source = StubSource::new().city("Delhi", 310.15).city("Chennai", 305.15);
        let (_dir, store, ingestor) = setup(source, &["Delhi", "Atlantis", "Chennai"]);

        let report = ingestor.run(DateSource::Today, FailurePolicy::Continue).await;

        assert!(!report.aborted);
        assert_eq!(3, report.outcomes.len());
        assert_eq!(1, report.failures().count());
        assert!(matches!(report.outcomes[1].result, Err(IngestError::Fields(_))));
        assert_eq!(2, store.count().unwrap());
        assert_eq!(1, store.query_by_city("Chennai").unwrap().len());
    }

    #[tokio::test]
    async fn test_live_rows_share_run_date() {
        let before = Local::now().date_naive();
        let source = StubSource::new().city("Delhi", 310.15).city("Mumbai", 303.15);
        let (_dir, store, ingestor) = setup(source, &["Delhi", "Mumbai"]);

        let report = ingestor.run(DateSource::Today, FailurePolicy::Continue).await;
        let after = Local::now().date_naive();

        let day = report.outcomes[0].date;
        assert!(day >= before && day <= after);
        assert!(report.outcomes.iter().all(|o| o.date == day));
        for city in ["Delhi", "Mumbai"] {
            assert_eq!(day, store.query_by_city(city).unwrap()[0].date);
        }
    }

    #[tokio::test]
    async fn test_live_provider_unavailable_isolated() {
        let source = StubSource::new()
            .city("Delhi", 310.15)
            .city("Mumbai", 303.15)
            .city("Chennai", 305.15)
            .unavailable("Mumbai");
        let (_dir, store, ingestor) = setup(source, &["Delhi", "Mumbai", "Chennai"]);

        let report = ingestor.run(DateSource::Today, FailurePolicy::Continue).await;

        assert!(!report.aborted);
        assert_eq!(3, report.outcomes.len());
        assert!(matches!(report.outcomes[1].result, Err(IngestError::Provider(_))));
        assert_eq!(2, store.count().unwrap());
        assert!(store.query_by_city("Mumbai").unwrap().is_empty());
        assert_eq!(1, store.query_by_city("Chennai").unwrap().len());
    }

    #[tokio::test]
    async fn test_live_store_unavailable() {
        let source = StubSource::new().city("Delhi", 310.15).city("Mumbai", 303.15);
        let (dir, _store, ingestor) = setup(source, &["Delhi", "Mumbai"]);
        std::fs::remove_file(dir.path().join("weather.db")).unwrap();

        let report = ingestor.run(DateSource::Today, FailurePolicy::Continue).await;

        assert!(!report.aborted);
        assert_eq!(2, report.outcomes.len());
        assert!(report
            .outcomes
            .iter()
            .all(|o| matches!(o.result, Err(IngestError::Store(_)))));
        assert_eq!(0, report.stored().count());
    }

    #[tokio::test]
    async fn test_live_fail_fast_stops_run() {
        let source = StubSource::new().city("Delhi", 310.15).city("Chennai", 305.15);
        let (_dir, store, ingestor) = setup(source, &["Delhi", "Atlantis", "Chennai"]);

        let report = ingestor.run(DateSource::Today, FailurePolicy::FailFast).await;

        assert!(report.aborted);
        assert_eq!(2, report.outcomes.len());
        assert_eq!(1, store.count().unwrap());
        assert!(store.query_by_city("Chennai").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_backfill_all_valid() {
        let source = StubSource::new().city("Delhi", 310.15).city("Mumbai", 303.15);
        let (_dir, store, ingestor) = setup(source, &["Delhi", "Mumbai"]);

        let report = ingestor
            .backfill(date(1), date(3), FailurePolicy::Continue)
            .await
            .unwrap();

        assert!(report.is_complete());
        assert_eq!(6, store.count().unwrap());

        let mut seen = HashSet::new();
        for city in ["Delhi", "Mumbai"] {
            for row in store.query_by_city(city).unwrap() {
                assert!(row.date >= date(1) && row.date <= date(3));
                assert!(seen.insert((row.city, row.date)));
            }
        }
        assert_eq!(6, seen.len());
    }

    #[tokio::test]
    async fn test_backfill_skips_missing_pair() {
        let source = StubSource::new()
            .city("Delhi", 310.15)
            .city("Mumbai", 303.15)
            .missing("Mumbai", Some(date(2)));
        let (_dir, store, ingestor) = setup(source, &["Delhi", "Mumbai"]);

        let report = ingestor
            .backfill(date(1), date(3), FailurePolicy::Continue)
            .await
            .unwrap();

        assert_eq!(5, store.count().unwrap());
        assert_eq!(1, report.failures().count());

        let skipped = report.failures().next().unwrap();
        assert_eq!("Mumbai", skipped.city);
        assert_eq!(date(2), skipped.date);
    }

    #[tokio::test]
    async fn test_backfill_single_day() {
        let source = StubSource::new().city("Delhi", 310.15);
        let (_dir, store, ingestor) = setup(source, &["Delhi"]);

        ingestor
            .backfill(date(5), date(5), FailurePolicy::Continue)
            .await
            .unwrap();

        let rows = store.query_by_city("Delhi").unwrap();
        assert_eq!(1, rows.len());
        assert_eq!(date(5), rows[0].date);
    }

    #[tokio::test]
    async fn test_backfill_rejects_reversed_range() {
        let (_dir, store, ingestor) = setup(StubSource::new(), &["Delhi"]);

        let res = ingestor.backfill(date(3), date(1), FailurePolicy::Continue).await;
        assert!(matches!(res, Err(IngestError::InvalidRange { .. })));
        assert_eq!(0, store.count().unwrap());
    }
}
