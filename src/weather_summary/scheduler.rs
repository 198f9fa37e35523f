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

//! Periodic live ingestion.

use crate::pipeline::{DateSource, FailurePolicy, Ingestor};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Default time between live ingestion runs.
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

/// Background task running live ingestion once at start and then once per period.
///
/// Runs happen one after another inside a single task so they never overlap.
/// Dropping the scheduler without calling [`IngestScheduler::stop`] also ends the
/// task once any in-progress run completes.
#[derive(Debug)]
pub struct IngestScheduler {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl IngestScheduler {
    /// Spawn the scheduler task on the current runtime.
    pub fn start(ingestor: Ingestor, period: Duration, policy: FailurePolicy) -> Self {
        let (stop, mut stopped) = oneshot::channel();
        let period = period.max(Duration::from_secs(1));

        let task = tokio::spawn(async move {
            // The first tick completes immediately which gives us the run at startup
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(
                message = "ingestion scheduler started",
                period_secs = period.as_secs(),
                cities = ingestor.cities().len(),
            );

            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = interval.tick() => {
                        let report = ingestor.run(DateSource::Today, policy).await;
                        if !report.is_complete() {
                            tracing::warn!(
                                message = "ingestion run incomplete",
                                failed = report.failures().count(),
                                aborted = report.aborted,
                            );
                        }
                    }
                }
            }

            tracing::info!("ingestion scheduler stopped");
        });

        IngestScheduler { stop: Some(stop), task }
    }

    /// Signal the task to stop and wait for it, letting any in-progress run finish.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }

        if let Err(e) = (&mut self.task).await {
            tracing::error!(message = "ingestion scheduler failed", error = %e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::IngestScheduler;
    use crate::pipeline::{FailurePolicy, Ingestor};
    use crate::store::SummaryStore;
    use crate::testing::StubSource;
    use std::sync::Arc;
    use std::time::Duration;

    async fn wait_for_rows(store: &SummaryStore, rows: usize) {
        for _ in 0..200 {
            if store.count().unwrap() >= rows {
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }

        panic!("timed out waiting for {} rows", rows);
    }

    #[tokio::test]
    async fn test_runs_at_start() {
        let dir = tempfile::tempdir().unwrap();
        let store = SummaryStore::open(dir.path().join("weather.db")).unwrap();
        let source = Arc::new(StubSource::new().city("Delhi", 310.0).city("Mumbai", 300.0));
        let ingestor = Ingestor::new(source.clone(), store.clone(), vec!["Delhi".into(), "Mumbai".into()]);

        let scheduler = IngestScheduler::start(ingestor, super::DEFAULT_PERIOD, FailurePolicy::Continue);
        wait_for_rows(&store, 2).await;
        scheduler.stop().await;

        assert_eq!(2, source.calls());
        assert_eq!(2, store.count().unwrap());
    }

    #[tokio::test]
    async fn test_repeats_each_period() {
        let dir = tempfile::tempdir().unwrap();
        let store = SummaryStore::open(dir.path().join("weather.db")).unwrap();
        let source = Arc::new(StubSource::new().city("Delhi", 310.0));
        let ingestor = Ingestor::new(source.clone(), store.clone(), vec!["Delhi".into()]);

        let scheduler = IngestScheduler::start(ingestor, Duration::from_secs(1), FailurePolicy::Continue);
        wait_for_rows(&store, 2).await;
        scheduler.stop().await;

        // Every run appends a row, the second run may land on the next day
        let rows = store.query_by_city("Delhi").unwrap();
        assert!(rows.len() >= 2);
        assert!(rows[1].id > rows[0].id);
        assert!(rows[1].date >= rows[0].date);
        assert!(rows[1].date - rows[0].date <= chrono::Duration::days(1));
    }
}
