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

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct CityLabels {
    city: String,
}

/// Counters describing ingestion runs.
///
/// All metrics are created and registered upon call to `IngestMetrics::new()`. Per-city
/// metrics carry a "city" label with the tracked city name.
#[derive(Debug, Clone, Default)]
pub struct IngestMetrics {
    stored: Family<CityLabels, Counter>,
    failed: Family<CityLabels, Counter>,
    runs: Counter,
    last_run: Gauge,
}

impl IngestMetrics {
    pub fn new(reg: &mut Registry) -> Self {
        let metrics = Self::default();

        reg.register(
            "weather_summaries_stored",
            "Daily summaries persisted per city",
            metrics.stored.clone(),
        );
        reg.register(
            "weather_ingest_failures",
            "Cities skipped or aborted during ingestion",
            metrics.failed.clone(),
        );
        reg.register("weather_ingest_runs", "Completed ingestion runs", metrics.runs.clone());
        reg.register(
            "weather_ingest_last_run_timestamp_seconds",
            "Unix time the last ingestion run finished",
            metrics.last_run.clone(),
        );

        metrics
    }

    pub fn stored(&self, city: &str) {
        self.stored.get_or_create(&Self::labels(city)).inc();
    }

    pub fn failed(&self, city: &str) {
        self.failed.get_or_create(&Self::labels(city)).inc();
    }

    pub fn run_finished(&self, unix_secs: i64) {
        self.runs.inc();
        self.last_run.set(unix_secs);
    }

    fn labels(city: &str) -> CityLabels {
        CityLabels { city: city.to_owned() }
    }
}
