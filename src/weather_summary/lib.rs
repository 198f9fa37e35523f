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

//! Daily weather summaries for a fixed set of cities
//!
//! ## Features
//!
//! `weather_summary` polls the [OpenWeatherMap] current weather API for a fixed set of
//! cities, stores a daily summary for each of them in a SQLite database, and serves
//! current conditions, temperature alerts, and trend charts over HTTP.
//!
//! Each summary row contains:
//!
//! * `date` - Day the summary applies to, `YYYY-MM-DD` in local time.
//! * `city` - Tracked city name.
//! * `avg_temp`, `max_temp`, `min_temp` - Temperatures in degrees celsius.
//! * `dominant_condition` - First weather condition reported by the provider (e.g. `Rain`).
//!
//! [OpenWeatherMap]: https://openweathermap.org/current
//!
//! ## Usage
//!
//! ### Server
//!
//! The `weather_summary` binary ingests summaries for every tracked city once at startup
//! and then once every 24 hours while serving the HTTP API. An API key for the provider
//! is required and may be given via the `OPENWEATHER_API_KEY` environment variable.
//!
//! ```text
//! export OPENWEATHER_API_KEY=...
//! ./weather_summary --db weather.db --city Delhi --city Mumbai
//! ```
//!
//! The following endpoints are available:
//!
//! * `GET /api/weather/current` - Current conditions for all tracked cities.
//! * `GET /api/weather/<city>` - Current conditions for any city.
//! * `GET /api/alerts` - Tracked cities above the alert threshold (35°C by default).
//! * `GET /api/trends/<city>` - Base64 PNG chart of stored temperatures for a city.
//! * `GET /metrics` - Prometheus metrics about ingestion.
//!
//! ### Backfill
//!
//! The `weather_backfill` binary stores summaries for each day in a date range, inclusive.
//! Days the provider has no data for are logged and skipped.
//!
//! ```text
//! ./weather_backfill --db weather.db --start 2024-06-01 --end 2024-06-07
//! ```
//!

pub mod alerts;
pub mod chart;
pub mod client;
pub mod convert;
pub mod http;
pub mod metrics;
pub mod pipeline;
pub mod retry;
pub mod scheduler;
pub mod store;

#[cfg(test)]
mod testing;

/// Cities tracked when none are configured.
pub const DEFAULT_CITIES: &[&str] = &["Delhi", "Mumbai", "Chennai", "Bangalore", "Kolkata", "Hyderabad"];
