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

//! Stub weather source shared by unit tests.

use crate::client::{ClientError, Condition, CurrentWeather, MainReadings, WeatherSource};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Answers with fixed readings per city. Unknown cities and pairs marked as
/// missing get the body the provider sends for an unknown city. Cities marked
/// unavailable fail at the transport level.
#[derive(Debug, Default)]
pub struct StubSource {
    kelvin: HashMap<String, f64>,
    missing: HashSet<(String, Option<NaiveDate>)>,
    unavailable: HashSet<String>,
    calls: AtomicUsize,
}

impl StubSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `temp` kelvin for `city`, with max and min two degrees either side.
    pub fn city(mut self, city: &str, temp: f64) -> Self {
        self.kelvin.insert(city.to_owned(), temp);
        self
    }

    /// Respond without readings for `city`, only on `date` when one is given.
    pub fn missing(mut self, city: &str, date: Option<NaiveDate>) -> Self {
        self.missing.insert((city.to_owned(), date));
        self
    }

    /// Fail every request for `city` with a client error.
    pub fn unavailable(mut self, city: &str) -> Self {
        self.unavailable.insert(city.to_owned());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn respond(&self, city: &str, date: Option<NaiveDate>) -> Result<CurrentWeather, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.unavailable.contains(city) {
            let err = reqwest::Client::new().get("not a url").build().unwrap_err();
            return Err(ClientError::Internal(err));
        }

        let skipped = self.missing.contains(&(city.to_owned(), date)) || self.missing.contains(&(city.to_owned(), None));
        Ok(match self.kelvin.get(city) {
            Some(&temp) if !skipped => CurrentWeather {
                name: Some(city.to_owned()),
                main: Some(MainReadings {
                    temp,
                    temp_min: temp - 2.0,
                    temp_max: temp + 2.0,
                }),
                weather: vec![
                    Condition {
                        main: "Clear".to_owned(),
                        description: Some("clear sky".to_owned()),
                    },
                    Condition {
                        main: "Haze".to_owned(),
                        description: None,
                    },
                ],
                cod: Some(serde_json::json!(200)),
                message: None,
            },
            _ => CurrentWeather {
                cod: Some(serde_json::json!("404")),
                message: Some(serde_json::json!("city not found")),
                ..CurrentWeather::default()
            },
        })
    }
}

#[async_trait]
impl WeatherSource for StubSource {
    async fn current(&self, city: &str) -> Result<CurrentWeather, ClientError> {
        self.respond(city, None)
    }

    async fn historical(&self, city: &str, date: NaiveDate) -> Result<CurrentWeather, ClientError> {
        self.respond(city, Some(date))
    }
}
