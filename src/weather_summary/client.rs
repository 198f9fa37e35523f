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

use crate::retry::RetryPolicy;
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const DEFAULT_API_URL: &str = "https://api.openweathermap.org/data/2.5/";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{0}")]
    Internal(#[from] reqwest::Error),
    #[error("invalid provider URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// The provider response did not contain a field required to build a sample.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("missing '{field}' in response for {city}{}", .detail.as_ref().map(|d| format!(" ({})", d)).unwrap_or_default())]
pub struct FieldMissing {
    pub city: String,
    pub field: &'static str,
    /// Error message from the provider, if it sent one.
    pub detail: Option<String>,
}

/// Source of raw weather observations for a city.
///
/// Implementations make a single logical request per call and return whatever
/// payload the provider produced. Callers are responsible for checking that the
/// fields they need are present, see [`CurrentWeather::sample`].
#[async_trait]
pub trait WeatherSource: Send + Sync + fmt::Debug {
    /// Current conditions for `city`.
    async fn current(&self, city: &str) -> Result<CurrentWeather, ClientError>;

    /// Conditions for `city` on a particular day.
    async fn historical(&self, city: &str, date: NaiveDate) -> Result<CurrentWeather, ClientError>;
}

pub struct OpenWeatherClient {
    client: Client,
    weather_url: Url,
    api_key: String,
    retry: RetryPolicy,
}

impl OpenWeatherClient {
    const USER_AGENT: &'static str = concat!("weather_summary/", env!("CARGO_PKG_VERSION"));
    const JSON_RESPONSE: &'static str = "application/json";

    pub fn new(client: Client, base_url: &str, api_key: String, retry: RetryPolicy) -> Result<Self, ClientError> {
        let invalid = |reason: String| ClientError::InvalidUrl {
            url: base_url.to_owned(),
            reason,
        };

        // Url::join replaces the last path segment unless the base ends with a slash
        let mut base = base_url.to_owned();
        if !base.ends_with('/') {
            base.push('/');
        }

        let weather_url = Url::parse(&base)
            .and_then(|u| u.join("weather"))
            .map_err(|e| invalid(e.to_string()))?;

        if weather_url.cannot_be_a_base() {
            return Err(invalid("not a base URL".to_owned()));
        }

        Ok(OpenWeatherClient {
            client,
            weather_url,
            api_key,
            retry,
        })
    }

    async fn fetch(&self, city: &str, date: Option<NaiveDate>) -> Result<CurrentWeather, ClientError> {
        let url = self.request_url(city, date);
        tracing::debug!(message = "making weather request", path = %self.weather_url.path(), city = %city, date = ?date);

        let res = self
            .retry
            .send(|| {
                self.client
                    .get(url.clone())
                    .header(USER_AGENT, Self::USER_AGENT)
                    .header(ACCEPT, Self::JSON_RESPONSE)
                    .send()
            })
            .await?;

        let status = res.status();
        if !status.is_success() {
            tracing::debug!(message = "unsuccessful weather response", status = %status, city = %city);
        }

        Ok(res.json::<CurrentWeather>().await?)
    }

    fn request_url(&self, city: &str, date: Option<NaiveDate>) -> Url {
        let mut url = self.weather_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("q", city);
            if let Some(d) = date {
                query.append_pair("date", &d.format("%Y-%m-%d").to_string());
            }
            query.append_pair("appid", &self.api_key);
        }

        url
    }
}

impl fmt::Debug for OpenWeatherClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenWeatherClient")
            .field("weather_url", &self.weather_url.as_str())
            .field("api_key", &"<redacted>")
            .field("retry", &self.retry)
            .finish()
    }
}

#[async_trait]
impl WeatherSource for OpenWeatherClient {
    async fn current(&self, city: &str) -> Result<CurrentWeather, ClientError> {
        self.fetch(city, None).await
    }

    async fn historical(&self, city: &str, date: NaiveDate) -> Result<CurrentWeather, ClientError> {
        self.fetch(city, Some(date)).await
    }
}

/// Response body of the provider's weather endpoint.
///
/// Every field is optional since error responses (unknown city, bad key, rate
/// limiting) use the same endpoint and only carry `cod` and `message`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct CurrentWeather {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub main: Option<MainReadings>,
    #[serde(default)]
    pub weather: Vec<Condition>,
    /// Response code, sent as a number on success and a string on error.
    #[serde(default)]
    pub cod: Option<serde_json::Value>,
    /// Provider message, usually text but sent as a number by some endpoints.
    #[serde(default)]
    pub message: Option<serde_json::Value>,
}

/// Temperatures in kelvin.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct MainReadings {
    pub temp: f64,
    pub temp_min: f64,
    pub temp_max: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Condition {
    pub main: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Normalized observation for a single city, temperatures in kelvin.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherSample {
    pub city: String,
    pub temp: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub condition: String,
}

impl CurrentWeather {
    /// Extract the fields needed for a summary, failing if any are absent.
    ///
    /// The first reported condition is used as the dominant one.
    pub fn sample(&self, city: &str) -> Result<WeatherSample, FieldMissing> {
        let missing = |field| FieldMissing {
            city: city.to_owned(),
            field,
            detail: self.message.as_ref().map(|m| match m {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
        };

        let main = self.main.ok_or_else(|| missing("main"))?;
        let condition = self.weather.first().ok_or_else(|| missing("weather"))?;

        Ok(WeatherSample {
            city: city.to_owned(),
            temp: main.temp,
            temp_min: main.temp_min,
            temp_max: main.temp_max,
            condition: condition.main.clone(),
        })
    }
}
