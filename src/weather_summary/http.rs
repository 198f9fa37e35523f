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

use crate::alerts::{self, Alert};
use crate::chart;
use crate::client::{WeatherSample, WeatherSource};
use crate::convert::{kelvin_to_celsius, round_to};
use crate::pipeline::IngestError;
use crate::store::SummaryStore;
use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use prometheus_client::encoding::text::encode;
use prometheus_client::registry::Registry;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

const OPEN_METRICS_FORMAT: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

const FETCH_FAILED: &str = "Failed to fetch weather data";
const NO_DATA: &str = "No data available for this city";
const INTERNAL: &str = "An error occurred while processing the request";

/// Shared state for every request handler.
#[derive(Debug)]
pub struct RequestContext {
    source: Arc<dyn WeatherSource>,
    store: SummaryStore,
    cities: Vec<String>,
    alert_threshold: f64,
    registry: Registry,
}

impl RequestContext {
    pub fn new(
        source: Arc<dyn WeatherSource>,
        store: SummaryStore,
        cities: Vec<String>,
        alert_threshold: f64,
        registry: Registry,
    ) -> Self {
        Self {
            source,
            store,
            cities,
            alert_threshold,
            registry,
        }
    }

    async fn sample(&self, city: &str) -> Result<WeatherSample, IngestError> {
        Ok(self.source.current(city).await?.sample(city)?)
    }

    /// Current samples for every tracked city, omitting (and logging) cities that fail.
    async fn tracked_samples(&self) -> Vec<WeatherSample> {
        let mut samples = Vec::with_capacity(self.cities.len());
        for city in &self.cities {
            match self.sample(city).await {
                Ok(s) => samples.push(s),
                Err(e) => tracing::warn!(message = "unable to fetch current weather", city = %city, error = %e),
            }
        }

        samples
    }
}

/// Current conditions for a city as served over HTTP, temperatures in celsius.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CurrentReading {
    pub city: String,
    pub temperature: f64,
    pub max_temp: f64,
    pub min_temp: f64,
    pub condition: String,
}

impl From<WeatherSample> for CurrentReading {
    fn from(s: WeatherSample) -> Self {
        let celsius = |k: f64| round_to(kelvin_to_celsius(k), 2);
        CurrentReading {
            temperature: celsius(s.temp),
            max_temp: celsius(s.temp_max),
            min_temp: celsius(s.temp_min),
            city: s.city,
            condition: s.condition,
        }
    }
}

#[derive(Serialize, Debug)]
pub struct TrendChart {
    pub image: String,
}

/// Error response with a fixed message, the underlying cause is only logged.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: &'static str,
}

impl ApiError {
    fn internal(message: &'static str) -> Self {
        ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message,
        }
    }

    fn not_found(message: &'static str) -> Self {
        ApiError {
            status: StatusCode::NOT_FOUND,
            message,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

pub fn router(context: Arc<RequestContext>) -> Router {
    Router::new()
        .route("/api/weather/current", get(current_weather))
        .route("/api/weather/:city", get(city_weather))
        .route("/api/alerts", get(temperature_alerts))
        .route("/api/trends/:city", get(temperature_trends))
        .route("/metrics", get(text_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(context)
}

async fn current_weather(State(context): State<Arc<RequestContext>>) -> Json<Vec<CurrentReading>> {
    let readings = context.tracked_samples().await.into_iter().map(CurrentReading::from).collect();
    Json(readings)
}

async fn city_weather(
    State(context): State<Arc<RequestContext>>,
    Path(city): Path<String>,
) -> Result<Json<Vec<CurrentReading>>, ApiError> {
    match context.sample(&city).await {
        Ok(s) => Ok(Json(vec![CurrentReading::from(s)])),
        Err(e) => {
            tracing::error!(message = "unable to fetch weather", city = %city, error = %e);
            Err(ApiError::internal(FETCH_FAILED))
        }
    }
}

async fn temperature_alerts(State(context): State<Arc<RequestContext>>) -> Json<Vec<Alert>> {
    let found = context
        .tracked_samples()
        .await
        .iter()
        .filter_map(|s| alerts::check(&s.city, kelvin_to_celsius(s.temp), context.alert_threshold))
        .collect();

    Json(found)
}

async fn temperature_trends(
    State(context): State<Arc<RequestContext>>,
    Path(city): Path<String>,
) -> Result<Json<TrendChart>, ApiError> {
    let lookup = city.clone();
    let series = context
        .store
        .run(move |s| s.daily_series(&lookup))
        .await
        .map_err(|e| {
            tracing::error!(message = "unable to read summaries", city = %city, error = %e);
            ApiError::internal(INTERNAL)
        })?;

    if series.is_empty() {
        return Err(ApiError::not_found(NO_DATA));
    }

    let chart_city = city.clone();
    let rendered = tokio::task::spawn_blocking(move || chart::render_trends_base64(&chart_city, &series)).await;
    match rendered {
        Ok(Ok(image)) => {
            tracing::debug!(message = "rendered trend chart", city = %city, num_bytes = image.len());
            Ok(Json(TrendChart { image }))
        }
        Ok(Err(e)) => {
            tracing::error!(message = "unable to render trend chart", city = %city, error = %e);
            Err(ApiError::internal(INTERNAL))
        }
        Err(e) => {
            tracing::error!(message = "trend chart task failed", city = %city, error = %e);
            Err(ApiError::internal(INTERNAL))
        }
    }
}

async fn text_metrics(State(context): State<Arc<RequestContext>>) -> Response {
    let mut buf = String::new();

    match encode(&mut buf, &context.registry) {
        Ok(_) => {
            tracing::debug!(message = "encoded prometheus metrics to text format", num_bytes = buf.len());
            ([(CONTENT_TYPE, OPEN_METRICS_FORMAT)], buf).into_response()
        }
        Err(e) => {
            tracing::error!(message = "error encoding metrics", error = %e);
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}
