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

use clap::Parser;
use prometheus_client::registry::Registry;
use reqwest::Client;
use std::error::Error;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{self, SignalKind};
use tracing::Level;
use weather_summary::client::{OpenWeatherClient, WeatherSource, DEFAULT_API_URL};
use weather_summary::http::RequestContext;
use weather_summary::metrics::IngestMetrics;
use weather_summary::pipeline::{FailurePolicy, Ingestor};
use weather_summary::retry::{RetryPolicy, DEFAULT_INITIAL_DELAY_MILLIS, DEFAULT_MAX_RETRIES};
use weather_summary::scheduler::{IngestScheduler, DEFAULT_PERIOD};
use weather_summary::store::SummaryStore;
use weather_summary::{alerts, DEFAULT_CITIES};

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_BIND_ADDR: ([u8; 4], u16) = ([127, 0, 0, 1], 5000);
const DEFAULT_TIMEOUT_MILLIS: u64 = 5000;
const DEFAULT_DB_PATH: &str = "weather.db";

#[derive(Debug, Parser)]
#[clap(name = "weather_summary", version = clap::crate_version!())]
struct WeatherSummaryApplication {
    /// API key for OpenWeatherMap
    #[clap(long, env = "OPENWEATHER_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Base URL for the OpenWeatherMap API
    #[clap(long, default_value_t = DEFAULT_API_URL.into())]
    api_url: String,

    /// City to ingest daily summaries for. May be given multiple times.
    #[clap(long = "city", default_values_t = DEFAULT_CITIES.iter().map(|c| c.to_string()))]
    cities: Vec<String>,

    /// Path to the SQLite database summaries are stored in. Created if it doesn't exist.
    #[clap(long, default_value = DEFAULT_DB_PATH)]
    db: PathBuf,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[clap(long, default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,

    /// Ingest daily summaries at this interval, in seconds. Ingestion also runs once at startup.
    #[clap(long, default_value_t = DEFAULT_PERIOD.as_secs())]
    refresh_secs: u64,

    /// Timeout for each request to the OpenWeatherMap API, in milliseconds.
    #[clap(long, default_value_t = DEFAULT_TIMEOUT_MILLIS)]
    timeout_millis: u64,

    /// Times to retry a request to the OpenWeatherMap API that timed out or failed with
    /// a server error.
    #[clap(long, default_value_t = DEFAULT_MAX_RETRIES)]
    max_retries: u32,

    /// Delay before the first retry, in milliseconds. Doubled for each retry after.
    #[clap(long, default_value_t = DEFAULT_INITIAL_DELAY_MILLIS)]
    retry_delay_millis: u64,

    /// Stop an ingestion run at the first city that fails instead of skipping it.
    #[clap(long)]
    fail_fast: bool,

    /// Report tracked cities whose current temperature exceeds this, in degrees celsius.
    #[clap(long, default_value_t = alerts::DEFAULT_THRESHOLD)]
    alert_threshold: f64,

    /// Address to bind to.
    #[clap(long, default_value_t = DEFAULT_BIND_ADDR.into())]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let opts = WeatherSummaryApplication::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(opts.log_level)
            .finish(),
    )?;

    let timeout = Duration::from_millis(opts.timeout_millis);
    let http_client = Client::builder().timeout(timeout).build().unwrap_or_else(|e| {
        tracing::error!(message = "unable to initialize HTTP client", error = %e);
        process::exit(1)
    });

    let retry = RetryPolicy::new(opts.max_retries, Duration::from_millis(opts.retry_delay_millis));
    let client = OpenWeatherClient::new(http_client, &opts.api_url, opts.api_key.clone(), retry).unwrap_or_else(|e| {
        tracing::error!(message = "unable to initialize weather client", error = %e);
        process::exit(1)
    });

    let store = SummaryStore::open(&opts.db).unwrap_or_else(|e| {
        tracing::error!(message = "unable to open summary database", path = %opts.db.display(), error = %e);
        process::exit(1)
    });

    let policy = if opts.fail_fast {
        FailurePolicy::FailFast
    } else {
        FailurePolicy::Continue
    };

    let source: Arc<dyn WeatherSource> = Arc::new(client);
    let mut registry = Registry::default();
    let metrics = IngestMetrics::new(&mut registry);
    let ingestor = Ingestor::new(source.clone(), store.clone(), opts.cities.clone()).with_metrics(metrics);
    let scheduler = IngestScheduler::start(ingestor, Duration::from_secs(opts.refresh_secs), policy);

    let context = Arc::new(RequestContext::new(
        source,
        store,
        opts.cities.clone(),
        opts.alert_threshold,
        registry,
    ));
    let app = weather_summary::http::router(context);
    let server = axum::Server::try_bind(&opts.bind).unwrap_or_else(|e| {
        tracing::error!(message = "error binding to address", address = %opts.bind, error = %e);
        process::exit(1)
    });

    tracing::info!(message = "server started", address = %opts.bind, api_url = %opts.api_url);
    server
        .serve(app.into_make_service())
        .with_graceful_shutdown(async {
            // Wait for either SIGTERM or SIGINT to shutdown
            tokio::select! {
                _ = sigterm() => {}
                _ = sigint() => {}
            }
        })
        .await?;

    scheduler.stop().await;
    tracing::info!("server shutdown");
    Ok(())
}

/// Return after the first SIGTERM signal received by this process
async fn sigterm() -> io::Result<()> {
    unix::signal(SignalKind::terminate())?.recv().await;
    Ok(())
}

/// Return after the first SIGINT signal received by this process
async fn sigint() -> io::Result<()> {
    unix::signal(SignalKind::interrupt())?.recv().await;
    Ok(())
}
