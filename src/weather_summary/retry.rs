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

//! Bounded retries with exponential backoff for provider requests.
//!
//! Timeouts, connection failures, 5xx responses, `408` and `429` are retried.
//! Anything else (including a `404` for an unknown city) is returned to the
//! caller immediately.

use reqwest::{Response, StatusCode};
use std::future::Future;
use std::time::Duration;

pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_INITIAL_DELAY_MILLIS: u64 = 250;
pub const DEFAULT_MAX_DELAY_MILLIS: u64 = 5000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Zero means a single attempt.
    pub max_retries: u32,
    /// Delay before the first retry, doubled for each one after.
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MILLIS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MILLIS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            ..Self::default()
        }
    }

    /// Policy that makes exactly one attempt.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Delay to wait before retry number `retry` (zero based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `attempt` until it yields a non-retryable result or retries are exhausted.
    ///
    /// When the final attempt still has a retryable status, that response is
    /// returned as-is so the caller can decode whatever body the provider sent.
    pub async fn send<F, Fut>(&self, attempt: F) -> Result<Response, reqwest::Error>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<Response, reqwest::Error>>,
    {
        let mut retry = 0;
        loop {
            let exhausted = retry >= self.max_retries;
            match attempt().await {
                Ok(res) if !exhausted && is_retryable_status(res.status()) => {
                    tracing::warn!(message = "retryable provider status", status = %res.status(), retry = retry);
                }
                Ok(res) => return Ok(res),
                Err(e) if !exhausted && is_retryable_error(&e) => {
                    tracing::warn!(message = "retryable provider error", error = %e, retry = retry);
                }
                Err(e) => return Err(e),
            }

            tokio::time::sleep(self.delay_for(retry)).await;
            retry += 1;
        }
    }
}

pub fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::REQUEST_TIMEOUT
}

pub fn is_retryable_error(e: &reqwest::Error) -> bool {
    if e.is_timeout() || e.is_connect() {
        return true;
    }

    e.status().map(is_retryable_status).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::{is_retryable_status, RetryPolicy};
    use reqwest::StatusCode;
    use std::time::Duration;

    #[test]
    fn test_delay_doubles() {
        let policy = RetryPolicy::new(4, Duration::from_millis(100));
        assert_eq!(Duration::from_millis(100), policy.delay_for(0));
        assert_eq!(Duration::from_millis(200), policy.delay_for(1));
        assert_eq!(Duration::from_millis(400), policy.delay_for(2));
    }

    #[test]
    fn test_delay_capped() {
        let policy = RetryPolicy {
            max_retries: 10,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
        };

        assert_eq!(Duration::from_millis(1000), policy.delay_for(4));
        assert_eq!(Duration::from_millis(1000), policy.delay_for(40));
    }

    #[test]
    fn test_retryable_status() {
        assert!(is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::REQUEST_TIMEOUT));

        assert!(!is_retryable_status(StatusCode::OK));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
        assert!(!is_retryable_status(StatusCode::UNAUTHORIZED));
        assert!(!is_retryable_status(StatusCode::BAD_REQUEST));
    }
}
