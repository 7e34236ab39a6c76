//! HTTP fetcher for the GreyNoise community check endpoint.

use super::{CheckResult, CheckSource, FetchError};
use crate::config::ApiConfig;
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// GreyNoise check fetcher.
pub struct GreyNoiseFetcher {
    client: Client,
    url: String,
    refresh_timeout: Duration,
    probe_timeout: Duration,
    last_stamp: Mutex<Option<DateTime<Utc>>>,
}

impl GreyNoiseFetcher {
    /// Create a new fetcher.
    ///
    /// A client that cannot be built is a local setup fault, not a fetch
    /// outcome, so it is reported as a plain error.
    pub fn new(config: &ApiConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            url: config.url.clone(),
            refresh_timeout: config.refresh_timeout(),
            probe_timeout: config.probe_timeout(),
            last_stamp: Mutex::new(None),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Perform one GET bounded by `timeout`.
    pub async fn fetch_with_timeout(&self, timeout: Duration) -> Result<CheckResult, FetchError> {
        debug!(
            url = %self.url,
            timeout_ms = timeout.as_millis() as u64,
            "Querying GreyNoise check API"
        );

        let response = self
            .client
            .get(&self.url)
            .header(ACCEPT, "application/json")
            .timeout(timeout)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            debug!(status = status.as_u16(), "GreyNoise API returned non-200 status");
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        // The content type is not trusted, so the body is decoded by hand
        let body = response.text().await?;
        let value: Value = serde_json::from_str(&body)
            .map_err(|e| FetchError::MalformedResponse(format!("invalid JSON: {}", e)))?;

        let object = match value {
            Value::Object(object) => object,
            other => {
                return Err(FetchError::MalformedResponse(format!(
                    "expected JSON object, got {}",
                    json_type(&other)
                )))
            }
        };

        let result = CheckResult::from_object(object, self.stamp());

        debug!(
            ip = ?result.ip,
            status = ?result.status,
            noise = ?result.noise,
            trust_level = ?result.trust_level,
            "GreyNoise check response"
        );

        Ok(result)
    }

    /// Capture time for a new result, never earlier than the previous one.
    fn stamp(&self) -> DateTime<Utc> {
        let now = Utc::now();
        match self.last_stamp.lock() {
            Ok(mut last) => {
                let stamp = match *last {
                    Some(previous) if previous > now => previous,
                    _ => now,
                };
                *last = Some(stamp);
                stamp
            }
            Err(_) => now,
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[async_trait]
impl CheckSource for GreyNoiseFetcher {
    async fn fetch(&self) -> Result<CheckResult, FetchError> {
        self.fetch_with_timeout(self.refresh_timeout).await
    }

    async fn probe(&self) -> Result<CheckResult, FetchError> {
        self.fetch_with_timeout(self.probe_timeout).await
    }

    fn name(&self) -> &str {
        "greynoise"
    }
}
