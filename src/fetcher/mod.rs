//! Check sources and the result they produce.

pub mod greynoise;
#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

const LAST_CHECKED: &str = "last_checked";
const API_LAST_CHECKED: &str = "api_last_checked";

/// Parsed reputation check for the caller's public IP.
///
/// Everything except `last_checked` is passed through from the remote API and
/// may be absent. Fields this crate does not model are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,

    /// Remote verdict, e.g. "clean" or "noise".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<String>,

    /// Whether the IP is seen scanning the internet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noise: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_business_services: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust_level: Option<String>,

    /// Soft error reported in-band by the API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Capture time, stamped on receipt.
    pub last_checked: DateTime<Utc>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CheckResult {
    /// Build a result from a decoded JSON object.
    ///
    /// Scalars are coerced leniently: a numeric `trust_level` becomes its
    /// string form and `"true"`/`"false"` strings become booleans. Values of
    /// any other type are treated as absent. An API-supplied `last_checked`
    /// is kept as `api_last_checked` so the capture stamp stays authoritative.
    pub fn from_object(mut object: Map<String, Value>, last_checked: DateTime<Utc>) -> Self {
        if let Some(api_stamp) = object.remove(LAST_CHECKED) {
            object.insert(API_LAST_CHECKED.to_string(), api_stamp);
        }

        Self {
            ip: take_string(&mut object, "ip"),
            status: take_string(&mut object, "status"),
            classification: take_string(&mut object, "classification"),
            noise: take_bool(&mut object, "noise"),
            common_business_services: take_bool(&mut object, "common_business_services"),
            trust_level: take_string(&mut object, "trust_level"),
            error: take_string(&mut object, "error"),
            last_checked,
            extra: object,
        }
    }

    /// True when the IP has been flagged as noise. A missing flag counts as clean.
    pub fn is_noise(&self) -> bool {
        self.noise.unwrap_or(false)
    }

    /// Compare two results ignoring their capture time.
    pub fn same_check(&self, other: &CheckResult) -> bool {
        self.ip == other.ip
            && self.status == other.status
            && self.classification == other.classification
            && self.noise == other.noise
            && self.common_business_services == other.common_business_services
            && self.trust_level == other.trust_level
            && self.error == other.error
            && self.extra == other.extra
    }
}

fn take_string(object: &mut Map<String, Value>, key: &str) -> Option<String> {
    match object.remove(key)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn take_bool(object: &mut Map<String, Value>, key: &str) -> Option<bool> {
    match object.remove(key)? {
        Value::Bool(b) => Some(b),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

/// Error from a check source.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// Any response other than 200.
    #[error("GreyNoise API returned HTTP {0}")]
    HttpStatus(u16),
    /// Total request deadline exceeded.
    #[error("Timeout connecting to GreyNoise API")]
    Timeout,
    /// Connect, DNS, TLS or body transfer failure.
    #[error("Error communicating with GreyNoise: {0}")]
    Network(String),
    /// 200 response whose body is not a JSON object.
    #[error("Invalid response from GreyNoise API: {0}")]
    MalformedResponse(String),
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::HttpStatus(_) => FetchErrorKind::HttpStatus,
            FetchError::Timeout => FetchErrorKind::Timeout,
            FetchError::Network(_) => FetchErrorKind::Network,
            FetchError::MalformedResponse(_) => FetchErrorKind::MalformedResponse,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Network(e.to_string())
        }
    }
}

/// Failure category, used for structured logging and update-failed signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    HttpStatus,
    Timeout,
    Network,
    MalformedResponse,
}

impl FetchErrorKind {
    /// Transport failures, as opposed to failures in the API's content.
    pub fn is_transport(&self) -> bool {
        matches!(self, FetchErrorKind::Timeout | FetchErrorKind::Network)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FetchErrorKind::HttpStatus => "http_status",
            FetchErrorKind::Timeout => "timeout",
            FetchErrorKind::Network => "network",
            FetchErrorKind::MalformedResponse => "malformed_response",
        }
    }
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something that can produce a [`CheckResult`].
#[async_trait]
pub trait CheckSource: Send + Sync {
    /// Fetch with the periodic refresh budget.
    async fn fetch(&self) -> Result<CheckResult, FetchError>;

    /// Fetch with the setup probe budget.
    async fn probe(&self) -> Result<CheckResult, FetchError> {
        self.fetch().await
    }

    /// Source name for logging.
    fn name(&self) -> &str;
}
