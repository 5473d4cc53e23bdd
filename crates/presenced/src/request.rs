//! Decoding of the JSON string arguments carried by D-Bus calls.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use presence_core::{CaptureMetrics, Descriptor};

use crate::service::ServiceError;

/// One descriptor, or several captures of the same face.
#[derive(Deserialize)]
#[serde(untagged)]
enum Samples {
    One(Descriptor),
    Many(Vec<Descriptor>),
}

pub fn parse_descriptor(json: &str) -> Result<Descriptor, ServiceError> {
    serde_json::from_str(json)
        .map_err(|e| ServiceError::Validation(format!("descriptor must be a JSON number array: {e}")))
}

/// Accepts `[f, f, ...]` or `[[f, ...], [f, ...]]`.
pub fn parse_samples(json: &str) -> Result<Vec<Descriptor>, ServiceError> {
    match serde_json::from_str::<Samples>(json) {
        Ok(Samples::One(d)) => Ok(vec![d]),
        Ok(Samples::Many(ds)) => Ok(ds),
        Err(_) => Err(ServiceError::Validation(
            "descriptor must be a number array or an array of number arrays".into(),
        )),
    }
}

/// RFC 3339 timestamp; an empty string means "now".
pub fn parse_captured_at(raw: &str) -> Result<DateTime<Utc>, ServiceError> {
    if raw.trim().is_empty() {
        return Ok(Utc::now());
    }
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ServiceError::Validation(format!("invalid timestamp {raw:?}: {e}")))
}

/// `{"accuracy": f, "latencyMs": f}`, both optional; an empty string means none.
pub fn parse_metrics(json: &str) -> Result<CaptureMetrics, ServiceError> {
    if json.trim().is_empty() {
        return Ok(CaptureMetrics::default());
    }
    serde_json::from_str(json).map_err(|e| ServiceError::Validation(format!("invalid metrics: {e}")))
}
