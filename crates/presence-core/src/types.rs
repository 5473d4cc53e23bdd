use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::descriptor::Descriptor;

/// An enrolled person and their stored face descriptor.
///
/// Created once at enrollment and never updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub name: String,
    /// Unique across the enrollment store (stored trimmed and lowercased).
    pub email: String,
    pub descriptor: Descriptor,
    pub created_at: DateTime<Utc>,
}

impl Identity {
    /// Build a new identity with a fresh UUID v4 id.
    pub fn new(name: impl Into<String>, email: impl Into<String>, descriptor: Descriptor) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            email: email.into(),
            descriptor,
            created_at: Utc::now(),
        }
    }

    pub fn summary(&self) -> IdentitySummary {
        IdentitySummary {
            id: self.id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }
}

/// Identity fields safe to hand back to callers (no descriptor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySummary {
    pub id: String,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    CheckIn,
    CheckOut,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::CheckIn => "CHECK_IN",
            EventKind::CheckOut => "CHECK_OUT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CHECK_IN" => Some(EventKind::CheckIn),
            "CHECK_OUT" => Some(EventKind::CheckOut),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One check-in or check-out. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceEvent {
    pub id: String,
    pub identity_id: String,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    /// Similarity of the match that produced this event.
    pub similarity: f32,
    /// Client-side detection latency, when reported.
    pub latency_ms: Option<f64>,
}

impl AttendanceEvent {
    pub fn new(
        identity_id: impl Into<String>,
        kind: EventKind,
        timestamp: DateTime<Utc>,
        similarity: f32,
        latency_ms: Option<f64>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            identity_id: identity_id.into(),
            kind,
            timestamp,
            similarity,
            latency_ms,
        }
    }
}

/// Optional capture metrics reported alongside a probe descriptor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureMetrics {
    /// Detector confidence for the captured face, in [0, 1].
    pub accuracy: Option<f32>,
    pub latency_ms: Option<f64>,
}
