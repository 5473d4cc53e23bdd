use std::time::Instant;

use presence_store::SqliteStore;
use zbus::interface;

use crate::request;
use crate::service::{AttendanceService, ServiceError};

pub const BUS_NAME: &str = "org.presence.Attendance1";
pub const OBJECT_PATH: &str = "/org/presence/Attendance1";

/// Upper bound on events returned by a single History call.
const MAX_HISTORY: u32 = 1000;

impl From<ServiceError> for zbus::fdo::Error {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(msg) => zbus::fdo::Error::InvalidArgs(msg),
            ServiceError::DuplicateEmail(email) => {
                zbus::fdo::Error::FileExists(format!("email already enrolled: {email}"))
            }
            ServiceError::UnknownIdentity(email) => {
                zbus::fdo::Error::UnknownObject(format!("no identity enrolled with email {email}"))
            }
            ServiceError::Store(e) => zbus::fdo::Error::Failed(e.to_string()),
        }
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
}

/// D-Bus interface for the Presence attendance daemon.
///
/// Bus name: org.presence.Attendance1
/// Object path: /org/presence/Attendance1
///
/// Arguments and replies are JSON strings.
pub struct AttendanceInterface {
    service: AttendanceService<SqliteStore, SqliteStore>,
    db_path: String,
    started: Instant,
}

impl AttendanceInterface {
    pub fn new(service: AttendanceService<SqliteStore, SqliteStore>, db_path: String) -> Self {
        Self {
            service,
            db_path,
            started: Instant::now(),
        }
    }
}

#[interface(name = "org.presence.Attendance1")]
impl AttendanceInterface {
    /// Enroll a new identity. `descriptor` is one array or an array of sample arrays.
    async fn enroll(&self, name: &str, email: &str, descriptor: &str) -> zbus::fdo::Result<String> {
        tracing::info!(email, "enroll requested");
        let samples = request::parse_samples(descriptor)?;
        let identity = self.service.enroll(name, email, &samples).await?;
        to_json(&identity.summary())
    }

    /// Match a probe descriptor and record attendance.
    async fn submit(
        &self,
        descriptor: &str,
        captured_at: &str,
        metrics: &str,
    ) -> zbus::fdo::Result<String> {
        tracing::debug!("submit requested");
        let probe = request::parse_descriptor(descriptor)?;
        let captured_at = request::parse_captured_at(captured_at)?;
        let metrics = request::parse_metrics(metrics)?;
        let outcome = self
            .service
            .submit_attendance(&probe, captured_at, metrics)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "submit failed");
                e
            })?;
        to_json(&outcome)
    }

    /// List enrolled identities (without descriptors).
    async fn list_identities(&self) -> zbus::fdo::Result<String> {
        let identities = self.service.identities().await?;
        to_json(&identities)
    }

    /// Most recent attendance events for an identity, newest first.
    async fn history(&self, email: &str, limit: u32) -> zbus::fdo::Result<String> {
        let limit = limit.clamp(1, MAX_HISTORY) as usize;
        let (identity, events) = self.service.history(email, limit).await?;
        to_json(&serde_json::json!({
            "identity": identity,
            "events": events,
        }))
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let options = self.service.options();
        let enrolled = match self.service.identities().await {
            Ok(identities) => serde_json::json!(identities.len()),
            Err(e) => serde_json::json!(format!("unavailable: {e}")),
        };
        to_json(&serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "database": self.db_path,
            "enrolled": enrolled,
            "uptime_secs": self.started.elapsed().as_secs(),
            "match_threshold": options.match_threshold,
            "min_checkout_minutes": options.min_checkout_minutes,
            "descriptor_len": options.descriptor_len,
        }))
    }
}
