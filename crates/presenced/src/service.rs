use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use presence_core::{
    AttendanceEvent, CaptureMetrics, Descriptor, DescriptorError, EuclideanMatcher,
    EventKind, Identity, IdentitySummary, Matcher, Resolver,
};
use presence_store::{AttendanceStore, EnrollmentStore, StoreError};

use crate::config::Config;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("email already enrolled: {0}")]
    DuplicateEmail(String),
    #[error("no identity enrolled with email {0}")]
    UnknownIdentity(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<DescriptorError> for ServiceError {
    fn from(err: DescriptorError) -> Self {
        ServiceError::Validation(err.to_string())
    }
}

/// Outcome of an attendance submission.
///
/// Not recognizing a face and checking out too early are normal outcomes,
/// not errors.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmitOutcome {
    MatchedCheckIn {
        identity: IdentitySummary,
        event: AttendanceEvent,
    },
    MatchedCheckOut {
        identity: IdentitySummary,
        event: AttendanceEvent,
    },
    NoMatch {
        best_similarity: f32,
    },
    TooSoon {
        identity: IdentitySummary,
        minutes_remaining: f64,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct ServiceOptions {
    pub match_threshold: f32,
    pub min_checkout_minutes: i64,
    /// Required probe length, if any.
    pub descriptor_len: Option<usize>,
    /// Minimum reported detector confidence, if any.
    pub min_detection_score: Option<f32>,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        ServiceOptions::from(&Config::default())
    }
}

impl From<&Config> for ServiceOptions {
    fn from(config: &Config) -> Self {
        Self {
            match_threshold: config.match_threshold,
            min_checkout_minutes: config.min_checkout_minutes,
            descriptor_len: (config.descriptor_len > 0).then_some(config.descriptor_len),
            min_detection_score: (config.min_detection_score > 0.0)
                .then_some(config.min_detection_score),
        }
    }
}

/// Per-identity async locks serializing "read latest, then append".
#[derive(Default)]
struct IdentityLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl IdentityLocks {
    fn lock_for(&self, identity_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        locks.entry(identity_id.to_string()).or_default().clone()
    }
}

/// Enrollment and attendance orchestration over injected stores.
pub struct AttendanceService<E, A> {
    enrollment: E,
    attendance: A,
    resolver: Resolver,
    options: ServiceOptions,
    locks: Arc<IdentityLocks>,
}

impl<E: Clone, A: Clone> Clone for AttendanceService<E, A> {
    fn clone(&self) -> Self {
        Self {
            enrollment: self.enrollment.clone(),
            attendance: self.attendance.clone(),
            resolver: self.resolver,
            options: self.options,
            locks: Arc::clone(&self.locks),
        }
    }
}

impl<E, A> AttendanceService<E, A>
where
    E: EnrollmentStore,
    A: AttendanceStore,
{
    pub fn new(enrollment: E, attendance: A, options: ServiceOptions) -> Self {
        Self {
            enrollment,
            attendance,
            resolver: Resolver::new(options.min_checkout_minutes),
            options,
            locks: Arc::default(),
        }
    }

    pub fn options(&self) -> &ServiceOptions {
        &self.options
    }

    /// Enroll a new identity from one or more descriptor samples.
    ///
    /// Several samples are averaged into a single stored descriptor.
    pub async fn enroll(
        &self,
        name: &str,
        email: &str,
        samples: &[Descriptor],
    ) -> Result<Identity, ServiceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::Validation("name is required".into()));
        }
        let email = normalize_email(email)?;

        for sample in samples {
            self.check_descriptor(sample)?;
        }
        let descriptor = Descriptor::mean(samples)?;

        if self.enrollment.find_by_email(&email).await?.is_some() {
            return Err(ServiceError::DuplicateEmail(email));
        }

        let identity = Identity::new(name, email.clone(), descriptor);
        let identity = match self.enrollment.insert(identity).await {
            Ok(identity) => identity,
            Err(StoreError::Conflict(_)) => return Err(ServiceError::DuplicateEmail(email)),
            Err(StoreError::Invalid(msg)) => return Err(ServiceError::Validation(msg)),
            Err(err) => return Err(err.into()),
        };

        tracing::info!(
            identity = %identity.id,
            email = %identity.email,
            samples = samples.len(),
            "identity enrolled"
        );
        Ok(identity)
    }

    /// Match a probe descriptor and record a check-in or check-out.
    pub async fn submit_attendance(
        &self,
        probe: &Descriptor,
        captured_at: DateTime<Utc>,
        metrics: CaptureMetrics,
    ) -> Result<SubmitOutcome, ServiceError> {
        self.check_descriptor(probe)?;
        self.check_metrics(&metrics)?;

        let candidates = self.enrollment.list_all().await?;
        let result = EuclideanMatcher.find_best_match(probe, &candidates, self.options.match_threshold);
        tracing::debug!(
            candidates = candidates.len(),
            skipped = result.skipped,
            similarity = result.similarity,
            "match scan complete"
        );

        let Some(identity) = result.identity(&candidates) else {
            tracing::info!(best_similarity = result.similarity, "no matching identity");
            return Ok(SubmitOutcome::NoMatch {
                best_similarity: result.similarity,
            });
        };

        let lock = self.locks.lock_for(&identity.id);
        let _guard = lock.lock().await;

        let latest = self.attendance.latest_for(&identity.id).await?;
        let decision = self.resolver.resolve(latest.as_ref(), captured_at);

        let Some(kind) = decision.event_kind() else {
            let minutes_remaining = decision.minutes_remaining().unwrap_or_default();
            tracing::info!(
                identity = %identity.id,
                minutes_remaining,
                "check-out rejected: too soon after check-in"
            );
            return Ok(SubmitOutcome::TooSoon {
                identity: identity.summary(),
                minutes_remaining,
            });
        };

        let event = self
            .attendance
            .append(AttendanceEvent::new(
                &identity.id,
                kind,
                captured_at,
                result.similarity,
                metrics.latency_ms,
            ))
            .await?;

        tracing::info!(
            identity = %identity.id,
            kind = %event.kind,
            similarity = event.similarity,
            "attendance recorded"
        );

        let identity = identity.summary();
        Ok(match event.kind {
            EventKind::CheckIn => SubmitOutcome::MatchedCheckIn { identity, event },
            EventKind::CheckOut => SubmitOutcome::MatchedCheckOut { identity, event },
        })
    }

    /// All enrolled identities, without descriptors.
    pub async fn identities(&self) -> Result<Vec<IdentitySummary>, ServiceError> {
        Ok(self
            .enrollment
            .list_all()
            .await?
            .iter()
            .map(Identity::summary)
            .collect())
    }

    /// Most recent attendance events for the identity enrolled under `email`.
    pub async fn history(
        &self,
        email: &str,
        limit: usize,
    ) -> Result<(IdentitySummary, Vec<AttendanceEvent>), ServiceError> {
        let email = normalize_email(email)?;
        let identity = self
            .enrollment
            .find_by_email(&email)
            .await?
            .ok_or(ServiceError::UnknownIdentity(email))?;
        let events = self.attendance.history_for(&identity.id, limit).await?;
        Ok((identity.summary(), events))
    }

    fn check_descriptor(&self, descriptor: &Descriptor) -> Result<(), ServiceError> {
        descriptor.validate()?;
        match self.options.descriptor_len {
            Some(expected) if descriptor.len() != expected => {
                Err(DescriptorError::LengthMismatch {
                    expected,
                    actual: descriptor.len(),
                }
                .into())
            }
            _ => Ok(()),
        }
    }

    fn check_metrics(&self, metrics: &CaptureMetrics) -> Result<(), ServiceError> {
        if let Some(latency) = metrics.latency_ms {
            if !latency.is_finite() || latency < 0.0 {
                return Err(ServiceError::Validation(format!("invalid latency: {latency}")));
            }
        }
        if let (Some(accuracy), Some(min)) = (metrics.accuracy, self.options.min_detection_score) {
            if !(accuracy >= min) {
                return Err(ServiceError::Validation(format!(
                    "detection score {accuracy:.2} below required {min:.2}"
                )));
            }
        }
        Ok(())
    }
}

fn normalize_email(email: &str) -> Result<String, ServiceError> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(ServiceError::Validation(format!("invalid email: {email:?}"))),
    }
}
