//! presence-store — Enrollment and attendance persistence.
//!
//! The attendance core only sees the [`EnrollmentStore`] and
//! [`AttendanceStore`] traits. [`MemoryStore`] backs tests; [`SqliteStore`]
//! backs the daemon.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use presence_core::{AttendanceEvent, Identity};
use thiserror::Error;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Error, Debug)]
pub enum StoreError {
    /// The backend could not serve the request. Callers may retry.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// A uniqueness constraint rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),
    /// A stored row could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),
    /// The record cannot be stored as given. Retrying will not help.
    #[error("invalid record: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

fn check_descriptor(identity: &Identity) -> Result<()> {
    identity
        .descriptor
        .validate()
        .map_err(|e| StoreError::Invalid(format!("identity {} descriptor: {e}", identity.id)))
}

/// Enrolled identities. Append-only; identities are never updated.
#[async_trait]
pub trait EnrollmentStore: Send + Sync {
    /// All identities in enrollment order (oldest first).
    async fn list_all(&self) -> Result<Vec<Identity>>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>>;

    /// Persist a new identity. Fails with [`StoreError::Conflict`] if the email is taken
    /// and [`StoreError::Invalid`] if the descriptor is empty or non-finite.
    async fn insert(&self, identity: Identity) -> Result<Identity>;
}

/// Attendance events, partitioned by identity.
#[async_trait]
pub trait AttendanceStore: Send + Sync {
    async fn latest_for(&self, identity_id: &str) -> Result<Option<AttendanceEvent>>;

    async fn append(&self, event: AttendanceEvent) -> Result<AttendanceEvent>;

    /// Most recent events for an identity, newest first.
    async fn history_for(&self, identity_id: &str, limit: usize) -> Result<Vec<AttendanceEvent>>;
}
