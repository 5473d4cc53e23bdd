//! In-memory store, used by tests and ephemeral runs.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use presence_core::{AttendanceEvent, Identity};
use tokio::sync::RwLock;

use crate::{check_descriptor, AttendanceStore, EnrollmentStore, Result, StoreError};

#[derive(Default)]
struct Inner {
    identities: Vec<Identity>,
    events: HashMap<String, Vec<AttendanceEvent>>,
}

/// Clone-safe handle to a shared in-memory store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EnrollmentStore for MemoryStore {
    async fn list_all(&self) -> Result<Vec<Identity>> {
        Ok(self.inner.read().await.identities.clone())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>> {
        let inner = self.inner.read().await;
        Ok(inner.identities.iter().find(|i| i.email == email).cloned())
    }

    async fn insert(&self, identity: Identity) -> Result<Identity> {
        check_descriptor(&identity)?;
        let mut inner = self.inner.write().await;
        if inner.identities.iter().any(|i| i.email == identity.email) {
            return Err(StoreError::Conflict(format!(
                "email already enrolled: {}",
                identity.email
            )));
        }
        inner.identities.push(identity.clone());
        Ok(identity)
    }
}

#[async_trait]
impl AttendanceStore for MemoryStore {
    async fn latest_for(&self, identity_id: &str) -> Result<Option<AttendanceEvent>> {
        let inner = self.inner.read().await;
        Ok(inner
            .events
            .get(identity_id)
            .and_then(|events| events.iter().max_by_key(|e| e.timestamp))
            .cloned())
    }

    async fn append(&self, event: AttendanceEvent) -> Result<AttendanceEvent> {
        let mut inner = self.inner.write().await;
        inner
            .events
            .entry(event.identity_id.clone())
            .or_default()
            .push(event.clone());
        Ok(event)
    }

    async fn history_for(&self, identity_id: &str, limit: usize) -> Result<Vec<AttendanceEvent>> {
        let inner = self.inner.read().await;
        let mut events = inner.events.get(identity_id).cloned().unwrap_or_default();
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        events.truncate(limit);
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use presence_core::{Descriptor, EventKind};

    #[tokio::test]
    async fn test_insert_rejects_duplicate_email() {
        let store = MemoryStore::new();
        let a = Identity::new("Ada", "ada@example.com", Descriptor::new(vec![0.1]));
        let b = Identity::new("Other Ada", "ada@example.com", Descriptor::new(vec![0.2]));

        store.insert(a).await.unwrap();
        assert!(matches!(store.insert(b).await, Err(StoreError::Conflict(_))));
        assert_eq!(store.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_insert_rejects_non_finite_descriptor() {
        let store = MemoryStore::new();
        let bad = Identity::new("Ada", "ada@example.com", Descriptor::new(vec![0.1, f32::NAN]));

        assert!(matches!(store.insert(bad).await, Err(StoreError::Invalid(_))));
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_latest_and_history_order() {
        let store = MemoryStore::new();
        let t0 = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();

        store
            .append(AttendanceEvent::new("u1", EventKind::CheckIn, t0, 0.9, None))
            .await
            .unwrap();
        store
            .append(AttendanceEvent::new(
                "u1",
                EventKind::CheckOut,
                t0 + Duration::hours(8),
                0.9,
                Some(42.0),
            ))
            .await
            .unwrap();

        let latest = store.latest_for("u1").await.unwrap().unwrap();
        assert_eq!(latest.kind, EventKind::CheckOut);
        assert!(store.latest_for("u2").await.unwrap().is_none());

        let history = store.history_for("u1", 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].kind, EventKind::CheckOut);
        assert_eq!(store.history_for("u1", 1).await.unwrap().len(), 1);
    }
}
