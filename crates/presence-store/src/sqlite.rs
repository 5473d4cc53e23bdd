//! SQLite-backed store.
//!
//! All statements run on `tokio-rusqlite`'s connection thread. Rows are
//! fetched raw inside the closure and decoded afterwards. A corrupt event row
//! or looked-up identity surfaces as [`StoreError::Corrupt`]; `list_all`
//! skips undecodable identities with a warning.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use presence_core::{AttendanceEvent, Descriptor, EventKind, Identity};
use rusqlite::{params, OptionalExtension};
use tokio_rusqlite::Connection;

use crate::{check_descriptor, AttendanceStore, EnrollmentStore, Result, StoreError};

const SCHEMA_VERSION: i64 = 1;

impl From<tokio_rusqlite::Error> for StoreError {
    fn from(err: tokio_rusqlite::Error) -> Self {
        match err {
            tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, msg))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::Conflict(msg.unwrap_or_else(|| e.to_string()))
            }
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

/// Clone-safe handle to the SQLite database.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Connection,
}

struct IdentityRow {
    id: String,
    name: String,
    email: String,
    descriptor: String,
    created_at_ms: i64,
}

struct EventRow {
    id: String,
    identity_id: String,
    kind: String,
    timestamp_ms: i64,
    similarity: f64,
    latency_ms: Option<f64>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and apply migrations.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Unavailable(format!("create {}: {e}", parent.display()))
                })?;
            }
        }
        let conn = Connection::open(path).await?;
        let store = Self { conn };
        let version = store.migrate().await?;
        tracing::info!(path = %path.display(), version, "attendance database opened");
        Ok(store)
    }

    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        let store = Self { conn };
        store.migrate().await?;
        Ok(store)
    }

    /// Bring the schema up to date. Returns the version found before migrating.
    async fn migrate(&self) -> Result<i64> {
        let version = self
            .conn
            .call(|conn| {
                conn.pragma_update(None, "foreign_keys", "ON")?;
                let version: i64 =
                    conn.query_row("SELECT user_version FROM pragma_user_version;", [], |row| {
                        row.get(0)
                    })?;

                if version < 1 {
                    conn.execute_batch(include_str!("sql/001-initial.sql"))?;
                    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
                }
                Ok(version)
            })
            .await?;

        if version < SCHEMA_VERSION {
            tracing::info!(from = version, to = SCHEMA_VERSION, "migrated attendance schema");
        }
        Ok(version)
    }
}

fn timestamp(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp out of range: {ms}")))
}

impl TryFrom<IdentityRow> for Identity {
    type Error = StoreError;

    fn try_from(row: IdentityRow) -> Result<Self> {
        let descriptor: Descriptor = serde_json::from_str(&row.descriptor)
            .map_err(|e| StoreError::Corrupt(format!("identity {} descriptor: {e}", row.id)))?;
        Ok(Identity {
            created_at: timestamp(row.created_at_ms)?,
            id: row.id,
            name: row.name,
            email: row.email,
            descriptor,
        })
    }
}

impl TryFrom<EventRow> for AttendanceEvent {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self> {
        let kind = EventKind::parse(&row.kind)
            .ok_or_else(|| StoreError::Corrupt(format!("event {} kind: {}", row.id, row.kind)))?;
        Ok(AttendanceEvent {
            timestamp: timestamp(row.timestamp_ms)?,
            id: row.id,
            identity_id: row.identity_id,
            kind,
            similarity: row.similarity as f32,
            latency_ms: row.latency_ms,
        })
    }
}

fn event_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EventRow> {
    Ok(EventRow {
        id: row.get(0)?,
        identity_id: row.get(1)?,
        kind: row.get(2)?,
        timestamp_ms: row.get(3)?,
        similarity: row.get(4)?,
        latency_ms: row.get(5)?,
    })
}

fn identity_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<IdentityRow> {
    Ok(IdentityRow {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        descriptor: row.get(3)?,
        created_at_ms: row.get(4)?,
    })
}

#[async_trait]
impl EnrollmentStore for SqliteStore {
    async fn list_all(&self) -> Result<Vec<Identity>> {
        let rows = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, email, descriptor, created_at_ms FROM identities
                     ORDER BY created_at_ms ASC, rowid ASC",
                )?;
                let rows = stmt
                    .query_map([], identity_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        let total = rows.len();
        let identities: Vec<Identity> = rows
            .into_iter()
            .filter_map(|row| match Identity::try_from(row) {
                Ok(identity) => Some(identity),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping undecodable identity row");
                    None
                }
            })
            .collect();
        if identities.len() < total {
            tracing::warn!(
                skipped = total - identities.len(),
                total,
                "identity listing incomplete"
            );
        }
        Ok(identities)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>> {
        let email = email.to_string();
        let row = self
            .conn
            .call(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT id, name, email, descriptor, created_at_ms FROM identities
                         WHERE email = ?1",
                        [&email],
                        identity_row,
                    )
                    .optional()?;
                Ok(row)
            })
            .await?;

        row.map(Identity::try_from).transpose()
    }

    async fn insert(&self, identity: Identity) -> Result<Identity> {
        check_descriptor(&identity)?;
        let descriptor = serde_json::to_string(&identity.descriptor)
            .map_err(|e| StoreError::Invalid(format!("encode descriptor: {e}")))?;
        let row = identity.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO identities (id, name, email, descriptor, created_at_ms)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        row.id,
                        row.name,
                        row.email,
                        descriptor,
                        row.created_at.timestamp_millis()
                    ],
                )?;
                Ok(())
            })
            .await?;

        tracing::debug!(identity = %identity.id, "identity stored");
        Ok(identity)
    }
}

#[async_trait]
impl AttendanceStore for SqliteStore {
    async fn latest_for(&self, identity_id: &str) -> Result<Option<AttendanceEvent>> {
        let identity_id = identity_id.to_string();
        let row = self
            .conn
            .call(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT id, identity_id, kind, timestamp_ms, similarity, latency_ms
                         FROM attendance WHERE identity_id = ?1
                         ORDER BY timestamp_ms DESC, rowid DESC LIMIT 1",
                        [&identity_id],
                        event_row,
                    )
                    .optional()?;
                Ok(row)
            })
            .await?;

        row.map(AttendanceEvent::try_from).transpose()
    }

    async fn append(&self, event: AttendanceEvent) -> Result<AttendanceEvent> {
        let row = event.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO attendance (id, identity_id, kind, timestamp_ms, similarity, latency_ms)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        row.id,
                        row.identity_id,
                        row.kind.as_str(),
                        row.timestamp.timestamp_millis(),
                        row.similarity as f64,
                        row.latency_ms
                    ],
                )?;
                Ok(())
            })
            .await?;

        Ok(event)
    }

    async fn history_for(&self, identity_id: &str, limit: usize) -> Result<Vec<AttendanceEvent>> {
        let identity_id = identity_id.to_string();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, identity_id, kind, timestamp_ms, similarity, latency_ms
                     FROM attendance WHERE identity_id = ?1
                     ORDER BY timestamp_ms DESC, rowid DESC LIMIT ?2",
                )?;
                let rows = stmt
                    .query_map(params![identity_id, limit], event_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter().map(AttendanceEvent::try_from).collect()
    }
}
