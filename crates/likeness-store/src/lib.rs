//! likeness-store — registry-side descriptor persistence.
//!
//! One reference descriptor per registered identity, stored in SQLite as
//! its backend tag plus an opaque little-endian float blob. The blob is
//! never interpreted here; validation happens through the engine's codec
//! on load. Re-registration replaces the row in a single statement — a
//! record is never partially written.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use likeness_core::codec::CodecError;
use likeness_core::{Backend, FaceDescriptor};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("stored descriptor for {id} is corrupt: {source}")]
    CorruptDescriptor {
        id: String,
        #[source]
        source: CodecError,
    },
}

/// A registered identity. The descriptor may be absent when extraction
/// failed at registration time (no face found, or backend unavailable).
#[derive(Debug, Clone)]
pub struct IdentityRecord {
    pub id: String,
    pub label: String,
    /// Tag of the backend that produced the stored descriptor, if any.
    pub backend: Option<Backend>,
    /// RFC 3339 registration timestamp.
    pub created_at: String,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS identities (
    id          TEXT PRIMARY KEY,
    label       TEXT NOT NULL,
    backend     TEXT,
    descriptor  BLOB,
    created_at  TEXT NOT NULL
);
";

/// SQLite-backed descriptor store.
pub struct RegistryStore {
    conn: Connection,
}

impl RegistryStore {
    /// Open (or create) the store at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        tracing::debug!(path = %path.display(), "registry store opened");
        Ok(Self { conn })
    }

    /// In-memory store, for tests and diagnostics.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Register an identity, replacing any previous registration under the
    /// same id. A missing id gets a fresh UUID.
    pub fn enroll(
        &self,
        id: Option<String>,
        label: &str,
        descriptor: Option<&FaceDescriptor>,
    ) -> Result<IdentityRecord, StoreError> {
        let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let created_at = chrono::Utc::now().to_rfc3339();

        let (tag, blob) = match descriptor {
            Some(d) => {
                let (tag, bytes) = d.serialize();
                (Some(tag), Some(bytes))
            }
            None => (None, None),
        };

        self.conn.execute(
            "INSERT OR REPLACE INTO identities (id, label, backend, descriptor, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, label, tag, blob, created_at],
        )?;

        Ok(IdentityRecord {
            id,
            label: label.to_string(),
            backend: tag.and_then(Backend::from_tag),
            created_at,
        })
    }

    /// Load the descriptor for an identity. `None` when the identity is
    /// unknown or has no descriptor; a corrupt row is an error.
    pub fn descriptor(&self, id: &str) -> Result<Option<FaceDescriptor>, StoreError> {
        let row: Option<(Option<String>, Option<Vec<u8>>)> = self
            .conn
            .query_row(
                "SELECT backend, descriptor FROM identities WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((Some(tag), Some(blob))) => FaceDescriptor::deserialize(&tag, &blob)
                .map(Some)
                .map_err(|source| StoreError::CorruptDescriptor { id: id.to_string(), source }),
            _ => Ok(None),
        }
    }

    /// Enumerate every identity with a descriptor produced by `backend`,
    /// as the candidate set for a match search. Rows that fail validation
    /// are skipped with a warning rather than poisoning the whole search.
    pub fn candidates(&self, backend: Backend) -> Result<Vec<(String, FaceDescriptor)>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, descriptor FROM identities
             WHERE backend = ?1 AND descriptor IS NOT NULL
             ORDER BY created_at, id",
        )?;

        let rows = stmt.query_map(params![backend.tag()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
        })?;

        let mut candidates = Vec::new();
        for row in rows {
            let (id, blob) = row?;
            match FaceDescriptor::deserialize(backend.tag(), &blob) {
                Ok(descriptor) => candidates.push((id, descriptor)),
                Err(error) => {
                    tracing::warn!(id, %error, "skipping corrupt stored descriptor");
                }
            }
        }

        Ok(candidates)
    }

    /// All registered identities, with or without descriptors.
    pub fn list(&self) -> Result<Vec<IdentityRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, label, backend, created_at FROM identities ORDER BY created_at, id",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(IdentityRecord {
                id: row.get(0)?,
                label: row.get(1)?,
                backend: row
                    .get::<_, Option<String>>(2)?
                    .as_deref()
                    .and_then(Backend::from_tag),
                created_at: row.get(3)?,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    /// Remove an identity. Returns whether a row existed.
    pub fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let affected = self
            .conn
            .execute("DELETE FROM identities WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }
}
