//! libSQL storage layer for cards, decks, users and login sessions.
//!
//! The [`Storage`] struct wraps a single libSQL connection. By default the
//! database lives in process memory ([`Storage::open_in_memory`]) and is
//! gone when the server exits; [`Storage::open`] persists to a file.

mod cards;
mod decks;
mod migrations;
mod users;

use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use studycards_shared::{Result, StudyCardsError};
use tokio::sync::{Mutex, MutexGuard};

pub use users::Credentials;

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    /// Serializes writers. Read-modify-write updates and multi-statement
    /// deletes hold it for their whole sequence, since every task shares
    /// `conn` and would otherwise interleave.
    writes: Mutex<()>,
}

impl Storage {
    /// Open a fresh in-memory database.
    pub async fn open_in_memory() -> Result<Self> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(storage_err)?;

        Self::from_database(db).await
    }

    /// Open or create a database file at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StudyCardsError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;

        Self::from_database(db).await
    }

    /// Open the file at `path` when given, otherwise an in-memory database.
    pub async fn open_configured(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                tracing::info!(?path, "opening database file");
                Self::open(path).await
            }
            None => {
                tracing::info!("using in-memory database; data is lost on exit");
                Self::open_in_memory().await
            }
        }
    }

    async fn from_database(db: Database) -> Result<Self> {
        let conn = db.connect().map_err(storage_err)?;
        let storage = Self {
            db,
            conn,
            writes: Mutex::new(()),
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    pub(crate) async fn write_lock(&self) -> MutexGuard<'_, ()> {
        self.writes.lock().await
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        StudyCardsError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }
}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

pub(crate) fn storage_err(e: impl std::fmt::Display) -> StudyCardsError {
    StudyCardsError::Storage(e.to_string())
}

/// True when `e` is a UNIQUE / PRIMARY KEY constraint violation.
pub(crate) fn is_unique_violation(e: &libsql::Error) -> bool {
    e.to_string().contains("UNIQUE constraint failed")
}

pub(crate) fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StudyCardsError::Storage(format!("invalid date '{s}': {e}")))
}

pub(crate) fn get_string(row: &libsql::Row, idx: i32) -> Result<String> {
    row.get::<String>(idx).map_err(storage_err)
}

pub(crate) fn get_time(row: &libsql::Row, idx: i32) -> Result<DateTime<Utc>> {
    parse_time(&get_string(row, idx)?)
}

pub(crate) fn tags_to_json(tags: &[String]) -> Result<String> {
    serde_json::to_string(tags).map_err(storage_err)
}

pub(crate) fn tags_from_json(json: &str) -> Result<Vec<String>> {
    serde_json::from_str(json).map_err(|e| StudyCardsError::Storage(format!("invalid tags: {e}")))
}


#[cfg(test)]
mod tests {
    use super::test_support::test_storage;
    use super::*;

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        let version = storage.get_schema_version().await;
        assert_eq!(version, 2);
    }

    #[tokio::test]
    async fn file_database_persists_across_opens() {
        let tmp = std::env::temp_dir().join(format!("sc_test_{}.db", studycards_shared::new_id()));
        let storage = Storage::open(&tmp).await.expect("open file db");
        let card = storage
            .insert_card(&studycards_shared::CardCreate {
                front: "Q".into(),
                back: "A".into(),
                ..Default::default()
            })
            .await
            .expect("insert card");
        drop(storage);

        let reopened = Storage::open(&tmp).await.expect("reopen");
        assert_eq!(reopened.get_schema_version().await, 2);
        let found = reopened.get_card(&card.id).await.expect("get card");
        assert!(found.is_some());
        let _ = std::fs::remove_file(&tmp);
    }

    #[test]
    fn tags_json_roundtrip() {
        let tags = vec!["rust".to_string(), "memory".to_string()];
        let json = tags_to_json(&tags).unwrap();
        assert_eq!(tags_from_json(&json).unwrap(), tags);
        assert!(tags_from_json("not json").is_err());
    }
}
