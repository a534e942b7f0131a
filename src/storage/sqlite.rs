//! SQLite storage for component snapshots

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Error, Result};

use super::SnapshotStore;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS snapshots (
    name TEXT PRIMARY KEY,
    document TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

/// One named row in a shared snapshot database
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    name: String,
}

impl SqliteStore {
    /// Open (or create) the database and address the row `name`
    pub fn open(path: impl AsRef<Path>, name: impl Into<String>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        Self::from_connection(conn, name)
    }

    /// In-memory database, mostly for tests
    pub fn open_in_memory(name: impl Into<String>) -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, name)
    }

    fn from_connection(conn: Connection, name: impl Into<String>) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            name: name.into(),
        })
    }

    /// Another row in the same database, sharing the connection
    pub fn sibling(&self, name: impl Into<String>) -> Self {
        Self {
            conn: self.conn.clone(),
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl SnapshotStore for SqliteStore {
    fn load(&self) -> Result<Option<String>> {
        let conn = self.conn.lock().map_err(|e| Error::storage(e.to_string()))?;

        let document = conn
            .query_row(
                "SELECT document FROM snapshots WHERE name = ?1",
                params![self.name],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        Ok(document)
    }

    fn save(&self, document: &str) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| Error::storage(e.to_string()))?;

        conn.execute(
            r#"
            INSERT INTO snapshots (name, document, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(name) DO UPDATE SET
                document = excluded.document,
                updated_at = excluded.updated_at
            "#,
            params![self.name, document, chrono::Utc::now().to_rfc3339()],
        )?;

        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| Error::storage(e.to_string()))?;
        conn.execute("DELETE FROM snapshots WHERE name = ?1", params![self.name])?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_rows_are_independent() {
        let graph = SqliteStore::open_in_memory("graph").unwrap();
        let index = graph.sibling("index");

        graph.save(r#"{"n":1}"#).unwrap();
        assert!(index.load().unwrap().is_none());

        index.save(r#"{"dimension":4}"#).unwrap();
        assert_eq!(graph.load().unwrap().as_deref(), Some(r#"{"n":1}"#));
        assert_eq!(index.load().unwrap().as_deref(), Some(r#"{"dimension":4}"#));
    }

    #[test]
    fn test_upsert_and_clear() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshots.db");
        {
            let store = SqliteStore::open(&path, "graph").unwrap();
            store.save("first").unwrap();
            store.save("second").unwrap();
        }

        let store = SqliteStore::open(&path, "graph").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("second"));

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }
}
