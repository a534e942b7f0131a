//! Snapshot storage backends for dieah-recall
//!
//! Components keep their working state in memory and hand a serialized
//! document to a [`SnapshotStore`] after every mutation. The store only moves
//! bytes; the JSON layout belongs to the component.

mod json;
mod sqlite;

pub use json::JsonFileStore;
pub use sqlite::SqliteStore;

use crate::error::Result;

/// Durable home for one component's snapshot document
pub trait SnapshotStore: Send + Sync {
    /// Read the last saved document, `None` if nothing was saved yet
    fn load(&self) -> Result<Option<String>>;

    /// Replace the saved document
    fn save(&self, document: &str) -> Result<()>;

    /// Forget the saved document
    fn clear(&self) -> Result<()>;

    /// Human-readable location for logs
    fn describe(&self) -> String;
}

/// Store whose writes always fail, counting `clear` calls
#[cfg(test)]
#[derive(Default)]
pub(crate) struct FailingStore {
    pub(crate) clears: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl SnapshotStore for FailingStore {
    fn load(&self) -> Result<Option<String>> {
        Ok(None)
    }

    fn save(&self, _document: &str) -> Result<()> {
        Err(crate::error::Error::storage("disk unavailable"))
    }

    fn clear(&self) -> Result<()> {
        self.clears
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Err(crate::error::Error::storage("disk unavailable"))
    }

    fn describe(&self) -> String {
        "failing".to_string()
    }
}
