//! In-memory backend, for tests and ephemeral games.

use super::{BoxFuture, Storage, StorageError, StorageResult};
use crate::command::DrawingSession;
use std::collections::BTreeMap;
use std::sync::RwLock;

/// Keeps sessions in a map; everything is gone when the process exits.
#[derive(Default)]
pub struct MemoryStorage {
    sessions: RwLock<BTreeMap<String, DrawingSession>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions.
    pub fn count(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }
}

impl Storage for MemoryStorage {
    fn save(&self, id: &str, session: &DrawingSession) -> BoxFuture<'_, StorageResult<()>> {
        let id = id.to_string();
        let session = session.clone();
        Box::pin(async move {
            self.sessions
                .write()
                .map_err(|_| StorageError::LockPoisoned)?
                .insert(id, session);
            Ok(())
        })
    }

    fn load(&self, id: &str) -> BoxFuture<'_, StorageResult<DrawingSession>> {
        let id = id.to_string();
        Box::pin(async move {
            self.sessions
                .read()
                .map_err(|_| StorageError::LockPoisoned)?
                .get(&id)
                .cloned()
                .ok_or(StorageError::NotFound(id))
        })
    }

    fn delete(&self, id: &str) -> BoxFuture<'_, StorageResult<()>> {
        let id = id.to_string();
        Box::pin(async move {
            self.sessions
                .write()
                .map_err(|_| StorageError::LockPoisoned)?
                .remove(&id);
            Ok(())
        })
    }

    fn list(&self) -> BoxFuture<'_, StorageResult<Vec<String>>> {
        Box::pin(async move {
            Ok(self
                .sessions
                .read()
                .map_err(|_| StorageError::LockPoisoned)?
                .keys()
                .cloned()
                .collect())
        })
    }

    fn exists(&self, id: &str) -> BoxFuture<'_, StorageResult<bool>> {
        let id = id.to_string();
        Box::pin(async move {
            Ok(self
                .sessions
                .read()
                .map_err(|_| StorageError::LockPoisoned)?
                .contains_key(&id))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::block_on;

    #[test]
    fn test_save_then_load() {
        let storage = MemoryStorage::new();
        let session = DrawingSession::new("a", "Alice");

        block_on(storage.save("round-1", &session)).unwrap();
        let loaded = block_on(storage.load("round-1")).unwrap();
        assert_eq!(loaded.session_id, session.session_id);
        assert_eq!(storage.count(), 1);
    }

    #[test]
    fn test_missing_session_errors() {
        let storage = MemoryStorage::new();
        let result = block_on(storage.load("nope"));
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let storage = MemoryStorage::new();
        let session = DrawingSession::new("a", "Alice");

        block_on(storage.save("s", &session)).unwrap();
        block_on(storage.delete("s")).unwrap();
        block_on(storage.delete("s")).unwrap();
        assert!(!block_on(storage.exists("s")).unwrap());
    }

    #[test]
    fn test_list_sorted_by_id() {
        let storage = MemoryStorage::new();
        let session = DrawingSession::new("a", "Alice");

        block_on(storage.save("s2", &session)).unwrap();
        block_on(storage.save("s1", &session)).unwrap();
        assert_eq!(block_on(storage.list()).unwrap(), vec!["s1", "s2"]);
    }
}
