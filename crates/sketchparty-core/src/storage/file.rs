//! File backend: one JSON file per session.

use super::{BoxFuture, Storage, StorageError, StorageResult};
use crate::command::DrawingSession;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

fn io_err(context: String) -> impl FnOnce(io::Error) -> StorageError {
    move |source| StorageError::Io { context, source }
}

/// Writes each session to `<base>/<id>.json`.
pub struct FileStorage {
    base: PathBuf,
}

impl FileStorage {
    /// Open a storage directory, creating it when missing.
    pub fn new(base: impl Into<PathBuf>) -> StorageResult<Self> {
        let base = base.into();
        fs::create_dir_all(&base).map_err(io_err(format!("creating {}", base.display())))?;
        Ok(Self { base })
    }

    /// The platform data directory, e.g.
    /// `~/.local/share/sketchparty/sessions` on Linux.
    pub fn default_location() -> StorageResult<Self> {
        let data = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| StorageError::Io {
                context: "no data directory for this platform".to_string(),
                source: io::Error::from(io::ErrorKind::NotFound),
            })?;
        Self::new(data.join("sketchparty").join("sessions"))
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Ids become file names; anything outside `[A-Za-z0-9_-]` is replaced
    /// so an id cannot escape the storage directory.
    fn path_for(&self, id: &str) -> PathBuf {
        let safe: String = id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.base.join(safe).with_extension("json")
    }
}

impl Storage for FileStorage {
    fn save(&self, id: &str, session: &DrawingSession) -> BoxFuture<'_, StorageResult<()>> {
        let path = self.path_for(id);
        let json = session.to_json();
        Box::pin(async move {
            let json = json?;
            fs::write(&path, json).map_err(io_err(format!("writing {}", path.display())))
        })
    }

    fn load(&self, id: &str) -> BoxFuture<'_, StorageResult<DrawingSession>> {
        let path = self.path_for(id);
        let id = id.to_string();
        Box::pin(async move {
            let json = match fs::read_to_string(&path) {
                Ok(json) => json,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    return Err(StorageError::NotFound(id));
                }
                Err(e) => return Err(io_err(format!("reading {}", path.display()))(e)),
            };
            Ok(DrawingSession::from_json(&json)?)
        })
    }

    fn delete(&self, id: &str) -> BoxFuture<'_, StorageResult<()>> {
        let path = self.path_for(id);
        Box::pin(async move {
            match fs::remove_file(&path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(io_err(format!("deleting {}", path.display()))(e)),
            }
        })
    }

    fn list(&self) -> BoxFuture<'_, StorageResult<Vec<String>>> {
        let base = self.base.clone();
        Box::pin(async move {
            let entries = match fs::read_dir(&base) {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
                Err(e) => return Err(io_err(format!("reading {}", base.display()))(e)),
            };
            let ids = entries
                .flatten()
                .map(|entry| entry.path())
                .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
                .filter_map(|path| path.file_stem()?.to_str().map(str::to_string))
                .collect();
            Ok(ids)
        })
    }

    fn exists(&self, id: &str) -> BoxFuture<'_, StorageResult<bool>> {
        let path = self.path_for(id);
        Box::pin(async move { Ok(path.exists()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::block_on;
    use tempfile::tempdir;

    fn storage(dir: &tempfile::TempDir) -> FileStorage {
        FileStorage::new(dir.path()).unwrap()
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let storage = storage(&dir);
        let session = DrawingSession::new("author", "Alice");

        block_on(storage.save("round-1", &session)).unwrap();
        let loaded = block_on(storage.load("round-1")).unwrap();
        assert_eq!(loaded.session_id, session.session_id);
        assert_eq!(loaded.author_name, "Alice");
    }

    #[test]
    fn test_missing_session_errors() {
        let dir = tempdir().unwrap();
        let storage = storage(&dir);
        let result = block_on(storage.load("nope"));
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_list_skips_foreign_files() {
        let dir = tempdir().unwrap();
        let storage = storage(&dir);
        let session = DrawingSession::new("author", "Alice");

        block_on(storage.save("s1", &session)).unwrap();
        block_on(storage.save("s2", &session)).unwrap();
        fs::write(dir.path().join("notes.txt"), "hi").unwrap();

        let mut ids = block_on(storage.list()).unwrap();
        ids.sort();
        assert_eq!(ids, vec!["s1", "s2"]);
    }

    #[test]
    fn test_delete_then_exists() {
        let dir = tempdir().unwrap();
        let storage = storage(&dir);
        let session = DrawingSession::new("author", "Alice");

        block_on(storage.save("s", &session)).unwrap();
        assert!(block_on(storage.exists("s")).unwrap());
        block_on(storage.delete("s")).unwrap();
        assert!(!block_on(storage.exists("s")).unwrap());
    }

    #[test]
    fn test_id_sanitized_for_file_name() {
        let dir = tempdir().unwrap();
        let storage = storage(&dir);
        let session = DrawingSession::new("author", "Alice");

        block_on(storage.save("round/3:slot*2", &session)).unwrap();
        let loaded = block_on(storage.load("round/3:slot*2")).unwrap();
        assert_eq!(loaded.session_id, session.session_id);
    }
}
