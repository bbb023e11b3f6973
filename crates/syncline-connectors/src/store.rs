//! Durable storage for enumerator snapshots.
//!
//! The engine's checkpoint coordinator normally owns persistence; this
//! store covers deployments that keep enumerator state next to the job on
//! local disk. Files are written atomically (temp file + rename) and named
//! `enumerator-<checkpoint id>.state` with the id zero-padded so that
//! lexical and numeric order agree.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::StateError;
use crate::state::{EnumeratorState, StateCodec};

const FILE_PREFIX: &str = "enumerator-";
const FILE_SUFFIX: &str = ".state";

/// Persistence backend for [`EnumeratorState`] snapshots.
pub trait EnumeratorStateStore: Send + Sync {
    /// Persists the snapshot taken for `checkpoint_id`.
    ///
    /// # Errors
    ///
    /// Returns `StateError` on encoding or I/O failure.
    fn save(&self, checkpoint_id: u64, state: &EnumeratorState) -> Result<(), StateError>;

    /// Loads the snapshot for `checkpoint_id`, if present.
    ///
    /// # Errors
    ///
    /// Returns `StateError` if the snapshot exists but cannot be read or decoded.
    fn load(&self, checkpoint_id: u64) -> Result<Option<EnumeratorState>, StateError>;

    /// Loads the newest decodable snapshot together with its checkpoint id.
    ///
    /// # Errors
    ///
    /// Returns `StateError` if the store cannot be listed.
    fn load_latest(&self) -> Result<Option<(u64, EnumeratorState)>, StateError>;

    /// Checkpoint ids with a stored snapshot, ascending.
    ///
    /// # Errors
    ///
    /// Returns `StateError` if the store cannot be listed.
    fn list(&self) -> Result<Vec<u64>, StateError>;
}

/// Filesystem-backed [`EnumeratorStateStore`].
#[derive(Debug, Clone)]
pub struct FileStateStore {
    dir: PathBuf,
    max_retained: usize,
}

impl FileStateStore {
    /// Creates a store rooted at `dir`, keeping at most `max_retained`
    /// snapshots (at least one).
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, max_retained: usize) -> Self {
        Self {
            dir: dir.into(),
            max_retained: max_retained.max(1),
        }
    }

    /// The store's directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, checkpoint_id: u64) -> PathBuf {
        self.dir
            .join(format!("{FILE_PREFIX}{checkpoint_id:020}{FILE_SUFFIX}"))
    }

    fn parse_id(file_name: &str) -> Option<u64> {
        file_name
            .strip_prefix(FILE_PREFIX)?
            .strip_suffix(FILE_SUFFIX)?
            .parse()
            .ok()
    }

    /// Deletes snapshots beyond the newest `max_retained`.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Io` if the directory cannot be listed.
    pub fn prune(&self) -> Result<usize, StateError> {
        let ids = self.list()?;
        let excess = ids.len().saturating_sub(self.max_retained);
        let mut removed = 0;
        for id in &ids[..excess] {
            match fs::remove_file(self.path_for(*id)) {
                Ok(()) => removed += 1,
                Err(e) => warn!(checkpoint_id = id, error = %e, "failed to prune enumerator state"),
            }
        }
        Ok(removed)
    }
}

impl EnumeratorStateStore for FileStateStore {
    fn save(&self, checkpoint_id: u64, state: &EnumeratorState) -> Result<(), StateError> {
        let bytes = StateCodec::encode(state)?;
        fs::create_dir_all(&self.dir)?;

        let path = self.path_for(checkpoint_id);
        let tmp = path.with_extension("state.tmp");
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, &path)?;
        debug!(checkpoint_id, bytes = bytes.len(), "enumerator state saved");

        self.prune()?;
        Ok(())
    }

    fn load(&self, checkpoint_id: u64) -> Result<Option<EnumeratorState>, StateError> {
        let path = self.path_for(checkpoint_id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        StateCodec::decode(&bytes).map(Some)
    }

    fn load_latest(&self) -> Result<Option<(u64, EnumeratorState)>, StateError> {
        for id in self.list()?.into_iter().rev() {
            match self.load(id) {
                Ok(Some(state)) => return Ok(Some((id, state))),
                Ok(None) => debug!(checkpoint_id = id, "enumerator state vanished, skipping"),
                Err(e) => warn!(
                    checkpoint_id = id,
                    error = %e,
                    "[SYN-6002] enumerator state unreadable, trying older snapshot"
                ),
            }
        }
        Ok(None)
    }

    fn list(&self) -> Result<Vec<u64>, StateError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry?;
            if let Some(id) = entry.file_name().to_str().and_then(Self::parse_id) {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::split::{SplitCursor, SplitDescriptor, SubtaskId, TablePath};

    fn state_with_split(id: &str) -> EnumeratorState {
        let table = TablePath::new("db", "t");
        let mut pending_splits = BTreeMap::new();
        pending_splits.insert(
            SubtaskId(0),
            vec![SplitDescriptor::new(id, table.clone(), SplitCursor::Full)],
        );
        EnumeratorState {
            pending_tables: vec![table],
            pending_splits,
        }
    }

    #[test]
    fn test_save_load_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path(), 5);

        store.save(7, &state_with_split("a")).unwrap();
        store.save(12, &state_with_split("b")).unwrap();

        assert_eq!(store.list().unwrap(), vec![7, 12]);
        assert_eq!(store.load(7).unwrap(), Some(state_with_split("a")));
        assert_eq!(store.load(8).unwrap(), None);

        let (id, latest) = store.load_latest().unwrap().unwrap();
        assert_eq!(id, 12);
        assert_eq!(latest, state_with_split("b"));
    }

    #[test]
    fn test_retention_prunes_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path(), 2);
        for id in 1..=4 {
            store.save(id, &EnumeratorState::empty()).unwrap();
        }
        assert_eq!(store.list().unwrap(), vec![3, 4]);
    }

    #[test]
    fn test_load_latest_falls_back_past_corrupt_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path(), 5);
        store.save(1, &state_with_split("good")).unwrap();
        store.save(2, &state_with_split("bad")).unwrap();

        fs::write(store.path_for(2), b"SNES garbage").unwrap();
        assert!(store.load(2).is_err());

        let (id, state) = store.load_latest().unwrap().unwrap();
        assert_eq!(id, 1);
        assert_eq!(state, state_with_split("good"));
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("never-created"), 3);
        assert!(store.list().unwrap().is_empty());
        assert!(store.load_latest().unwrap().is_none());
    }

    #[test]
    fn test_ignores_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path(), 3);
        store.save(3, &EnumeratorState::empty()).unwrap();
        fs::write(dir.path().join("notes.txt"), b"hello").unwrap();
        fs::write(dir.path().join("enumerator-x.state"), b"nope").unwrap();
        assert_eq!(store.list().unwrap(), vec![3]);
    }
}
