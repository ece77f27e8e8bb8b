//! Player persistence
//!
//! The tick loop and the disconnect path decide *when* player data is
//! saved; a [`PlayerStore`] decides *how*.

use crate::entity::{Experience, Transform};
use log::debug;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Everything persisted for one player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerData {
    pub display_name: String,
    pub transform: Transform,
    pub experience: Experience,
    /// Milliseconds since the Unix epoch when this was written
    pub saved_at: u64,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("encoding error: {0}")]
    Encoding(#[from] bincode::Error),
    #[error("{0:?} cannot be used as a storage key")]
    InvalidKey(String),
}

pub trait PlayerStore: Send + Sync {
    /// Previously saved data, or `None` for a player never saved before
    fn load(&self, name: &str) -> Result<Option<PlayerData>, StoreError>;

    fn save(&self, name: &str, data: &PlayerData) -> Result<(), StoreError>;
}

/// Keeps saved data in memory for the lifetime of the process
#[derive(Debug, Default)]
pub struct MemoryStore {
    players: Mutex<HashMap<String, PlayerData>>,
    saves: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful saves so far
    pub fn save_count(&self) -> usize {
        *self.saves.lock()
    }

    pub fn get(&self, name: &str) -> Option<PlayerData> {
        self.players.lock().get(name).cloned()
    }
}

impl PlayerStore for MemoryStore {
    fn load(&self, name: &str) -> Result<Option<PlayerData>, StoreError> {
        Ok(self.get(name))
    }

    fn save(&self, name: &str, data: &PlayerData) -> Result<(), StoreError> {
        self.players.lock().insert(name.to_string(), data.clone());
        *self.saves.lock() += 1;
        Ok(())
    }
}

/// One bincode file per player inside a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Opens `dir`, creating it if needed
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, StoreError> {
        let usable = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !usable {
            return Err(StoreError::InvalidKey(name.to_string()));
        }
        Ok(self.dir.join(format!("{}.dat", name)))
    }
}

impl PlayerStore for FileStore {
    fn load(&self, name: &str) -> Result<Option<PlayerData>, StoreError> {
        let path = self.path_for(name)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let data = bincode::deserialize(&bytes)?;
        debug!("Loaded {} from {}", name, path.display());
        Ok(Some(data))
    }

    fn save(&self, name: &str, data: &PlayerData) -> Result<(), StoreError> {
        let path = self.path_for(name)?;
        let bytes = bincode::serialize(data)?;

        // Write then rename so a crash never leaves a half-written file
        let tmp = path.with_extension("dat.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        debug!("Saved {} to {}", name, path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::get_timestamp;

    fn sample() -> PlayerData {
        PlayerData {
            display_name: "Captain".to_string(),
            transform: Transform::at(10.0, 64.0, -5.0).with_look(180.0, 0.0),
            experience: Experience::new(0.25, 3, 42),
            saved_at: 1_700_000_000_000,
        }
    }

    fn scratch_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "tick-session-{}-{}-{}",
            tag,
            std::process::id(),
            get_timestamp()
        ))
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        assert!(store.load("alex").unwrap().is_none());

        store.save("alex", &sample()).unwrap();
        assert_eq!(store.load("alex").unwrap(), Some(sample()));
        assert_eq!(store.save_count(), 1);
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = scratch_dir("roundtrip");
        let store = FileStore::new(&dir).unwrap();

        assert!(store.load("alex").unwrap().is_none());
        store.save("alex", &sample()).unwrap();
        assert_eq!(store.load("alex").unwrap(), Some(sample()));
        assert!(dir.join("alex.dat").exists());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_file_store_rejects_path_names() {
        let dir = scratch_dir("keys");
        let store = FileStore::new(&dir).unwrap();

        assert!(matches!(
            store.save("../escape", &sample()),
            Err(StoreError::InvalidKey(_))
        ));
        assert!(matches!(store.load(""), Err(StoreError::InvalidKey(_))));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_file_store_corrupt_file() {
        let dir = scratch_dir("corrupt");
        let store = FileStore::new(&dir).unwrap();
        fs::write(dir.join("alex.dat"), [0xFF, 0x01]).unwrap();

        assert!(matches!(store.load("alex"), Err(StoreError::Encoding(_))));

        fs::remove_dir_all(&dir).unwrap();
    }
}
