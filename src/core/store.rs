//! Numbered save slots for snapshots.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::core::snapshot::{Snapshot, SnapshotCodec, SnapshotError};

/// Number of save slots, indexed `0..MAX_SAVE_SLOTS`.
pub const MAX_SAVE_SLOTS: usize = 37;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot encoding error: {0}")]
    Codec(#[from] SnapshotError),
    #[error("save slot {index} is out of range (max {max})")]
    SlotOutOfRange { index: usize, max: usize },
}

/// Persistence collaborator the engine writes snapshots through.
pub trait SnapshotStore: Send {
    fn save(&mut self, index: usize, snapshot: &Snapshot) -> Result<(), StoreError>;

    /// `Ok(None)` for an empty slot.
    fn load(&self, index: usize) -> Result<Option<Snapshot>, StoreError>;

    /// Occupied slot indices, ascending.
    fn list(&self) -> Result<Vec<usize>, StoreError>;

    fn delete(&mut self, index: usize) -> Result<(), StoreError>;
}

fn check_index(index: usize) -> Result<(), StoreError> {
    if index >= MAX_SAVE_SLOTS {
        return Err(StoreError::SlotOutOfRange {
            index,
            max: MAX_SAVE_SLOTS,
        });
    }
    Ok(())
}

/// Keeps snapshots in memory. Useful for tests and quick-save.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: BTreeMap<usize, Snapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemoryStore {
    fn save(&mut self, index: usize, snapshot: &Snapshot) -> Result<(), StoreError> {
        check_index(index)?;
        self.slots.insert(index, snapshot.clone());
        Ok(())
    }

    fn load(&self, index: usize) -> Result<Option<Snapshot>, StoreError> {
        check_index(index)?;
        Ok(self.slots.get(&index).cloned())
    }

    fn list(&self) -> Result<Vec<usize>, StoreError> {
        Ok(self.slots.keys().copied().collect())
    }

    fn delete(&mut self, index: usize) -> Result<(), StoreError> {
        check_index(index)?;
        self.slots.remove(&index);
        Ok(())
    }
}

/// One RON file per slot, `save{index}.ron`, under a root directory.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    /// The directory is created on first save.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, index: usize) -> PathBuf {
        self.root.join(format!("save{}.ron", index))
    }
}

fn parse_slot_file_name(name: &str) -> Option<usize> {
    let index = name.strip_prefix("save")?.strip_suffix(".ron")?.parse().ok()?;
    (index < MAX_SAVE_SLOTS).then_some(index)
}

impl SnapshotStore for DirectoryStore {
    fn save(&mut self, index: usize, snapshot: &Snapshot) -> Result<(), StoreError> {
        check_index(index)?;
        std::fs::create_dir_all(&self.root)?;
        let path = self.path_for(index);
        std::fs::write(&path, SnapshotCodec::to_ron(snapshot)?)?;
        info!(slot = index, path = %path.display(), "snapshot_saved");
        Ok(())
    }

    fn load(&self, index: usize) -> Result<Option<Snapshot>, StoreError> {
        check_index(index)?;
        let path = self.path_for(index);
        if !path.exists() {
            debug!(slot = index, "save_slot_empty");
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)?;
        Ok(Some(SnapshotCodec::from_ron(&contents)?))
    }

    fn list(&self) -> Result<Vec<usize>, StoreError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut indices = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if let Some(index) = entry.file_name().to_str().and_then(parse_slot_file_name) {
                indices.push(index);
            }
        }
        indices.sort_unstable();
        Ok(indices)
    }

    fn delete(&mut self, index: usize) -> Result<(), StoreError> {
        check_index(index)?;
        let path = self.path_for(index);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}
