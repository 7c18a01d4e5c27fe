use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::board::{AssignmentStore, DayBoards, Direction, Group, Student, VehicleSlot, VEHICLE_COUNT};
use crate::error::PersistError;
use crate::imaging::GridSpec;

/// Storage key of the current record layout. A new layout gets a new key; an
/// older record is left alone rather than migrated.
pub const STORAGE_KEY: &str = "transport-board-v7";

/// Everything that survives a restart
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedState {
    pub students: Vec<Student>,
    pub groups: Vec<Group>,
    pub group_lock: bool,
    pub vehicles: [VehicleSlot; VEHICLE_COUNT],
    pub panel_width: u32,
    pub grid: GridSpec,
    pub by_date: BTreeMap<NaiveDate, DayBoards>,
    pub selected_date: NaiveDate,
    pub mode: Direction,
}

/// A JSON file holding one [`SavedState`] under [`STORAGE_KEY`]
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    /// The state file inside a data directory
    pub fn in_dir<P: AsRef<Path>>(dir: P) -> Self {
        StateFile {
            path: dir.as_ref().join(format!("{}.json", STORAGE_KEY)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the saved state; `None` when nothing has been saved yet
    pub fn load(&self) -> Result<Option<SavedState>, PersistError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(PersistError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let state = serde_json::from_str(&raw).map_err(|source| PersistError::Json {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = %self.path.display(), "state loaded");
        Ok(Some(state))
    }

    /// Writes the state next to the target and renames it into place
    pub fn save(&self, state: &SavedState) -> Result<(), PersistError> {
        let io_err = |source| PersistError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(state).map_err(|source| PersistError::Json {
            path: self.path.clone(),
            source,
        })?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }

    /// Loads the store, falling back to a fresh board when nothing usable is
    /// on disk
    pub fn load_store(&self, today: NaiveDate) -> AssignmentStore {
        match self.load() {
            Ok(Some(saved)) => AssignmentStore::from_saved(saved, today),
            Ok(None) => {
                info!(path = %self.path.display(), "no saved state, starting fresh");
                AssignmentStore::new(today)
            }
            Err(e) => {
                tracing::warn!(error = %e, "ignoring unreadable saved state");
                AssignmentStore::new(today)
            }
        }
    }

    pub fn save_store(&self, store: &AssignmentStore) -> Result<(), PersistError> {
        self.save(&store.to_saved())
    }
}
