//! Persistence of tracker state as JSON under `.tally/state.json`.
//!
//! Loading is forgiving: a collection that fails to deserialize is replaced
//! by an empty one, and a file whose stat history is unreadable keeps its
//! other fields. Every fallback is reported as a diagnostic instead of an
//! error so one bad record never loses the rest of the state.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use tally_core::error::TallyError;
use tally_core::snapshot::{FileRecord, Snapshot};

/// Name of the per-vault state directory.
pub const STATE_DIR: &str = ".tally";
const STATE_FILE: &str = "state.json";
const CONFIG_FILE: &str = "config.toml";

/// Path of the settings file of the vault at `root`.
#[must_use]
pub fn config_path(root: &Path) -> PathBuf {
    root.join(STATE_DIR).join(CONFIG_FILE)
}

/// A loaded snapshot together with what had to be discarded.
#[derive(Debug, Default)]
pub struct LoadedState {
    pub snapshot: Snapshot,
    pub diagnostics: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The store of the vault at `root`.
    #[must_use]
    pub fn for_vault(root: &Path) -> Self {
        Self::new(root.join(STATE_DIR).join(STATE_FILE))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored snapshot. A missing file yields an empty snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`TallyError::Io`] if the file exists but cannot be read.
    pub fn load(&self) -> Result<LoadedState, TallyError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no state file, starting empty");
            return Ok(LoadedState::default());
        }
        let text = fs::read_to_string(&self.path)?;
        let loaded = parse_state(&text);
        for diagnostic in &loaded.diagnostics {
            warn!(path = %self.path.display(), "{diagnostic}");
        }
        Ok(loaded)
    }

    /// Write a snapshot, replacing the previous state atomically.
    ///
    /// # Errors
    ///
    /// Returns [`TallyError::Io`] on write failure or
    /// [`TallyError::Serialization`] if the snapshot cannot be encoded.
    pub fn save(&self, snapshot: &Snapshot) -> Result<(), TallyError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|e| TallyError::Serialization(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        debug!(
            path = %self.path.display(),
            files = snapshot.files.len(),
            "state saved"
        );
        Ok(())
    }
}

/// Decode state text, falling back per collection.
#[must_use]
pub fn parse_state(text: &str) -> LoadedState {
    let mut diagnostics = Vec::new();
    let root = match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            diagnostics.push("state is not a JSON object, starting empty".to_string());
            return LoadedState {
                snapshot: Snapshot::default(),
                diagnostics,
            };
        }
        Err(e) => {
            diagnostics.push(format!("state is not valid JSON ({e}), starting empty"));
            return LoadedState {
                snapshot: Snapshot::default(),
                diagnostics,
            };
        }
    };

    let snapshot = Snapshot {
        folders: collection(&root, "folders", &mut diagnostics),
        files: files(&root, &mut diagnostics),
        projects: collection(&root, "projects", &mut diagnostics),
    };
    LoadedState {
        snapshot,
        diagnostics,
    }
}

fn collection<T: DeserializeOwned>(
    root: &Map<String, Value>,
    key: &str,
    diagnostics: &mut Vec<String>,
) -> Vec<T> {
    let Some(value) = root.get(key) else {
        return Vec::new();
    };
    serde_json::from_value(value.clone()).unwrap_or_else(|e| {
        diagnostics.push(format!("discarded {key}: {e}"));
        Vec::new()
    })
}

/// Files are recovered one by one; a file with unreadable stats is kept
/// without its history.
fn files(root: &Map<String, Value>, diagnostics: &mut Vec<String>) -> Vec<FileRecord> {
    let Some(value) = root.get("files") else {
        return Vec::new();
    };
    let Some(items) = value.as_array() else {
        diagnostics.push("discarded files: not a list".to_string());
        return Vec::new();
    };

    let mut out = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        match serde_json::from_value::<FileRecord>(item.clone()) {
            Ok(record) => out.push(record),
            Err(e) => {
                let mut stripped = item.clone();
                if let Some(map) = stripped.as_object_mut() {
                    map.remove("stats");
                }
                match serde_json::from_value::<FileRecord>(stripped) {
                    Ok(record) => {
                        diagnostics.push(format!("discarded stats of '{}': {e}", record.path));
                        out.push(record);
                    }
                    Err(e) => diagnostics.push(format!("discarded file #{index}: {e}")),
                }
            }
        }
    }
    out
}
