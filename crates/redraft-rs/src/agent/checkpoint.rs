//! Checkpoint and resume for the refinement loop.
//!
//! The engine saves an [`EngineState`] after the initial draft and after
//! every cycle that changed at least one section. A later run with the same
//! output path picks up from the last saved state. The checkpoint is deleted only after the final
//! document has been written.
//!
//! Writes go through a temp file and a rename, so a crash mid-write leaves
//! the previous checkpoint intact. Loads are validated against the schema
//! derived from [`EngineState`]; anything that fails is reported as absent.

use crate::document::Document;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Everything needed to resume a run.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, PartialEq, Eq)]
pub struct EngineState {
    /// Current document snapshot, canonical order.
    pub document: Document,
    /// Refinement cycles completed so far.
    pub cycle_index: u32,
    /// Consecutive cycles whose verdict was NO_FURTHER_IMPROVEMENTS_NEEDED,
    /// whether or not they also changed a section.
    pub consecutive_no_improvement_count: u32,
}

impl EngineState {
    /// Fresh state for a newly drafted document.
    pub fn drafted(document: Document) -> Self {
        Self {
            document,
            cycle_index: 0,
            consecutive_no_improvement_count: 0,
        }
    }
}

/// Why a checkpoint on disk was not usable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadFailure {
    #[error("unreadable: {0}")]
    Unreadable(String),
    #[error("malformed: {0}")]
    Malformed(String),
}

/// Saves, loads and deletes the checkpoint file for one output path.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    path: PathBuf,
}

impl CheckpointManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Checkpoint beside `output`, named `.<stem>.checkpoint.json`.
    pub fn for_output(output: &Path) -> Self {
        let stem = output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let name = format!(".{stem}.checkpoint.json");
        let path = match output.parent() {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        };
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Persist `state`, replacing any previous checkpoint atomically.
    pub fn save(&self, state: &EngineState) -> Result<(), String> {
        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)
                .map_err(|e| format!("Failed to create checkpoint dir: {e}"))?;
        }

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "checkpoint".to_string());
        let tmp_path = self.path.with_file_name(format!(".{file_name}.tmp"));

        let json = serde_json::to_string_pretty(state)
            .map_err(|e| format!("Failed to serialize checkpoint: {e}"))?;
        std::fs::write(&tmp_path, json)
            .map_err(|e| format!("Failed to write temp checkpoint: {e}"))?;
        std::fs::rename(&tmp_path, &self.path)
            .map_err(|e| format!("Failed to rename checkpoint: {e}"))?;

        debug!(
            "Checkpoint saved: cycle {} -> {}",
            state.cycle_index,
            self.path.display()
        );
        Ok(())
    }

    /// Load the checkpoint. `Ok(None)` when there is no file.
    pub fn try_load(&self) -> Result<Option<EngineState>, LoadFailure> {
        if !self.path.exists() {
            return Ok(None);
        }
        let json = std::fs::read_to_string(&self.path)
            .map_err(|e| LoadFailure::Unreadable(e.to_string()))?;
        let value: serde_json::Value =
            serde_json::from_str(&json).map_err(|e| LoadFailure::Malformed(e.to_string()))?;

        let schema = crate::json_schema_for::<EngineState>();
        // If the schema itself cannot be compiled, fall through to serde.
        if let Ok(validator) = jsonschema::validator_for(&schema) {
            let errors: Vec<String> = validator
                .iter_errors(&value)
                .map(|e| format!("{}: {e}", e.instance_path()))
                .collect();
            if !errors.is_empty() {
                return Err(LoadFailure::Malformed(errors.join("; ")));
            }
        }

        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| LoadFailure::Malformed(e.to_string()))
    }

    /// Load the checkpoint, treating any failure as absent.
    pub fn load(&self) -> Option<EngineState> {
        match self.try_load() {
            Ok(state) => state,
            Err(e) => {
                warn!("Ignoring checkpoint {}: {e}", self.path.display());
                None
            }
        }
    }

    /// Remove the checkpoint. Missing files are not an error.
    pub fn delete(&self) -> Result<(), String> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(format!("Failed to delete checkpoint: {e}")),
        }
    }
}
