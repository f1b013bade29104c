//! Resumable judge runs: atomic JSON writes, checkpoints and resume

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::analysis::judge::{is_successful, result_id};

pub const CHECKPOINT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported checkpoint version {found}")]
    Version { found: u32 },
}

/// Write JSON to a temporary sibling, then rename it over `path`
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), CheckpointError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let tmp = with_suffix(path, "tmp");
    let content = serde_json::to_string_pretty(value)?;
    if let Err(e) = fs::write(&tmp, content).and_then(|_| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// Move a bad file aside as `<path>.<tag>.<unix-seconds>`
pub fn backup_file(path: &Path, tag: &str) -> Option<PathBuf> {
    let backup = with_suffix(path, &format!("{}.{}", tag, chrono::Utc::now().timestamp()));
    match fs::rename(path, &backup) {
        Ok(()) => {
            tracing::warn!("Moved {} to {}", path.display(), backup.display());
            Some(backup)
        }
        Err(e) => {
            tracing::warn!("Could not back up {}: {}", path.display(), e);
            None
        }
    }
}

/// Versioned snapshot of a judge run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunDescriptor {
    #[serde(default)]
    pub version: u32,
    pub processed_successful_ids: Vec<String>,
    pub successful_evaluation_results: Vec<Value>,
    /// Unix seconds
    pub timestamp: f64,
}

impl RunDescriptor {
    pub fn new(state: &ResumeState) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            processed_successful_ids: state.ids.clone(),
            successful_evaluation_results: state.results.clone(),
            timestamp: chrono::Utc::now().timestamp_millis() as f64 / 1000.0,
        }
    }

    pub fn load(path: &Path) -> Result<Self, CheckpointError> {
        let descriptor: RunDescriptor = serde_json::from_str(&fs::read_to_string(path)?)?;
        if descriptor.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::Version {
                found: descriptor.version,
            });
        }
        Ok(descriptor)
    }

    pub fn save(&self, path: &Path) -> Result<(), CheckpointError> {
        write_json_atomic(path, self)
    }
}

/// Successful results accumulated so far, unique by id, in arrival order
#[derive(Debug, Clone, Default)]
pub struct ResumeState {
    pub results: Vec<Value>,
    pub ids: Vec<String>,
    seen: HashSet<String>,
}

impl ResumeState {
    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Add a result unless its id is already present; returns whether it was added
    pub fn push(&mut self, id: String, result: Value) -> bool {
        if !self.seen.insert(id.clone()) {
            return false;
        }
        self.ids.push(id);
        self.results.push(result);
        true
    }

    /// Restore successful results, preferring the output file over the checkpoint.
    ///
    /// An unreadable output file is backed up as `.corrupt`, a non-array one as
    /// `.invalid`; an unreadable or mismatched checkpoint is backed up as
    /// `.corrupt`. Either way the run starts from what could be recovered.
    pub fn load(output_file: &Path, checkpoint_file: &Path) -> Self {
        let mut state = ResumeState::default();

        if output_file.exists() {
            match fs::read_to_string(output_file)
                .map_err(CheckpointError::from)
                .and_then(|s| Ok(serde_json::from_str::<Value>(&s)?))
            {
                Ok(Value::Array(items)) => {
                    for item in items {
                        if let Some(id) = result_id(&item).filter(|_| is_successful(&item)) {
                            state.push(id, item);
                        }
                    }
                    tracing::info!(
                        "Loaded {} successful results from {}",
                        state.len(),
                        output_file.display()
                    );
                }
                Ok(_) => {
                    tracing::warn!("{} is not a JSON array", output_file.display());
                    backup_file(output_file, "invalid");
                }
                Err(e) => {
                    tracing::warn!("Could not read {}: {}", output_file.display(), e);
                    backup_file(output_file, "corrupt");
                }
            }
        }

        if state.is_empty() && checkpoint_file.exists() {
            match RunDescriptor::load(checkpoint_file) {
                Ok(descriptor) => {
                    let ids: HashSet<&str> = descriptor
                        .processed_successful_ids
                        .iter()
                        .map(String::as_str)
                        .collect();
                    for item in descriptor.successful_evaluation_results {
                        if let Some(id) = result_id(&item)
                            .filter(|id| ids.contains(id.as_str()) && is_successful(&item))
                        {
                            state.push(id, item);
                        }
                    }
                    tracing::info!(
                        "Resumed {} successful ids from {}",
                        state.len(),
                        checkpoint_file.display()
                    );
                }
                Err(e) => {
                    tracing::warn!("Ignoring checkpoint {}: {}", checkpoint_file.display(), e);
                    backup_file(checkpoint_file, "corrupt");
                }
            }
        }

        state
    }
}
