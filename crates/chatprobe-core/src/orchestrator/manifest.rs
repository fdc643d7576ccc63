use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::batch::{BatchDefinition, RunResult};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub batch: BatchDefinition,
    pub result: RunResult,
}

/// Everything one orchestrator invocation produced, in completion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunManifest {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub interrupted: bool,
    #[serde(default)]
    pub entries: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedRun {
    pub name: String,
    pub app_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: Vec<FailedRun>,
}

impl RunManifest {
    pub fn new() -> Self {
        Self {
            id: Uuid::now_v7(),
            created_at: Utc::now(),
            interrupted: false,
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, batch: BatchDefinition, result: RunResult) {
        self.entries.push(ManifestEntry { batch, result });
    }

    /// True when every recorded run passed.
    pub fn success(&self) -> bool {
        self.entries.iter().all(|entry| entry.result.success)
    }

    pub fn summary(&self) -> RunSummary {
        let failed: Vec<FailedRun> = self
            .entries
            .iter()
            .filter(|entry| !entry.result.success)
            .map(|entry| FailedRun {
                name: entry.result.name.clone(),
                app_id: entry.result.app_id.clone(),
                reason: entry.result.reason.clone().unwrap_or_default(),
            })
            .collect();
        RunSummary {
            total: self.entries.len(),
            passed: self.entries.len() - failed.len(),
            failed,
        }
    }
}

impl Default for RunManifest {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes manifest entries as `<output>/<run id>/<app id>/<name>.yaml`.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    output_dir: PathBuf,
}

impl ManifestStore {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn run_dir(&self, manifest: &RunManifest) -> PathBuf {
        self.output_dir.join(manifest.id.to_string())
    }

    /// Creates the run directory. Nothing can be reported if this fails.
    pub fn prepare(&self, manifest: &RunManifest) -> Result<PathBuf> {
        let dir = self.run_dir(manifest);
        fs::create_dir_all(&dir).map_err(|source| Error::Storage {
            path: dir.clone(),
            source,
        })?;
        Ok(dir)
    }

    /// Writes every entry that has no file yet. Existing files are left as
    /// they are; a file that cannot be written is logged and skipped.
    pub fn save(&self, manifest: &RunManifest) -> Result<()> {
        let run_dir = self.prepare(manifest)?;
        for entry in &manifest.entries {
            let dir = if entry.result.app_id.is_empty() {
                run_dir.clone()
            } else {
                run_dir.join(&entry.result.app_id)
            };
            let path = dir.join(format!("{}.yaml", entry.result.name));

            match write_entry(&dir, &path, entry) {
                Ok(true) => debug!(target: "chatprobe::manifest", path = %path.display(), "Saved result"),
                Ok(false) => {}
                Err(e) => {
                    warn!(target: "chatprobe::manifest", path = %path.display(), error = %e, "Failed to save result");
                }
            }
        }
        Ok(())
    }
}

/// Returns whether a new file was written.
fn write_entry(dir: &Path, path: &Path, entry: &ManifestEntry) -> Result<bool> {
    let yaml = serde_yaml::to_string(entry)?;
    write_new(dir, path, |file| file.write_all(yaml.as_bytes()))
}

/// Fills a temp file in `dir` and moves it to `path` unless something is
/// already there. A failed write leaves nothing behind.
fn write_new(
    dir: &Path,
    path: &Path,
    write: impl FnOnce(&mut NamedTempFile) -> io::Result<()>,
) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    fs::create_dir_all(dir)?;
    let mut file = NamedTempFile::new_in(dir)?;
    write(&mut file)?;
    file.as_file().sync_all()?;

    match file.persist_noclobber(path) {
        Ok(_) => Ok(true),
        Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.error.into()),
    }
}
