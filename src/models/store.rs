// Model Store - on-disk home of the current artifact, its scaler, and a
// single-generation backup of both.
//
// Every write lands in a sibling temp file and is renamed into place, so a
// reader never observes a half-written artifact.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use super::network::ModelArtifact;
use super::scaler::FeatureScaler;
use super::trainer::TrainedModel;
use crate::config::constants::*;

/// What `backup_current` managed to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupOutcome {
    /// Current artifact (and scaler, if any) copied to the backup paths
    Saved,
    /// No current artifact existed, so there was nothing to protect
    NothingToBackUp,
    /// Copy failed; rollback will not be possible this cycle
    Failed,
}

/// What `rollback` managed to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// Backup copied back over current
    Restored,
    /// There was no previous artifact; the rejected candidate was removed
    Cleared,
    /// No usable backup; store left as is
    Unavailable,
    /// Restoring failed part-way
    Failed,
}

/// Filesystem layout of the model directory
#[derive(Debug, Clone)]
pub struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Create the directory if missing. Failure here is a setup error.
    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create model directory: {}", self.dir.display()))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn model_path(&self) -> PathBuf {
        self.dir.join(MODEL_FILE)
    }

    pub fn backup_model_path(&self) -> PathBuf {
        self.dir.join(MODEL_BACKUP_FILE)
    }

    pub fn scaler_path(&self) -> PathBuf {
        self.dir.join(SCALER_FILE)
    }

    pub fn backup_scaler_path(&self) -> PathBuf {
        self.dir.join(SCALER_BACKUP_FILE)
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    pub fn has_current(&self) -> bool {
        self.model_path().is_file()
    }

    /// Copy current artifact and scaler to the backup paths.
    ///
    /// Best-effort: a failure is logged and reported, never raised. Any stale
    /// scaler backup is removed when the current model has no scaler so the
    /// pair stays consistent.
    pub fn backup_current(&self) -> BackupOutcome {
        if !self.has_current() {
            return BackupOutcome::NothingToBackUp;
        }

        let result = (|| -> Result<()> {
            copy_atomic(&self.model_path(), &self.backup_model_path())?;
            if self.scaler_path().is_file() {
                copy_atomic(&self.scaler_path(), &self.backup_scaler_path())?;
            } else {
                remove_if_exists(&self.backup_scaler_path())?;
            }
            Ok(())
        })();

        match result {
            Ok(()) => {
                info!(path = %self.backup_model_path().display(), "Backed up current model");
                BackupOutcome::Saved
            }
            Err(e) => {
                warn!(error = %e, "Could not back up model, proceeding without backup");
                BackupOutcome::Failed
            }
        }
    }

    /// Write a freshly trained artifact and scaler over the current ones.
    ///
    /// Model first, then scaler, the same order `rollback` restores them in.
    /// The two renames are separate, so a reader loading between them sees the
    /// new model with the previous scaler. Readers load once at startup, and
    /// the supervisor validates the pair before committing.
    pub fn write_current(&self, trained: &TrainedModel) -> Result<()> {
        self.ensure_dir()?;
        write_atomic(&self.model_path(), trained.artifact.to_json()?.as_bytes())?;
        write_atomic(&self.scaler_path(), trained.scaler.to_json()?.as_bytes())?;
        Ok(())
    }

    /// Undo a rejected cycle according to how the backup step went
    pub fn rollback(&self, backup: BackupOutcome) -> RollbackOutcome {
        let result = match backup {
            BackupOutcome::Saved => (|| -> Result<RollbackOutcome> {
                copy_atomic(&self.backup_model_path(), &self.model_path())?;
                if self.backup_scaler_path().is_file() {
                    copy_atomic(&self.backup_scaler_path(), &self.scaler_path())?;
                } else {
                    remove_if_exists(&self.scaler_path())?;
                }
                Ok(RollbackOutcome::Restored)
            })(),
            BackupOutcome::NothingToBackUp => (|| -> Result<RollbackOutcome> {
                remove_if_exists(&self.model_path())?;
                remove_if_exists(&self.scaler_path())?;
                Ok(RollbackOutcome::Cleared)
            })(),
            BackupOutcome::Failed => {
                warn!("No backup available for rollback");
                return RollbackOutcome::Unavailable;
            }
        };

        match result {
            Ok(outcome) => {
                info!(outcome = ?outcome, "Rolled back model store");
                outcome
            }
            Err(e) => {
                error!(error = %e, "Rollback failed");
                RollbackOutcome::Failed
            }
        }
    }

    pub fn load_artifact(&self) -> Result<ModelArtifact> {
        ModelArtifact::load(self.model_path())
    }

    /// `Ok(None)` when no scaler file exists
    pub fn load_scaler(&self) -> Result<Option<FeatureScaler>> {
        let path = self.scaler_path();
        if !path.exists() {
            return Ok(None);
        }
        FeatureScaler::load(&path).map(Some)
    }
}

/// Write `bytes` to a sibling temp file, then rename over `path`
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = temp_sibling(path);
    fs::write(&tmp, bytes).with_context(|| format!("Failed to write {}", tmp.display()))?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e).with_context(|| format!("Failed to move {} into place", path.display()));
    }
    Ok(())
}

fn copy_atomic(from: &Path, to: &Path) -> Result<()> {
    let bytes = fs::read(from).with_context(|| format!("Failed to read {}", from.display()))?;
    write_atomic(to, &bytes)
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".tmp-{}", std::process::id()));
    path.with_file_name(name)
}
