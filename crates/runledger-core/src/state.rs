//! Cross-batch cumulative state: one JSON file shared by every batch of a
//! logical run.
//!
//! Writes go through a temp file plus atomic rename, and every read hands out
//! the stamp it was made under. A save re-checks the on-disk stamp so that a
//! concurrent writer is detected as a [`StateError::Conflict`] instead of a
//! silent lost update; a malformed or missing file reads as "no prior state"
//! so a crashed earlier batch can never wedge the run.

use crate::model::BatchDescriptor;
use crate::snapshot::RunSnapshot;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Default location, relative to the run's working directory.
pub const DEFAULT_STATE_PATH: &str = ".runledger/cumulative.json";

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// The same persisted stamp was consumed twice without an intervening
    /// write; merging it again would double-count.
    #[error("cumulative state {path} already consumed under stamp {stamp}")]
    Stale { path: PathBuf, stamp: String },
    /// Someone rewrote the file between our read and our write.
    #[error("cumulative state {path} changed since it was read (expected {expected}, found {found:?})")]
    Conflict {
        path: PathBuf,
        expected: String,
        found: Option<String>,
    },
    #[error("cumulative state io at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// On-disk shape: the snapshot counters plus write-tracking context.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StateFile {
    #[serde(flatten)]
    snapshot: RunSnapshot,
    stamp: String,
    batch_index: u32,
    batch_count: u32,
    updated_at: String,
}

/// A snapshot read from disk, tied to the stamp it was read under.
#[derive(Debug, Clone)]
pub struct PriorState {
    pub snapshot: RunSnapshot,
    stamp: String,
}

impl PriorState {
    pub fn stamp(&self) -> &str {
        &self.stamp
    }
}

/// Handle on the cumulative state file for one process.
#[derive(Debug)]
pub struct CumulativeStore {
    path: PathBuf,
    /// Stamp of the last state this process consumed, if any.
    consumed: Option<String>,
}

impl CumulativeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            consumed: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the prior snapshot, if any.
    ///
    /// Missing file is a valid first-batch state. An unreadable or malformed
    /// file is logged and treated the same way. Reading the same stamp a
    /// second time without an intervening [`save`](Self::save) is rejected.
    pub fn load(&mut self) -> Result<Option<PriorState>, StateError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "cumulative state unreadable; starting fresh");
                return Ok(None);
            }
        };
        let file: StateFile = match serde_json::from_str(&raw) {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "cumulative state malformed; starting fresh");
                return Ok(None);
            }
        };
        if self.consumed.as_deref() == Some(file.stamp.as_str()) {
            return Err(StateError::Stale {
                path: self.path.clone(),
                stamp: file.stamp,
            });
        }
        self.consumed = Some(file.stamp.clone());
        Ok(Some(PriorState {
            snapshot: file.snapshot,
            stamp: file.stamp,
        }))
    }

    /// Persist the snapshot under a fresh stamp.
    ///
    /// When this process previously consumed a stamp, the on-disk stamp must
    /// still match it; otherwise another batch wrote in between and the save
    /// is refused rather than clobbering its contribution.
    pub fn save(
        &mut self,
        snapshot: &RunSnapshot,
        batch: &BatchDescriptor,
    ) -> Result<(), StateError> {
        if let Some(expected) = self.consumed.clone() {
            let found = self.read_stamp();
            if found.as_deref() != Some(expected.as_str()) {
                return Err(StateError::Conflict {
                    path: self.path.clone(),
                    expected,
                    found,
                });
            }
        }

        let file = StateFile {
            snapshot: snapshot.clone(),
            stamp: Uuid::new_v4().to_string(),
            batch_index: batch.index,
            batch_count: batch.count,
            updated_at: Utc::now().to_rfc3339(),
        };
        let body = serde_json::to_string_pretty(&file).map_err(|e| StateError::Io {
            path: self.path.clone(),
            source: std::io::Error::new(ErrorKind::InvalidData, e),
        })?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StateError::Io {
                path: self.path.clone(),
                source: e,
            })?;
        }
        let tmp = self.path.with_extension(format!("tmp.{}", std::process::id()));
        std::fs::write(&tmp, body).map_err(|e| StateError::Io {
            path: tmp.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|e| StateError::Io {
            path: self.path.clone(),
            source: e,
        })?;
        self.consumed = None;
        Ok(())
    }

    /// Best-effort delete after the final summary went out. A missing file is
    /// fine; anything else is logged and ignored.
    pub fn clear(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to delete cumulative state");
            }
        }
    }

    fn read_stamp(&self) -> Option<String> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        let file: StateFile = serde_json::from_str(&raw).ok()?;
        Some(file.stamp)
    }
}
