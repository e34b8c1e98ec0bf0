//! Durable checkpoint store for pipeline runs.
//!
//! Each run owns a directory under the state root, keyed by an identity
//! derived from the normalized request text:
//!
//! ```text
//! <state_dir>/<run_id>/state.json          run status + checkpoint values
//! <state_dir>/<run_id>/assets/<name>.json  one file per stage asset
//! ```
//!
//! Every write goes through a temp-file + fsync + rename sequence, so a
//! reader after a crash observes either the previous or the fully written
//! content, never a torn file. No operation reports success before its
//! bytes are durable.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::StoreError;
use crate::pipeline::stage::StageStatus;

/// Persisted state of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    /// Stable identity derived from the normalized request text.
    pub run_id: String,
    /// The original request, verbatim.
    pub request: String,
    /// Last durably-committed stage.
    pub status: StageStatus,
    /// Number of records the run is converging toward. Zero until the
    /// request has been parsed.
    pub target_sample_count: usize,
    /// Fine-grained progress markers (indexes, counters) scoped to stages.
    pub checkpoint: BTreeMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunState {
    /// Creates the state of a run that has done no work yet.
    pub fn fresh(run_id: impl Into<String>, request: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            run_id: run_id.into(),
            request: request.into(),
            status: StageStatus::Initial,
            target_sample_count: 0,
            checkpoint: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets a checkpoint value.
    pub fn set_checkpoint(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        self.checkpoint.insert(key.to_string(), value.into());
    }

    /// Reads an integer checkpoint value, falling back to `default`.
    pub fn checkpoint_usize(&self, key: &str, default: usize) -> usize {
        self.checkpoint
            .get(key)
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(default)
    }

    /// Removes a checkpoint value.
    pub fn clear_checkpoint(&mut self, key: &str) {
        self.checkpoint.remove(key);
    }
}

/// Derives the stable run identity for a request.
///
/// The request text is case-folded and whitespace-normalized before
/// hashing so trivial reformatting maps to the same run.
pub fn run_id_for_request(request: &str) -> String {
    let normalized = request
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    let digest = Sha256::digest(normalized.as_bytes());
    hex::encode(&digest[..8])
}

/// File-backed store of run state and stage assets.
pub struct CheckpointStore {
    root: PathBuf,
    /// Monotonic suffix for temp files so concurrent asset writes from
    /// fan-out workers never collide on the same temp path.
    tmp_seq: AtomicU64,
}

impl CheckpointStore {
    /// Creates a store rooted at `root`. The directory is created lazily
    /// on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tmp_seq: AtomicU64::new(0),
        }
    }

    /// Returns the store's root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn run_dir(&self, run_id: &str) -> PathBuf {
        self.root.join(run_id)
    }

    fn state_path(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join("state.json")
    }

    fn asset_path(&self, run_id: &str, name: &str) -> PathBuf {
        self.run_dir(run_id).join("assets").join(format!("{name}.json"))
    }

    /// Loads the persisted state of a run, or `None` if the run has never
    /// been persisted. Undecodable state surfaces as
    /// [`StoreError::CorruptState`] so the caller can decide what to do.
    pub async fn load(&self, run_id: &str) -> Result<Option<RunState>, StoreError> {
        let path = self.state_path(run_id);
        let bytes = match fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Io(e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::CorruptState {
                run_id: run_id.to_string(),
                message: e.to_string(),
            })
    }

    /// Persists the run state atomically.
    pub async fn persist(&self, state: &RunState) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(state)?;
        self.write_atomic(&self.state_path(&state.run_id), &bytes)
            .await?;
        debug!(run_id = %state.run_id, status = %state.status, "run state persisted");
        Ok(())
    }

    /// Writes a stage asset atomically.
    pub async fn save_asset<T: Serialize>(
        &self,
        run_id: &str,
        name: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_atomic(&self.asset_path(run_id, name), &bytes)
            .await
    }

    /// Loads a stage asset, or `None` if the stage has not produced one.
    /// Undecodable assets surface as [`StoreError::CorruptState`].
    pub async fn load_asset<T: DeserializeOwned>(
        &self,
        run_id: &str,
        name: &str,
    ) -> Result<Option<T>, StoreError> {
        let path = self.asset_path(run_id, name);
        let bytes = match fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Io(e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::CorruptState {
                run_id: run_id.to_string(),
                message: format!("asset '{name}': {e}"),
            })
    }

    /// Removes a stage asset. Removing an absent asset is a no-op.
    pub async fn clear_asset(&self, run_id: &str, name: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.asset_path(run_id, name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    /// Enumerates every persisted run, most recently updated first.
    pub async fn list_runs(&self) -> Result<Vec<RunState>, StoreError> {
        let mut runs = Vec::new();
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(runs),
            Err(e) => return Err(StoreError::Io(e)),
        };
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let run_id = entry.file_name().to_string_lossy().to_string();
            match self.load(&run_id).await {
                Ok(Some(state)) => runs.push(state),
                Ok(None) => {}
                // A corrupt run must not hide the healthy ones from `list`.
                Err(StoreError::CorruptState { run_id, message }) => {
                    tracing::warn!(run_id = %run_id, error = %message, "skipping corrupt run state");
                }
                Err(e) => return Err(e),
            }
        }
        runs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(runs)
    }

    /// Writes `bytes` to `path` through a temp file in the same directory,
    /// fsyncs, then renames into place.
    async fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
        let parent = path
            .parent()
            .ok_or_else(|| StoreError::Io(std::io::Error::other("path has no parent")))?;
        fs::create_dir_all(parent).await?;

        let seq = self.tmp_seq.fetch_add(1, Ordering::SeqCst);
        let file_name = path
            .file_name()
            .ok_or_else(|| StoreError::Io(std::io::Error::other("path has no file name")))?
            .to_string_lossy();
        let tmp_path = parent.join(format!(".{file_name}.{seq}.tmp"));

        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp_path, path).await?;
        Ok(())
    }
}
