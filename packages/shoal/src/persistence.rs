//! Durable session snapshots.
//!
//! One JSON file per session id, overwritten on every persist.  The format
//! is schema-versioned and only guaranteed readable by the process version
//! that wrote it.  Snapshots outlive their connection — they are the
//! restore point for reconnects — and are reaped by a lazy retention sweep
//! rather than a dedicated timer.

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::session::SessionAttributes;

pub const SNAPSHOT_VERSION: u32 = 1;

/// Minimum interval between retention sweeps.
const SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    saved_at: DateTime<Utc>,
    attributes: SessionAttributes,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no snapshot for session {0}")]
    NotFound(String),

    #[error("snapshot version {found} is not readable by this build")]
    Version { found: u32 },

    #[error("snapshot is corrupt: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub struct SessionStore {
    dir: PathBuf,
    retention: Duration,
    last_sweep: Mutex<Option<Instant>>,
}

impl SessionStore {
    pub fn new(dir: PathBuf, retention: Duration) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create snapshot dir {}", dir.display()))?;
        Ok(Self {
            dir,
            retention,
            last_sweep: Mutex::new(None),
        })
    }

    fn path_for(&self, session_id: &str) -> Result<PathBuf, StoreError> {
        // Session ids are server-generated UUIDs, but the id also arrives
        // from the wire on reconnect.
        if session_id.is_empty()
            || session_id
                .chars()
                .any(|c| !c.is_ascii_alphanumeric() && c != '-' && c != '_')
        {
            return Err(StoreError::Corrupt(format!(
                "invalid session id: {session_id}"
            )));
        }
        Ok(self.dir.join(format!("{session_id}.json")))
    }

    /// Write (or overwrite) the snapshot for a session.  Temp-file plus
    /// rename, so readers never observe a partial write.
    pub async fn persist(
        &self,
        session_id: &str,
        attributes: &SessionAttributes,
    ) -> Result<(), StoreError> {
        let path = self.path_for(session_id)?;
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            attributes: attributes.clone(),
        };
        let json = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(session = %session_id, "persisted session snapshot");

        self.maybe_sweep().await;
        Ok(())
    }

    /// Read a snapshot back.  A missing file is `NotFound`; a snapshot
    /// written by a different schema version is a `Version` error.
    pub async fn restore(&self, session_id: &str) -> Result<SessionAttributes, StoreError> {
        let path = self.path_for(session_id)?;
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(session_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let snapshot: Snapshot =
            serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(StoreError::Version {
                found: snapshot.version,
            });
        }
        Ok(snapshot.attributes)
    }

    /// Delete a snapshot.  Returns whether one existed.
    pub async fn discard(&self, session_id: &str) -> Result<bool, StoreError> {
        let path = self.path_for(session_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn exists(&self, session_id: &str) -> bool {
        self.path_for(session_id)
            .map(|p| p.exists())
            .unwrap_or(false)
    }

    /// Run the retention sweep if one has not run within the last hour.
    /// Piggybacks on persist calls — no dedicated timer.
    async fn maybe_sweep(&self) {
        {
            let mut last = self.last_sweep.lock().expect("sweep lock poisoned");
            let due = last.map(|t| t.elapsed() >= SWEEP_INTERVAL).unwrap_or(true);
            if !due {
                return;
            }
            *last = Some(Instant::now());
        }
        if let Err(e) = self.sweep().await {
            warn!("session snapshot sweep failed: {e}");
        }
    }

    /// Delete snapshots whose `saved_at` is older than the retention
    /// window.  Unreadable files are skipped, not deleted.
    pub async fn sweep(&self) -> Result<usize, StoreError> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.retention)
                .unwrap_or_else(|_| chrono::Duration::days(7));
        let mut reaped = 0usize;

        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Ok(raw) = tokio::fs::read_to_string(&path).await else {
                continue;
            };
            let Ok(snapshot) = serde_json::from_str::<Snapshot>(&raw) else {
                continue;
            };
            if snapshot.saved_at < cutoff {
                if tokio::fs::remove_file(&path).await.is_ok() {
                    reaped += 1;
                }
            }
        }
        if reaped > 0 {
            debug!(reaped, "reaped expired session snapshots");
        }
        Ok(reaped)
    }
}
