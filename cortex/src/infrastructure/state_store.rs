// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Durable storage for the learner's [`LearningSnapshot`].
//!
//! `JsonFileStateStore` keeps the whole snapshot in one pretty-printed JSON
//! document. Saves go to a sibling `<file>.tmp`, are fsynced, then renamed
//! over the target, so a crash mid-write leaves either the previous document
//! or the new one, never a torn file.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::domain::LearningSnapshot;

#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize learning state: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Learning state at {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

#[async_trait]
pub trait LearningStateStore: Send + Sync {
    /// `Ok(None)` when nothing has been persisted yet.
    async fn load(&self) -> Result<Option<LearningSnapshot>, StateStoreError>;

    async fn save(&self, snapshot: &LearningSnapshot) -> Result<(), StateStoreError>;
}

pub struct JsonFileStateStore {
    path: PathBuf,
}

impl JsonFileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| OsString::from("learning-state"));
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(path: &Path, source: std::io::Error) -> StateStoreError {
        StateStoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[async_trait]
impl LearningStateStore for JsonFileStateStore {
    async fn load(&self) -> Result<Option<LearningSnapshot>, StateStoreError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No persisted learning state");
                return Ok(None);
            }
            Err(e) => return Err(Self::io_error(&self.path, e)),
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| StateStoreError::Corrupt {
                path: self.path.clone(),
                reason: e.to_string(),
            })
    }

    async fn save(&self, snapshot: &LearningSnapshot) -> Result<(), StateStoreError> {
        let json = serde_json::to_string_pretty(snapshot)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Self::io_error(parent, e))?;
        }

        let tmp_path = self.tmp_path();
        fs::write(&tmp_path, json)
            .await
            .map_err(|e| Self::io_error(&tmp_path, e))?;

        let sync_path = tmp_path.clone();
        match tokio::task::spawn_blocking(move || {
            std::fs::File::open(&sync_path).and_then(|file| file.sync_all())
        })
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Failed to sync learning state to disk"),
            Err(e) => warn!(error = %e, "Failed to sync learning state to disk"),
        }

        fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| Self::io_error(&self.path, e))?;

        debug!(path = %self.path.display(), "Learning state written");
        Ok(())
    }
}

/// Process-local store, used in tests and when persistence is disabled.
#[derive(Default)]
pub struct InMemoryStateStore {
    snapshot: RwLock<Option<LearningSnapshot>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: LearningSnapshot) -> Self {
        Self {
            snapshot: RwLock::new(Some(snapshot)),
        }
    }
}

#[async_trait]
impl LearningStateStore for InMemoryStateStore {
    async fn load(&self) -> Result<Option<LearningSnapshot>, StateStoreError> {
        Ok(self.snapshot.read().await.clone())
    }

    async fn save(&self, snapshot: &LearningSnapshot) -> Result<(), StateStoreError> {
        *self.snapshot.write().await = Some(snapshot.clone());
        Ok(())
    }
}
