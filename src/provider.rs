//! Repository data access behind the `RepoProvider` trait.
//!
//! The engine only ever talks to this trait; transport, authentication, and
//! retry policy belong to the implementation. `SnapshotProvider` serves a
//! JSON facts file and applies mutations to an in-memory copy, which makes
//! every run a dry-run unless the caller persists the result.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ProviderError};
use crate::models::label::LabelSpec;
use crate::models::target::{CommentFacts, ItemFacts, ItemState, RepoFacts};

/// Author recorded on comments this tool posts into a snapshot.
const TOOL_AUTHOR: &str = "relabel";

pub trait RepoProvider: Sync {
    fn fetch_repository(&self) -> Result<RepoFacts, ProviderError>;
    fn fetch_item(&self, number: u64) -> Result<ItemFacts, ProviderError>;
    fn list_item_numbers(&self) -> Result<Vec<u64>, ProviderError>;
    fn list_labels(&self) -> Result<Vec<LabelSpec>, ProviderError>;
    fn create_label(&self, label: &LabelSpec) -> Result<(), ProviderError>;
    fn update_label(&self, label: &LabelSpec) -> Result<(), ProviderError>;
    fn delete_label(&self, name: &str) -> Result<(), ProviderError>;
    fn assign_label(&self, number: u64, name: &str) -> Result<(), ProviderError>;
    fn detach_label(&self, number: u64, name: &str) -> Result<(), ProviderError>;
    fn set_item_state(&self, number: u64, state: ItemState) -> Result<(), ProviderError>;
    fn post_comment(&self, number: u64, body: &str) -> Result<(), ProviderError>;
}

/// Serialized shape of one repository's facts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub repository: RepoFacts,
    #[serde(default)]
    pub labels: Vec<LabelSpec>,
    #[serde(default)]
    pub items: Vec<ItemFacts>,
}

/// File-backed provider. Whole-repository runs hit it from rayon workers,
/// so the state sits behind a mutex.
pub struct SnapshotProvider {
    path: Option<PathBuf>,
    state: Mutex<Snapshot>,
}

impl SnapshotProvider {
    pub fn load(path: &Path) -> Result<SnapshotProvider, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let snapshot: Snapshot = serde_json::from_str(&raw).map_err(|e| {
            ConfigError::malformed(path.display().to_string(), format!("invalid snapshot: {e}"))
        })?;
        Ok(SnapshotProvider {
            path: Some(path.to_path_buf()),
            state: Mutex::new(snapshot),
        })
    }

    pub fn from_snapshot(snapshot: Snapshot) -> SnapshotProvider {
        SnapshotProvider {
            path: None,
            state: Mutex::new(snapshot),
        }
    }

    /// Write the mutated facts back to the backing file.
    pub fn persist(&self) -> Result<(), ProviderError> {
        let path = match &self.path {
            Some(p) => p.clone(),
            None => {
                return Err(ProviderError::permanent(
                    "snapshot has no backing file to persist to",
                ))
            }
        };
        let body = serde_json::to_string_pretty(&*self.lock())
            .map_err(|e| ProviderError::permanent(format!("serialize snapshot: {e}")))?;
        std::fs::write(&path, body).map_err(|e| {
            ProviderError::transient(format!("write '{}': {e}", path.display()))
        })
    }

    pub fn snapshot(&self) -> Snapshot {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Snapshot> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn with_item<T>(
        &self,
        number: u64,
        f: impl FnOnce(&mut ItemFacts) -> T,
    ) -> Result<T, ProviderError> {
        let mut state = self.lock();
        match state.items.iter_mut().find(|it| it.number == number) {
            Some(item) => Ok(f(item)),
            None => Err(ProviderError::permanent(format!(
                "no issue or PR #{number} in snapshot"
            ))),
        }
    }
}

impl RepoProvider for SnapshotProvider {
    fn fetch_repository(&self) -> Result<RepoFacts, ProviderError> {
        Ok(self.lock().repository.clone())
    }

    fn fetch_item(&self, number: u64) -> Result<ItemFacts, ProviderError> {
        self.with_item(number, |it| it.clone())
    }

    fn list_item_numbers(&self) -> Result<Vec<u64>, ProviderError> {
        Ok(self.lock().items.iter().map(|it| it.number).collect())
    }

    fn list_labels(&self) -> Result<Vec<LabelSpec>, ProviderError> {
        Ok(self.lock().labels.clone())
    }

    fn create_label(&self, label: &LabelSpec) -> Result<(), ProviderError> {
        let mut state = self.lock();
        if state.labels.iter().any(|l| l.name == label.name) {
            return Err(ProviderError::permanent(format!(
                "label '{}' already exists",
                label.name
            )));
        }
        state.labels.push(label.clone());
        Ok(())
    }

    fn update_label(&self, label: &LabelSpec) -> Result<(), ProviderError> {
        let mut state = self.lock();
        match state.labels.iter_mut().find(|l| l.name == label.name) {
            Some(existing) => {
                *existing = label.clone();
                Ok(())
            }
            None => Err(ProviderError::permanent(format!(
                "label '{}' does not exist",
                label.name
            ))),
        }
    }

    fn delete_label(&self, name: &str) -> Result<(), ProviderError> {
        let mut state = self.lock();
        let before = state.labels.len();
        state.labels.retain(|l| l.name != name);
        if state.labels.len() == before {
            return Err(ProviderError::permanent(format!(
                "label '{name}' does not exist"
            )));
        }
        for item in &mut state.items {
            item.labels.retain(|l| l != name);
        }
        Ok(())
    }

    fn assign_label(&self, number: u64, name: &str) -> Result<(), ProviderError> {
        self.with_item(number, |it| {
            if !it.labels.iter().any(|l| l == name) {
                it.labels.push(name.to_string());
            }
        })
    }

    fn detach_label(&self, number: u64, name: &str) -> Result<(), ProviderError> {
        self.with_item(number, |it| it.labels.retain(|l| l != name))
    }

    fn set_item_state(&self, number: u64, state: ItemState) -> Result<(), ProviderError> {
        self.with_item(number, |it| it.state = state)
    }

    fn post_comment(&self, number: u64, body: &str) -> Result<(), ProviderError> {
        self.with_item(number, |it| {
            it.comments.push(CommentFacts {
                author: TOOL_AUTHOR.to_string(),
                body: body.to_string(),
                created_at: Utc::now(),
                from_maintainer: true,
            })
        })
    }
}
