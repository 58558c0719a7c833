// SPDX-FileCopyrightText: Copyright © 2020-2026 Depot Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Durable store + cache + computed index; TTL invalidation; load/flush
//! with backup-on-corruption.
//!
//! Load/save of JSON-shaped state under a root path, with per-file
//! errors collected rather than raised, across three always-present
//! store/index/pool files plus an unpersisted cache map.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use log::{debug, trace, warn};
use thiserror::Error;

use crate::ident::{PackageIdentifier, RepositoryIdentifier};
use crate::installation::Installation;
use crate::package::{IndexEntry, InstalledPackageEntry};
use crate::repository::{CacheEntry, LocalRepositoryEntry};

/// Remote index reuse window.
pub const CACHE_TTL: Duration = Duration::from_secs(300);
/// Local re-read throttle.
pub const STORAGE_TTL: Duration = Duration::from_secs(5);

fn epoch() -> i64 {
    Utc::now().timestamp()
}

/// Seconds since epoch, for stamping freshly fetched repository indexes.
pub fn epoch_seconds() -> i64 {
    epoch()
}

/// The three persistent maps plus the in-memory repository index cache.
///
/// Owned exclusively by the repository/package orchestrators, which
/// mutate it only from within transaction action bodies, never
/// directly.
pub struct Storage {
    installation: Installation,
    pub store: HashMap<RepositoryIdentifier, LocalRepositoryEntry>,
    pub index: HashMap<PackageIdentifier, IndexEntry>,
    pub pool: HashMap<PackageIdentifier, InstalledPackageEntry>,
    pub cache: HashMap<RepositoryIdentifier, CacheEntry>,
    load_timestamp: Option<i64>,
}

#[derive(Debug, Error)]
pub enum FileError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("deserialize: {0}")]
    Deserialize(serde_json::Error),
    #[error("serialize: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl Storage {
    pub fn new(installation: Installation) -> Self {
        Self {
            installation,
            store: HashMap::new(),
            index: HashMap::new(),
            pool: HashMap::new(),
            cache: HashMap::new(),
            load_timestamp: None,
        }
    }

    pub fn installation(&self) -> &Installation {
        &self.installation
    }

    /// Unconditionally (re)load `store.json`, `index.json` and
    /// `pool.json`. Per-file deserialization failures are quarantined
    /// to a `.backup.<epoch-ms>` file and substituted with an empty
    /// map rather than raised; the returned map collects those errors
    /// keyed by file name.
    pub async fn load(&mut self) -> HashMap<&'static str, FileError> {
        let mut errors = HashMap::new();

        match load_map(&self.installation.store_path()).await {
            Ok(map) => self.store = map,
            Err(error) => {
                warn!("store.json unreadable, quarantining: {error}");
                self.store = HashMap::new();
                errors.insert("store", error);
            }
        }

        match load_map(&self.installation.index_path()).await {
            Ok(map) => self.index = map,
            Err(error) => {
                warn!("index.json unreadable, quarantining: {error}");
                self.index = HashMap::new();
                errors.insert("index", error);
            }
        }

        match load_map(&self.installation.pool_path()).await {
            Ok(map) => self.pool = map,
            Err(error) => {
                warn!("pool.json unreadable, quarantining: {error}");
                self.pool = HashMap::new();
                errors.insert("pool", error);
            }
        }

        self.load_timestamp = Some(epoch());
        debug!("storage loaded: {} repos, {} pool entries", self.store.len(), self.pool.len());

        errors
    }

    /// Throttled form of [`Self::load`]: skips I/O entirely when the
    /// last load happened within [`STORAGE_TTL`].
    pub async fn load_if_expired(&mut self) -> HashMap<&'static str, FileError> {
        let expired = match self.load_timestamp {
            Some(ts) => (epoch() - ts) as u64 > STORAGE_TTL.as_secs(),
            None => true,
        };

        if expired {
            self.load().await
        } else {
            trace!("storage load throttled (within STORAGE_TTL)");
            HashMap::new()
        }
    }

    /// Serialize and write all three maps. On any per-file error, the
    /// on-disk snapshot for that file is left at its previous value;
    /// `load_timestamp` only refreshes on full success.
    pub async fn flush(&mut self) -> HashMap<&'static str, FileError> {
        let mut errors = HashMap::new();

        if let Err(error) = save_map(&self.installation.store_path(), &self.store).await {
            errors.insert("store", error);
        }
        if let Err(error) = save_map(&self.installation.index_path(), &self.index).await {
            errors.insert("index", error);
        }
        if let Err(error) = save_map(&self.installation.pool_path(), &self.pool).await {
            errors.insert("pool", error);
        }

        if errors.is_empty() {
            self.load_timestamp = Some(epoch());
            debug!("storage flushed");
        }

        errors
    }

    /// `true` iff a cache entry stamped at `update_timestamp` is stale.
    /// Uses the natural `now - ts > TTL` sign (the flipped sign would
    /// only ever expire timestamps in the future).
    pub fn cache_is_expired(update_timestamp: i64) -> bool {
        epoch() - update_timestamp > CACHE_TTL.as_secs() as i64
    }

    pub fn cache_get(&self, identifier: &RepositoryIdentifier) -> Option<&CacheEntry> {
        self.cache
            .get(identifier)
            .filter(|entry| !Self::cache_is_expired(entry.update_timestamp))
    }

    pub fn cache_insert(&mut self, identifier: RepositoryIdentifier, entry: CacheEntry) {
        self.cache.insert(identifier, entry);
    }
}

async fn load_map<T>(path: &std::path::Path) -> Result<T, FileError>
where
    T: Default + serde::de::DeserializeOwned,
{
    if !path.exists() {
        return Ok(T::default());
    }

    let bytes = tokio::fs::read(path).await?;

    match serde_json::from_slice(&bytes) {
        Ok(value) => Ok(value),
        Err(error) => {
            quarantine(path).await;
            Err(FileError::Deserialize(error))
        }
    }
}

async fn save_map<T>(path: &std::path::Path, value: &T) -> Result<(), FileError>
where
    T: serde::Serialize,
{
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let serialized = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(path, serialized).await?;
    Ok(())
}

/// Best-effort rename of a corrupt state file to `<file>.backup.<epoch-ms>`.
async fn quarantine(path: &std::path::Path) {
    let millis = Utc::now().timestamp_millis();
    let backup = path.with_extension(format!(
        "{}.backup.{millis}",
        path.extension().and_then(|e| e.to_str()).unwrap_or("json")
    ));
    if let Err(error) = tokio::fs::rename(path, &backup).await {
        warn!("failed to quarantine corrupt state file {path:?}: {error}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn installation(dir: &tempfile::TempDir) -> Installation {
        Installation::new(dir.path(), "depot-tests")
    }

    #[tokio::test]
    async fn load_of_missing_files_yields_empty_maps_no_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = Storage::new(installation(&dir));
        let errors = storage.load().await;
        assert!(errors.is_empty());
        assert!(storage.store.is_empty());
        assert!(storage.pool.is_empty());
        assert!(storage.index.is_empty());
    }

    #[tokio::test]
    async fn flush_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let inst = installation(&dir);
        let mut storage = Storage::new(inst.clone());

        let repo_id = RepositoryIdentifier::new("owner/repo");
        storage.store.insert(
            repo_id.clone(),
            LocalRepositoryEntry {
                index: crate::repository::RepositoryIndex {
                    name: "repo".into(),
                    priority: 0,
                    companions: vec![],
                    packages: HashMap::new(),
                    driver: "github".into(),
                    update_timestamp: 0,
                },
                identifier: repo_id.clone(),
                user_installed: true,
            },
        );

        let errors = storage.flush().await;
        assert!(errors.is_empty());

        let mut reloaded = Storage::new(inst);
        reloaded.load().await;
        assert!(reloaded.store.contains_key(&repo_id));
    }

    #[tokio::test]
    async fn corrupt_file_is_quarantined_and_reported() {
        let dir = tempfile::tempdir().unwrap();
        let inst = installation(&dir);
        tokio::fs::create_dir_all(inst.state_dir()).await.unwrap();
        tokio::fs::write(inst.store_path(), b"not json").await.unwrap();

        let mut storage = Storage::new(inst.clone());
        let errors = storage.load().await;

        assert!(errors.contains_key("store"));
        assert!(storage.store.is_empty());
        assert!(!inst.store_path().exists());
    }

    #[test]
    fn cache_expiry_uses_natural_sign() {
        let fresh = Utc::now().timestamp();
        assert!(!Storage::cache_is_expired(fresh));

        let stale = fresh - CACHE_TTL.as_secs() as i64 - 1;
        assert!(Storage::cache_is_expired(stale));

        // A timestamp in the future must not read as expired either,
        // which the natural `now - ts > TTL` sign guarantees.
        let future = fresh + 1000;
        assert!(!Storage::cache_is_expired(future));
    }
}
