// SPDX-FileCopyrightText: Copyright © 2020-2026 Depot Developers
//
// SPDX-License-Identifier: MPL-2.0

//! The repository orchestrator. Composes the dependency engine
//! and the transaction actuator into `fetch`, `fetch_and_store`, `add`,
//! `remove`, `find`.

use std::cell::RefCell;
use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;

use crate::deptree;
use crate::driver::Registry;
use crate::ident::RepositoryIdentifier;
use crate::storage::{self, Storage};
use crate::transaction::{Action, Handlers, Transaction};
use crate::wildcard::Pattern;

use super::{LocalRepositoryEntry, RepositoryIndex};

#[derive(Debug, Error)]
pub enum Error {
    #[error("no compatible driver for {0}")]
    NoDriver(String),
    #[error("repository does not exist: {0}")]
    DoesNotExist(String),
    #[error("cannot fetch index for {0}: {1}")]
    FetchFailed(String, String),
    #[error("repository already present: {0}")]
    AlreadyPresent(String),
    #[error("repository not present: {0}")]
    NotPresent(String),
    #[error("{0}")]
    Dependency(String),
}

pub struct Orchestrator {
    storage: Arc<Mutex<Storage>>,
    drivers: Arc<Registry>,
}

impl Orchestrator {
    pub fn new(storage: Arc<Mutex<Storage>>, drivers: Arc<Registry>) -> Self {
        Self { storage, drivers }
    }

    /// Cache hit, else driver-backed fetch stamped and cached.
    pub async fn fetch(&self, identifier: &RepositoryIdentifier) -> Result<RepositoryIndex, Error> {
        {
            let storage = self.storage.lock().await;
            if let Some(cached) = storage.cache_get(identifier) {
                return Ok(cached.clone());
            }
        }

        let driver = self
            .drivers
            .select_for(identifier.as_ref())
            .ok_or_else(|| Error::NoDriver(identifier.to_string()))?;

        if !driver.exists(identifier.as_ref()).await {
            return Err(Error::DoesNotExist(identifier.to_string()));
        }

        let mut index = driver
            .fetch_index(identifier.as_ref())
            .await
            .map_err(|msg| Error::FetchFailed(identifier.to_string(), msg))?;

        index.driver = driver.name().to_string();
        index.update_timestamp = storage::epoch_seconds();

        {
            let mut storage = self.storage.lock().await;
            storage.cache_insert(identifier.clone(), index.clone());
        }

        Ok(index)
    }

    /// Return the stored entry if present; otherwise a
    /// not-yet-inserted shallow copy of the fetched remote index.
    pub async fn fetch_and_store(&self, identifier: &RepositoryIdentifier) -> Result<LocalRepositoryEntry, Error> {
        {
            let storage = self.storage.lock().await;
            if let Some(entry) = storage.store.get(identifier) {
                return Ok(entry.clone());
            }
        }

        let index = self.fetch(identifier).await?;

        Ok(LocalRepositoryEntry {
            index,
            identifier: identifier.clone(),
            user_installed: false,
        })
    }

    /// Store keys matching `pattern` (empty pattern matches all).
    pub async fn find(&self, pattern: &str) -> Vec<RepositoryIdentifier> {
        let storage = self.storage.lock().await;
        let matcher = Pattern::compile(pattern, "");
        storage
            .store
            .keys()
            .filter(|id| matcher.matches(id.as_ref()))
            .cloned()
            .collect()
    }

    /// Add repositories, expanding through companion edges.
    pub async fn add(
        &self,
        identifiers: Vec<RepositoryIdentifier>,
    ) -> (Option<Transaction<LocalRepositoryEntry>>, Vec<Error>) {
        let mut errors = Vec::new();

        let existing: Vec<RepositoryIdentifier> = self.find("").await;

        let mut working_pool = existing.clone();
        let mut requested = Vec::new();

        for id in identifiers {
            if working_pool.contains(&id) {
                errors.push(Error::AlreadyPresent(id.to_string()));
            } else {
                working_pool.push(id.clone());
                requested.push(id);
            }
        }

        let dependency_errors = RefCell::new(Vec::new());

        let companions = deptree::expand(working_pool, |id: RepositoryIdentifier| {
            let dependency_errors = &dependency_errors;
            async move {
                match self.fetch(&id).await {
                    Ok(index) => Some(index.companions),
                    Err(error) => {
                        dependency_errors.borrow_mut().push(format!("{id}: {error}"));
                        Some(Vec::new())
                    }
                }
            }
        })
        .await;

        errors.extend(dependency_errors.into_inner().into_iter().map(Error::Dependency));

        let mut actions = Vec::new();

        for companion in companions {
            match self.fetch_and_store(&companion).await {
                Ok(entry) => actions.push(add_action(self.storage.clone(), entry)),
                Err(error) => errors.push(error),
            }
        }

        for id in requested {
            match self.fetch_and_store(&id).await {
                Ok(mut entry) => {
                    entry.user_installed = true;
                    actions.push(add_action(self.storage.clone(), entry));
                }
                Err(error) => errors.push(error),
            }
        }

        if actions.is_empty() && !errors.is_empty() {
            return (None, errors);
        }

        let mut tx = Transaction::new(actions);
        tx.set_handlers(self.load_flush_handlers());
        (Some(tx), errors)
    }

    /// Remove repositories, pruning companions that become orphans.
    pub async fn remove(
        &self,
        identifiers: Vec<RepositoryIdentifier>,
    ) -> (Option<Transaction<LocalRepositoryEntry>>, Vec<Error>) {
        let mut errors = Vec::new();

        let snapshot = {
            let storage = self.storage.lock().await;
            storage.store.clone()
        };

        for id in &identifiers {
            if !snapshot.contains_key(id) {
                errors.push(Error::NotPresent(id.to_string()));
            }
        }

        let pool: Vec<RepositoryIdentifier> = snapshot.keys().cloned().collect();
        let roots: HashSet<RepositoryIdentifier> = identifiers.into_iter().collect();

        let get_companions = |id: RepositoryIdentifier| {
            let snapshot = &snapshot;
            async move {
                Some(
                    snapshot
                        .get(&id)
                        .map(|entry| entry.index.companions.clone())
                        .unwrap_or_default(),
                )
            }
        };

        let is_pinned = |id: RepositoryIdentifier| {
            let snapshot = &snapshot;
            let roots = &roots;
            async move {
                if roots.contains(&id) {
                    false
                } else {
                    snapshot.get(&id).map(|entry| entry.user_installed).unwrap_or(false)
                }
            }
        };

        let deletions = deptree::shrink(pool, get_companions, is_pinned).await;

        let actions = deletions
            .into_iter()
            .filter_map(|id| snapshot.get(&id).cloned())
            .map(|entry| remove_action(self.storage.clone(), entry))
            .collect::<Vec<_>>();

        if actions.is_empty() && !errors.is_empty() {
            return (None, errors);
        }

        let mut tx = Transaction::new(actions);
        tx.set_handlers(self.load_flush_handlers());
        (Some(tx), errors)
    }

    fn load_flush_handlers(&self) -> Handlers<LocalRepositoryEntry> {
        let storage_open = self.storage.clone();
        let storage_close = self.storage.clone();
        Handlers {
            open: Some(Arc::new(move || {
                let storage = storage_open.clone();
                Box::pin(async move {
                    storage.lock().await.load().await;
                    Ok(())
                })
            })),
            close: Some(Arc::new(move || {
                let storage = storage_close.clone();
                Box::pin(async move {
                    storage.lock().await.flush().await;
                    Ok(())
                })
            })),
            before_all: None,
            after_all: None,
            before: None,
            after: None,
        }
    }
}

/// `addUnchecked`/`removeUnchecked` pair, used by `add`.
fn add_action(storage: Arc<Mutex<Storage>>, entry: LocalRepositoryEntry) -> Action<LocalRepositoryEntry> {
    let apply_storage = storage.clone();
    let rollback_storage = storage;
    Action::new(
        entry,
        move |entry: &LocalRepositoryEntry| {
            let storage = apply_storage.clone();
            let entry = entry.clone();
            Box::pin(async move {
                storage.lock().await.store.insert(entry.identifier.clone(), entry);
                Ok(())
            })
        },
        move |entry: &LocalRepositoryEntry| {
            let storage = rollback_storage.clone();
            let identifier = entry.identifier.clone();
            Box::pin(async move {
                storage.lock().await.store.remove(&identifier);
                Ok(())
            })
        },
    )
}

/// `removeUnchecked`/`addUnchecked` pair, used by `remove`.
fn remove_action(storage: Arc<Mutex<Storage>>, entry: LocalRepositoryEntry) -> Action<LocalRepositoryEntry> {
    let apply_storage = storage.clone();
    let rollback_storage = storage;
    Action::new(
        entry,
        move |entry: &LocalRepositoryEntry| {
            let storage = apply_storage.clone();
            let identifier = entry.identifier.clone();
            Box::pin(async move {
                storage.lock().await.store.remove(&identifier);
                Ok(())
            })
        },
        move |entry: &LocalRepositoryEntry| {
            let storage = rollback_storage.clone();
            let entry = entry.clone();
            Box::pin(async move {
                storage.lock().await.store.insert(entry.identifier.clone(), entry);
                Ok(())
            })
        },
    )
}
