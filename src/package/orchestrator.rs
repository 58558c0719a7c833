// SPDX-FileCopyrightText: Copyright © 2020-2026 Depot Developers
//
// SPDX-License-Identifier: MPL-2.0

//! The package orchestrator. Builds the priority-ordered global
//! package index and composes the dependency engine and transaction
//! actuator into `find`, `build_index`, `add`, `remove`.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, info, warn};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::deptree;
use crate::driver::Registry;
use crate::ident::{PackageIdentifier, PackageName};
use crate::package::actions;
use crate::storage::Storage;
use crate::transaction::{Action, Handlers, Transaction};
use crate::wildcard::Pattern;

use super::InstalledPackageEntry;

#[derive(Debug, Error)]
pub enum Error {
    #[error("package already installed: {0}")]
    AlreadyInstalled(String),
    #[error("package not installed: {0}")]
    NotInstalled(String),
    #[error("no package matches: {0}")]
    NoMatch(String),
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

    /// `namePattern[@repoPattern]`; `@*` is appended when the
    /// pattern carries no `@`, so wildcards in the name half can never
    /// cross into the repo half.
    pub async fn find(&self, pattern: &str) -> Vec<InstalledPackageEntry> {
        let pattern = if pattern.contains('@') {
            pattern.to_string()
        } else {
            format!("{pattern}@*")
        };
        let matcher = Pattern::compile(&pattern, "@");

        let storage = self.storage.lock().await;
        let mut results = Vec::new();
        for local_entry in storage.store.values() {
            for manifest in local_entry.index.packages.values() {
                let identifier = PackageIdentifier::new(&manifest.name, &local_entry.identifier);
                if matcher.matches(identifier.as_str()) {
                    results.push(InstalledPackageEntry {
                        manifest: manifest.clone(),
                        repository: local_entry.identifier.clone(),
                        user_installed: false,
                    });
                }
            }
        }
        results
    }

    /// Pure function of the store: rebuild the global index,
    /// keyed by `name@repository`, ordered by `(-priority, name)` so the
    /// first match for a bare package name is deterministic.
    pub async fn build_index(&self) -> Vec<PackageName> {
        self.storage.lock().await.load_if_expired().await;

        let mut names: HashSet<PackageName> = HashSet::new();
        let mut entries: Vec<_> = {
            let storage = self.storage.lock().await;
            storage.store.values().cloned().collect()
        };

        entries.sort_by(|a, b| match b.index.priority.cmp(&a.index.priority) {
            Ordering::Equal => a.identifier.as_ref().cmp(b.identifier.as_ref()),
            other => other,
        });

        let mut index = std::collections::HashMap::new();
        for local_entry in &entries {
            for manifest in local_entry.index.packages.values() {
                names.insert(manifest.name.clone());
                let identifier = PackageIdentifier::new(&manifest.name, &local_entry.identifier);
                index.insert(
                    identifier,
                    InstalledPackageEntry {
                        manifest: manifest.clone(),
                        repository: local_entry.identifier.clone(),
                        user_installed: false,
                    },
                );
            }
        }

        let packs: Vec<PackageName> = names.into_iter().collect();

        {
            let mut storage = self.storage.lock().await;
            storage.index = index;
        }
        self.storage.lock().await.flush().await;

        debug!("package index rebuilt: {} names across {} repos", packs.len(), entries.len());
        packs
    }

    /// Add packages, expanding through dependency edges
    /// resolved against the priority-ordered index.
    pub async fn add(&self, names: Vec<String>) -> (Option<Transaction<InstalledPackageEntry>>, Vec<Error>) {
        let mut errors = Vec::new();

        let mut added_by_id = std::collections::HashMap::new();
        for name in &names {
            let matches = self.find(name).await;
            if matches.is_empty() {
                errors.push(Error::NoMatch(name.clone()));
                continue;
            }
            for m in matches {
                added_by_id.entry(m.identifier()).or_insert(m);
            }
        }

        let existing: Vec<PackageIdentifier> = {
            let storage = self.storage.lock().await;
            storage.pool.keys().cloned().collect()
        };
        let existing_set: HashSet<PackageIdentifier> = existing.iter().cloned().collect();

        let mut working_pool = existing.clone();
        let mut requested = Vec::new();
        for (identifier, entry) in &added_by_id {
            if existing_set.contains(identifier) {
                errors.push(Error::AlreadyInstalled(identifier.to_string()));
            } else {
                working_pool.push(identifier.clone());
                requested.push(entry.clone());
            }
        }

        // `getDeps(pid) = index[pid].dependencies`, with
        // each dependency name expanded through `find` so a bare name
        // resolves against the priority order, not an arbitrary repo.
        let dependency_errors = RefCell::new(Vec::new());

        let get_deps = |identifier: PackageIdentifier| {
            let storage = self.storage.clone();
            let dependency_errors = &dependency_errors;
            async move {
                let dep_names = {
                    let storage = storage.lock().await;
                    match storage.index.get(&identifier) {
                        Some(entry) => entry.manifest.dependencies.clone(),
                        None => return Some(Vec::new()),
                    }
                };

                let mut deps = Vec::new();
                for dep_name in dep_names {
                    match resolve_by_priority(&storage, &dep_name).await {
                        Some(resolved) => deps.push(resolved),
                        None => dependency_errors
                            .borrow_mut()
                            .push(format!("cannot resolve dependency {dep_name} of {identifier}")),
                    }
                }
                Some(deps)
            }
        };

        let additions = deptree::expand(working_pool, get_deps).await;

        errors.extend(dependency_errors.into_inner().into_iter().map(Error::Dependency));

        let mut dependency_entries = Vec::new();
        for identifier in additions {
            if existing_set.contains(&identifier) {
                continue;
            }
            let storage = self.storage.lock().await;
            match storage.index.get(&identifier) {
                Some(entry) => dependency_entries.push(entry.clone()),
                None => errors.push(Error::Dependency(format!("cannot resolve dependency {identifier}"))),
            }
        }

        let mut actions = Vec::new();
        for entry in dependency_entries {
            debug!("resolved dependency {}", entry.identifier());
            actions.push(download_action(self.storage.clone(), self.drivers.clone(), entry));
        }
        for mut entry in requested {
            entry.user_installed = true;
            info!("adding package {}", entry.identifier());
            actions.push(download_action(self.storage.clone(), self.drivers.clone(), entry));
        }

        if actions.is_empty() && !errors.is_empty() {
            return (None, errors);
        }

        let mut tx = Transaction::new(actions);
        tx.set_handlers(self.load_flush_handlers());
        (Some(tx), errors)
    }

    /// Remove packages, pruning dependencies that become
    /// orphans within the installed pool.
    pub async fn remove(&self, names: Vec<String>) -> (Option<Transaction<InstalledPackageEntry>>, Vec<Error>) {
        let mut errors = Vec::new();

        let snapshot = {
            let storage = self.storage.lock().await;
            storage.pool.clone()
        };

        let mut roots = HashSet::new();
        for name in &names {
            let matching: Vec<PackageIdentifier> = snapshot
                .keys()
                .filter(|identifier| {
                    let (pkg_name, _repo) = identifier.parts();
                    pkg_name.as_ref() == name.as_str()
                })
                .cloned()
                .collect();
            if matching.is_empty() {
                errors.push(Error::NotInstalled(name.clone()));
            }
            roots.extend(matching);
        }

        let pool: Vec<PackageIdentifier> = snapshot.keys().cloned().collect();

        let get_deps = {
            let snapshot = snapshot.clone();
            move |identifier: PackageIdentifier| {
                let snapshot = snapshot.clone();
                async move {
                    Some(
                        snapshot
                            .get(&identifier)
                            .map(|entry| entry.manifest.dependencies.clone().into_iter())
                            .into_iter()
                            .flatten()
                            .filter_map(|dep_name| {
                                snapshot
                                    .keys()
                                    .find(|identifier| identifier.parts().0 == dep_name)
                                    .cloned()
                            })
                            .collect::<Vec<_>>(),
                    )
                }
            }
        };

        let is_pinned = {
            let snapshot = snapshot.clone();
            let roots = roots.clone();
            move |identifier: PackageIdentifier| {
                let snapshot = snapshot.clone();
                let roots = roots.clone();
                async move {
                    if roots.contains(&identifier) {
                        false
                    } else {
                        snapshot.get(&identifier).map(|entry| entry.user_installed).unwrap_or(false)
                    }
                }
            }
        };

        let deletions = deptree::shrink(pool, get_deps, is_pinned).await;

        let actions = deletions
            .into_iter()
            .filter_map(|identifier| snapshot.get(&identifier).cloned())
            .map(|entry| {
                info!("removing package {}", entry.identifier());
                trash_action(self.storage.clone(), entry)
            })
            .collect::<Vec<_>>();

        if actions.is_empty() && !errors.is_empty() {
            return (None, errors);
        }

        let mut tx = Transaction::new(actions);
        tx.set_handlers(self.load_flush_handlers());
        (Some(tx), errors)
    }

    fn load_flush_handlers(&self) -> Handlers<InstalledPackageEntry> {
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

/// Resolve a bare package name to the identifier the priority-ordered
/// index would pick, using the same `(-priority, name)` comparator as
/// `build_index`.
async fn resolve_by_priority(storage: &Arc<Mutex<Storage>>, name: &PackageName) -> Option<PackageIdentifier> {
    let storage = storage.lock().await;
    let mut entries: Vec<_> = storage
        .store
        .values()
        .filter(|entry| entry.index.packages.contains_key(name))
        .collect();
    entries.sort_by(|a, b| match b.index.priority.cmp(&a.index.priority) {
        Ordering::Equal => a.identifier.as_ref().cmp(b.identifier.as_ref()),
        other => other,
    });
    entries.first().map(|entry| PackageIdentifier::new(name, &entry.identifier))
}

/// `downloadFiles`/`deleteFiles` pair, used by `add`.
fn download_action(
    storage: Arc<Mutex<Storage>>,
    drivers: Arc<Registry>,
    entry: InstalledPackageEntry,
) -> Action<InstalledPackageEntry> {
    let apply_storage = storage.clone();
    let apply_drivers = drivers;
    let rollback_storage = storage;
    Action::new(
        entry,
        move |entry: &InstalledPackageEntry| {
            let storage = apply_storage.clone();
            let drivers = apply_drivers.clone();
            let entry = entry.clone();
            Box::pin(async move {
                let result = actions::download_files(storage.clone(), drivers, &entry).await;
                if let Err(error) = &result {
                    warn!("download of {} failed: {error}", entry.identifier());
                }
                result
            })
        },
        move |entry: &InstalledPackageEntry| {
            let storage = rollback_storage.clone();
            let entry = entry.clone();
            Box::pin(async move { actions::delete_files(storage, &entry).await })
        },
    )
}

/// `moveToTrash`/`restoreFromTrash` pair, used by `remove`.
fn trash_action(storage: Arc<Mutex<Storage>>, entry: InstalledPackageEntry) -> Action<InstalledPackageEntry> {
    let apply_storage = storage.clone();
    let rollback_storage = storage;
    Action::new(
        entry,
        move |entry: &InstalledPackageEntry| {
            let storage = apply_storage.clone();
            let entry = entry.clone();
            Box::pin(async move { actions::move_to_trash(storage, &entry).await })
        },
        move |entry: &InstalledPackageEntry| {
            let storage = rollback_storage.clone();
            let entry = entry.clone();
            Box::pin(async move { actions::restore_from_trash(storage, &entry).await })
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::Driver;
    use crate::ident::RepositoryIdentifier;
    use crate::installation::Installation;
    use crate::package::PackageManifest;
    use crate::repository::{LocalRepositoryEntry, RepositoryIndex};
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct FakeDriver {
        files: HashMap<String, Vec<u8>>,
    }

    #[async_trait]
    impl Driver for FakeDriver {
        fn name(&self) -> &str {
            "fake"
        }
        fn compatible(&self, _identifier: &str) -> bool {
            true
        }
        async fn exists(&self, _identifier: &str) -> bool {
            true
        }
        async fn fetch_index(&self, _identifier: &str) -> Result<RepositoryIndex, String> {
            Err("unimplemented".into())
        }
        async fn fetch_package_file(&self, _identifier: &str, package: &str, path: &str) -> Result<Vec<u8>, String> {
            self.files.get(&format!("{package}:{path}")).cloned().ok_or_else(|| "missing".to_string())
        }
    }

    fn manifest(name: &str, deps: &[&str], files: HashMap<std::path::PathBuf, String>) -> PackageManifest {
        PackageManifest {
            name: PackageName::new(name),
            dependencies: deps.iter().map(|d| PackageName::new(*d)).collect(),
            files,
            metadata: serde_json::Map::new(),
        }
    }

    async fn orchestrator_with_store(
        dir: &tempfile::TempDir,
        packages: HashMap<PackageName, PackageManifest>,
        driver_files: HashMap<String, Vec<u8>>,
    ) -> Orchestrator {
        let storage = Arc::new(Mutex::new(Storage::new(Installation::new(dir.path(), "depot-tests"))));
        {
            let mut storage = storage.lock().await;
            storage.store.insert(
                RepositoryIdentifier::new("owner/repo"),
                LocalRepositoryEntry {
                    index: RepositoryIndex {
                        name: "repo".into(),
                        priority: 0,
                        companions: vec![],
                        packages,
                        driver: "fake".into(),
                        update_timestamp: 0,
                    },
                    identifier: RepositoryIdentifier::new("owner/repo"),
                    user_installed: true,
                },
            );
        }
        let mut registry = Registry::new();
        registry.register(Box::new(FakeDriver { files: driver_files }));
        let orch = Orchestrator::new(storage, Arc::new(registry));
        orch.build_index().await;
        orch
    }

    #[tokio::test]
    async fn add_expands_dependencies_and_downloads_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut packages = HashMap::new();
        let leaf_bytes = b"leaf contents".to_vec();
        let mut leaf_files = HashMap::new();
        leaf_files.insert(std::path::PathBuf::from("usr/lib/leaf"), crate::digest::sha256_hex(&leaf_bytes));
        packages.insert(PackageName::new("leaf"), manifest("leaf", &[], leaf_files));
        packages.insert(PackageName::new("root"), manifest("root", &["leaf"], HashMap::new()));

        let mut driver_files = HashMap::new();
        driver_files.insert("leaf:usr/lib/leaf".to_string(), leaf_bytes);

        let orch = orchestrator_with_store(&dir, packages, driver_files).await;

        let (tx, errors) = orch.add(vec!["root".to_string()]).await;
        assert!(errors.is_empty());
        let tx = tx.unwrap();
        assert_eq!(tx.len(), 2);

        let (ok, errors) = tx.apply().await;
        assert!(ok, "apply should succeed: {errors:?}");

        let storage = orch.storage.lock().await;
        assert_eq!(storage.pool.len(), 2);
        let root_id = PackageIdentifier::new(&PackageName::new("root"), &RepositoryIdentifier::new("owner/repo"));
        assert!(storage.pool.get(&root_id).unwrap().user_installed);
        let leaf_id = PackageIdentifier::new(&PackageName::new("leaf"), &RepositoryIdentifier::new("owner/repo"));
        assert!(!storage.pool.get(&leaf_id).unwrap().user_installed);
    }

    #[tokio::test]
    async fn add_rolls_back_on_digest_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let mut packages = HashMap::new();
        let mut files = HashMap::new();
        files.insert(std::path::PathBuf::from("usr/lib/bad"), "0".repeat(64));
        packages.insert(PackageName::new("bad"), manifest("bad", &[], files));

        let mut driver_files = HashMap::new();
        driver_files.insert("bad:usr/lib/bad".to_string(), b"mismatched bytes".to_vec());

        let orch = orchestrator_with_store(&dir, packages, driver_files).await;

        let (tx, errors) = orch.add(vec!["bad".to_string()]).await;
        assert!(errors.is_empty());
        let tx = tx.unwrap();

        let (ok, errors) = tx.apply().await;
        assert!(!ok);
        assert!(!errors.is_empty());

        let storage = orch.storage.lock().await;
        assert!(storage.pool.is_empty());

        let path = storage.installation().resolve("usr/lib/bad");
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn build_index_orders_by_priority_then_name() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(Mutex::new(Storage::new(Installation::new(dir.path(), "depot-tests"))));

        let mut pkgs = HashMap::new();
        pkgs.insert(PackageName::new("x"), manifest("x", &[], HashMap::new()));

        {
            let mut storage = storage.lock().await;
            for (id, priority) in [("R1", 10), ("R2", 10), ("R3", 5)] {
                storage.store.insert(
                    RepositoryIdentifier::new(id),
                    LocalRepositoryEntry {
                        index: RepositoryIndex {
                            name: id.into(),
                            priority,
                            companions: vec![],
                            packages: pkgs.clone(),
                            driver: "fake".into(),
                            update_timestamp: 0,
                        },
                        identifier: RepositoryIdentifier::new(id),
                        user_installed: true,
                    },
                );
            }
        }

        let orch = Orchestrator::new(storage, Arc::new(Registry::new()));
        let names = orch.build_index().await;
        assert_eq!(names, vec![PackageName::new("x")]);

        let storage = orch.storage.lock().await;
        assert_eq!(storage.index.len(), 3);
        for id in ["R1", "R2", "R3"] {
            let identifier = PackageIdentifier::new(&PackageName::new("x"), &RepositoryIdentifier::new(id));
            assert!(storage.index.contains_key(&identifier));
        }
    }
}
