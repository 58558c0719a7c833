// SPDX-FileCopyrightText: Copyright © 2020-2026 Depot Developers
//
// SPDX-License-Identifier: MPL-2.0

//! File materialization actions. `download_files`/`delete_files`
//! back `package::Orchestrator::add`; `move_to_trash`/`restore_from_trash`
//! back `remove`. Downloads verify digest against the expected hash
//! before landing on disk; removal creates parent directories up front
//! and prunes them back to empty afterward.

use std::path::Path;
use std::sync::Arc;

use log::{debug, warn};
use tokio::sync::Mutex;

use crate::digest::sha256_hex;
use crate::driver::Registry;
use crate::error::Error;
use crate::installation::Installation;
use crate::storage::Storage;

use super::InstalledPackageEntry;

/// `downloadFiles` — fetch every file in the manifest, verify its digest,
/// write it under the installation root, then insert into the pool.
///
/// The pool insertion must not happen if any file
/// failed: callers see a raised error and the action's rollback
/// (`delete_files`) is responsible for cleaning up whatever partial set
/// of files did make it to disk.
pub async fn download_files(
    storage: Arc<Mutex<Storage>>,
    drivers: Arc<Registry>,
    entry: &InstalledPackageEntry,
) -> Result<(), Error> {
    let installation = { storage.lock().await.installation().clone() };

    let driver = drivers
        .select_for(entry.repository.as_ref())
        .ok_or_else(|| Error::NotFound(entry.repository.to_string()))?;

    for (path, expected_digest) in &entry.manifest.files {
        let bytes = driver
            .fetch_package_file(
                entry.repository.as_ref(),
                entry.manifest.name.as_ref(),
                &path.to_string_lossy(),
            )
            .await
            .map_err(|reason| Error::UnreadableIndex {
                identifier: entry.repository.to_string(),
                reason,
            })?;

        let actual_digest = sha256_hex(&bytes);
        if &actual_digest != expected_digest {
            return Err(Error::DigestMismatch {
                path: path.display().to_string(),
                expected: expected_digest.clone(),
                actual: actual_digest,
            });
        }

        let destination = installation.resolve(path);
        if let Some(parent) = destination.parent() {
            fs_err::tokio::create_dir_all(parent)
                .await
                .map_err(|source| Error::io(parent, source))?;
        }
        fs_err::tokio::write(&destination, &bytes)
            .await
            .map_err(|source| Error::io(&destination, source))?;
        debug!("wrote {} ({} bytes)", destination.display(), bytes.len());
    }

    storage.lock().await.pool.insert(entry.identifier(), entry.clone());

    Ok(())
}

/// `deleteFiles` — the rollback counterpart of [`download_files`]. Not
/// used by `package::Orchestrator::remove`, which goes through
/// [`move_to_trash`]/[`restore_from_trash`] instead so a removed
/// package's files can be restored without a re-download; shared here
/// since both prune empty parents identically.
pub async fn delete_files(storage: Arc<Mutex<Storage>>, entry: &InstalledPackageEntry) -> Result<(), Error> {
    let installation = { storage.lock().await.installation().clone() };

    for path in entry.manifest.files.keys() {
        let target = installation.resolve(path);
        remove_file_best_effort(&target).await;
        prune_empty_parents(&installation, &target).await;
    }

    storage.lock().await.pool.remove(&entry.identifier());

    Ok(())
}

/// `moveToTrash` — move each installed file to the trash area, keyed by
/// its install path, overwriting any existing trash entry there, then
/// prune empty parent directories upward from the original location.
pub async fn move_to_trash(storage: Arc<Mutex<Storage>>, entry: &InstalledPackageEntry) -> Result<(), Error> {
    let installation = { storage.lock().await.installation().clone() };

    for path in entry.manifest.files.keys() {
        let source = installation.resolve(path);
        let trashed = installation.trash_path(path);

        if let Some(parent) = trashed.parent() {
            fs_err::tokio::create_dir_all(parent)
                .await
                .map_err(|source_err| Error::io(parent, source_err))?;
        }

        match fs_err::tokio::rename(&source, &trashed).await {
            Ok(()) => {}
            Err(source_err) if source_err.kind() == std::io::ErrorKind::NotFound => {
                warn!("{} already absent while moving to trash", source.display());
            }
            Err(source_err) => return Err(Error::io(&source, source_err)),
        }

        prune_empty_parents(&installation, &source).await;
    }

    storage.lock().await.pool.remove(&entry.identifier());

    Ok(())
}

/// `restoreFromTrash` — the rollback counterpart of [`move_to_trash`].
/// Verifies the trashed file's digest before moving it back, matching
/// the same digest-enforcement discipline as `download_files`.
pub async fn restore_from_trash(storage: Arc<Mutex<Storage>>, entry: &InstalledPackageEntry) -> Result<(), Error> {
    let installation = { storage.lock().await.installation().clone() };

    for (path, expected_digest) in &entry.manifest.files {
        let trashed = installation.trash_path(path);
        let destination = installation.resolve(path);

        let bytes = fs_err::tokio::read(&trashed)
            .await
            .map_err(|source| Error::io(&trashed, source))?;

        let actual_digest = sha256_hex(&bytes);
        if &actual_digest != expected_digest {
            return Err(Error::DigestMismatch {
                path: path.display().to_string(),
                expected: expected_digest.clone(),
                actual: actual_digest,
            });
        }

        if let Some(parent) = destination.parent() {
            fs_err::tokio::create_dir_all(parent)
                .await
                .map_err(|source| Error::io(parent, source))?;
        }
        fs_err::tokio::rename(&trashed, &destination)
            .await
            .map_err(|source| Error::io(&destination, source))?;
    }

    storage.lock().await.pool.insert(entry.identifier(), entry.clone());

    Ok(())
}

async fn remove_file_best_effort(path: &Path) {
    if let Err(error) = fs_err::tokio::remove_file(path).await {
        if error.kind() != std::io::ErrorKind::NotFound {
            warn!("failed to remove {}: {error}", path.display());
        }
    }
}

/// Iteratively climb from `path`'s parent directory up to (but not past)
/// the installation root, removing directories as long as they're empty.
/// Climbs iteratively rather than recursing, so an arbitrarily deep install tree can't blow the stack.
async fn prune_empty_parents(installation: &Installation, path: &Path) {
    let mut current = match path.parent() {
        Some(parent) => parent.to_path_buf(),
        None => return,
    };

    while current != installation.root() && current.starts_with(installation.root()) {
        let mut entries = match fs_err::tokio::read_dir(&current).await {
            Ok(entries) => entries,
            Err(_) => break,
        };

        let is_empty = entries.next_entry().await.ok().flatten().is_none();
        if !is_empty {
            break;
        }

        if fs_err::tokio::remove_dir(&current).await.is_err() {
            break;
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::Driver;
    use crate::ident::RepositoryIdentifier;
    use crate::package::PackageManifest;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::path::PathBuf;

    struct FakeDriver {
        files: HashMap<PathBuf, Vec<u8>>,
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
        async fn fetch_index(&self, _identifier: &str) -> Result<crate::repository::RepositoryIndex, String> {
            Err("unimplemented".into())
        }
        async fn fetch_package_file(&self, _identifier: &str, _package: &str, path: &str) -> Result<Vec<u8>, String> {
            self.files
                .get(Path::new(path))
                .cloned()
                .ok_or_else(|| "missing".to_string())
        }
    }

    fn entry(files: HashMap<PathBuf, String>) -> InstalledPackageEntry {
        InstalledPackageEntry {
            manifest: PackageManifest {
                name: crate::ident::PackageName::new("pkg"),
                dependencies: vec![],
                files,
                metadata: serde_json::Map::new(),
            },
            repository: RepositoryIdentifier::new("owner/repo"),
            user_installed: true,
        }
    }

    #[tokio::test]
    async fn download_then_delete_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let installation = Installation::new(dir.path(), "depot-tests");
        let storage = Arc::new(Mutex::new(Storage::new(installation)));

        let path = PathBuf::from("usr/bin/pkg");
        let bytes = b"hello world".to_vec();
        let digest = sha256_hex(&bytes);

        let mut files = HashMap::new();
        files.insert(path.clone(), digest);
        let entry = entry(files);

        let mut registry = Registry::new();
        let mut driver_files = HashMap::new();
        driver_files.insert(path.clone(), bytes);
        registry.register(Box::new(FakeDriver { files: driver_files }));
        let registry = Arc::new(registry);

        download_files(storage.clone(), registry, &entry).await.unwrap();

        let written = storage.lock().await.installation().resolve(&path);
        assert!(written.exists());
        assert!(storage.lock().await.pool.contains_key(&entry.identifier()));

        delete_files(storage.clone(), &entry).await.unwrap();
        assert!(!written.exists());
        assert!(!storage.lock().await.pool.contains_key(&entry.identifier()));
    }

    #[tokio::test]
    async fn download_rejects_digest_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let installation = Installation::new(dir.path(), "depot-tests");
        let storage = Arc::new(Mutex::new(Storage::new(installation)));

        let path = PathBuf::from("usr/bin/pkg");
        let mut files = HashMap::new();
        files.insert(path.clone(), "0".repeat(64));
        let entry = entry(files);

        let mut registry = Registry::new();
        let mut driver_files = HashMap::new();
        driver_files.insert(path.clone(), b"mismatched".to_vec());
        registry.register(Box::new(FakeDriver { files: driver_files }));

        let result = download_files(storage.clone(), Arc::new(registry), &entry).await;
        assert!(matches!(result, Err(Error::DigestMismatch { .. })));
        assert!(!storage.lock().await.pool.contains_key(&entry.identifier()));

        let written = storage.lock().await.installation().resolve(&path);
        assert!(!written.exists());
    }

    #[tokio::test]
    async fn move_to_trash_then_restore_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let installation = Installation::new(dir.path(), "depot-tests");
        let storage = Arc::new(Mutex::new(Storage::new(installation)));

        let path = PathBuf::from("usr/share/pkg/data.txt");
        let bytes = b"payload".to_vec();
        let digest = sha256_hex(&bytes);
        let mut files = HashMap::new();
        files.insert(path.clone(), digest);
        let entry = entry(files);

        let resolved = storage.lock().await.installation().resolve(&path);
        fs_err::tokio::create_dir_all(resolved.parent().unwrap()).await.unwrap();
        fs_err::tokio::write(&resolved, &bytes).await.unwrap();
        storage.lock().await.pool.insert(entry.identifier(), entry.clone());

        move_to_trash(storage.clone(), &entry).await.unwrap();
        assert!(!resolved.exists());
        assert!(!storage.lock().await.pool.contains_key(&entry.identifier()));

        let trashed = storage.lock().await.installation().trash_path(&path);
        assert!(trashed.exists());

        restore_from_trash(storage.clone(), &entry).await.unwrap();
        assert!(resolved.exists());
        assert!(storage.lock().await.pool.contains_key(&entry.identifier()));
    }
}
