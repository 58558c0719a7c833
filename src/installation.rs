// SPDX-FileCopyrightText: Copyright © 2020-2026 Depot Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::path::{Path, PathBuf};

/// Where the engine's persistent state and materialized package files
/// live on the host: a small value object the embedding application
/// constructs once and threads explicitly into every orchestrator,
/// rather than a global.
#[derive(Debug, Clone)]
pub struct Installation {
    /// Base path for the host's file root, e.g. `/`.
    root: PathBuf,
    /// App name used to namespace the persistent store, e.g. `/share/<app>/`.
    app: String,
}

impl Installation {
    pub fn new(root: impl Into<PathBuf>, app: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            app: app.into(),
        }
    }

    /// `/share/<app>/` — where `store.json`, `index.json` and `pool.json` live.
    pub fn state_dir(&self) -> PathBuf {
        self.root.join("share").join(&self.app)
    }

    pub fn store_path(&self) -> PathBuf {
        self.state_dir().join("store.json")
    }

    pub fn index_path(&self) -> PathBuf {
        self.state_dir().join("index.json")
    }

    pub fn pool_path(&self) -> PathBuf {
        self.state_dir().join("pool.json")
    }

    /// Base directory package files are moved under on removal.
    pub fn trash_dir(&self) -> PathBuf {
        self.state_dir().join(".trash")
    }

    /// Resolve an `installPath` declared by a manifest to an absolute path
    /// under this installation's file root.
    pub fn resolve(&self, install_path: impl AsRef<Path>) -> PathBuf {
        let install_path = install_path.as_ref();
        if install_path.is_absolute() {
            self.root.join(install_path.strip_prefix("/").unwrap_or(install_path))
        } else {
            self.root.join(install_path)
        }
    }

    pub fn trash_path(&self, install_path: impl AsRef<Path>) -> PathBuf {
        let install_path = install_path.as_ref();
        let relative = if install_path.is_absolute() {
            install_path.strip_prefix("/").unwrap_or(install_path)
        } else {
            install_path
        };
        self.trash_dir().join(relative)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
