// SPDX-FileCopyrightText: Copyright © 2020-2026 Depot Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Package entities and the package orchestrator (`find`, `build_index`,
//! `add`, `remove`).

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::ident::{PackageIdentifier, PackageName, RepositoryIdentifier};

pub mod actions;
pub mod orchestrator;

pub use orchestrator::{Error, Orchestrator};

/// A named unit of installable files belonging to exactly one
/// repository, as published in a [`crate::repository::RepositoryIndex`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageManifest {
    pub name: PackageName,
    #[serde(default)]
    pub dependencies: Vec<PackageName>,
    /// `installPath -> expected hex digest`.
    #[serde(default)]
    pub files: HashMap<PathBuf, String>,
    /// Opaque metadata the driver's index carried that this crate
    /// doesn't otherwise model (description, version strings, ...).
    #[serde(flatten)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// A [`PackageManifest`] copy installed into the pool, augmented with
/// where it came from and whether the user asked for it directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstalledPackageEntry {
    #[serde(flatten)]
    pub manifest: PackageManifest,
    pub repository: RepositoryIdentifier,
    pub user_installed: bool,
}

impl InstalledPackageEntry {
    pub fn identifier(&self) -> PackageIdentifier {
        PackageIdentifier::new(&self.manifest.name, &self.repository)
    }
}

/// Same shape as [`InstalledPackageEntry`]; produced by
/// [`orchestrator::Orchestrator::build_index`] as a pure function of the
/// store's contents at call time.
pub type IndexEntry = InstalledPackageEntry;
