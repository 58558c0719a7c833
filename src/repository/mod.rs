// SPDX-FileCopyrightText: Copyright © 2020-2026 Depot Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Repository entities and the repository orchestrator (`fetch`,
//! `fetch_and_store`, `add`, `remove`, `find`).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ident::RepositoryIdentifier;
use crate::package::PackageManifest;
use crate::package::PackageName;

pub mod orchestrator;

pub use orchestrator::{Error, Orchestrator};

/// A remote repository's published manifest: packages plus companion
/// repositories implicitly required alongside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryIndex {
    pub name: String,
    /// Higher wins; defaults to 0 if absent.
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub companions: Vec<RepositoryIdentifier>,
    #[serde(default)]
    pub packages: HashMap<PackageName, PackageManifest>,
    pub driver: String,
    /// Seconds since epoch, stamped at fetch time.
    pub update_timestamp: i64,
}

/// In-memory, TTL-bounded copy of a remote [`RepositoryIndex`]. The
/// cache is never persisted; `update_timestamp` on the index itself
/// records when it was fetched.
pub type CacheEntry = RepositoryIndex;

/// A [`RepositoryIndex`] installed into the store, augmented with its
/// identifier and whether the user asked for it directly (as opposed to
/// being pulled in as a companion).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalRepositoryEntry {
    #[serde(flatten)]
    pub index: RepositoryIndex,
    pub identifier: RepositoryIdentifier,
    pub user_installed: bool,
}
