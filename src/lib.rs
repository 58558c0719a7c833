// SPDX-FileCopyrightText: Copyright © 2020-2026 Depot Developers
//
// SPDX-License-Identifier: MPL-2.0

//! `depot` — the dependency graph engine, transaction actuator and
//! repository/package orchestrator at the core of a package manager for
//! a sandboxed, file-system-capable host.
//!
//! This crate has no CLI, logging backend, or on-disk format choice of
//! its own: it logs through [`log`], and the embedding application picks
//! a subscriber, a serializer, and a [`driver::Driver`] set.

pub use self::error::Error;
pub use self::installation::Installation;

pub mod deptree;
pub mod digest;
pub mod driver;
pub mod error;
pub mod future;
pub mod ident;
pub mod installation;
pub mod package;
pub mod repository;
pub mod storage;
pub mod transaction;
pub mod wildcard;

use std::sync::Arc;

use tokio::sync::Mutex;

use driver::Registry;
use storage::Storage;

/// Owns the shared [`Storage`] and [`Registry`] and hands out the
/// repository and package orchestrators that share them: a small
/// composition root the embedding application constructs once, rather
/// than global state.
pub struct Depot {
    storage: Arc<Mutex<Storage>>,
    drivers: Arc<Registry>,
}

impl Depot {
    pub fn new(installation: Installation, drivers: Registry) -> Self {
        Self {
            storage: Arc::new(Mutex::new(Storage::new(installation))),
            drivers: Arc::new(drivers),
        }
    }

    /// A [`Depot`] using the bundled `github` driver, for callers that
    /// haven't discovered any drivers of their own.
    pub fn with_default_drivers(installation: Installation) -> Self {
        Self::new(installation, Registry::with_defaults())
    }

    pub fn repositories(&self) -> repository::Orchestrator {
        repository::Orchestrator::new(self.storage.clone(), self.drivers.clone())
    }

    pub fn packages(&self) -> package::Orchestrator {
        package::Orchestrator::new(self.storage.clone(), self.drivers.clone())
    }

    pub fn storage(&self) -> Arc<Mutex<Storage>> {
        self.storage.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn composition_root_shares_storage_across_orchestrators() {
        let dir = tempfile::tempdir().unwrap();
        let depot = Depot::with_default_drivers(Installation::new(dir.path(), "depot-tests"));

        let repos = depot.repositories();
        let packages = depot.packages();

        assert!(repos.find("").await.is_empty());
        assert!(packages.find("*").await.is_empty());
    }
}
