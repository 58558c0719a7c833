// SPDX-FileCopyrightText: Copyright © 2020-2026 Depot Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Pluggable fetchers. The engine only ever sees the four-operation
//! interface; no driver internals are specified beyond the bundled
//! default.

use async_trait::async_trait;

use crate::repository::RepositoryIndex;

pub mod github;

/// A fetcher for a family of repository identifiers.
///
/// Drivers are discovered at startup and selected by compatibility, not
/// by name: repository behavior is keyed off the identifier's shape
/// rather than an explicit driver choice at the call site.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Stable name this driver registers under (stamped onto fetched
    /// indexes so the cache can be re-associated with its driver).
    fn name(&self) -> &str;

    /// Whether this driver recognizes `identifier`'s shape.
    fn compatible(&self, identifier: &str) -> bool;

    /// Whether the repository actually exists (network probe).
    async fn exists(&self, identifier: &str) -> bool;

    async fn fetch_index(&self, identifier: &str) -> Result<RepositoryIndex, String>;

    async fn fetch_package_file(
        &self,
        identifier: &str,
        package_name: &str,
        path: &str,
    ) -> Result<Vec<u8>, String>;
}

/// Selects a compatible [`Driver`] for a repository identifier.
///
/// Populated from a fixed in-process table at construction time; if
/// none are registered explicitly, [`Registry::with_defaults`]
/// registers the bundled `github` driver.
#[derive(Default)]
pub struct Registry {
    drivers: Vec<Box<dyn Driver>>,
}

impl Registry {
    pub fn new() -> Self {
        Self { drivers: Vec::new() }
    }

    /// A registry seeded with the default `github` driver, used when
    /// discovery yields none.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(github::GithubDriver::default()));
        registry
    }

    pub fn register(&mut self, driver: Box<dyn Driver>) {
        self.drivers.push(driver);
    }

    /// First driver for which `compatible(identifier)` is true, in
    /// registration order. No further tie-break is specified.
    pub fn select_for(&self, identifier: &str) -> Option<&dyn Driver> {
        self.drivers
            .iter()
            .find(|driver| driver.compatible(identifier))
            .map(|driver| driver.as_ref())
    }

    pub fn by_name(&self, name: &str) -> Option<&dyn Driver> {
        self.drivers.iter().find(|d| d.name() == name).map(|d| d.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Always(&'static str);

    #[async_trait]
    impl Driver for Always {
        fn name(&self) -> &str {
            self.0
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
        async fn fetch_package_file(
            &self,
            _identifier: &str,
            _package_name: &str,
            _path: &str,
        ) -> Result<Vec<u8>, String> {
            Err("unimplemented".into())
        }
    }

    #[test]
    fn select_for_uses_registration_order() {
        let mut registry = Registry::new();
        registry.register(Box::new(Always("first")));
        registry.register(Box::new(Always("second")));

        let selected = registry.select_for("anything").unwrap();
        assert_eq!(selected.name(), "first");
    }

    #[test]
    fn select_for_none_when_empty() {
        let registry = Registry::new();
        assert!(registry.select_for("anything").is_none());
    }

    #[test]
    fn with_defaults_registers_github() {
        let registry = Registry::with_defaults();
        assert!(registry.by_name("github").is_some());
    }
}
