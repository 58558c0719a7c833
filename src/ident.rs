// SPDX-FileCopyrightText: Copyright © 2020-2026 Depot Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Identifier newtypes shared across the storage, repository and
//! package modules.

use std::fmt;

use derive_more::{AsRef, Display, From, Into};
use serde::{Deserialize, Serialize};

/// Opaque string understood by at least one [`crate::driver::Driver`].
/// Uniqueness key for repositories.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, From, Into, AsRef, Display)]
#[serde(transparent)]
pub struct RepositoryIdentifier(String);

impl RepositoryIdentifier {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

/// Short, not-globally-unique package name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, From, Into, AsRef, Display)]
#[serde(transparent)]
pub struct PackageName(String);

impl PackageName {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

/// `"name@repository"` — globally unique across the package index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, From, Into, AsRef)]
#[serde(transparent)]
pub struct PackageIdentifier(String);

impl PackageIdentifier {
    pub fn new(name: &PackageName, repository: &RepositoryIdentifier) -> Self {
        Self(format!("{name}@{repository}"))
    }

    /// Split back into `(name, repository)`. Splits on the first `@`,
    /// since package names cannot contain one.
    pub fn parts(&self) -> (PackageName, RepositoryIdentifier) {
        match self.0.split_once('@') {
            Some((name, repo)) => (PackageName::new(name), RepositoryIdentifier::new(repo)),
            None => (PackageName::new(self.0.clone()), RepositoryIdentifier::new("")),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PackageIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
