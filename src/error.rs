// SPDX-FileCopyrightText: Copyright © 2020-2026 Depot Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Shared error taxonomy surfaced to callers of the orchestrators.
///
/// Individual modules define narrower error enums for their own
/// fallible operations and convert into this type at the boundary
/// where the distinction between error *kinds* (rather than sources)
/// actually matters to a caller.
#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("index for {identifier} could not be read: {reason}")]
    UnreadableIndex { identifier: String, reason: String },

    #[error("digest mismatch for {path}: expected {expected}, got {actual}")]
    DigestMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("io failure at {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("already present: {0}")]
    AlreadyPresent(String),

    #[error("not present: {0}")]
    NotPresent(String),

    #[error("transaction failed with {0} error(s)")]
    TransactionFailure(usize),
}

impl Error {
    pub fn io(path: impl AsRef<std::path::Path>, source: io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}
