// SPDX-FileCopyrightText: Copyright © 2020-2026 Depot Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Default driver registered when no others are discovered.
//!
//! Fetches an `index.json` and raw package files over `reqwest` from a
//! repository identified as `owner/repo`.

use reqwest::Client;

use super::Driver;
use crate::repository::RepositoryIndex;

const NAME: &str = "github";

pub struct GithubDriver {
    client: Client,
}

impl Default for GithubDriver {
    fn default() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl GithubDriver {
    fn raw_url(&self, identifier: &str, path: &str) -> String {
        format!("https://raw.githubusercontent.com/{identifier}/HEAD/{path}")
    }
}

#[async_trait::async_trait]
impl Driver for GithubDriver {
    fn name(&self) -> &str {
        NAME
    }

    /// Recognizes bare `owner/repo` identifiers (no scheme, exactly one
    /// slash, no leading/trailing slash).
    fn compatible(&self, identifier: &str) -> bool {
        let mut parts = identifier.split('/');
        matches!((parts.next(), parts.next(), parts.next()), (Some(owner), Some(repo), None) if !owner.is_empty() && !repo.is_empty())
    }

    async fn exists(&self, identifier: &str) -> bool {
        let url = format!("https://api.github.com/repos/{identifier}");
        self.client
            .get(url)
            .header("User-Agent", "depot")
            .send()
            .await
            .map(|response| response.status().is_success())
            .unwrap_or(false)
    }

    async fn fetch_index(&self, identifier: &str) -> Result<RepositoryIndex, String> {
        let url = self.raw_url(identifier, "index.json");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|error| error.to_string())?;

        if !response.status().is_success() {
            return Err(format!("GET {url} returned {}", response.status()));
        }

        let bytes = response.bytes().await.map_err(|error| error.to_string())?;

        serde_json::from_slice(&bytes).map_err(|error| error.to_string())
    }

    async fn fetch_package_file(
        &self,
        identifier: &str,
        package_name: &str,
        path: &str,
    ) -> Result<Vec<u8>, String> {
        let url = self.raw_url(identifier, &format!("packages/{package_name}/{path}"));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|error| error.to_string())?;

        if !response.status().is_success() {
            return Err(format!("GET {url} returned {}", response.status()));
        }

        response
            .bytes()
            .await
            .map(|bytes| bytes.to_vec())
            .map_err(|error| error.to_string())
    }
}
