//! Remote tag discovery against the Pyxis catalog API.

use anyhow::{Context, Result};
use log::debug;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::time::Duration;

pub const PYXIS_BASE: &str = "https://catalog.redhat.com/api/containers/v1";

const PAGE_SIZE: usize = 500;

#[derive(Debug, Deserialize)]
struct PyxisPage {
    #[serde(default)]
    data: Vec<PyxisImage>,
}

#[derive(Debug, Deserialize)]
struct PyxisImage {
    #[serde(default)]
    repositories: Vec<PyxisRepository>,
}

#[derive(Debug, Deserialize)]
struct PyxisRepository {
    #[serde(default)]
    tags: Vec<PyxisTag>,
}

#[derive(Debug, Deserialize)]
struct PyxisTag {
    #[serde(default)]
    name: String,
}

/// Resolve the catalog-facing registry host and the repository path for a
/// Pyxis lookup.
///
/// Red Hat images are cataloged under `registry.access.redhat.com` even
/// when pulled from `registry.redhat.io`; other hosts pass through. Any
/// registry-host prefix is stripped from the repository path.
pub fn catalog_registry_and_path(registry: &str, repo: &str) -> (String, String) {
    let catalog_registry = if registry.ends_with("redhat.io") {
        "registry.access.redhat.com".to_string()
    } else {
        registry.to_string()
    };

    let mut repo_path = repo;
    if let Some(stripped) = repo_path.strip_prefix(&format!("{}/", registry)) {
        repo_path = stripped;
    }
    if let Some(stripped) = repo_path.strip_prefix(&format!("{}/", catalog_registry)) {
        repo_path = stripped;
    }
    (catalog_registry, repo_path.to_string())
}

/// Blocking Pyxis client used for `--tags all`.
pub struct TagDiscovery {
    client: reqwest::blocking::Client,
}

impl TagDiscovery {
    pub fn new() -> Result<Self> {
        let user_agent = format!("ee-inventory/{}", env!("CARGO_PKG_VERSION"));
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(user_agent)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }

    /// Discover every tag published for a repository, paginating through
    /// the catalog and aggregating tag names across the nested
    /// repository/tag structures into a sorted, de-duplicated list.
    pub fn discover_tags(&self, registry: &str, repo: &str) -> Result<Vec<String>> {
        let (catalog_registry, repo_path) = catalog_registry_and_path(registry, repo);
        let url = format!(
            "{}/repositories/registry/{}/repository/{}/images",
            PYXIS_BASE, catalog_registry, repo_path
        );

        let mut tags = BTreeSet::new();
        let mut page = 0usize;
        loop {
            debug!("Fetching {} page {}", url, page);
            let response: PyxisPage = self
                .client
                .get(&url)
                .query(&[("page_size", PAGE_SIZE), ("page", page)])
                .send()
                .with_context(|| format!("Tag discovery request failed for {}", repo_path))?
                .error_for_status()
                .with_context(|| format!("Tag discovery rejected for {}", repo_path))?
                .json()
                .context("Invalid JSON from the catalog service")?;

            let count = response.data.len();
            for image in response.data {
                for repository in image.repositories {
                    for tag in repository.tags {
                        if !tag.name.is_empty() {
                            tags.insert(tag.name);
                        }
                    }
                }
            }
            if count < PAGE_SIZE {
                break;
            }
            page += 1;
        }

        Ok(tags.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redhat_io_maps_to_access_catalog_host() {
        let (registry, path) = catalog_registry_and_path(
            "registry.redhat.io",
            "registry.redhat.io/ansible-automation-platform-25/ee-minimal-rhel9",
        );
        assert_eq!(registry, "registry.access.redhat.com");
        assert_eq!(path, "ansible-automation-platform-25/ee-minimal-rhel9");
    }

    #[test]
    fn test_other_registries_pass_through() {
        let (registry, path) = catalog_registry_and_path("quay.io", "quay.io/ns/app");
        assert_eq!(registry, "quay.io");
        assert_eq!(path, "ns/app");
    }

    #[test]
    fn test_catalog_host_prefix_is_also_stripped() {
        let (registry, path) = catalog_registry_and_path(
            "registry.redhat.io",
            "registry.access.redhat.com/ns/app",
        );
        assert_eq!(registry, "registry.access.redhat.com");
        assert_eq!(path, "ns/app");
    }

    #[test]
    fn test_unprefixed_path_is_unchanged() {
        let (_, path) = catalog_registry_and_path("registry.redhat.io", "ns/app");
        assert_eq!(path, "ns/app");
    }

    #[test]
    fn test_pyxis_response_shape_parses() {
        let page: PyxisPage = serde_json::from_str(
            r#"{"data": [{"repositories": [{"tags": [{"name": "1.0"}, {"name": ""}]}, {}]}, {}]}"#,
        )
        .unwrap();
        assert_eq!(page.data.len(), 2);
        assert_eq!(page.data[0].repositories[0].tags[0].name, "1.0");
        assert!(page.data[0].repositories[1].tags.is_empty());
    }
}
