//! Assignment of repositories to backend endpoints.
//!
//! Repositories are placed with rendezvous (highest random weight) hashing
//! on the repository name: every endpoint gets a weight derived from
//! `sha256(endpoint ‖ 0x00 ‖ name)` and the heaviest endpoint wins. The same
//! name always lands on the same endpoint for a given set, and growing the
//! set only moves names onto the new endpoint.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::error::{ClientError, ClientResult};
use crate::vector::{RepoId, RepoName};

/// Immutable set of backend base URLs, sorted and deduplicated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointSet {
    endpoints: Vec<String>,
}

impl EndpointSet {
    pub fn new<I, S>(endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut endpoints: Vec<String> = endpoints
            .into_iter()
            .map(Into::into)
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect();
        endpoints.sort();
        endpoints.dedup();
        Self { endpoints }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.endpoints.iter().map(String::as_str)
    }

    /// Lexically first endpoint, used for requests that are not sharded.
    #[must_use]
    pub fn first(&self) -> Option<&str> {
        self.endpoints.first().map(String::as_str)
    }

    /// Endpoint responsible for `key`.
    pub fn get(&self, key: &str) -> ClientResult<&str> {
        // Iteration is in sorted order and only a strictly heavier endpoint
        // replaces the current one, so ties keep the smaller URL.
        let mut best: Option<(u64, &str)> = None;
        for endpoint in self.iter() {
            let weight = rendezvous_weight(endpoint, key);
            if best.is_none_or(|(w, _)| weight > w) {
                best = Some((weight, endpoint));
            }
        }
        best.map(|(_, endpoint)| endpoint)
            .ok_or(ClientError::NotConfigured)
    }
}

fn rendezvous_weight(endpoint: &str, key: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(endpoint.as_bytes());
    hasher.update([0u8]);
    hasher.update(key.as_bytes());
    let digest = hasher.finalize();
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}

/// The repositories routed to one endpoint.
///
/// `repo_names[i]` and `repo_ids[i]` always describe the same repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoPartition {
    pub repo_names: Vec<RepoName>,
    pub repo_ids: Vec<RepoId>,
}

impl RepoPartition {
    #[must_use]
    pub fn len(&self) -> usize {
        self.repo_names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.repo_names.is_empty()
    }
}

/// Splits parallel name/ID sequences across `endpoints`.
///
/// Only endpoints that receive at least one repository appear in the map.
/// Input order is kept within each partition.
pub fn partition(
    repo_names: &[RepoName],
    repo_ids: &[RepoId],
    endpoints: &EndpointSet,
) -> ClientResult<BTreeMap<String, RepoPartition>> {
    if endpoints.is_empty() {
        return Err(ClientError::NotConfigured);
    }
    if repo_names.len() != repo_ids.len() {
        return Err(ClientError::LengthMismatch {
            names: repo_names.len(),
            ids: repo_ids.len(),
        });
    }

    let mut partitions: BTreeMap<String, RepoPartition> = BTreeMap::new();
    for (name, id) in repo_names.iter().zip(repo_ids) {
        let endpoint = endpoints.get(name.as_str())?;
        let entry = partitions.entry(endpoint.to_string()).or_default();
        entry.repo_names.push(name.clone());
        entry.repo_ids.push(*id);
    }
    Ok(partitions)
}
