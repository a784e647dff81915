// Copyright (c) 2025 - Cowboy AI, Inc.
//! Static Instance Directory
//!
//! Cluster membership read from a JSON inventory:
//!
//! ```json
//! {
//!   "clusters": {
//!     "app-mpdw-emr-dev": {
//!       "MASTER": [{ "instanceId": "i-0abc", "privateIp": "10.1.0.12" }],
//!       "CORE":   [{ "instanceId": "i-0def" }]
//!     }
//!   }
//! }
//! ```
//!
//! Clusters are keyed by id or by name; a name entry answers for the id it
//! is aliased to.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::debug;

use super::{ClusterInstance, InstanceDirectory, InstanceRole, RegistrationError, RegistrationResult};

/// Instances by cluster and role
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub clusters: BTreeMap<String, BTreeMap<InstanceRole, Vec<ClusterInstance>>>,
}

impl Inventory {
    pub fn from_json_str(json: &str) -> RegistrationResult<Self> {
        serde_json::from_str(json).map_err(|e| RegistrationError::Inventory(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> RegistrationResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| RegistrationError::Inventory(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&contents)
    }

    pub fn with_instances(
        mut self,
        cluster: impl Into<String>,
        role: InstanceRole,
        instances: Vec<ClusterInstance>,
    ) -> Self {
        self.clusters
            .entry(cluster.into())
            .or_default()
            .insert(role, instances);
        self
    }
}

/// In-memory [`InstanceDirectory`]
#[derive(Debug, Clone, Default)]
pub struct StaticInstanceDirectory {
    inventory: Inventory,
    aliases: HashMap<String, String>,
}

impl StaticInstanceDirectory {
    pub fn new(inventory: Inventory) -> Self {
        Self {
            inventory,
            aliases: HashMap::new(),
        }
    }

    /// Answer lookups for `cluster_id` from the entry stored under `name`
    pub fn alias(&mut self, cluster_id: impl Into<String>, name: impl Into<String>) {
        self.aliases.insert(cluster_id.into(), name.into());
    }
}

#[async_trait]
impl InstanceDirectory for StaticInstanceDirectory {
    async fn running_instances(
        &self,
        cluster_id: &str,
        role: InstanceRole,
    ) -> RegistrationResult<Vec<ClusterInstance>> {
        let clusters = &self.inventory.clusters;
        let entry = clusters.get(cluster_id).or_else(|| {
            self.aliases
                .get(cluster_id)
                .and_then(|name| clusters.get(name))
        });
        let instances = entry
            .and_then(|roles| roles.get(&role))
            .cloned()
            .unwrap_or_default();
        debug!(cluster_id, %role, count = instances.len(), "inventory lookup");
        Ok(instances)
    }
}
