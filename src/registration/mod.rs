// Copyright (c) 2025 - Cowboy AI, Inc.
//! Cluster Target Registration
//!
//! EMR picks its own instances, so the targets of the cluster-backed target
//! groups are only known once the cluster is running. Registration asks an
//! [`InstanceDirectory`] which instances back a cluster and declares the
//! resulting attachments and name tags into the graph, to be provisioned
//! by a second apply.
//!
//! ```text
//! ┌────────────────────┐  running_instances(id, MASTER) ┌──────────────────┐
//! │ register_cluster_  │───────────────────────────────►│ InstanceDirectory│
//! │ targets            │  running_instances(id, CORE)   │  (static / EC2)  │
//! │                    │───────────────────────────────►│                  │
//! └─────────┬──────────┘                                └──────────────────┘
//!           │ plan_registration
//!           ▼
//!   masters × groups  ─► TargetGroupAttachment  <group>-<instance id>
//!   masters + cores   ─► Ec2Tag <cluster>-name-<instance id>
//!                        Name = <cluster>-master-<i> / -core-<i>
//! ```
//!
//! Only master nodes serve the load-balanced UIs; core nodes get a name tag
//! and nothing else. Every declared resource is keyed by instance id, so
//! registering again declares only what belongs to new instances. Attachments left over from instances that have since
//! disappeared are reported by [`stale_attachments`] and never removed.

#[cfg(feature = "aws")]
pub mod ec2;
mod inventory;

#[cfg(feature = "aws")]
pub use ec2::Ec2InstanceDirectory;
pub use inventory::{Inventory, StaticInstanceDirectory};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::graph::{GraphError, ResourceGraph, ResourceKey, ResourceKind, ResourceRef};
use crate::provisioning::DeploymentState;
use crate::stack::{ClusterHandle, DataPlatformStack, DeferredTargets};

/// Registration errors
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// The directory could not list the cluster's instances
    #[error("Failed to look up {role} instances of cluster {cluster}: {reason}")]
    Lookup {
        cluster: String,
        role: InstanceRole,
        reason: String,
    },

    /// The inventory file is unreadable or malformed
    #[error("Invalid instance inventory: {0}")]
    Inventory(String),

    /// The cluster has no id yet; apply the stack first
    #[error("Cluster {0} has not been provisioned")]
    ClusterNotProvisioned(String),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

pub type RegistrationResult<T> = Result<T, RegistrationError>;

/// EMR instance group role, as stamped in `aws:elasticmapreduce:instance-group-role`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InstanceRole {
    Master,
    Core,
}

impl InstanceRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Master => "MASTER",
            Self::Core => "CORE",
        }
    }

    fn tag_segment(&self) -> &'static str {
        match self {
            Self::Master => "master",
            Self::Core => "core",
        }
    }
}

impl fmt::Display for InstanceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A running cluster node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterInstance {
    pub instance_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_ip: Option<String>,
}

impl ClusterInstance {
    pub fn new(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            private_ip: None,
        }
    }
}

/// Source of truth for which instances back a cluster
#[async_trait]
pub trait InstanceDirectory: Send + Sync {
    /// Running instances of `cluster_id` in the given instance group role
    async fn running_instances(
        &self,
        cluster_id: &str,
        role: InstanceRole,
    ) -> RegistrationResult<Vec<ClusterInstance>>;
}

/// A target group attachment to declare
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedAttachment {
    pub name: String,
    pub target_group: ResourceRef,
    pub instance_id: String,
    pub port: u16,
}

/// A `Name` tag to declare on an instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTag {
    pub name: String,
    pub instance_id: String,
    pub role: InstanceRole,
    pub value: String,
}

/// Everything registration will declare for one cluster
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RegistrationPlan {
    pub cluster: String,
    pub target_groups: Vec<String>,
    pub attachments: Vec<PlannedAttachment>,
    pub tags: Vec<PlannedTag>,
}

impl RegistrationPlan {
    pub fn is_empty(&self) -> bool {
        self.attachments.is_empty() && self.tags.is_empty()
    }

    /// Declare the planned resources, each after `cluster`
    ///
    /// Resources the graph already holds are left alone; only the newly
    /// declared ones are returned.
    pub fn declare(
        &self,
        graph: &mut ResourceGraph,
        cluster: &ResourceRef,
    ) -> RegistrationResult<Vec<ResourceRef>> {
        let mut declared = Vec::with_capacity(self.attachments.len() + self.tags.len());
        for attachment in &self.attachments {
            let key = ResourceKey::new(ResourceKind::TargetGroupAttachment, &attachment.name);
            if graph.contains(&key) {
                continue;
            }
            declared.push(graph.declare_with(
                ResourceKind::TargetGroupAttachment,
                &attachment.name,
                json!({
                    "targetGroupArn": attachment.target_group.arn(),
                    "targetId": attachment.instance_id,
                    "port": attachment.port,
                }),
                &[cluster],
            )?);
        }
        for tag in &self.tags {
            if graph.contains(&ResourceKey::new(ResourceKind::Ec2Tag, &tag.name)) {
                continue;
            }
            declared.push(graph.declare_with(
                ResourceKind::Ec2Tag,
                &tag.name,
                json!({
                    "resourceId": tag.instance_id,
                    "key": "Name",
                    "value": tag.value,
                }),
                &[cluster],
            )?);
        }
        Ok(declared)
    }
}

/// Attachments and tags for a cluster's running nodes
///
/// Every master is attached to every target group; masters and cores each
/// get a `Name` tag numbered from 1 in the order the directory reported them.
pub fn plan_registration(
    cluster_name: &str,
    groups: &[DeferredTargets],
    masters: &[ClusterInstance],
    cores: &[ClusterInstance],
) -> RegistrationPlan {
    let mut plan = RegistrationPlan {
        cluster: cluster_name.to_string(),
        target_groups: groups
            .iter()
            .map(|g| g.target_group.name().to_string())
            .collect(),
        ..Default::default()
    };

    for master in masters {
        for group in groups {
            plan.attachments.push(PlannedAttachment {
                name: format!("{}-{}", group.target_group.name(), master.instance_id),
                target_group: group.target_group.clone(),
                instance_id: master.instance_id.clone(),
                port: group.service.port(),
            });
        }
    }

    for (role, instances) in [(InstanceRole::Master, masters), (InstanceRole::Core, cores)] {
        for (i, instance) in instances.iter().enumerate() {
            plan.tags.push(PlannedTag {
                name: format!("{}-name-{}", cluster_name, instance.instance_id),
                instance_id: instance.instance_id.clone(),
                role,
                value: format!("{}-{}-{}", cluster_name, role.tag_segment(), i + 1),
            });
        }
    }

    plan
}

/// Look up one cluster's nodes and declare its registrations into `graph`
pub async fn register_cluster_targets<D>(
    directory: &D,
    cluster: &ClusterHandle,
    cluster_id: &str,
    groups: &[DeferredTargets],
    graph: &mut ResourceGraph,
) -> RegistrationResult<RegistrationPlan>
where
    D: InstanceDirectory + ?Sized,
{
    let (masters, cores) = futures::try_join!(
        directory.running_instances(cluster_id, InstanceRole::Master),
        directory.running_instances(cluster_id, InstanceRole::Core),
    )?;

    if masters.is_empty() {
        warn!(
            cluster = %cluster.name,
            cluster_id,
            "no running master instances; target groups left without targets"
        );
    }

    let plan = plan_registration(&cluster.name, groups, &masters, &cores);
    let declared = plan.declare(graph, &cluster.cluster)?;
    info!(
        cluster = %cluster.name,
        masters = masters.len(),
        cores = cores.len(),
        attachments = plan.attachments.len(),
        tags = plan.tags.len(),
        declared = declared.len(),
        "registered cluster targets"
    );
    Ok(plan)
}

/// Register the nodes of every cluster in an applied stack
///
/// Cluster ids come from `state`, so the stack must have been applied once.
pub async fn register_stack_targets<D>(
    directory: &D,
    stack: &mut DataPlatformStack,
    state: &DeploymentState,
) -> RegistrationResult<Vec<RegistrationPlan>>
where
    D: InstanceDirectory + ?Sized,
{
    let handles: Vec<ClusterHandle> = stack.clusters.all().cloned().collect();
    let mut plans = Vec::with_capacity(handles.len());

    for handle in handles {
        let cluster_id = state
            .output_str(&handle.cluster_id())
            .ok_or_else(|| RegistrationError::ClusterNotProvisioned(handle.name.clone()))?
            .to_string();
        let groups: Vec<DeferredTargets> = stack.edge.deferred_for(handle.role).cloned().collect();
        debug!(cluster = %handle.name, groups = groups.len(), "registering cluster");

        let plan =
            register_cluster_targets(directory, &handle, &cluster_id, &groups, &mut stack.graph)
                .await?;
        plans.push(plan);
    }
    Ok(plans)
}

/// An attachment whose instance is no longer among the cluster's masters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleAttachment {
    pub key: ResourceKey,
    pub target_group: String,
    pub instance_id: String,
}

/// Previously provisioned attachments that the current plan no longer has
///
/// Only attachments of the plan's target groups are considered. Nothing is
/// removed; the caller decides what to do with the report.
pub fn stale_attachments(
    previous: &DeploymentState,
    current: &RegistrationPlan,
) -> Vec<StaleAttachment> {
    let mut stale = Vec::new();
    for key in previous.provisioned() {
        if key.kind != ResourceKind::TargetGroupAttachment
            || current.attachments.iter().any(|a| a.name == key.name)
        {
            continue;
        }
        let Some(group) = current
            .target_groups
            .iter()
            .find(|g| key.name.starts_with(&format!("{}-", g)))
        else {
            continue;
        };
        let instance_id = previous
            .outputs_of(key)
            .and_then(|o| o.get("targetId"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| key.name[group.len() + 1..].to_string());

        warn!(
            attachment = %key,
            instance = %instance_id,
            "attachment targets an instance that is no longer running"
        );
        stale.push(StaleAttachment {
            key: key.clone(),
            target_group: group.clone(),
            instance_id,
        });
    }
    stale
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BackendService;
    use crate::stack::ClusterRole;

    fn groups(graph: &mut ResourceGraph) -> Vec<DeferredTargets> {
        [BackendService::Livy, BackendService::HdfsUi, BackendService::Presto]
            .into_iter()
            .map(|service| DeferredTargets {
                service,
                target_group: graph
                    .declare(
                        ResourceKind::TargetGroup,
                        format!("mpdw-{}-dev", service.slug()),
                        json!({}),
                    )
                    .unwrap(),
                cluster: ClusterRole::Main,
            })
            .collect()
    }

    fn instances(prefix: &str, n: usize) -> Vec<ClusterInstance> {
        (1..=n)
            .map(|i| ClusterInstance::new(format!("i-{}{}", prefix, i)))
            .collect()
    }

    #[test]
    fn test_masters_times_groups_attachments() {
        let mut graph = ResourceGraph::new("data-platform", "dev");
        let groups = groups(&mut graph);
        let plan = plan_registration(
            "app-mpdw-emr-dev",
            &groups,
            &instances("m", 3),
            &instances("c", 2),
        );

        assert_eq!(plan.attachments.len(), 9);
        assert_eq!(plan.tags.len(), 5);
        assert_eq!(plan.attachments[0].name, "mpdw-livy-dev-i-m1");
        assert_eq!(plan.attachments[0].port, 8998);
        assert_eq!(plan.tags[0].value, "app-mpdw-emr-dev-master-1");
        assert_eq!(plan.tags[0].name, "app-mpdw-emr-dev-name-i-m1");
        assert_eq!(plan.tags[4].value, "app-mpdw-emr-dev-core-2");
        assert_eq!(plan.tags[4].name, "app-mpdw-emr-dev-name-i-c2");
    }

    #[test]
    fn test_no_masters_no_attachments() {
        let mut graph = ResourceGraph::new("data-platform", "dev");
        let groups = groups(&mut graph);
        let plan = plan_registration("app-mpdw-emr-dev", &groups, &[], &instances("c", 2));
        assert!(plan.attachments.is_empty());
        assert_eq!(plan.tags.len(), 2);

        let empty = plan_registration("app-mpdw-emr-dev", &groups, &[], &[]);
        assert!(empty.is_empty());
    }

    #[test]
    fn test_declared_after_cluster() {
        let mut graph = ResourceGraph::new("data-platform", "dev");
        let groups = groups(&mut graph);
        let cluster = graph
            .declare(ResourceKind::EmrCluster, "app-mpdw-emr-dev", json!({}))
            .unwrap();
        let plan = plan_registration("app-mpdw-emr-dev", &groups, &instances("m", 1), &[]);
        let declared = plan.declare(&mut graph, &cluster).unwrap();

        assert_eq!(declared.len(), 4);
        for resource in declared {
            assert!(graph
                .node(&resource)
                .unwrap()
                .dependencies()
                .contains(cluster.key()));
        }
        assert_eq!(graph.count_of(ResourceKind::Ec2Tag), 1);
    }

    #[test]
    fn test_declare_skips_registered_instances() {
        let mut graph = ResourceGraph::new("data-platform", "dev");
        let groups = groups(&mut graph);
        let cluster = graph
            .declare(ResourceKind::EmrCluster, "app-mpdw-emr-dev", json!({}))
            .unwrap();
        let first = plan_registration("app-mpdw-emr-dev", &groups, &instances("m", 1), &[]);
        first.declare(&mut graph, &cluster).unwrap();
        let before = graph.len();

        assert!(first.declare(&mut graph, &cluster).unwrap().is_empty());
        assert_eq!(graph.len(), before);

        // A second master takes the slot after the first; only its resources are new
        let second = plan_registration("app-mpdw-emr-dev", &groups, &instances("m", 2), &[]);
        let declared = second.declare(&mut graph, &cluster).unwrap();
        assert_eq!(declared.len(), groups.len() + 1);
        assert!(declared.iter().all(|r| r.name().ends_with("i-m2")));
    }

    #[test]
    fn test_instance_role_wire_format() {
        assert_eq!(serde_json::to_value(InstanceRole::Master).unwrap(), "MASTER");
        assert_eq!(InstanceRole::Core.to_string(), "CORE");
    }
}
