// Copyright (c) 2025 - Cowboy AI, Inc.
//! Cluster Module
//!
//! The EMR cluster running Hive, Spark, Livy, Presto and JupyterHub, and an
//! optional second cluster dedicated to notebooks. Both keep their Hive
//! metastore in the RDS instance, wired in through `hive-site` and
//! `spark-hive-site` configurations.
//!
//! Clusters are created after the VPC and the metastore grant; EMR starts
//! Hive immediately and fails the bootstrap if it cannot log in.

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::{EmrConfig, InstanceGroupConfig, StackSecrets};
use crate::context::DeploymentContext;
use crate::domain::BackendService;
use crate::errors::PlatformResult;
use crate::graph::{OutputRef, ResourceGraph, ResourceKind, ResourceRef, SecretRef};
use crate::keypair;
use crate::stack::database::{DatabaseOutputs, HIVE_DATABASE};
use crate::stack::identity::{IdentityOutputs, PlatformRole};
use crate::stack::network::{GroupPurpose, NetworkOutputs};
use crate::stack::storage::{BucketTier, StorageOutputs};

/// JDBC driver EMR ships for MySQL-compatible metastores
pub const JDBC_DRIVER: &str = "org.mariadb.jdbc.Driver";

/// Application that serves notebooks
const NOTEBOOK_APPLICATION: &str = "JupyterHub";

/// `jdbc:mysql://<endpoint>/hive?createDatabaseIfNotExist=true`
pub fn jdbc_url(endpoint: impl std::fmt::Display) -> String {
    format!(
        "jdbc:mysql://{}/{}?createDatabaseIfNotExist=true",
        endpoint, HIVE_DATABASE
    )
}

/// Which of the platform's clusters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClusterRole {
    Main,
    Notebook,
}

impl ClusterRole {
    pub fn cluster_name(&self, env: &str) -> String {
        match self {
            Self::Main => format!("app-mpdw-emr-{}", env),
            Self::Notebook => format!("app-mpdw-emr-jpt-{}", env),
        }
    }

    fn service_role(&self) -> PlatformRole {
        match self {
            Self::Main => PlatformRole::EmrService,
            Self::Notebook => PlatformRole::NotebookService,
        }
    }

    fn instance_role(&self) -> PlatformRole {
        match self {
            Self::Main => PlatformRole::EmrEc2,
            Self::Notebook => PlatformRole::NotebookEc2,
        }
    }

    fn purpose(&self) -> &'static str {
        match self {
            Self::Main => "emr",
            Self::Notebook => "emr-jpt",
        }
    }
}

/// One declared cluster
#[derive(Debug, Clone)]
pub struct ClusterHandle {
    pub role: ClusterRole,
    pub name: String,
    pub cluster: ResourceRef,
    pub task_group: Option<ResourceRef>,
    pub scaling_policy: Option<ResourceRef>,
}

impl ClusterHandle {
    /// The job-flow id EMR stamps on the cluster's instances
    pub fn cluster_id(&self) -> OutputRef {
        self.cluster.id()
    }
}

#[derive(Debug, Clone)]
pub struct ClusterOutputs {
    pub main: ClusterHandle,
    pub notebook: Option<ClusterHandle>,
}

impl ClusterOutputs {
    /// The cluster whose master node serves `service`
    pub fn backing(&self, service: BackendService) -> Option<&ClusterHandle> {
        match (service, &self.notebook) {
            (BackendService::Tableau, _) => None,
            (BackendService::JupyterHub, Some(notebook)) => Some(notebook),
            _ => Some(&self.main),
        }
    }

    pub fn all(&self) -> impl Iterator<Item = &ClusterHandle> {
        std::iter::once(&self.main).chain(self.notebook.as_ref())
    }
}

fn instance_group(group: &InstanceGroupConfig) -> Value {
    let ebs_configs: Vec<Value> = group
        .ebs_volume_size
        .map(|size| {
            json!({
                "size": size,
                "type": group.ebs_volume_type.as_str(),
                "volumesPerInstance": 1,
            })
        })
        .into_iter()
        .collect();

    let mut value = json!({
        "instanceType": group.instance_type,
        "instanceCount": group.instance_count,
        "ebsConfigs": ebs_configs,
    });
    if let Some(bid) = &group.bid_price {
        value["bidPrice"] = json!(bid);
    }
    value
}

/// `hive-site`, `spark-hive-site` and `spark-defaults` classifications
pub fn cluster_configurations(endpoint: impl std::fmt::Display, hive_username: &str) -> Value {
    let metastore = json!({
        "javax.jdo.option.ConnectionURL": jdbc_url(endpoint),
        "javax.jdo.option.ConnectionDriverName": JDBC_DRIVER,
        "javax.jdo.option.ConnectionUserName": hive_username,
        "javax.jdo.option.ConnectionPassword": SecretRef(StackSecrets::HIVE_PASSWORD.into()),
    });
    json!([
        { "Classification": "hive-site", "Properties": metastore },
        { "Classification": "spark-hive-site", "Properties": metastore },
        {
            "Classification": "spark-defaults",
            "Properties": {
                "spark.sql.catalogImplementation": "hive",
                "spark.dynamicAllocation.enabled": "true",
            },
        },
    ])
}

/// Declare the main cluster and, if configured, the notebook cluster
pub fn configure_emr_cluster(
    graph: &mut ResourceGraph,
    ctx: &DeploymentContext,
    config: &EmrConfig,
    network: &NetworkOutputs,
    identity: &IdentityOutputs,
    storage: &StorageOutputs,
    database: &DatabaseOutputs,
) -> PlatformResult<ClusterOutputs> {
    let main = declare_cluster(
        graph,
        ctx,
        ClusterRole::Main,
        config,
        &config.applications,
        network,
        identity,
        storage,
        database,
    )?;

    let notebook = if config.notebook_cluster {
        let mut applications = config.applications.clone();
        if !applications.iter().any(|a| a == NOTEBOOK_APPLICATION) {
            applications.push(NOTEBOOK_APPLICATION.to_string());
        }
        Some(declare_cluster(
            graph,
            ctx,
            ClusterRole::Notebook,
            config,
            &applications,
            network,
            identity,
            storage,
            database,
        )?)
    } else {
        None
    };

    info!(
        clusters = 1 + usize::from(notebook.is_some()),
        release = %config.release_label,
        "declared EMR clusters"
    );
    Ok(ClusterOutputs { main, notebook })
}

#[allow(clippy::too_many_arguments)]
fn declare_cluster(
    graph: &mut ResourceGraph,
    ctx: &DeploymentContext,
    role: ClusterRole,
    config: &EmrConfig,
    applications: &[String],
    network: &NetworkOutputs,
    identity: &IdentityOutputs,
    storage: &StorageOutputs,
    database: &DatabaseOutputs,
) -> PlatformResult<ClusterHandle> {
    let env = ctx.env();
    let name = role.cluster_name(env);
    let log_bucket = BucketTier::Log.bucket_name(env);
    let emr_group = network.security_group_id(GroupPurpose::Emr);

    let mut properties = json!({
        "name": name,
        "releaseLabel": config.release_label,
        "applications": applications,
        "serviceRole": identity.role(role.service_role()).map(ResourceRef::arn),
        "autoscalingRole": identity.role(PlatformRole::EmrAutoscaling).map(ResourceRef::arn),
        "logUri": format!("s3://{}/emr/{}/", log_bucket, name),
        "ebsRootVolumeSize": config.ebs_root_volume_size,
        "scaleDownBehavior": config.scale_down_behavior.as_str(),
        "ec2Attributes": {
            "subnetId": network.private_subnets.first().map(|s| s.subnet.id()),
            "instanceProfile": identity.instance_profile(role.instance_role()).map(ResourceRef::arn),
            "emrManagedMasterSecurityGroup": emr_group,
            "emrManagedSlaveSecurityGroup": emr_group,
            "keyName": keypair::key_name(env),
        },
        "masterInstanceGroup": instance_group(&config.master_instance_group),
        "coreInstanceGroup": instance_group(&config.core_instance_group),
        "configurations": cluster_configurations(database.endpoint(), &database.hive_username),
        "tags": ctx.tags(role.purpose()).with("Name", name.as_str()),
    });
    if let Some(label) = &config.os_release_label {
        properties["osReleaseLabel"] = json!(label);
    }

    let mut depends_on = vec![&network.vpc, &database.instance, &database.grant];
    if let Some(log) = storage.bucket(BucketTier::Log) {
        depends_on.push(log);
    }
    let cluster = graph.declare_with(ResourceKind::EmrCluster, &name, properties, &depends_on)?;

    let task_group = match &config.task_instance_group {
        Some(group) => {
            let mut task = instance_group(group);
            task["clusterId"] = cluster.id().into();
            task["name"] = json!(format!("{}-task", name));
            Some(graph.declare(ResourceKind::EmrInstanceGroup, format!("{}-task", name), task)?)
        }
        None => None,
    };

    let scaling_policy = match &config.managed_scaling {
        Some(scaling) => Some(graph.declare(
            ResourceKind::EmrManagedScalingPolicy,
            &name,
            json!({
                "clusterId": cluster.id(),
                "computeLimits": [{
                    "unitType": scaling.unit_type.as_str(),
                    "minimumCapacityUnits": scaling.minimum_capacity_units,
                    "maximumCapacityUnits": scaling.maximum_capacity_units,
                }],
            }),
        )?),
        None => None,
    };

    debug!(
        cluster = %name,
        task_group = task_group.is_some(),
        managed_scaling = scaling_policy.is_some(),
        "declared cluster"
    );
    Ok(ClusterHandle {
        role,
        name,
        cluster,
        task_group,
        scaling_policy,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jdbc_url() {
        assert_eq!(
            jdbc_url("db.internal:3306"),
            "jdbc:mysql://db.internal:3306/hive?createDatabaseIfNotExist=true"
        );
    }

    #[test]
    fn test_configurations_reference_secret_password() {
        let configurations = cluster_configurations("db:3306", "hive");
        let hive_site = &configurations[0];
        assert_eq!(hive_site["Classification"], "hive-site");
        assert_eq!(
            hive_site["Properties"]["javax.jdo.option.ConnectionPassword"],
            "{{secret:hivePassword}}"
        );
        assert_eq!(configurations[2]["Classification"], "spark-defaults");
    }

    #[test]
    fn test_instance_group_ebs_optional() {
        let mut group = InstanceGroupConfig {
            instance_type: "m5.xlarge".into(),
            instance_count: 2,
            ebs_volume_size: None,
            ebs_volume_type: Default::default(),
            bid_price: None,
        };
        assert_eq!(instance_group(&group)["ebsConfigs"], json!([]));
        group.ebs_volume_size = Some(64);
        group.bid_price = Some("0.30".into());
        let value = instance_group(&group);
        assert_eq!(value["ebsConfigs"][0]["size"], 64);
        assert_eq!(value["bidPrice"], "0.30");
    }
}
