// Copyright (c) 2025 - Cowboy AI, Inc.
//! Stack Assembly
//!
//! Declares the whole platform into one graph, module by module. Each step
//! hands its typed outputs to the steps after it:
//!
//! ```text
//! configure_vpc ─► configure_iam_roles ─► configure_s3_buckets ─► configure_rds
//!                                                                      │
//!          configure_albs ◄── configure_emr_cluster ◄── configure_ec2_instance
//! ```
//!
//! Building a stack is pure: nothing is created until the graph is applied
//! through a [`ResourceProvisioner`](crate::provisioning::ResourceProvisioner).

pub mod cluster;
pub mod compute;
pub mod database;
pub mod edge;
pub mod identity;
pub mod network;
pub mod storage;

pub use cluster::{configure_emr_cluster, ClusterHandle, ClusterOutputs, ClusterRole};
pub use compute::{configure_ec2_instance, ComputeOutputs};
pub use database::{configure_rds, DatabaseOutputs};
pub use edge::{configure_albs, DeferredTargets, EdgeOutputs};
pub use identity::{configure_iam_roles, IdentityOutputs, PlatformRole};
pub use network::{configure_vpc, GroupPurpose, NetworkOutputs};
pub use storage::{configure_s3_buckets, BucketTier, StorageOutputs};

use tracing::info;

use crate::config::StackConfig;
use crate::context::DeploymentContext;
use crate::errors::PlatformResult;
use crate::graph::{Plan, ResourceGraph};
use crate::validation;

/// A fully declared platform and the outputs of every module
#[derive(Debug, Clone)]
pub struct DataPlatformStack {
    pub ctx: DeploymentContext,
    pub graph: ResourceGraph,
    pub network: NetworkOutputs,
    pub identity: IdentityOutputs,
    pub storage: StorageOutputs,
    pub database: DatabaseOutputs,
    pub compute: ComputeOutputs,
    pub clusters: ClusterOutputs,
    pub edge: EdgeOutputs,
}

impl DataPlatformStack {
    /// Check every stack invariant
    pub fn validate(&self) -> PlatformResult<()> {
        validation::validate_stack(&self.graph, &self.edge.cluster_backed())?;
        Ok(())
    }

    /// Creation-ordered plan of the declared resources
    pub fn plan(&self) -> PlatformResult<Plan> {
        Ok(self.graph.plan()?)
    }
}

/// Declare every module of the platform for one environment
pub fn build_stack(ctx: DeploymentContext, config: &StackConfig) -> PlatformResult<DataPlatformStack> {
    let mut graph = ResourceGraph::new(ctx.project(), ctx.env());

    let network = configure_vpc(&mut graph, &ctx, &config.vpc, config.rds.port)?;
    info!(
        vpc = %network.vpc.name(),
        public_subnets = network.public_subnets.len(),
        private_subnets = network.private_subnets.len(),
        "VPC configured"
    );

    let identity = configure_iam_roles(&mut graph, &ctx)?;
    info!(roles = identity.roles.len(), "IAM roles configured");

    let storage = configure_s3_buckets(&mut graph, &ctx, &identity)?;
    info!(buckets = storage.buckets.len(), "S3 buckets configured");

    let database = configure_rds(&mut graph, &ctx, &config.rds, &network)?;
    info!(instance = %database.instance.name(), "RDS configured");

    let compute = configure_ec2_instance(&mut graph, &ctx, &config.ec2, &network, &identity)?;
    info!(instance = %compute.instance.name(), "EC2 instance configured");

    let clusters = configure_emr_cluster(
        &mut graph,
        &ctx,
        &config.emr,
        &network,
        &identity,
        &storage,
        &database,
    )?;
    info!(cluster = %clusters.main.name, "EMR cluster configured");

    let edge = configure_albs(&mut graph, &ctx, &config.alb, &network, &compute, &clusters)?;
    info!(
        load_balancers = edge.load_balancers.len(),
        "load balancers configured"
    );

    info!(
        environment = %ctx.env(),
        resources = graph.len(),
        "stack declared"
    );
    Ok(DataPlatformStack {
        ctx,
        graph,
        network,
        identity,
        storage,
        database,
        compute,
        clusters,
        edge,
    })
}
