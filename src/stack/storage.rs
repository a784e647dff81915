// Copyright (c) 2025 - Cowboy AI, Inc.
//! Storage Module
//!
//! Five private buckets: cluster logs, the three data-lake tiers and the
//! notebook workspace. Every bucket blocks public access; the data-lake and
//! notebook buckets additionally deny all access to sessions outside an
//! explicit set of roles.

use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use crate::context::DeploymentContext;
use crate::errors::PlatformResult;
use crate::graph::{ResourceGraph, ResourceKind, ResourceRef};
use crate::policy::BucketAccessPolicy;
use crate::stack::identity::{IdentityOutputs, PlatformRole};

/// The platform's buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BucketTier {
    /// EMR and application logs
    Log,
    /// Raw data lake
    Raw,
    /// Staged data lake
    Staged,
    /// Analytics data lake
    Analytics,
    /// Notebook workspace
    Notebook,
}

impl BucketTier {
    pub const ALL: [BucketTier; 5] = [
        Self::Log,
        Self::Raw,
        Self::Staged,
        Self::Analytics,
        Self::Notebook,
    ];

    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Raw => "rdl",
            Self::Staged => "sdl",
            Self::Analytics => "adl",
            Self::Notebook => "jpt",
        }
    }

    pub fn purpose(&self) -> &'static str {
        match self {
            Self::Log => "emr",
            Self::Raw => "emr-rdl",
            Self::Staged => "emr-sdl",
            Self::Analytics => "emr-adl",
            Self::Notebook => "emr-jpt",
        }
    }

    /// `app-mpdw-<env>-<suffix>`
    pub fn bucket_name(&self, env: &str) -> String {
        format!("app-mpdw-{}-{}", env, self.suffix())
    }

    /// Roles exempt from the bucket's deny policy; empty means no policy
    pub fn allowed_roles(&self) -> &'static [PlatformRole] {
        match self {
            Self::Log => &[],
            Self::Raw | Self::Staged | Self::Analytics => &[
                PlatformRole::EmrService,
                PlatformRole::NotebookService,
                PlatformRole::EmrEc2,
                PlatformRole::NotebookEc2,
            ],
            Self::Notebook => &[PlatformRole::NotebookService, PlatformRole::NotebookEc2],
        }
    }

    pub fn has_deny_policy(&self) -> bool {
        !self.allowed_roles().is_empty()
    }
}

impl fmt::Display for BucketTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

#[derive(Debug, Clone, Default)]
pub struct StorageOutputs {
    pub buckets: BTreeMap<BucketTier, ResourceRef>,
    pub policies: BTreeMap<BucketTier, ResourceRef>,
}

impl StorageOutputs {
    pub fn bucket(&self, tier: BucketTier) -> Option<&ResourceRef> {
        self.buckets.get(&tier)
    }
}

/// Declare the buckets, their public access blocks and deny policies
pub fn configure_s3_buckets(
    graph: &mut ResourceGraph,
    ctx: &DeploymentContext,
    identity: &IdentityOutputs,
) -> PlatformResult<StorageOutputs> {
    let env = ctx.env();
    let mut outputs = StorageOutputs::default();

    for tier in BucketTier::ALL {
        let name = tier.bucket_name(env);
        let bucket = graph.declare(
            ResourceKind::S3Bucket,
            &name,
            json!({
                "bucket": name,
                "acl": "private",
                "tags": ctx.tags(tier.purpose()),
            }),
        )?;
        graph.declare_with(
            ResourceKind::S3BucketPublicAccessBlock,
            &name,
            json!({
                "bucket": bucket.id(),
                "blockPublicAcls": true,
                "blockPublicPolicy": true,
                "ignorePublicAcls": true,
                "restrictPublicBuckets": true,
            }),
            &[&bucket],
        )?;

        if tier.has_deny_policy() {
            let roles: Vec<&ResourceRef> = tier
                .allowed_roles()
                .iter()
                .filter_map(|role| identity.role(*role))
                .collect();
            let policy = BucketAccessPolicy::new(
                name.as_str(),
                tier.allowed_roles()
                    .iter()
                    .map(|role| role.role_name(env))
                    .collect(),
            );
            let policy_ref = graph.declare_with(
                ResourceKind::S3BucketPolicy,
                format!("{}-{}", tier.suffix(), env),
                json!({
                    "bucket": bucket.id(),
                    "policy": policy.document(),
                }),
                &roles,
            )?;
            outputs.policies.insert(tier, policy_ref);
        }

        debug!(bucket = %name, "declared bucket");
        outputs.buckets.insert(tier, bucket);
    }

    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Environment;
    use crate::policy::exempt_roles;
    use crate::stack::identity::configure_iam_roles;

    fn declare() -> (ResourceGraph, StorageOutputs) {
        let ctx = DeploymentContext::new(
            "data-platform",
            Environment::new("dev").unwrap(),
            "us-west-2",
        );
        let mut graph = ResourceGraph::new("data-platform", "dev");
        let identity = configure_iam_roles(&mut graph, &ctx).unwrap();
        let storage = configure_s3_buckets(&mut graph, &ctx, &identity).unwrap();
        (graph, storage)
    }

    #[test]
    fn test_every_bucket_blocks_public_access() {
        let (graph, storage) = declare();
        assert_eq!(storage.buckets.len(), 5);
        for block in graph.of_kind(ResourceKind::S3BucketPublicAccessBlock) {
            for flag in [
                "blockPublicAcls",
                "blockPublicPolicy",
                "ignorePublicAcls",
                "restrictPublicBuckets",
            ] {
                assert_eq!(block.properties[flag], true, "{} on {}", flag, block.name());
            }
        }
        assert_eq!(graph.count_of(ResourceKind::S3BucketPublicAccessBlock), 5);
    }

    #[test]
    fn test_log_bucket_has_no_deny_policy() {
        let (graph, storage) = declare();
        assert!(!storage.policies.contains_key(&BucketTier::Log));
        assert_eq!(graph.count_of(ResourceKind::S3BucketPolicy), 4);
    }

    #[test]
    fn test_notebook_policy_allows_only_notebook_roles() {
        let (graph, storage) = declare();
        let node = graph.node(&storage.policies[&BucketTier::Notebook]).unwrap();
        assert_eq!(node.name(), "jpt-dev");
        assert_eq!(
            exempt_roles(&node.properties["policy"]),
            vec!["app-mpdw-jpt-service-dev", "app-mpdw-jpt-ec2-dev"]
        );
        // created after the roles it names
        assert_eq!(node.depends_on.len(), 2);
    }
}
