// Copyright (c) 2025 - Cowboy AI, Inc.
//! Identity Module
//!
//! IAM roles for the EMR control plane, the EMR and notebook nodes, and the
//! Tableau host. Each role gets its AWS managed policies plus, where it
//! touches data, a custom policy scoped to exactly the buckets it needs.
//!
//! Bucket ARNs are derived from bucket names, which are a pure function of
//! the environment, so these policies can be declared before the buckets.

use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use crate::context::DeploymentContext;
use crate::errors::PlatformResult;
use crate::graph::{ResourceGraph, ResourceKind, ResourceRef};
use crate::policy::{bucket_arn, bucket_objects_arn, PolicyDocument, Statement};
use crate::stack::storage::BucketTier;

const EMR_SERVICE: &str = "elasticmapreduce.amazonaws.com";
const EC2_SERVICE: &str = "ec2.amazonaws.com";
const AUTOSCALING_SERVICE: &str = "application-autoscaling.amazonaws.com";

/// Every role the platform declares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PlatformRole {
    /// Assumed by EMR to manage the main cluster
    EmrService,
    /// Instance role of the main cluster's nodes
    EmrEc2,
    /// Assumed by EMR automatic scaling
    EmrAutoscaling,
    /// Assumed by EMR to manage the notebook cluster
    NotebookService,
    /// Instance role of the notebook cluster's nodes
    NotebookEc2,
    /// Instance role of the Tableau host
    TableauEc2,
}

impl PlatformRole {
    pub const ALL: [PlatformRole; 6] = [
        Self::EmrService,
        Self::EmrEc2,
        Self::EmrAutoscaling,
        Self::NotebookService,
        Self::NotebookEc2,
        Self::TableauEc2,
    ];

    pub fn slug(&self) -> &'static str {
        match self {
            Self::EmrService => "emr-service",
            Self::EmrEc2 => "emr-ec2",
            Self::EmrAutoscaling => "emr-autoscaling",
            Self::NotebookService => "jpt-service",
            Self::NotebookEc2 => "jpt-ec2",
            Self::TableauEc2 => "tableau-ec2",
        }
    }

    /// IAM role name, `app-mpdw-<slug>-<env>`
    pub fn role_name(&self, env: &str) -> String {
        format!("app-mpdw-{}-{}", self.slug(), env)
    }

    pub fn purpose(&self) -> &'static str {
        match self {
            Self::EmrService | Self::EmrEc2 | Self::EmrAutoscaling => "emr",
            Self::NotebookService | Self::NotebookEc2 => "emr-jpt",
            Self::TableauEc2 => "tableau",
        }
    }

    pub fn trusted_services(&self) -> &'static [&'static str] {
        match self {
            Self::EmrService | Self::NotebookService => &[EMR_SERVICE],
            Self::EmrAutoscaling => &[EMR_SERVICE, AUTOSCALING_SERVICE],
            Self::EmrEc2 | Self::NotebookEc2 | Self::TableauEc2 => &[EC2_SERVICE],
        }
    }

    pub fn managed_policy_arns(&self) -> &'static [&'static str] {
        match self {
            Self::EmrService | Self::NotebookService => {
                &["arn:aws:iam::aws:policy/service-role/AmazonEMRServicePolicy_v2"]
            }
            Self::EmrEc2 | Self::NotebookEc2 => {
                &["arn:aws:iam::aws:policy/service-role/AmazonElasticMapReduceforEC2Role"]
            }
            Self::EmrAutoscaling => {
                &["arn:aws:iam::aws:policy/service-role/AmazonElasticMapReduceforAutoScalingRole"]
            }
            Self::TableauEc2 => &["arn:aws:iam::aws:policy/AmazonSSMManagedInstanceCore"],
        }
    }

    /// Whether EC2 instances run as this role
    pub fn has_instance_profile(&self) -> bool {
        matches!(self, Self::EmrEc2 | Self::NotebookEc2 | Self::TableauEc2)
    }

    /// Buckets this role reads and writes
    pub fn data_buckets(&self) -> &'static [BucketTier] {
        match self {
            Self::EmrEc2 => &[BucketTier::Raw, BucketTier::Staged, BucketTier::Analytics],
            Self::NotebookEc2 => &[
                BucketTier::Raw,
                BucketTier::Staged,
                BucketTier::Analytics,
                BucketTier::Notebook,
            ],
            _ => &[],
        }
    }

    /// Least-privilege custom policy, if the role needs one
    pub fn custom_policy(&self, env: &str) -> Option<PolicyDocument> {
        let buckets: Vec<String> = self
            .data_buckets()
            .iter()
            .map(|tier| tier.bucket_name(env))
            .collect();
        if buckets.is_empty() {
            return None;
        }

        let log = BucketTier::Log.bucket_name(env);
        Some(PolicyDocument::new(vec![
            Statement::allow(["s3:ListBucket"])
                .sid("DataLakeList")
                .resources(buckets.iter().map(|b| bucket_arn(b))),
            Statement::allow(["s3:GetObject", "s3:PutObject", "s3:DeleteObject"])
                .sid("DataLakeReadWrite")
                .resources(buckets.iter().map(|b| bucket_objects_arn(b))),
            Statement::allow(["s3:PutObject"])
                .sid("LogWrite")
                .resources([bucket_objects_arn(&log)]),
            Statement::allow([
                "ec2:DescribeInstances",
                "ec2:DescribeTags",
                "elasticmapreduce:DescribeCluster",
                "elasticmapreduce:ListInstances",
            ])
            .sid("Describe")
            .resources(["*"]),
        ]))
    }
}

impl fmt::Display for PlatformRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// Declared roles, profiles and custom policies
#[derive(Debug, Clone, Default)]
pub struct IdentityOutputs {
    pub roles: BTreeMap<PlatformRole, ResourceRef>,
    pub instance_profiles: BTreeMap<PlatformRole, ResourceRef>,
    pub policies: BTreeMap<PlatformRole, ResourceRef>,
}

impl IdentityOutputs {
    pub fn role(&self, role: PlatformRole) -> Option<&ResourceRef> {
        self.roles.get(&role)
    }

    pub fn instance_profile(&self, role: PlatformRole) -> Option<&ResourceRef> {
        self.instance_profiles.get(&role)
    }
}

/// Declare every platform role
pub fn configure_iam_roles(
    graph: &mut ResourceGraph,
    ctx: &DeploymentContext,
) -> PlatformResult<IdentityOutputs> {
    let env = ctx.env();
    let mut outputs = IdentityOutputs::default();

    for role in PlatformRole::ALL {
        let name = role.role_name(env);
        let role_ref = graph.declare(
            ResourceKind::IamRole,
            &name,
            json!({
                "name": name,
                "assumeRolePolicy": PolicyDocument::assume_role(role.trusted_services().iter().copied()),
                "tags": ctx.tags(role.purpose()).with("Name", name.as_str()),
            }),
        )?;

        for &arn in role.managed_policy_arns() {
            let short = arn.rsplit('/').next().unwrap_or(arn);
            graph.declare(
                ResourceKind::IamRolePolicyAttachment,
                format!("{}-{}", name, short),
                json!({
                    "role": role_ref.output("name"),
                    "policyArn": arn,
                }),
            )?;
        }

        if let Some(document) = role.custom_policy(env) {
            let policy = graph.declare(
                ResourceKind::IamPolicy,
                &name,
                json!({
                    "name": name,
                    "description": format!("Data access for {}", name),
                    "policy": document,
                    "tags": ctx.tags(role.purpose()),
                }),
            )?;
            graph.declare(
                ResourceKind::IamRolePolicyAttachment,
                format!("{}-custom", name),
                json!({
                    "role": role_ref.output("name"),
                    "policyArn": policy.arn(),
                }),
            )?;
            outputs.policies.insert(role, policy);
        }

        if role.has_instance_profile() {
            let profile = graph.declare(
                ResourceKind::IamInstanceProfile,
                &name,
                json!({
                    "name": name,
                    "role": role_ref.output("name"),
                    "tags": ctx.tags(role.purpose()),
                }),
            )?;
            outputs.instance_profiles.insert(role, profile);
        }

        debug!(role = %name, "declared role");
        outputs.roles.insert(role, role_ref);
    }

    Ok(outputs)
}
