// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource Kind Taxonomy
//!
//! Every AWS (and MySQL) resource type the platform declares, with the
//! provider type token used in URNs and plans.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Resource type taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    // Network
    Vpc,
    Subnet,
    InternetGateway,
    Eip,
    NatGateway,
    RouteTable,
    Route,
    RouteTableAssociation,
    SecurityGroup,
    SecurityGroupRule,

    // Identity
    IamRole,
    IamPolicy,
    IamRolePolicyAttachment,
    IamInstanceProfile,

    // Storage
    S3Bucket,
    S3BucketPublicAccessBlock,
    S3BucketPolicy,

    // Database
    RdsSubnetGroup,
    RdsInstance,
    MysqlProvider,
    MysqlDatabase,
    MysqlUser,
    MysqlGrant,

    // Compute
    Ec2Instance,
    EbsVolume,
    VolumeAttachment,
    Ec2Tag,

    // Cluster
    EmrCluster,
    EmrInstanceGroup,
    EmrManagedScalingPolicy,

    // Edge
    LoadBalancer,
    TargetGroup,
    Listener,
    ListenerRule,
    TargetGroupAttachment,
}

/// High-level grouping matching the stack modules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceCategory {
    Network,
    Identity,
    Storage,
    Database,
    Compute,
    Cluster,
    Edge,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 35] = [
        Self::Vpc,
        Self::Subnet,
        Self::InternetGateway,
        Self::Eip,
        Self::NatGateway,
        Self::RouteTable,
        Self::Route,
        Self::RouteTableAssociation,
        Self::SecurityGroup,
        Self::SecurityGroupRule,
        Self::IamRole,
        Self::IamPolicy,
        Self::IamRolePolicyAttachment,
        Self::IamInstanceProfile,
        Self::S3Bucket,
        Self::S3BucketPublicAccessBlock,
        Self::S3BucketPolicy,
        Self::RdsSubnetGroup,
        Self::RdsInstance,
        Self::MysqlProvider,
        Self::MysqlDatabase,
        Self::MysqlUser,
        Self::MysqlGrant,
        Self::Ec2Instance,
        Self::EbsVolume,
        Self::VolumeAttachment,
        Self::Ec2Tag,
        Self::EmrCluster,
        Self::EmrInstanceGroup,
        Self::EmrManagedScalingPolicy,
        Self::LoadBalancer,
        Self::TargetGroup,
        Self::Listener,
        Self::ListenerRule,
        Self::TargetGroupAttachment,
    ];

    /// Canonical snake_case name, used inside output references
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vpc => "vpc",
            Self::Subnet => "subnet",
            Self::InternetGateway => "internet_gateway",
            Self::Eip => "eip",
            Self::NatGateway => "nat_gateway",
            Self::RouteTable => "route_table",
            Self::Route => "route",
            Self::RouteTableAssociation => "route_table_association",
            Self::SecurityGroup => "security_group",
            Self::SecurityGroupRule => "security_group_rule",
            Self::IamRole => "iam_role",
            Self::IamPolicy => "iam_policy",
            Self::IamRolePolicyAttachment => "iam_role_policy_attachment",
            Self::IamInstanceProfile => "iam_instance_profile",
            Self::S3Bucket => "s3_bucket",
            Self::S3BucketPublicAccessBlock => "s3_bucket_public_access_block",
            Self::S3BucketPolicy => "s3_bucket_policy",
            Self::RdsSubnetGroup => "rds_subnet_group",
            Self::RdsInstance => "rds_instance",
            Self::MysqlProvider => "mysql_provider",
            Self::MysqlDatabase => "mysql_database",
            Self::MysqlUser => "mysql_user",
            Self::MysqlGrant => "mysql_grant",
            Self::Ec2Instance => "ec2_instance",
            Self::EbsVolume => "ebs_volume",
            Self::VolumeAttachment => "volume_attachment",
            Self::Ec2Tag => "ec2_tag",
            Self::EmrCluster => "emr_cluster",
            Self::EmrInstanceGroup => "emr_instance_group",
            Self::EmrManagedScalingPolicy => "emr_managed_scaling_policy",
            Self::LoadBalancer => "load_balancer",
            Self::TargetGroup => "target_group",
            Self::Listener => "listener",
            Self::ListenerRule => "listener_rule",
            Self::TargetGroupAttachment => "target_group_attachment",
        }
    }

    /// Provider type token, as it appears in URNs
    pub fn type_token(&self) -> &'static str {
        match self {
            Self::Vpc => "aws:ec2/vpc:Vpc",
            Self::Subnet => "aws:ec2/subnet:Subnet",
            Self::InternetGateway => "aws:ec2/internetGateway:InternetGateway",
            Self::Eip => "aws:ec2/eip:Eip",
            Self::NatGateway => "aws:ec2/natGateway:NatGateway",
            Self::RouteTable => "aws:ec2/routeTable:RouteTable",
            Self::Route => "aws:ec2/route:Route",
            Self::RouteTableAssociation => "aws:ec2/routeTableAssociation:RouteTableAssociation",
            Self::SecurityGroup => "aws:ec2/securityGroup:SecurityGroup",
            Self::SecurityGroupRule => "aws:ec2/securityGroupRule:SecurityGroupRule",
            Self::IamRole => "aws:iam/role:Role",
            Self::IamPolicy => "aws:iam/policy:Policy",
            Self::IamRolePolicyAttachment => "aws:iam/rolePolicyAttachment:RolePolicyAttachment",
            Self::IamInstanceProfile => "aws:iam/instanceProfile:InstanceProfile",
            Self::S3Bucket => "aws:s3/bucket:Bucket",
            Self::S3BucketPublicAccessBlock => "aws:s3/bucketPublicAccessBlock:BucketPublicAccessBlock",
            Self::S3BucketPolicy => "aws:s3/bucketPolicy:BucketPolicy",
            Self::RdsSubnetGroup => "aws:rds/subnetGroup:SubnetGroup",
            Self::RdsInstance => "aws:rds/instance:Instance",
            Self::MysqlProvider => "pulumi:providers:mysql",
            Self::MysqlDatabase => "mysql:index/database:Database",
            Self::MysqlUser => "mysql:index/user:User",
            Self::MysqlGrant => "mysql:index/grant:Grant",
            Self::Ec2Instance => "aws:ec2/instance:Instance",
            Self::EbsVolume => "aws:ebs/volume:Volume",
            Self::VolumeAttachment => "aws:ec2/volumeAttachment:VolumeAttachment",
            Self::Ec2Tag => "aws:ec2/tag:Tag",
            Self::EmrCluster => "aws:emr/cluster:Cluster",
            Self::EmrInstanceGroup => "aws:emr/instanceGroup:InstanceGroup",
            Self::EmrManagedScalingPolicy => "aws:emr/managedScalingPolicy:ManagedScalingPolicy",
            Self::LoadBalancer => "aws:lb/loadBalancer:LoadBalancer",
            Self::TargetGroup => "aws:lb/targetGroup:TargetGroup",
            Self::Listener => "aws:lb/listener:Listener",
            Self::ListenerRule => "aws:lb/listenerRule:ListenerRule",
            Self::TargetGroupAttachment => "aws:lb/targetGroupAttachment:TargetGroupAttachment",
        }
    }

    /// AWS service namespace used in ARNs
    pub fn service(&self) -> &'static str {
        match self.category() {
            ResourceCategory::Network | ResourceCategory::Compute => "ec2",
            ResourceCategory::Identity => "iam",
            ResourceCategory::Storage => "s3",
            ResourceCategory::Database => match self {
                Self::RdsSubnetGroup | Self::RdsInstance => "rds",
                _ => "mysql",
            },
            ResourceCategory::Cluster => "elasticmapreduce",
            ResourceCategory::Edge => "elasticloadbalancing",
        }
    }

    pub fn category(&self) -> ResourceCategory {
        match self {
            Self::Vpc
            | Self::Subnet
            | Self::InternetGateway
            | Self::Eip
            | Self::NatGateway
            | Self::RouteTable
            | Self::Route
            | Self::RouteTableAssociation
            | Self::SecurityGroup
            | Self::SecurityGroupRule => ResourceCategory::Network,

            Self::IamRole
            | Self::IamPolicy
            | Self::IamRolePolicyAttachment
            | Self::IamInstanceProfile => ResourceCategory::Identity,

            Self::S3Bucket | Self::S3BucketPublicAccessBlock | Self::S3BucketPolicy => {
                ResourceCategory::Storage
            }

            Self::RdsSubnetGroup
            | Self::RdsInstance
            | Self::MysqlProvider
            | Self::MysqlDatabase
            | Self::MysqlUser
            | Self::MysqlGrant => ResourceCategory::Database,

            Self::Ec2Instance | Self::EbsVolume | Self::VolumeAttachment | Self::Ec2Tag => {
                ResourceCategory::Compute
            }

            Self::EmrCluster | Self::EmrInstanceGroup | Self::EmrManagedScalingPolicy => {
                ResourceCategory::Cluster
            }

            Self::LoadBalancer
            | Self::TargetGroup
            | Self::Listener
            | Self::ListenerRule
            | Self::TargetGroupAttachment => ResourceCategory::Edge,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("Unknown resource kind: {}", s))
    }
}
