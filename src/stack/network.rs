// Copyright (c) 2025 - Cowboy AI, Inc.
//! Network Module
//!
//! One VPC with a public and a private subnet per availability zone, the
//! routing that makes them public and private, and the five security groups
//! every other module places its resources into.
//!
//! ```text
//!                         ┌──────────── VPC 10.1.0.0/16 ────────────┐
//!   Internet ──► IGW ──►  │ public-1  public-2   (route 0/0 → IGW)  │
//!                         │    │ NAT                                │
//!                         │    ▼                                    │
//!                         │ private-1 private-2  (route 0/0 → NAT)  │
//!                         └─────────────────────────────────────────┘
//! ```
//!
//! Security group rules are declared as standalone resources after both of
//! the groups they mention, so a rule can never point at a group that does
//! not exist yet.

use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use crate::config::VpcConfig;
use crate::context::DeploymentContext;
use crate::domain::{BackendService, Exposure, Ipv4Cidr};
use crate::errors::PlatformResult;
use crate::graph::{OutputRef, ResourceGraph, ResourceKind, ResourceRef};
use crate::validation;

/// Subnet placement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubnetTier {
    Public,
    Private,
}

impl SubnetTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }
}

/// A declared subnet and where it sits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetOutput {
    pub subnet: ResourceRef,
    pub tier: SubnetTier,
    pub cidr: Ipv4Cidr,
    pub availability_zone: String,
}

/// The fixed set of security groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GroupPurpose {
    Alb,
    AlbInternal,
    Emr,
    Rds,
    Tableau,
}

impl GroupPurpose {
    pub const ALL: [GroupPurpose; 5] = [
        Self::Alb,
        Self::AlbInternal,
        Self::Emr,
        Self::Rds,
        Self::Tableau,
    ];

    /// Value of the group's `purpose` tag
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Alb => "alb",
            Self::AlbInternal => "alb-internal",
            Self::Emr => "emr",
            Self::Rds => "rds",
            Self::Tableau => "tableau",
        }
    }

    /// Suffix of the group's name, `data-platform-sg-<env>-<suffix>`
    pub fn name_suffix(&self) -> &'static str {
        match self {
            Self::AlbInternal => "alb2",
            other => other.tag(),
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Alb => "Security group for ALB resource",
            Self::AlbInternal => "Security group for internal ALB resource",
            Self::Emr => "Security group for EMR resource",
            Self::Rds => "Security group for RDS resource",
            Self::Tableau => {
                "Security group for EC2 instance that will be installed with Tableau app"
            }
        }
    }

    pub fn group_name(&self, env: &str) -> String {
        format!("data-platform-sg-{}-{}", env, self.name_suffix())
    }
}

impl fmt::Display for GroupPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Where traffic matched by a rule comes from (or goes to)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleSource {
    Cidr(Ipv4Cidr),
    Group(GroupPurpose),
    /// Members of the same group
    SelfRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleDirection {
    Ingress,
    Egress,
}

impl RuleDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ingress => "ingress",
            Self::Egress => "egress",
        }
    }
}

/// One security group rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityRule {
    pub direction: RuleDirection,
    /// `tcp`, or `-1` for all protocols
    pub protocol: &'static str,
    pub from_port: u16,
    pub to_port: u16,
    pub source: RuleSource,
    pub description: String,
}

impl SecurityRule {
    pub fn tcp(port: u16, source: RuleSource, description: impl Into<String>) -> Self {
        Self {
            direction: RuleDirection::Ingress,
            protocol: "tcp",
            from_port: port,
            to_port: port,
            source,
            description: description.into(),
        }
    }

    pub fn all_traffic(source: RuleSource, description: impl Into<String>) -> Self {
        Self {
            direction: RuleDirection::Ingress,
            protocol: "-1",
            from_port: 0,
            to_port: 0,
            source,
            description: description.into(),
        }
    }

    pub fn egress_all() -> Self {
        Self {
            direction: RuleDirection::Egress,
            ..Self::all_traffic(RuleSource::Cidr(Ipv4Cidr::ANYWHERE), "Allow all outbound")
        }
    }
}

/// A security group and its rules, before declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityGroupSpec {
    pub purpose: GroupPurpose,
    pub rules: Vec<SecurityRule>,
}

impl SecurityGroupSpec {
    pub fn ingress(&self) -> impl Iterator<Item = &SecurityRule> {
        self.rules
            .iter()
            .filter(|r| r.direction == RuleDirection::Ingress)
    }
}

/// The rule set of every security group
pub fn security_group_specs(vpc_cidr: Ipv4Cidr, db_port: u16) -> Vec<SecurityGroupSpec> {
    use RuleSource::{Cidr, Group, SelfRef};

    let internal_services = BackendService::ALL
        .into_iter()
        .filter(|s| s.exposure() == Exposure::Internal);

    let mut emr = Vec::new();
    for service in internal_services {
        emr.push(SecurityRule::tcp(
            service.port(),
            Group(GroupPurpose::AlbInternal),
            format!("{} from internal ALB", service.slug()),
        ));
    }
    emr.push(SecurityRule::tcp(
        BackendService::JupyterHub.port(),
        Group(GroupPurpose::Alb),
        "jupyter from ALB",
    ));
    for service in [BackendService::Presto, BackendService::HiveServer] {
        emr.push(SecurityRule::tcp(
            service.port(),
            Group(GroupPurpose::Tableau),
            format!("{} from Tableau", service.slug()),
        ));
    }
    emr.push(SecurityRule::tcp(
        BackendService::HiveServer.port(),
        Cidr(vpc_cidr),
        "hive from NLB",
    ));
    emr.push(SecurityRule::all_traffic(SelfRef, "cluster internal"));

    let specs = vec![
        SecurityGroupSpec {
            purpose: GroupPurpose::Alb,
            rules: vec![
                SecurityRule::tcp(80, Cidr(Ipv4Cidr::ANYWHERE), "HTTP"),
                SecurityRule::tcp(443, Cidr(Ipv4Cidr::ANYWHERE), "HTTPS"),
            ],
        },
        SecurityGroupSpec {
            purpose: GroupPurpose::AlbInternal,
            rules: vec![SecurityRule::tcp(443, Cidr(vpc_cidr), "HTTPS from VPC")],
        },
        SecurityGroupSpec {
            purpose: GroupPurpose::Emr,
            rules: emr,
        },
        SecurityGroupSpec {
            purpose: GroupPurpose::Rds,
            rules: vec![SecurityRule::tcp(
                db_port,
                Group(GroupPurpose::Emr),
                "metastore from EMR",
            )],
        },
        SecurityGroupSpec {
            purpose: GroupPurpose::Tableau,
            rules: vec![
                SecurityRule::tcp(
                    BackendService::Tableau.port(),
                    Group(GroupPurpose::Alb),
                    "tableau from ALB",
                ),
                SecurityRule::tcp(22, Cidr(vpc_cidr), "SSH from VPC"),
            ],
        },
    ];

    specs
        .into_iter()
        .map(|mut spec| {
            spec.rules.push(SecurityRule::egress_all());
            spec
        })
        .collect()
}

/// What later modules need from the network
#[derive(Debug, Clone)]
pub struct NetworkOutputs {
    pub vpc: ResourceRef,
    pub vpc_cidr: Ipv4Cidr,
    pub public_subnets: Vec<SubnetOutput>,
    pub private_subnets: Vec<SubnetOutput>,
    pub nat_gateways: Vec<ResourceRef>,
    pub security_groups: BTreeMap<GroupPurpose, ResourceRef>,
    pub security_group_specs: Vec<SecurityGroupSpec>,
}

impl NetworkOutputs {
    pub fn security_group(&self, purpose: GroupPurpose) -> Option<&ResourceRef> {
        self.security_groups.get(&purpose)
    }

    pub fn security_group_id(&self, purpose: GroupPurpose) -> Option<OutputRef> {
        self.security_group(purpose).map(ResourceRef::id)
    }

    pub fn public_subnet_ids(&self) -> Vec<OutputRef> {
        self.public_subnets.iter().map(|s| s.subnet.id()).collect()
    }

    pub fn private_subnet_ids(&self) -> Vec<OutputRef> {
        self.private_subnets.iter().map(|s| s.subnet.id()).collect()
    }
}

/// Declare the VPC, its subnets and routing, and the security groups
pub fn configure_vpc(
    graph: &mut ResourceGraph,
    ctx: &DeploymentContext,
    config: &VpcConfig,
    db_port: u16,
) -> PlatformResult<NetworkOutputs> {
    let env = ctx.env();
    let vpc_name = format!("data-platform-vpc-{}", env);
    let cidr = config.cidr_block;

    let vpc = graph.declare(
        ResourceKind::Vpc,
        &vpc_name,
        json!({
            "cidrBlock": cidr,
            "enableDnsHostnames": true,
            "enableDnsSupport": true,
            "tags": ctx.tags("network")
                .with("Name", vpc_name.as_str())
                .with("availability_zones_used", config.number_of_availability_zones.to_string())
                .with("nat_gateways", config.number_of_nat_gateways.to_string())
                .with("cidr_block", cidr.as_cidr()),
        }),
    )?;

    let zones = ctx.availability_zones(config.number_of_availability_zones);
    let blocks = config.subnet_blocks()?;
    let mut private_subnets = Vec::with_capacity(zones.len());
    let mut public_subnets = Vec::with_capacity(zones.len());
    for (tier, tier_blocks, out) in [
        (SubnetTier::Private, &blocks.private, &mut private_subnets),
        (SubnetTier::Public, &blocks.public, &mut public_subnets),
    ] {
        for (i, (zone, block)) in zones.iter().zip(tier_blocks).enumerate() {
            let block = *block;
            let name = format!("{}-{}-{}", vpc_name, tier.as_str(), i + 1);
            let subnet = graph.declare(
                ResourceKind::Subnet,
                &name,
                json!({
                    "vpcId": vpc.id(),
                    "cidrBlock": block,
                    "availabilityZone": zone,
                    "mapPublicIpOnLaunch": tier == SubnetTier::Public,
                    "tags": ctx.tags("network")
                        .with("Name", name.as_str())
                        .with("type", tier.as_str()),
                }),
            )?;
            debug!(subnet = %name, cidr = %block, zone = %zone, "allocated subnet");
            out.push(SubnetOutput {
                subnet,
                tier,
                cidr: block,
                availability_zone: zone.clone(),
            });
        }
    }
    let layout: Vec<Ipv4Cidr> = private_subnets
        .iter()
        .chain(&public_subnets)
        .map(|s| s.cidr)
        .collect();
    validation::validate_subnet_layout(cidr, &layout)?;

    let igw = graph.declare(
        ResourceKind::InternetGateway,
        &vpc_name,
        json!({
            "vpcId": vpc.id(),
            "tags": ctx.tags("network").with("Name", vpc_name.as_str()),
        }),
    )?;

    let public_table_name = format!("{}-public", vpc_name);
    let public_table = graph.declare(
        ResourceKind::RouteTable,
        &public_table_name,
        json!({
            "vpcId": vpc.id(),
            "tags": ctx.tags("network").with("Name", public_table_name.as_str()),
        }),
    )?;
    graph.declare(
        ResourceKind::Route,
        format!("{}-default", public_table_name),
        json!({
            "routeTableId": public_table.id(),
            "destinationCidrBlock": Ipv4Cidr::ANYWHERE,
            "gatewayId": igw.id(),
        }),
    )?;
    for subnet in &public_subnets {
        graph.declare(
            ResourceKind::RouteTableAssociation,
            subnet.subnet.name(),
            json!({
                "subnetId": subnet.subnet.id(),
                "routeTableId": public_table.id(),
            }),
        )?;
    }

    let mut nat_gateways = Vec::with_capacity(config.number_of_nat_gateways);
    for (i, subnet) in public_subnets
        .iter()
        .take(config.number_of_nat_gateways)
        .enumerate()
    {
        let name = format!("{}-nat-{}", vpc_name, i + 1);
        let eip = graph.declare_with(
            ResourceKind::Eip,
            &name,
            json!({
                "domain": "vpc",
                "tags": ctx.tags("network").with("Name", name.as_str()),
            }),
            &[&igw],
        )?;
        nat_gateways.push(graph.declare(
            ResourceKind::NatGateway,
            &name,
            json!({
                "allocationId": eip.output("allocationId"),
                "subnetId": subnet.subnet.id(),
                "tags": ctx.tags("network").with("Name", name.as_str()),
            }),
        )?);
    }

    for (i, subnet) in private_subnets.iter().enumerate() {
        let table = graph.declare(
            ResourceKind::RouteTable,
            subnet.subnet.name(),
            json!({
                "vpcId": vpc.id(),
                "tags": ctx.tags("network").with("Name", subnet.subnet.name()),
            }),
        )?;
        if !nat_gateways.is_empty() {
            let nat = &nat_gateways[i % nat_gateways.len()];
            graph.declare(
                ResourceKind::Route,
                format!("{}-default", subnet.subnet.name()),
                json!({
                    "routeTableId": table.id(),
                    "destinationCidrBlock": Ipv4Cidr::ANYWHERE,
                    "natGatewayId": nat.id(),
                }),
            )?;
        }
        graph.declare(
            ResourceKind::RouteTableAssociation,
            subnet.subnet.name(),
            json!({
                "subnetId": subnet.subnet.id(),
                "routeTableId": table.id(),
            }),
        )?;
    }

    let specs = security_group_specs(cidr, db_port);
    let security_groups = declare_security_groups(graph, ctx, &vpc, &specs)?;

    Ok(NetworkOutputs {
        vpc,
        vpc_cidr: cidr,
        public_subnets,
        private_subnets,
        nat_gateways,
        security_groups,
        security_group_specs: specs,
    })
}

/// Declare every group first, then every rule
fn declare_security_groups(
    graph: &mut ResourceGraph,
    ctx: &DeploymentContext,
    vpc: &ResourceRef,
    specs: &[SecurityGroupSpec],
) -> PlatformResult<BTreeMap<GroupPurpose, ResourceRef>> {
    validation::validate_security_group_references(specs)?;

    let env = ctx.env();
    let mut groups = BTreeMap::new();
    for spec in specs {
        let name = spec.purpose.group_name(env);
        let group = graph.declare(
            ResourceKind::SecurityGroup,
            &name,
            json!({
                "name": name,
                "description": spec.purpose.description(),
                "vpcId": vpc.id(),
                "tags": ctx.tags(spec.purpose.tag()).with("Name", name.as_str()),
            }),
        )?;
        groups.insert(spec.purpose, group);
    }

    for spec in specs {
        let group = &groups[&spec.purpose];
        for (i, rule) in spec.rules.iter().enumerate() {
            let mut properties = json!({
                "type": rule.direction.as_str(),
                "securityGroupId": group.id(),
                "protocol": rule.protocol,
                "fromPort": rule.from_port,
                "toPort": rule.to_port,
                "description": rule.description,
            });
            match &rule.source {
                RuleSource::Cidr(block) => properties["cidrBlocks"] = json!([block]),
                RuleSource::Group(peer) => {
                    properties["sourceSecurityGroupId"] = groups[peer].id().into()
                }
                RuleSource::SelfRef => properties["self"] = json!(true),
            }
            graph.declare(
                ResourceKind::SecurityGroupRule,
                format!("{}-{}-{}", group.name(), rule.direction.as_str(), i + 1),
                properties,
            )?;
        }
    }
    Ok(groups)
}
