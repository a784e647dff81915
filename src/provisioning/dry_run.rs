// Copyright (c) 2025 - Cowboy AI, Inc.
//! Dry-run provisioner
//!
//! Fabricates the outputs AWS would report, derived only from the resource's
//! stable id and inputs, so two dry runs over the same graph agree exactly.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::{Outputs, ProvisionResult, ResolvedResource, ResourceProvisioner};
use crate::graph::ResourceKind;

/// Records every resource it is asked to create and invents its outputs
#[derive(Debug, Clone)]
pub struct DryRunProvisioner {
    account_id: String,
    region: String,
    resources: Vec<ResolvedResource>,
}

impl DryRunProvisioner {
    pub fn new(account_id: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            region: region.into(),
            resources: Vec::new(),
        }
    }

    /// Resolved resources in the order they were provisioned
    pub fn resources(&self) -> &[ResolvedResource] {
        &self.resources
    }

    fn outputs(&self, resource: &ResolvedResource) -> Outputs {
        let kind = resource.key.kind;
        let hex = resource.id.simple().to_string();
        let short = &hex[..17];
        let name = physical_name(resource);

        let id = match id_prefix(kind) {
            Some(prefix) => format!("{}-{}", prefix, short),
            None => name.clone(),
        };
        let arn = self.arn(kind, &name, &id, &hex[..16]);

        // Inputs double as outputs, as with any declarative provider
        let mut outputs = resource.properties.as_object().cloned().unwrap_or_default();
        outputs.insert("id".into(), json!(id));
        outputs.insert("arn".into(), json!(arn));
        outputs.insert("urn".into(), json!(resource.urn));

        let bytes = resource.id.as_bytes();
        match kind {
            ResourceKind::IamRole | ResourceKind::IamPolicy | ResourceKind::IamInstanceProfile => {
                outputs.insert("name".into(), json!(name));
            }
            ResourceKind::S3Bucket => {
                outputs.insert("bucket".into(), json!(name));
                outputs.insert(
                    "bucketDomainName".into(),
                    json!(format!("{}.s3.amazonaws.com", name)),
                );
            }
            ResourceKind::Eip => {
                outputs.insert("allocationId".into(), json!(id));
                outputs.insert(
                    "publicIp".into(),
                    json!(format!("52.{}.{}.{}", bytes[0], bytes[1], bytes[2])),
                );
            }
            ResourceKind::RdsInstance => {
                let address = format!(
                    "{}.{}.{}.rds.amazonaws.com",
                    name,
                    &hex[..12],
                    self.region
                );
                let port = outputs.get("port").and_then(Value::as_u64).unwrap_or(3306);
                outputs.insert("endpoint".into(), json!(format!("{}:{}", address, port)));
                outputs.insert("address".into(), json!(address));
                outputs.insert("port".into(), json!(port));
            }
            ResourceKind::Ec2Instance => {
                outputs.insert(
                    "privateIp".into(),
                    json!(format!("10.1.{}.{}", bytes[0], bytes[1].max(4))),
                );
                if !outputs.contains_key("availabilityZone") {
                    outputs.insert("availabilityZone".into(), json!(format!("{}a", self.region)));
                }
            }
            ResourceKind::EmrCluster => {
                outputs.insert(
                    "masterPublicDns".into(),
                    json!(format!(
                        "ip-10-1-{}-{}.{}.compute.internal",
                        bytes[0], bytes[1], self.region
                    )),
                );
            }
            ResourceKind::LoadBalancer => {
                outputs.insert(
                    "dnsName".into(),
                    json!(format!(
                        "{}-{}.{}.elb.amazonaws.com",
                        name,
                        u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
                        self.region
                    )),
                );
            }
            _ => {}
        }
        outputs
    }

    fn arn(&self, kind: ResourceKind, name: &str, id: &str, suffix: &str) -> String {
        let (region, account) = (&self.region, &self.account_id);
        match kind {
            ResourceKind::IamRole => format!("arn:aws:iam::{}:role/{}", account, name),
            ResourceKind::IamPolicy => format!("arn:aws:iam::{}:policy/{}", account, name),
            ResourceKind::IamInstanceProfile => {
                format!("arn:aws:iam::{}:instance-profile/{}", account, name)
            }
            ResourceKind::S3Bucket => format!("arn:aws:s3:::{}", name),
            ResourceKind::RdsInstance => format!("arn:aws:rds:{}:{}:db:{}", region, account, name),
            ResourceKind::RdsSubnetGroup => {
                format!("arn:aws:rds:{}:{}:subgrp:{}", region, account, name)
            }
            ResourceKind::EmrCluster => format!(
                "arn:aws:elasticmapreduce:{}:{}:cluster/{}",
                region, account, id
            ),
            ResourceKind::LoadBalancer
            | ResourceKind::TargetGroup
            | ResourceKind::Listener
            | ResourceKind::ListenerRule => format!(
                "arn:aws:elasticloadbalancing:{}:{}:{}/{}/{}",
                region,
                account,
                kind.as_str().replace('_', "-"),
                name,
                suffix
            ),
            _ => format!(
                "arn:aws:{}:{}:{}:{}/{}",
                kind.service(),
                region,
                account,
                kind.as_str().replace('_', "-"),
                id
            ),
        }
    }
}

/// Physical name AWS would know the resource by
fn physical_name(resource: &ResolvedResource) -> String {
    ["name", "bucket", "identifier"]
        .iter()
        .find_map(|field| resource.properties.get(*field).and_then(Value::as_str))
        .unwrap_or(resource.key.name.as_str())
        .to_string()
}

fn id_prefix(kind: ResourceKind) -> Option<&'static str> {
    Some(match kind {
        ResourceKind::Vpc => "vpc",
        ResourceKind::Subnet => "subnet",
        ResourceKind::InternetGateway => "igw",
        ResourceKind::Eip => "eipalloc",
        ResourceKind::NatGateway => "nat",
        ResourceKind::RouteTable => "rtb",
        ResourceKind::Route => "r",
        ResourceKind::RouteTableAssociation => "rtbassoc",
        ResourceKind::SecurityGroup => "sg",
        ResourceKind::SecurityGroupRule => "sgrule",
        ResourceKind::IamRolePolicyAttachment => "rpa",
        ResourceKind::Ec2Instance => "i",
        ResourceKind::EbsVolume => "vol",
        ResourceKind::VolumeAttachment => "vai",
        ResourceKind::Ec2Tag => "tag",
        ResourceKind::EmrCluster => "j",
        ResourceKind::EmrInstanceGroup => "ig",
        ResourceKind::EmrManagedScalingPolicy => "msp",
        ResourceKind::TargetGroupAttachment => "tga",
        _ => return None,
    })
}

#[async_trait]
impl ResourceProvisioner for DryRunProvisioner {
    async fn provision(&mut self, resource: &ResolvedResource) -> ProvisionResult<Outputs> {
        let outputs = self.outputs(resource);
        let id = outputs
            .get("id")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();
        debug!(resource = %resource.key, id, "dry-run provision");
        self.resources.push(resource.clone());
        Ok(outputs)
    }
}
