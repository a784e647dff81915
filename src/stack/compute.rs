// Copyright (c) 2025 - Cowboy AI, Inc.
//! Compute Module
//!
//! The Tableau host: one instance in the first private subnet, with a data
//! volume in the same availability zone.

use serde_json::json;
use tracing::debug;

use crate::config::Ec2Config;
use crate::context::DeploymentContext;
use crate::errors::PlatformResult;
use crate::graph::{ResourceGraph, ResourceKind, ResourceRef};
use crate::keypair;
use crate::stack::identity::{IdentityOutputs, PlatformRole};
use crate::stack::network::{GroupPurpose, NetworkOutputs};

/// Device the data volume is attached as
pub const DATA_DEVICE: &str = "/dev/sdf";

/// Mount point of the data volume
pub const DATA_MOUNT: &str = "/var/opt/tableau";

pub fn host_name(env: &str) -> String {
    format!("data-tableau-{}", env)
}

#[derive(Debug, Clone)]
pub struct ComputeOutputs {
    pub instance: ResourceRef,
    pub volume: ResourceRef,
    pub attachment: ResourceRef,
}

fn user_data() -> String {
    format!(
        r#"#!/bin/bash
set -euo pipefail
for _ in $(seq 1 60); do
  [ -b {device} ] && break
  sleep 5
done
if ! blkid {device}; then
  mkfs -t xfs {device}
fi
mkdir -p {mount}
mount {device} {mount}
echo "{device} {mount} xfs defaults,nofail 0 2" >> /etc/fstab
"#,
        device = DATA_DEVICE,
        mount = DATA_MOUNT
    )
}

/// Declare the Tableau instance and its data volume
pub fn configure_ec2_instance(
    graph: &mut ResourceGraph,
    ctx: &DeploymentContext,
    config: &Ec2Config,
    network: &NetworkOutputs,
    identity: &IdentityOutputs,
) -> PlatformResult<ComputeOutputs> {
    let env = ctx.env();
    let name = host_name(env);
    let tags = ctx.tags("tableau");

    let placement = network.private_subnets.first();
    let zone = placement
        .map(|s| s.availability_zone.clone())
        .unwrap_or_else(|| format!("{}a", ctx.region()));
    let key_name = config
        .key_name
        .clone()
        .unwrap_or_else(|| keypair::key_name(env));

    let security_groups: Vec<_> = network
        .security_group_id(GroupPurpose::Tableau)
        .into_iter()
        .collect();

    let instance = graph.declare(
        ResourceKind::Ec2Instance,
        &name,
        json!({
            "instanceType": config.instance_type,
            "ami": config.ami,
            "keyName": key_name,
            "subnetId": placement.map(|s| s.subnet.id()),
            "availabilityZone": zone,
            "iamInstanceProfile": identity
                .instance_profile(PlatformRole::TableauEc2)
                .map(|p| p.output("name")),
            "vpcSecurityGroupIds": security_groups,
            "userData": user_data(),
            "tags": tags.clone().with("Name", name.as_str()),
        }),
    )?;

    let volume_name = format!("{}-data", name);
    let volume = graph.declare(
        ResourceKind::EbsVolume,
        &volume_name,
        json!({
            "availabilityZone": zone,
            "size": config.volume_size,
            "type": config.volume_type.as_str(),
            "encrypted": true,
            "tags": tags.with("Name", volume_name.as_str()),
        }),
    )?;

    let attachment = graph.declare(
        ResourceKind::VolumeAttachment,
        &volume_name,
        json!({
            "deviceName": DATA_DEVICE,
            "instanceId": instance.id(),
            "volumeId": volume.id(),
        }),
    )?;
    debug!(host = %name, zone = %zone, "declared tableau host");

    Ok(ComputeOutputs {
        instance,
        volume,
        attachment,
    })
}
