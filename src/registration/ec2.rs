// Copyright (c) 2025 - Cowboy AI, Inc.
//! EC2-backed instance directory
//!
//! Finds cluster nodes through the tags EMR stamps on every instance it
//! launches.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_ec2::types::{Filter, Instance};
use aws_sdk_ec2::Client as Ec2Client;
use tracing::debug;

use super::{ClusterInstance, InstanceDirectory, InstanceRole, RegistrationError, RegistrationResult};

pub const JOB_FLOW_TAG: &str = "tag:aws:elasticmapreduce:job-flow-id";
pub const INSTANCE_GROUP_ROLE_TAG: &str = "tag:aws:elasticmapreduce:instance-group-role";

/// Queries `DescribeInstances` for running cluster nodes
#[derive(Debug, Clone)]
pub struct Ec2InstanceDirectory {
    client: Ec2Client,
}

impl Ec2InstanceDirectory {
    pub fn new(client: Ec2Client) -> Self {
        Self { client }
    }

    /// Client for `region` using the default credential chain
    pub async fn for_region(region: impl Into<String>) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.into()))
            .load()
            .await;
        Self::new(Ec2Client::new(&config))
    }
}

#[async_trait]
impl InstanceDirectory for Ec2InstanceDirectory {
    async fn running_instances(
        &self,
        cluster_id: &str,
        role: InstanceRole,
    ) -> RegistrationResult<Vec<ClusterInstance>> {
        let mut pages = self
            .client
            .describe_instances()
            .filters(Filter::builder().name(JOB_FLOW_TAG).values(cluster_id).build())
            .filters(
                Filter::builder()
                    .name(INSTANCE_GROUP_ROLE_TAG)
                    .values(role.as_str())
                    .build(),
            )
            .filters(
                Filter::builder()
                    .name("instance-state-name")
                    .values("running")
                    .build(),
            )
            .into_paginator()
            .send();

        let mut instances = Vec::new();
        let mut page_count = 0usize;
        while let Some(page) = pages.next().await {
            let page = page.map_err(|err| RegistrationError::Lookup {
                cluster: cluster_id.to_string(),
                role,
                reason: err.into_service_error().to_string(),
            })?;
            page_count += 1;
            instances.extend(
                page.reservations()
                    .iter()
                    .flat_map(|reservation| reservation.instances())
                    .filter_map(to_cluster_instance),
            );
        }
        debug!(
            cluster_id,
            %role,
            pages = page_count,
            count = instances.len(),
            "described cluster instances"
        );
        Ok(instances)
    }
}

fn to_cluster_instance(instance: &Instance) -> Option<ClusterInstance> {
    instance.instance_id().map(|id| ClusterInstance {
        instance_id: id.to_string(),
        private_ip: instance.private_ip_address().map(str::to_string),
    })
}
