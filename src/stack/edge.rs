// Copyright (c) 2025 - Cowboy AI, Inc.
//! Edge Module
//!
//! Load balancers in front of the platform's web and JDBC endpoints.
//!
//! ```text
//!                     ┌─ :80  ─► redirect :443
//! external ALB ───────┤
//!  (public subnets)   └─ :443 ─► tableau.<domain> ─► tableau TG ─► Tableau host
//!                              ► jupyter.<domain> ─► jupyter TG ─► EMR master*
//!
//! internal ALB ──────── :443 ─► livy.<env>.<domain>   ─► livy TG   ─► EMR master*
//!  (private subnets)           ► hdfs.<env>.<domain>   ─► hdfs TG   ─► EMR master*
//!                              ► presto.<env>.<domain> ─► presto TG ─► EMR master*
//!
//! NLB (optional) ─────── :10000 ─► hive TG ─► EMR master*
//! ```
//!
//! Targets marked `*` are registered once the cluster reports its running
//! master instances; see the `registration` module. Unmatched HTTPS requests
//! get a fixed 404.

use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::config::AlbConfig;
use crate::context::DeploymentContext;
use crate::domain::{BackendService, Exposure, TargetProtocol};
use crate::errors::PlatformResult;
use crate::graph::{ResourceGraph, ResourceKey, ResourceKind, ResourceRef};
use crate::stack::cluster::{ClusterOutputs, ClusterRole};
use crate::stack::compute::ComputeOutputs;
use crate::stack::network::{GroupPurpose, NetworkOutputs};

/// TLS policy on every HTTPS listener
pub const SSL_POLICY: &str = "ELBSecurityPolicy-TLS13-1-2-2021-06";

pub fn load_balancer_name(exposure: Exposure, env: &str) -> String {
    match exposure {
        Exposure::External => format!("mpdw-alb-ext-{}", env),
        Exposure::Internal => format!("mpdw-alb-int-{}", env),
        Exposure::Network => format!("mpdw-nlb-{}", env),
    }
}

pub fn target_group_name(service: BackendService, env: &str) -> String {
    format!("mpdw-{}-{}", service.slug(), env)
}

/// Host header routed to `service`
pub fn host_name(service: BackendService, env: &str, base_domain: &str) -> Option<String> {
    match service.exposure() {
        Exposure::External => Some(format!("{}.{}", service.slug(), base_domain)),
        Exposure::Internal => Some(format!("{}.{}.{}", service.slug(), env, base_domain)),
        Exposure::Network => None,
    }
}

/// A target group whose targets arrive with the cluster
#[derive(Debug, Clone)]
pub struct DeferredTargets {
    pub service: BackendService,
    pub target_group: ResourceRef,
    pub cluster: ClusterRole,
}

#[derive(Debug, Clone, Default)]
pub struct EdgeOutputs {
    pub load_balancers: BTreeMap<String, ResourceRef>,
    pub target_groups: BTreeMap<BackendService, ResourceRef>,
    pub listeners: Vec<ResourceRef>,
    pub rules: BTreeMap<BackendService, ResourceRef>,
    pub attachments: Vec<ResourceRef>,
    pub deferred: Vec<DeferredTargets>,
}

impl EdgeOutputs {
    pub fn target_group(&self, service: BackendService) -> Option<&ResourceRef> {
        self.target_groups.get(&service)
    }

    /// Keys of target groups backed by dynamic registration
    pub fn cluster_backed(&self) -> Vec<ResourceKey> {
        self.deferred
            .iter()
            .map(|d| d.target_group.key().clone())
            .collect()
    }

    /// Deferred groups served by one cluster
    pub fn deferred_for(&self, cluster: ClusterRole) -> impl Iterator<Item = &DeferredTargets> {
        self.deferred.iter().filter(move |d| d.cluster == cluster)
    }
}

fn health_check(service: BackendService) -> Value {
    match service.health_check_path() {
        Some(path) => json!({
            "enabled": true,
            "path": path,
            "protocol": service.protocol().as_str(),
            "matcher": "200-399",
        }),
        None => json!({
            "enabled": true,
            "protocol": TargetProtocol::Tcp.as_str(),
        }),
    }
}

fn forward(target_group: &ResourceRef) -> Value {
    json!([{ "type": "forward", "targetGroupArn": target_group.arn() }])
}

/// Declare load balancers, listeners, rules and target groups
pub fn configure_albs(
    graph: &mut ResourceGraph,
    ctx: &DeploymentContext,
    config: &AlbConfig,
    network: &NetworkOutputs,
    compute: &ComputeOutputs,
    clusters: &ClusterOutputs,
) -> PlatformResult<EdgeOutputs> {
    let env = ctx.env();
    let mut outputs = EdgeOutputs::default();

    let mut exposures = vec![Exposure::External, Exposure::Internal];
    if config.network_load_balancer {
        exposures.push(Exposure::Network);
    }

    for exposure in exposures {
        let lb_name = load_balancer_name(exposure, env);
        let (subnets, group, purpose, lb_type) = match exposure {
            Exposure::External => (
                network.public_subnet_ids(),
                Some(GroupPurpose::Alb),
                "alb",
                "application",
            ),
            Exposure::Internal => (
                network.private_subnet_ids(),
                Some(GroupPurpose::AlbInternal),
                "alb-internal",
                "application",
            ),
            Exposure::Network => (network.private_subnet_ids(), None, "nlb", "network"),
        };
        let security_groups: Vec<_> = group
            .and_then(|g| network.security_group_id(g))
            .into_iter()
            .collect();

        let lb = graph.declare(
            ResourceKind::LoadBalancer,
            &lb_name,
            json!({
                "name": lb_name,
                "internal": exposure != Exposure::External,
                "loadBalancerType": lb_type,
                "subnets": subnets,
                "securityGroups": security_groups,
                "tags": ctx.tags(purpose).with("Name", lb_name.as_str()),
            }),
        )?;

        let services: Vec<BackendService> = BackendService::ALL
            .into_iter()
            .filter(|s| s.exposure() == exposure)
            .collect();
        for &service in &services {
            let tg_name = target_group_name(service, env);
            let target_group = graph.declare(
                ResourceKind::TargetGroup,
                &tg_name,
                json!({
                    "name": tg_name,
                    "port": service.port(),
                    "protocol": service.protocol().as_str(),
                    "targetType": "instance",
                    "vpcId": network.vpc.id(),
                    "healthCheck": health_check(service),
                    "tags": ctx.tags(service.slug()).with("Name", tg_name.as_str()),
                }),
            )?;

            match clusters.backing(service) {
                Some(cluster) => outputs.deferred.push(DeferredTargets {
                    service,
                    target_group: target_group.clone(),
                    cluster: cluster.role,
                }),
                None => {
                    let attachment = graph.declare(
                        ResourceKind::TargetGroupAttachment,
                        format!("{}-{}", tg_name, compute.instance.name()),
                        json!({
                            "targetGroupArn": target_group.arn(),
                            "targetId": compute.instance.id(),
                            "port": service.port(),
                        }),
                    )?;
                    outputs.attachments.push(attachment);
                }
            }
            outputs.target_groups.insert(service, target_group);
        }

        match exposure {
            Exposure::External | Exposure::Internal => {
                if exposure == Exposure::External {
                    let http = graph.declare(
                        ResourceKind::Listener,
                        format!("{}-http", lb_name),
                        json!({
                            "loadBalancerArn": lb.arn(),
                            "port": 80,
                            "protocol": "HTTP",
                            "defaultActions": [{
                                "type": "redirect",
                                "redirect": {
                                    "port": "443",
                                    "protocol": "HTTPS",
                                    "statusCode": "HTTP_301",
                                },
                            }],
                        }),
                    )?;
                    outputs.listeners.push(http);
                }

                let https = graph.declare(
                    ResourceKind::Listener,
                    format!("{}-https", lb_name),
                    json!({
                        "loadBalancerArn": lb.arn(),
                        "port": 443,
                        "protocol": "HTTPS",
                        "sslPolicy": SSL_POLICY,
                        "certificateArn": config.certificate_arn,
                        "defaultActions": [{
                            "type": "fixed-response",
                            "fixedResponse": {
                                "contentType": "text/plain",
                                "messageBody": "Not Found",
                                "statusCode": "404",
                            },
                        }],
                    }),
                )?;

                for (i, &service) in services.iter().enumerate() {
                    let Some(host) = host_name(service, env, &config.base_domain) else {
                        continue;
                    };
                    let target_group = &outputs.target_groups[&service];
                    let rule = graph.declare(
                        ResourceKind::ListenerRule,
                        target_group_name(service, env),
                        json!({
                            "listenerArn": https.arn(),
                            "priority": (i + 1) * 10,
                            "actions": forward(target_group),
                            "conditions": [{ "hostHeader": { "values": [host] } }],
                        }),
                    )?;
                    debug!(service = %service, host = %host, "declared listener rule");
                    outputs.rules.insert(service, rule);
                }
                outputs.listeners.push(https);
            }
            Exposure::Network => {
                for &service in &services {
                    let listener = graph.declare(
                        ResourceKind::Listener,
                        format!("{}-{}", lb_name, service.port()),
                        json!({
                            "loadBalancerArn": lb.arn(),
                            "port": service.port(),
                            "protocol": TargetProtocol::Tcp.as_str(),
                            "defaultActions": forward(&outputs.target_groups[&service]),
                        }),
                    )?;
                    outputs.listeners.push(listener);
                }
            }
        }

        outputs.load_balancers.insert(lb_name, lb);
    }

    info!(
        load_balancers = outputs.load_balancers.len(),
        target_groups = outputs.target_groups.len(),
        deferred = outputs.deferred.len(),
        "declared edge"
    );
    Ok(outputs)
}
