// Copyright (c) 2025 - Cowboy AI, Inc.
//! Stack Invariants
//!
//! Pure checks over declared resources. The network module runs the subnet
//! and security group checks before it declares anything; the rest run over
//! a finished graph through [`validate_stack`].
//!
//! ```text
//! validate_stack
//!   ├─ subnet layout          subnets inside their VPC, no overlaps
//!   ├─ policy resources       every S3 ARN names a declared bucket
//!   ├─ deny coverage          roles granted a bucket are exempt from its deny
//!   ├─ listener targets       forwarded groups have targets (or get them later)
//!   ├─ unique names           one physical name per resource kind
//!   └─ ordering               the graph has no cycles or dangling edges
//! ```

use std::collections::{BTreeMap, BTreeSet, HashSet};
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::Ipv4Cidr;
use crate::graph::reference::tokens_in;
use crate::graph::{
    GraphError, OutputRef, ResourceGraph, ResourceKey, ResourceKind, ResourceNode, Token,
};
use crate::policy::{exempt_roles, granted_buckets};
use crate::stack::network::{RuleSource, SecurityGroupSpec};

/// Errors raised when a stack breaks one of its invariants
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Subnet {subnet} lies outside VPC block {vpc}")]
    SubnetOutsideVpc { subnet: String, vpc: String },

    #[error("Subnets {first} and {second} overlap")]
    OverlappingSubnets { first: String, second: String },

    #[error("Security group {group} references undeclared group {peer}")]
    DanglingSecurityGroup { group: String, peer: String },

    #[error("Policy {policy} grants access to undeclared bucket {bucket}")]
    UnknownBucket { policy: String, bucket: String },

    #[error("Bucket {bucket} denies role {role}, which is granted access to it")]
    DenyPolicyCoverage { bucket: String, role: String },

    #[error("Target group {target_group} is forwarded to by {listener} but has no targets")]
    UnbackedTargetGroup {
        listener: String,
        target_group: String,
    },

    #[error("Physical name {name} is used by more than one {kind}")]
    DuplicateName { kind: ResourceKind, name: String },

    #[error("Malformed {resource}: {reason}")]
    Malformed { resource: String, reason: String },

    #[error(transparent)]
    Graph(#[from] GraphError),
}

pub type ValidationResult<T> = Result<T, ValidationError>;

/// Subnets must fit inside the VPC block and never overlap
pub fn validate_subnet_layout(vpc: Ipv4Cidr, subnets: &[Ipv4Cidr]) -> ValidationResult<()> {
    for (i, subnet) in subnets.iter().enumerate() {
        if !vpc.contains(subnet) {
            return Err(ValidationError::SubnetOutsideVpc {
                subnet: subnet.to_string(),
                vpc: vpc.to_string(),
            });
        }
        if let Some(other) = subnets[i + 1..].iter().find(|o| o.overlaps(subnet)) {
            return Err(ValidationError::OverlappingSubnets {
                first: subnet.to_string(),
                second: other.to_string(),
            });
        }
    }
    Ok(())
}

/// Every peer group a rule mentions must be part of the same set
pub fn validate_security_group_references(specs: &[SecurityGroupSpec]) -> ValidationResult<()> {
    let declared: HashSet<_> = specs.iter().map(|s| s.purpose).collect();
    for spec in specs {
        for rule in &spec.rules {
            if let RuleSource::Group(peer) = rule.source {
                if !declared.contains(&peer) {
                    return Err(ValidationError::DanglingSecurityGroup {
                        group: spec.purpose.to_string(),
                        peer: peer.to_string(),
                    });
                }
            }
        }
    }
    Ok(())
}

/// Resources an output token inside `value` points at
fn referenced(value: &serde_json::Value) -> Vec<ResourceKey> {
    tokens_in(value)
        .into_iter()
        .filter_map(|token| match token {
            Token::Output(OutputRef { resource, .. }) => Some(resource),
            Token::Secret(_) => None,
        })
        .collect()
}

fn referenced_of_kind(value: Option<&serde_json::Value>, kind: ResourceKind) -> Option<ResourceKey> {
    value
        .map(referenced)
        .unwrap_or_default()
        .into_iter()
        .find(|key| key.kind == kind)
}

/// Subnet layout checked against the declared VPCs and subnets
fn check_declared_subnets(graph: &ResourceGraph) -> ValidationResult<()> {
    let parse = |node: &ResourceNode| -> ValidationResult<Ipv4Cidr> {
        let raw = node
            .property("cidrBlock")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        Ipv4Cidr::new(raw).map_err(|e| ValidationError::Malformed {
            resource: node.key.to_string(),
            reason: e.to_string(),
        })
    };

    let mut by_vpc: BTreeMap<ResourceKey, Vec<Ipv4Cidr>> = BTreeMap::new();
    for subnet in graph.of_kind(ResourceKind::Subnet) {
        let vpc = referenced_of_kind(subnet.property("vpcId"), ResourceKind::Vpc).ok_or_else(
            || ValidationError::Malformed {
                resource: subnet.key.to_string(),
                reason: "subnet is not placed in a VPC".to_string(),
            },
        )?;
        by_vpc.entry(vpc).or_default().push(parse(subnet)?);
    }

    for (vpc, subnets) in by_vpc {
        // dangling VPC references are reported by the ordering check
        let Some(node) = graph.get(&vpc) else {
            continue;
        };
        validate_subnet_layout(parse(node)?, &subnets)?;
    }
    Ok(())
}

fn declared_buckets(graph: &ResourceGraph) -> BTreeSet<String> {
    graph
        .of_kind(ResourceKind::S3Bucket)
        .filter_map(|b| b.property("bucket").and_then(|v| v.as_str()))
        .map(str::to_string)
        .collect()
}

/// Identity policies may only name buckets of this deployment
pub fn validate_policy_resources(graph: &ResourceGraph) -> ValidationResult<()> {
    let declared = declared_buckets(graph);
    for policy in graph.of_kind(ResourceKind::IamPolicy) {
        let Some(document) = policy.property("policy") else {
            continue;
        };
        if let Some(bucket) = granted_buckets(document)
            .into_iter()
            .find(|b| !declared.contains(b))
        {
            return Err(ValidationError::UnknownBucket {
                policy: policy.name().to_string(),
                bucket,
            });
        }
    }
    Ok(())
}

/// Role name → buckets its attached custom policies grant
fn role_grants(graph: &ResourceGraph) -> BTreeMap<String, BTreeSet<String>> {
    let mut grants: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for attachment in graph.of_kind(ResourceKind::IamRolePolicyAttachment) {
        let Some(policy) = referenced_of_kind(attachment.property("policyArn"), ResourceKind::IamPolicy)
            .and_then(|key| graph.get(&key))
        else {
            continue;
        };
        let Some(role) = referenced_of_kind(attachment.property("role"), ResourceKind::IamRole)
        else {
            continue;
        };
        let buckets = policy
            .property("policy")
            .map(granted_buckets)
            .unwrap_or_default();
        grants.entry(role.name).or_default().extend(buckets);
    }
    grants
}

/// Every role granted a bucket must be exempt from that bucket's deny policy
pub fn validate_deny_coverage(graph: &ResourceGraph) -> ValidationResult<()> {
    let grants = role_grants(graph);

    for policy in graph.of_kind(ResourceKind::S3BucketPolicy) {
        let Some(bucket) = referenced_of_kind(policy.property("bucket"), ResourceKind::S3Bucket)
            .and_then(|key| graph.get(&key))
            .and_then(|node| node.property("bucket").and_then(|v| v.as_str()))
        else {
            continue;
        };
        let allowed: BTreeSet<String> = policy
            .property("policy")
            .map(exempt_roles)
            .unwrap_or_default()
            .into_iter()
            .collect();

        for (role, buckets) in &grants {
            if buckets.contains(bucket) && !allowed.contains(role) {
                return Err(ValidationError::DenyPolicyCoverage {
                    bucket: bucket.to_string(),
                    role: role.clone(),
                });
            }
        }
        debug!(bucket = %bucket, allowed = allowed.len(), "deny policy covers granted roles");
    }
    Ok(())
}

/// Target groups that listeners and rules forward to must have targets
///
/// A group counts as backed when the graph holds an attachment for it or it
/// is in `cluster_backed`, whose targets are registered after the cluster
/// comes up.
pub fn validate_listener_targets(
    graph: &ResourceGraph,
    cluster_backed: &[ResourceKey],
) -> ValidationResult<()> {
    let mut backed: HashSet<ResourceKey> = cluster_backed.iter().cloned().collect();
    for attachment in graph.of_kind(ResourceKind::TargetGroupAttachment) {
        if let Some(group) =
            referenced_of_kind(attachment.property("targetGroupArn"), ResourceKind::TargetGroup)
        {
            backed.insert(group);
        }
    }

    let routing = graph
        .of_kind(ResourceKind::Listener)
        .map(|n| (n, "defaultActions"))
        .chain(graph.of_kind(ResourceKind::ListenerRule).map(|n| (n, "actions")));
    for (node, field) in routing {
        let Some(actions) = node.property(field) else {
            continue;
        };
        for group in referenced(actions)
            .into_iter()
            .filter(|k| k.kind == ResourceKind::TargetGroup)
        {
            if !backed.contains(&group) {
                return Err(ValidationError::UnbackedTargetGroup {
                    listener: node.key.to_string(),
                    target_group: group.name,
                });
            }
        }
    }
    Ok(())
}

/// The name AWS knows a resource by, when it is fixed at declaration
pub fn physical_name(node: &ResourceNode) -> Option<&str> {
    ["name", "bucket", "identifier"]
        .into_iter()
        .filter_map(|field| node.property(field).and_then(|v| v.as_str()))
        .find(|name| tokens_in(&serde_json::Value::from(*name)).is_empty())
}

/// No two resources of one kind may share a physical name
pub fn validate_unique_names(graph: &ResourceGraph) -> ValidationResult<()> {
    let mut seen: HashSet<(ResourceKind, &str)> = HashSet::new();
    for node in graph.nodes() {
        if let Some(name) = physical_name(node) {
            if !seen.insert((node.kind(), name)) {
                return Err(ValidationError::DuplicateName {
                    kind: node.kind(),
                    name: name.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Run every check over a finished graph
pub fn validate_stack(graph: &ResourceGraph, cluster_backed: &[ResourceKey]) -> ValidationResult<()> {
    graph.topological_order()?;
    check_declared_subnets(graph)?;
    validate_policy_resources(graph)?;
    validate_deny_coverage(graph)?;
    validate_listener_targets(graph, cluster_backed)?;
    validate_unique_names(graph)?;
    info!(resources = graph.len(), "stack validated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::BucketAccessPolicy;
    use crate::stack::network::{security_group_specs, GroupPurpose, SecurityRule};
    use serde_json::json;

    fn cidr(s: &str) -> Ipv4Cidr {
        Ipv4Cidr::new(s).unwrap()
    }

    #[test]
    fn test_subnet_outside_vpc() {
        let err = validate_subnet_layout(cidr("10.1.0.0/16"), &[cidr("10.2.0.0/20")]).unwrap_err();
        assert!(matches!(err, ValidationError::SubnetOutsideVpc { .. }));
    }

    #[test]
    fn test_overlapping_subnets() {
        let err = validate_subnet_layout(
            cidr("10.1.0.0/16"),
            &[cidr("10.1.0.0/19"), cidr("10.1.16.0/20")],
        )
        .unwrap_err();
        assert_eq!(
            err,
            ValidationError::OverlappingSubnets {
                first: "10.1.0.0/19".into(),
                second: "10.1.16.0/20".into(),
            }
        );
    }

    #[test]
    fn test_dangling_peer_group() {
        let mut specs = security_group_specs(cidr("10.1.0.0/16"), 3306);
        assert!(validate_security_group_references(&specs).is_ok());

        specs.retain(|s| s.purpose != GroupPurpose::AlbInternal);
        let err = validate_security_group_references(&specs).unwrap_err();
        assert_eq!(
            err,
            ValidationError::DanglingSecurityGroup {
                group: "emr".into(),
                peer: "alb-internal".into(),
            }
        );
    }

    #[test]
    fn test_self_reference_is_not_dangling() {
        let specs = vec![SecurityGroupSpec {
            purpose: GroupPurpose::Emr,
            rules: vec![SecurityRule::all_traffic(RuleSource::SelfRef, "self")],
        }];
        assert!(validate_security_group_references(&specs).is_ok());
    }

    fn bucket_graph(allowed: &[&str]) -> ResourceGraph {
        let mut graph = ResourceGraph::new("data-platform", "dev");
        let role = graph
            .declare(ResourceKind::IamRole, "reader", json!({ "name": "reader" }))
            .unwrap();
        let policy = graph
            .declare(
                ResourceKind::IamPolicy,
                "reader",
                json!({
                    "name": "reader",
                    "policy": {
                        "Version": "2012-10-17",
                        "Statement": [{
                            "Effect": "Allow",
                            "Action": ["s3:GetObject"],
                            "Resource": ["arn:aws:s3:::lake/*"],
                        }],
                    },
                }),
            )
            .unwrap();
        graph
            .declare(
                ResourceKind::IamRolePolicyAttachment,
                "reader-custom",
                json!({ "role": role.output("name"), "policyArn": policy.arn() }),
            )
            .unwrap();
        let bucket = graph
            .declare(ResourceKind::S3Bucket, "lake", json!({ "bucket": "lake" }))
            .unwrap();
        let document = BucketAccessPolicy::new(
            "lake",
            allowed.iter().map(|r| r.to_string()).collect(),
        )
        .document();
        graph
            .declare(
                ResourceKind::S3BucketPolicy,
                "lake",
                json!({ "bucket": bucket.id(), "policy": document }),
            )
            .unwrap();
        graph
    }

    #[test]
    fn test_deny_coverage() {
        assert!(validate_deny_coverage(&bucket_graph(&["reader", "writer"])).is_ok());
        assert_eq!(
            validate_deny_coverage(&bucket_graph(&["writer"])).unwrap_err(),
            ValidationError::DenyPolicyCoverage {
                bucket: "lake".into(),
                role: "reader".into(),
            }
        );
    }

    #[test]
    fn test_unknown_bucket() {
        let mut graph = ResourceGraph::new("data-platform", "dev");
        graph
            .declare(
                ResourceKind::IamPolicy,
                "p",
                json!({
                    "policy": {
                        "Statement": [{
                            "Effect": "Allow",
                            "Action": ["s3:ListBucket"],
                            "Resource": ["arn:aws:s3:::elsewhere"],
                        }],
                    },
                }),
            )
            .unwrap();
        assert!(matches!(
            validate_policy_resources(&graph),
            Err(ValidationError::UnknownBucket { bucket, .. }) if bucket == "elsewhere"
        ));
    }

    #[test]
    fn test_listener_targets() {
        let mut graph = ResourceGraph::new("data-platform", "dev");
        let group = graph
            .declare(ResourceKind::TargetGroup, "livy", json!({ "name": "livy" }))
            .unwrap();
        graph
            .declare(
                ResourceKind::ListenerRule,
                "livy",
                json!({ "actions": [{ "type": "forward", "targetGroupArn": group.arn() }] }),
            )
            .unwrap();

        assert!(matches!(
            validate_listener_targets(&graph, &[]),
            Err(ValidationError::UnbackedTargetGroup { .. })
        ));
        assert!(validate_listener_targets(&graph, &[group.key().clone()]).is_ok());

        graph
            .declare(
                ResourceKind::TargetGroupAttachment,
                "livy-i-1",
                json!({ "targetGroupArn": group.arn(), "targetId": "i-1" }),
            )
            .unwrap();
        assert!(validate_listener_targets(&graph, &[]).is_ok());
    }

    #[test]
    fn test_duplicate_physical_name() {
        let mut graph = ResourceGraph::new("data-platform", "dev");
        graph
            .declare(ResourceKind::S3Bucket, "a", json!({ "bucket": "same" }))
            .unwrap();
        graph
            .declare(ResourceKind::S3Bucket, "b", json!({ "bucket": "same" }))
            .unwrap();
        assert_eq!(
            validate_unique_names(&graph).unwrap_err(),
            ValidationError::DuplicateName {
                kind: ResourceKind::S3Bucket,
                name: "same".into(),
            }
        );
    }
}
