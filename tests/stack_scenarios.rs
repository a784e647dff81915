// Copyright (c) 2025 - Cowboy AI, Inc.
//! Stack Scenario Tests
//!
//! Builds complete stacks from stack files and checks the resulting graph:
//! resource counts for a dev deployment, plan ordering and determinism, and
//! the cross-resource invariants the validator enforces.

mod fixtures;

use data_platform_infra::domain::Ipv4Cidr;
use data_platform_infra::stack::{BucketTier, ClusterRole, GroupPurpose, PlatformRole};
use data_platform_infra::validation::{
    self, validate_deny_coverage, validate_listener_targets, validate_security_group_references,
    validate_subnet_layout, ValidationError,
};
use data_platform_infra::ResourceKind;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::HashMap;
use test_case::test_case;

// ============================================================================
// Dev deployment shape
// ============================================================================

#[test]
fn test_dev_stack_network_shape() {
    let stack = fixtures::stack("dev");
    let graph = &stack.graph;

    assert_eq!(graph.count_of(ResourceKind::Vpc), 1);
    assert_eq!(stack.network.public_subnets.len(), 2);
    assert_eq!(stack.network.private_subnets.len(), 2);
    assert_eq!(graph.count_of(ResourceKind::Subnet), 4);
    assert_eq!(graph.count_of(ResourceKind::NatGateway), 1);
    assert_eq!(graph.count_of(ResourceKind::SecurityGroup), 5);

    let names: Vec<&str> = graph
        .of_kind(ResourceKind::SecurityGroup)
        .filter_map(|node| node.property("name").and_then(|v| v.as_str()))
        .collect();
    assert_eq!(
        names,
        vec![
            "data-platform-sg-dev-alb",
            "data-platform-sg-dev-alb2",
            "data-platform-sg-dev-emr",
            "data-platform-sg-dev-rds",
            "data-platform-sg-dev-tableau",
        ]
    );
}

#[test]
fn test_dev_stack_subnets_partition_vpc() {
    let stack = fixtures::stack("dev");
    let subnets: Vec<Ipv4Cidr> = stack
        .network
        .public_subnets
        .iter()
        .chain(&stack.network.private_subnets)
        .map(|s| s.cidr)
        .collect();

    assert!(validate_subnet_layout(stack.network.vpc_cidr, &subnets).is_ok());

    let zones: Vec<&str> = stack
        .network
        .private_subnets
        .iter()
        .map(|s| s.availability_zone.as_str())
        .collect();
    assert_eq!(zones, vec!["us-west-2a", "us-west-2b"]);
}

#[test]
fn test_dev_stack_core_resources() {
    let stack = fixtures::stack("dev");
    let graph = &stack.graph;

    assert_eq!(graph.count_of(ResourceKind::S3Bucket), BucketTier::ALL.len());
    assert_eq!(graph.count_of(ResourceKind::IamRole), PlatformRole::ALL.len());
    assert_eq!(graph.count_of(ResourceKind::RdsInstance), 1);
    assert_eq!(graph.count_of(ResourceKind::EmrCluster), 1);
    assert_eq!(graph.count_of(ResourceKind::Ec2Instance), 1);
    assert_eq!(graph.count_of(ResourceKind::LoadBalancer), 2);
    assert!(stack.clusters.notebook.is_none());
}

#[test]
fn test_full_stack_adds_optional_resources() {
    let base = fixtures::stack("dev");
    let full = fixtures::full_stack("dev");

    assert_eq!(full.graph.count_of(ResourceKind::EmrCluster), 2);
    assert_eq!(full.graph.count_of(ResourceKind::LoadBalancer), 3);
    // Both clusters get the task group and the scaling policy
    assert_eq!(full.graph.count_of(ResourceKind::EmrInstanceGroup), 2);
    assert_eq!(full.graph.count_of(ResourceKind::EmrManagedScalingPolicy), 2);
    assert!(full.graph.len() > base.graph.len());
    assert!(full.clusters.notebook.is_some());
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn test_built_stacks_validate() {
    assert!(fixtures::stack("dev").validate().is_ok());
    assert!(fixtures::full_stack("dev").validate().is_ok());
    assert!(validation::validate_stack(
        &fixtures::full_stack("prod").graph,
        &fixtures::full_stack("prod").edge.cluster_backed()
    )
    .is_ok());
}

#[test]
fn test_missing_peer_group_is_dangling() {
    let stack = fixtures::stack("dev");
    let specs: Vec<_> = stack
        .network
        .security_group_specs
        .iter()
        .filter(|spec| spec.purpose != GroupPurpose::Tableau)
        .cloned()
        .collect();

    let err = validate_security_group_references(&specs).unwrap_err();
    assert!(matches!(
        err,
        ValidationError::DanglingSecurityGroup { ref peer, .. } if peer == &GroupPurpose::Tableau.to_string()
    ));
}

#[test]
fn test_granting_unlisted_role_breaks_deny_coverage() {
    let mut stack = fixtures::stack("dev");
    let emr_policy = stack.identity.policies[&PlatformRole::EmrEc2].clone();
    let tableau = stack.identity.roles[&PlatformRole::TableauEc2].clone();

    stack
        .graph
        .declare(
            ResourceKind::IamRolePolicyAttachment,
            "tableau-reads-data-lake",
            json!({
                "role": tableau.output("name"),
                "policyArn": emr_policy.arn(),
            }),
        )
        .unwrap();

    assert_eq!(
        validate_deny_coverage(&stack.graph),
        Err(ValidationError::DenyPolicyCoverage {
            bucket: BucketTier::Raw.bucket_name("dev"),
            role: PlatformRole::TableauEc2.role_name("dev"),
        })
    );
}

#[test]
fn test_cluster_groups_need_registration_or_deferral() {
    let stack = fixtures::stack("dev");
    let err = validate_listener_targets(&stack.graph, &[]).unwrap_err();
    assert!(matches!(err, ValidationError::UnbackedTargetGroup { .. }));

    assert!(validate_listener_targets(&stack.graph, &stack.edge.cluster_backed()).is_ok());
}

#[test]
fn test_tableau_group_is_attached_at_declaration() {
    let stack = fixtures::stack("dev");
    let attachments = stack.graph.count_of(ResourceKind::TargetGroupAttachment);
    assert_eq!(attachments, 1);
    assert!(stack.edge.deferred_for(ClusterRole::Main).count() > 0);
}

// ============================================================================
// Plans
// ============================================================================

#[test]
fn test_plan_orders_dependencies_first() {
    let plan = fixtures::full_stack("dev").plan().unwrap();
    let position: HashMap<&str, usize> = plan
        .resources
        .iter()
        .enumerate()
        .map(|(i, r)| (r.urn.as_str(), i))
        .collect();

    for (i, resource) in plan.resources.iter().enumerate() {
        for dep in &resource.depends_on {
            assert!(
                position[dep.as_str()] < i,
                "{} planned before its dependency {}",
                resource.urn,
                dep
            );
        }
    }
    assert_eq!(plan.resources[0].type_token, "aws:ec2/vpc:Vpc");
}

#[test]
fn test_plans_are_deterministic() {
    let mut first = fixtures::stack("dev").plan().unwrap();
    let second = fixtures::stack("dev").plan().unwrap();
    first.generated_at = second.generated_at;

    assert_eq!(first, second);
}

#[test]
fn test_plan_json_shape() {
    let plan = fixtures::stack("dev").plan().unwrap();
    let value: serde_json::Value = serde_json::from_str(&plan.to_json_pretty().unwrap()).unwrap();

    assert_eq!(value["project"], "data-platform");
    assert_eq!(value["stack"], "dev");
    assert!(value["generatedAt"].is_string());
    assert_eq!(
        value["resources"].as_array().map(Vec::len),
        Some(plan.len())
    );
    assert!(value["resources"][0]["urn"]
        .as_str()
        .unwrap()
        .starts_with("urn:pulumi:dev::data-platform::"));
}

// ============================================================================
// Environments
// ============================================================================

#[test_case("dev" ; "development")]
#[test_case("staging" ; "staging")]
#[test_case("prod" ; "production")]
fn test_names_carry_environment(env: &str) {
    let stack = fixtures::stack(env);
    for node in stack.graph.nodes() {
        if matches!(
            node.kind(),
            ResourceKind::MysqlDatabase | ResourceKind::MysqlUser | ResourceKind::MysqlGrant
        ) {
            continue;
        }
        if let Some(name) = validation::physical_name(node) {
            assert!(name.contains(env), "{} lacks environment {}", name, env);
        }
    }
}

#[test_case("dev", "prod")]
#[test_case("staging", "prod")]
#[test_case("dev", "dev2")]
fn test_environments_share_no_urns(a: &str, b: &str) {
    let first = fixtures::stack(a);
    let second = fixtures::stack(b);

    for node in first.graph.nodes() {
        assert!(!second.graph.nodes().iter().any(|other| other.urn == node.urn));
        assert!(!second.graph.nodes().iter().any(|other| other.id == node.id));
    }
}
