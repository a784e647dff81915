// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource naming properties across environments

use data_platform_infra::validation::{physical_name, validate_unique_names};
use data_platform_infra::{DataPlatformStack, ResourceKind};
use proptest::prelude::*;
use std::collections::BTreeSet;

use crate::fixtures;

fn environment_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,15}"
}

/// Physical names of every resource that AWS scopes to the account
fn account_scoped_names(stack: &DataPlatformStack) -> BTreeSet<(ResourceKind, String)> {
    stack
        .graph
        .nodes()
        .iter()
        // Database objects live inside the environment's own RDS instance
        .filter(|node| {
            !matches!(
                node.kind(),
                ResourceKind::MysqlDatabase | ResourceKind::MysqlUser | ResourceKind::MysqlGrant
            )
        })
        .filter_map(|node| physical_name(node).map(|name| (node.kind(), name.to_string())))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn distinct_environments_never_share_names(
        first in environment_name(),
        second in environment_name(),
    ) {
        prop_assume!(first != second);
        let a = fixtures::stack(&first);
        let b = fixtures::stack(&second);

        let logical_a: BTreeSet<_> = a.graph.nodes().iter().map(|n| &n.key).collect();
        let logical_b: BTreeSet<_> = b.graph.nodes().iter().map(|n| &n.key).collect();
        prop_assert!(logical_a.is_disjoint(&logical_b));

        let physical_a = account_scoped_names(&a);
        let physical_b = account_scoped_names(&b);
        prop_assert!(physical_a.is_disjoint(&physical_b));
    }

    #[test]
    fn names_are_unique_and_fit_aws_limits(env in environment_name()) {
        let stack = fixtures::full_stack(&env);
        prop_assert!(validate_unique_names(&stack.graph).is_ok());

        for kind in [ResourceKind::LoadBalancer, ResourceKind::TargetGroup] {
            for node in stack.graph.of_kind(kind) {
                let name = physical_name(node).unwrap();
                prop_assert!(name.len() <= 32, "{} is longer than 32 characters", name);
            }
        }
    }

    #[test]
    fn resource_ids_are_stable(env in environment_name()) {
        let first = fixtures::stack(&env);
        let second = fixtures::stack(&env);
        let ids = |stack: &DataPlatformStack| {
            stack.graph.nodes().iter().map(|n| n.id).collect::<Vec<_>>()
        };
        prop_assert_eq!(ids(&first), ids(&second));
    }
}
