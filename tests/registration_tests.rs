// Copyright (c) 2025 - Cowboy AI, Inc.
//! Target Registration Tests
//!
//! Walks the two-phase `up`: apply the declared stack, look up the EMR
//! nodes, declare their attachments and name tags, and apply again.

mod fixtures;

use data_platform_infra::registration::{
    self, plan_registration, stale_attachments, ClusterInstance, InstanceRole, Inventory,
    RegistrationError, StaticInstanceDirectory,
};
use data_platform_infra::stack::{ClusterRole, DeferredTargets};
use data_platform_infra::{
    DataPlatformStack, Deployment, DeploymentState, DryRunProvisioner, ResourceKind,
};
use pretty_assertions::assert_eq;

const CLUSTER: &str = "app-mpdw-emr-dev";

fn instances(prefix: &str, count: usize) -> Vec<ClusterInstance> {
    (1..=count)
        .map(|i| ClusterInstance::new(format!("i-{}{:04}", prefix, i)))
        .collect()
}

fn deployment() -> Deployment {
    Deployment::new().with_secrets(fixtures::config("dev").secrets.by_name())
}

fn provisioner() -> DryRunProvisioner {
    DryRunProvisioner::new(fixtures::ACCOUNT_ID, "us-west-2")
}

/// Directory answering for the applied clusters' fabricated ids
fn directory(
    stack: &DataPlatformStack,
    state: &DeploymentState,
    inventory: Inventory,
) -> StaticInstanceDirectory {
    let mut directory = StaticInstanceDirectory::new(inventory);
    for cluster in stack.clusters.all() {
        let id = state.output_str(&cluster.cluster_id()).unwrap();
        directory.alias(id, cluster.name.clone());
    }
    directory
}

fn main_groups(stack: &DataPlatformStack) -> Vec<DeferredTargets> {
    stack.edge.deferred_for(ClusterRole::Main).cloned().collect()
}

#[tokio::test]
async fn test_registration_attaches_every_master_to_every_group() {
    let mut stack = fixtures::stack("dev");
    let deployment = deployment();
    let mut provisioner = provisioner();
    let mut state = DeploymentState::new();

    let created = deployment
        .apply(&stack.graph, &mut provisioner, &mut state)
        .await
        .unwrap();
    assert_eq!(created.len(), stack.graph.len());

    let inventory = Inventory::default()
        .with_instances(CLUSTER, InstanceRole::Master, instances("m", 3))
        .with_instances(CLUSTER, InstanceRole::Core, instances("c", 2));
    let directory = directory(&stack, &state, inventory);

    let groups = main_groups(&stack).len();
    let plans = registration::register_stack_targets(&directory, &mut stack, &state)
        .await
        .unwrap();

    assert_eq!(plans.len(), 1);
    let plan = &plans[0];
    assert_eq!(plan.attachments.len(), 3 * groups);
    assert_eq!(plan.tags.len(), 5);

    let tags: Vec<&str> = plan.tags.iter().map(|t| t.value.as_str()).collect();
    assert_eq!(
        tags,
        vec![
            "app-mpdw-emr-dev-master-1",
            "app-mpdw-emr-dev-master-2",
            "app-mpdw-emr-dev-master-3",
            "app-mpdw-emr-dev-core-1",
            "app-mpdw-emr-dev-core-2",
        ]
    );

    stack.validate().unwrap();
    let registered = deployment
        .apply(&stack.graph, &mut provisioner, &mut state)
        .await
        .unwrap();
    assert_eq!(registered.len(), 3 * groups + 5);
    assert!(registered
        .iter()
        .all(|key| matches!(key.kind, ResourceKind::TargetGroupAttachment | ResourceKind::Ec2Tag)));
}

#[tokio::test]
async fn test_registration_without_instances_declares_nothing() {
    let mut stack = fixtures::stack("dev");
    let deployment = deployment();
    let mut provisioner = provisioner();
    let mut state = DeploymentState::new();
    deployment
        .apply(&stack.graph, &mut provisioner, &mut state)
        .await
        .unwrap();

    let before = stack.graph.len();
    let directory = directory(&stack, &state, Inventory::default());
    let plans = registration::register_stack_targets(&directory, &mut stack, &state)
        .await
        .unwrap();

    assert!(plans.iter().all(|plan| plan.is_empty()));
    assert_eq!(stack.graph.len(), before);

    let registered = deployment
        .apply(&stack.graph, &mut provisioner, &mut state)
        .await
        .unwrap();
    assert!(registered.is_empty());
}

#[tokio::test]
async fn test_registration_requires_applied_clusters() {
    let mut stack = fixtures::stack("dev");
    let state = DeploymentState::new();
    let directory = StaticInstanceDirectory::new(Inventory::default());

    let err = registration::register_stack_targets(&directory, &mut stack, &state)
        .await
        .unwrap_err();
    assert!(matches!(err, RegistrationError::ClusterNotProvisioned(name) if name == CLUSTER));
}

#[tokio::test]
async fn test_notebook_cluster_registers_its_own_groups() {
    let mut stack = fixtures::full_stack("dev");
    let deployment = deployment();
    let mut provisioner = provisioner();
    let mut state = DeploymentState::new();
    deployment
        .apply(&stack.graph, &mut provisioner, &mut state)
        .await
        .unwrap();

    let notebook = stack.clusters.notebook.clone().unwrap();
    let inventory = Inventory::default()
        .with_instances(CLUSTER, InstanceRole::Master, instances("m", 1))
        .with_instances(&notebook.name, InstanceRole::Master, instances("n", 1));
    let directory = directory(&stack, &state, inventory);

    let main = main_groups(&stack).len();
    let jupyter = stack.edge.deferred_for(ClusterRole::Notebook).count();
    let plans = registration::register_stack_targets(&directory, &mut stack, &state)
        .await
        .unwrap();

    assert_eq!(plans.len(), 2);
    assert_eq!(plans[0].attachments.len(), main);
    assert_eq!(plans[1].cluster, notebook.name);
    assert_eq!(plans[1].attachments.len(), jupyter);
    stack.validate().unwrap();
}

#[tokio::test]
async fn test_replaced_master_leaves_stale_attachments() {
    let mut stack = fixtures::stack("dev");
    let deployment = deployment();
    let mut provisioner = provisioner();
    let mut state = DeploymentState::new();
    deployment
        .apply(&stack.graph, &mut provisioner, &mut state)
        .await
        .unwrap();

    let inventory =
        Inventory::default().with_instances(CLUSTER, InstanceRole::Master, instances("old", 1));
    let directory = directory(&stack, &state, inventory);
    registration::register_stack_targets(&directory, &mut stack, &state)
        .await
        .unwrap();
    deployment
        .apply(&stack.graph, &mut provisioner, &mut state)
        .await
        .unwrap();

    let groups = main_groups(&stack);
    let replacement = plan_registration(CLUSTER, &groups, &instances("new", 1), &[]);
    let stale = stale_attachments(&state, &replacement);

    assert_eq!(stale.len(), groups.len());
    assert!(stale.iter().all(|s| s.instance_id == "i-old0001"));

    let current = plan_registration(CLUSTER, &groups, &instances("old", 1), &[]);
    assert!(stale_attachments(&state, &current).is_empty());
}

#[tokio::test]
async fn test_registering_again_declares_only_new_instances() {
    let mut stack = fixtures::stack("dev");
    let deployment = deployment();
    let mut provisioner = provisioner();
    let mut state = DeploymentState::new();
    deployment
        .apply(&stack.graph, &mut provisioner, &mut state)
        .await
        .unwrap();

    let inventory = Inventory::default()
        .with_instances(CLUSTER, InstanceRole::Master, instances("m", 1))
        .with_instances(CLUSTER, InstanceRole::Core, instances("c", 2));
    let directory = directory(&stack, &state, inventory);
    registration::register_stack_targets(&directory, &mut stack, &state)
        .await
        .unwrap();
    deployment
        .apply(&stack.graph, &mut provisioner, &mut state)
        .await
        .unwrap();

    // Same nodes: nothing new to declare or provision
    let before = stack.graph.len();
    registration::register_stack_targets(&directory, &mut stack, &state)
        .await
        .unwrap();
    assert_eq!(stack.graph.len(), before);
    let again = deployment
        .apply(&stack.graph, &mut provisioner, &mut state)
        .await
        .unwrap();
    assert!(again.is_empty());

    // Replaced master: it takes over master-1 under its own resource names
    let inventory = Inventory::default()
        .with_instances(CLUSTER, InstanceRole::Master, instances("r", 1))
        .with_instances(CLUSTER, InstanceRole::Core, instances("c", 2));
    let replaced = self::directory(&stack, &state, inventory);
    let plans = registration::register_stack_targets(&replaced, &mut stack, &state)
        .await
        .unwrap();
    let groups = main_groups(&stack).len();
    assert_eq!(stack.graph.len(), before + groups + 1);

    let tag = &plans[0].tags[0];
    assert_eq!(tag.name, "app-mpdw-emr-dev-name-i-r0001");
    assert_eq!(tag.value, "app-mpdw-emr-dev-master-1");

    stack.validate().unwrap();
    let registered = deployment
        .apply(&stack.graph, &mut provisioner, &mut state)
        .await
        .unwrap();
    assert_eq!(registered.len(), groups + 1);
}

#[tokio::test]
async fn test_state_from_previous_run_reports_replaced_master() {
    let deployment = deployment();
    let inventory = |prefix: &str| {
        Inventory::default().with_instances(CLUSTER, InstanceRole::Master, instances(prefix, 1))
    };

    // First run registers the original master and writes its state out
    let saved = {
        let mut stack = fixtures::stack("dev");
        let mut provisioner = provisioner();
        let mut state = DeploymentState::new();
        deployment
            .apply(&stack.graph, &mut provisioner, &mut state)
            .await
            .unwrap();
        let directory = directory(&stack, &state, inventory("old"));
        registration::register_stack_targets(&directory, &mut stack, &state)
            .await
            .unwrap();
        deployment
            .apply(&stack.graph, &mut provisioner, &mut state)
            .await
            .unwrap();
        serde_json::to_string_pretty(&state).unwrap()
    };

    // Second run rebuilds the stack and resumes from the saved state
    let mut state: DeploymentState = serde_json::from_str(&saved).unwrap();
    let mut stack = fixtures::stack("dev");
    let mut provisioner = provisioner();
    let resumed = deployment
        .apply(&stack.graph, &mut provisioner, &mut state)
        .await
        .unwrap();
    assert!(resumed.is_empty());

    let directory = directory(&stack, &state, inventory("new"));
    let plans = registration::register_stack_targets(&directory, &mut stack, &state)
        .await
        .unwrap();
    let stale = stale_attachments(&state, &plans[0]);

    let groups = main_groups(&stack).len();
    assert_eq!(stale.len(), groups);
    assert!(stale.iter().all(|s| s.instance_id == "i-old0001"));

    let registered = deployment
        .apply(&stack.graph, &mut provisioner, &mut state)
        .await
        .unwrap();
    assert_eq!(registered.len(), groups + 1);
}
