// Copyright (c) 2025 - Cowboy AI, Inc.
//! Test Fixtures for data-platform-infra
//!
//! Provides deterministic stack files and stacks built from them. Every
//! secret is plaintext so stacks can be applied without environment
//! overrides.

#![allow(dead_code)]

use data_platform_infra::{
    build_stack, DataPlatformStack, DeploymentContext, Environment, StackConfig,
};

pub const PROJECT: &str = "data-platform";
pub const ACCOUNT_ID: &str = "123456789012";

/// Two availability zones, one NAT gateway
pub const DEV_STACK: &str = r#"
config:
  aws:region: us-west-2
  data-platform:vpc:
    numberOfAvailabilityZones: 2
    numberOfNatGateways: 1
  data-platform:ec2:
    instanceType: m5.2xlarge
    ami: ami-0123456789abcdef0
  data-platform:rds:
    engine: mysql
    engineVersion: "8.0"
    port: 3306
    masterUsername: admin
    hiveUsername: hive
    iamDatabaseAuthenticationEnabled: false
    instanceClass: db.t3.medium
  data-platform:emr:
    applications: [Hadoop, Hive, Spark, Livy, Presto, JupyterHub]
    releaseLabel: emr-6.9.0
    masterInstanceGroup:
      instanceType: m5.xlarge
      instanceCount: 1
    coreInstanceGroup:
      instanceType: m5.xlarge
      instanceCount: 2
  data-platform:alb:
    certificateArn: arn:aws:acm:us-west-2:123456789012:certificate/abc
    baseDomain: data.example.com
  data-platform:masterPassword: master-secret
  data-platform:hivePassword: hive-secret
"#;

pub fn environment(name: &str) -> Environment {
    Environment::new(name).expect("Invalid environment in test fixture")
}

pub fn config_from(env: &str, yaml: &str) -> StackConfig {
    StackConfig::from_yaml_str(PROJECT, environment(env), yaml).expect("Invalid stack fixture")
}

pub fn config(env: &str) -> StackConfig {
    config_from(env, DEV_STACK)
}

pub fn stack_from(config: &StackConfig) -> DataPlatformStack {
    let ctx = DeploymentContext::new(PROJECT, config.stack.clone(), &config.region);
    build_stack(ctx, config).expect("Stack fixture failed to build")
}

pub fn stack(env: &str) -> DataPlatformStack {
    stack_from(&config(env))
}

/// The dev stack with a notebook cluster, an NLB and a task group
pub fn full_stack(env: &str) -> DataPlatformStack {
    let yaml = DEV_STACK
        .replace(
            "    baseDomain: data.example.com\n",
            "    baseDomain: data.example.com\n    networkLoadBalancer: true\n",
        )
        .replace(
            "    releaseLabel: emr-6.9.0\n",
            "    releaseLabel: emr-6.9.0\n    notebookCluster: true\n    taskInstanceGroup:\n      instanceType: m5.xlarge\n      instanceCount: 1\n    managedScaling:\n      minimumCapacityUnits: 2\n      maximumCapacityUnits: 10\n      unitType: Instances\n",
        );
    stack_from(&config_from(env, &yaml))
}
