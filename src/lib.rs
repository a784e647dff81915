// Copyright (c) 2025 - Cowboy AI, Inc.
//! Data platform infrastructure
//!
//! Declares the AWS resources of a data-platform deployment (network,
//! identity, storage, the Hive metastore database, the Tableau host, EMR
//! clusters and load balancers) as a typed, validated resource graph, and
//! applies that graph through a pluggable provisioner.
//!
//! ```text
//! StackConfig ─► build_stack ─► ResourceGraph ─► validate ─► Plan
//!                                     │
//!                                     └─► Deployment::apply ─► registration ─► apply
//! ```

pub mod bootstrap;
pub mod config;
pub mod context;
pub mod domain;
pub mod errors;
pub mod graph;
pub mod keypair;
pub mod policy;
pub mod provisioning;
pub mod registration;
pub mod stack;
pub mod validation;

// Re-export commonly used types
pub use config::{Secret, StackConfig};
pub use context::DeploymentContext;
pub use domain::Environment;
pub use errors::{PlatformError, PlatformResult};
pub use graph::{Plan, ResourceGraph, ResourceKind, ResourceRef};
pub use provisioning::{Deployment, DeploymentState, DryRunProvisioner, ResourceProvisioner};
pub use stack::{build_stack, DataPlatformStack};
