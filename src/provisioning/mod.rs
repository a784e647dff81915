// Copyright (c) 2025 - Cowboy AI, Inc.
//! Graph Execution
//!
//! Walks a [`ResourceGraph`] in topological order, resolves every output and
//! secret reference against what has already been provisioned, and hands the
//! fully concrete resource to a [`ResourceProvisioner`].
//!
//! # Architecture
//!
//! ```text
//! ResourceGraph                  Deployment::apply                Provisioner
//! ─────────────                  ─────────────────                ───────────
//!
//!  topological_order() ──► node ──► resolve({{ref}}, {{secret}}) ──► provision()
//!                                          ▲                            │
//!                                          │                            ▼
//!                                   DeploymentState  ◄──────────── outputs
//! ```
//!
//! Resolution is pure: a node sees only the outputs of nodes that precede it
//! in the order, which are exactly its (transitive) dependencies plus
//! unrelated earlier nodes. Resources already recorded in the state are
//! skipped, so re-applying a grown graph provisions only the new nodes.

mod dry_run;

pub use dry_run::DryRunProvisioner;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::Secret;
use crate::graph::{reference, GraphError, OutputRef, ResourceGraph, ResourceKey, Token};

/// Attributes a provisioned resource exposes to its dependents
pub type Outputs = Map<String, Value>;

/// Provisioning errors
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// A reference names an attribute its resource never produced
    #[error("Resource {resource} references unresolved value {token}")]
    UnresolvedReference { resource: ResourceKey, token: String },

    /// The secret exists only as ciphertext
    #[error("Secret {0} is encrypted; supply its plaintext through the environment")]
    SecretUnavailable(String),

    /// The provisioner rejected the resource
    #[error("Failed to provision {resource}: {reason}")]
    Provider { resource: ResourceKey, reason: String },
}

pub type ProvisionResult<T> = Result<T, ProvisionError>;

/// A resource with every reference replaced by a concrete value
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedResource {
    pub id: Uuid,
    pub urn: String,
    pub key: ResourceKey,
    pub properties: Value,
}

/// Creates resources once their inputs are known
#[async_trait]
pub trait ResourceProvisioner: Send + Sync {
    /// Create (or adopt) one resource and report its outputs
    async fn provision(&mut self, resource: &ResolvedResource) -> ProvisionResult<Outputs>;
}

/// Outputs of everything provisioned so far
///
/// Serializes to the state file `up` reads back on the next run, so a later
/// run skips what is already provisioned and can compare against it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentState {
    outputs: BTreeMap<String, Outputs>,
    order: Vec<ResourceKey>,
}

impl DeploymentState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.outputs.contains_key(&key.to_string())
    }

    pub fn outputs_of(&self, key: &ResourceKey) -> Option<&Outputs> {
        self.outputs.get(&key.to_string())
    }

    pub fn output(&self, reference: &OutputRef) -> Option<&Value> {
        self.outputs_of(&reference.resource)?
            .get(&reference.attribute)
    }

    /// String-valued output, e.g. an id or ARN
    pub fn output_str(&self, reference: &OutputRef) -> Option<&str> {
        self.output(reference).and_then(Value::as_str)
    }

    /// Resources in the order they were provisioned
    pub fn provisioned(&self) -> &[ResourceKey] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn record(&mut self, key: ResourceKey, outputs: Outputs) {
        self.outputs.insert(key.to_string(), outputs);
        self.order.push(key);
    }
}

/// Applies graphs through a provisioner
#[derive(Debug, Clone, Default)]
pub struct Deployment {
    secrets: BTreeMap<String, Secret>,
}

impl Deployment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Secrets available to `{{secret:<name>}}` references
    pub fn with_secrets(mut self, secrets: BTreeMap<String, Secret>) -> Self {
        self.secrets = secrets;
        self
    }

    /// Provision every node of `graph` not yet present in `state`
    ///
    /// Returns the keys provisioned by this call, in order.
    pub async fn apply<P>(
        &self,
        graph: &ResourceGraph,
        provisioner: &mut P,
        state: &mut DeploymentState,
    ) -> ProvisionResult<Vec<ResourceKey>>
    where
        P: ResourceProvisioner + ?Sized,
    {
        let order = graph.topological_order()?;
        let mut created = Vec::new();

        for node in order {
            if state.contains(&node.key) {
                debug!(resource = %node.key, "already provisioned, skipping");
                continue;
            }

            let resolved = ResolvedResource {
                id: node.id,
                urn: node.urn.clone(),
                key: node.key.clone(),
                properties: self.resolve(&node.key, &node.properties, state)?,
            };
            let outputs = provisioner.provision(&resolved).await?;
            info!(resource = %node.key, outputs = outputs.len(), "provisioned");

            state.record(node.key.clone(), outputs);
            created.push(node.key.clone());
        }

        info!(
            created = created.len(),
            total = state.len(),
            stack = graph.stack(),
            "apply complete"
        );
        Ok(created)
    }

    fn resolve(
        &self,
        key: &ResourceKey,
        properties: &Value,
        state: &DeploymentState,
    ) -> ProvisionResult<Value> {
        // Surface encrypted secrets before generic resolution failures
        for token in reference::tokens_in(properties) {
            if let Token::Secret(name) = &token {
                if self.secrets.get(name).is_some_and(Secret::is_encrypted) {
                    return Err(ProvisionError::SecretUnavailable(name.clone()));
                }
            }
        }

        let lookup = |token: &Token| match token {
            Token::Output(output) => state.output(output).cloned(),
            Token::Secret(name) => self
                .secrets
                .get(name)
                .and_then(Secret::expose)
                .map(|value| Value::String(value.to_string())),
        };

        reference::resolve(properties, &lookup).map_err(|token| {
            ProvisionError::UnresolvedReference {
                resource: key.clone(),
                token: token.to_string(),
            }
        })
    }
}
