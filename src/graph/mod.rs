// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource Dependency Graph
//!
//! Modules declare resources into a [`ResourceGraph`]; the graph records
//! both explicit dependencies and the implicit ones carried by output
//! references embedded in properties.
//!
//! # Architecture
//!
//! ```text
//! network ──► identity ──► storage ──► database ──► compute ──► cluster ──► edge
//!    │            │            │            │            │           │         │
//!    └────────────┴────────────┴─── declare(kind, name, properties) ─┴─────────┘
//!                                        │
//!                                        ▼
//!                               ┌──────────────────┐
//!                               │  ResourceGraph   │  nodes + edges
//!                               └──────────────────┘
//!                                        │ topological_order()
//!                                        ▼
//!                               Plan / Deployment::apply
//! ```
//!
//! A [`ResourceRef`] only exists once its resource is declared, so graphs
//! built through the module functions are acyclic by construction. Cycles
//! and dangling references can still arise from hand-written tokens and are
//! reported by [`ResourceGraph::topological_order`].

pub mod plan;
pub mod reference;
pub mod resource;

pub use plan::{Plan, PlannedResource};
pub use reference::{OutputRef, ResourceKey, ResourceRef, SecretRef, Token};
pub use resource::{ResourceCategory, ResourceKind};

use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;
use tracing::trace;
use uuid::Uuid;

/// Graph construction and ordering errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Resource {0} is declared twice")]
    DuplicateResource(ResourceKey),

    #[error("Resource {from} depends on undeclared resource {to}")]
    DanglingReference { from: ResourceKey, to: ResourceKey },

    #[error("Dependency cycle involving: {0:?}")]
    Cycle(Vec<String>),

    #[error("Resource properties must be a JSON object: {0}")]
    InvalidProperties(ResourceKey),
}

pub type GraphResult<T> = Result<T, GraphError>;

/// One declared resource
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceNode {
    pub id: Uuid,
    pub key: ResourceKey,
    pub urn: String,
    pub properties: Value,
    /// Explicit dependencies (`dependsOn`)
    pub depends_on: Vec<ResourceKey>,
}

impl ResourceNode {
    pub fn kind(&self) -> ResourceKind {
        self.key.kind
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    /// Explicit dependencies plus every resource referenced by a property
    pub fn dependencies(&self) -> BTreeSet<ResourceKey> {
        let mut deps: BTreeSet<ResourceKey> = self.depends_on.iter().cloned().collect();
        for token in reference::tokens_in(&self.properties) {
            if let Token::Output(output) = token {
                deps.insert(output.resource);
            }
        }
        deps.remove(&self.key);
        deps
    }

    /// Look up a top-level property
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }
}

/// Declarative set of resources for one stack
#[derive(Debug, Clone)]
pub struct ResourceGraph {
    project: String,
    stack: String,
    nodes: Vec<ResourceNode>,
    index: HashMap<ResourceKey, usize>,
}

impl ResourceGraph {
    pub fn new(project: impl Into<String>, stack: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            stack: stack.into(),
            nodes: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn stack(&self) -> &str {
        &self.stack
    }

    /// Declare a resource with no explicit dependencies
    pub fn declare(
        &mut self,
        kind: ResourceKind,
        name: impl Into<String>,
        properties: Value,
    ) -> GraphResult<ResourceRef> {
        self.declare_with(kind, name, properties, &[])
    }

    /// Declare a resource that must be created after `depends_on`
    pub fn declare_with(
        &mut self,
        kind: ResourceKind,
        name: impl Into<String>,
        properties: Value,
        depends_on: &[&ResourceRef],
    ) -> GraphResult<ResourceRef> {
        let key = ResourceKey::new(kind, name);
        if self.index.contains_key(&key) {
            return Err(GraphError::DuplicateResource(key));
        }
        if !properties.is_object() {
            return Err(GraphError::InvalidProperties(key));
        }

        let depends_on: Vec<ResourceKey> = depends_on.iter().map(|r| r.key().clone()).collect();
        for dep in &depends_on {
            if !self.index.contains_key(dep) {
                return Err(GraphError::DanglingReference {
                    from: key,
                    to: dep.clone(),
                });
            }
        }

        let urn = self.urn(&key);
        let node = ResourceNode {
            id: Uuid::new_v5(&Uuid::NAMESPACE_URL, urn.as_bytes()),
            urn,
            key: key.clone(),
            properties,
            depends_on,
        };
        trace!(resource = %key, "declared resource");

        self.index.insert(key.clone(), self.nodes.len());
        self.nodes.push(node);
        Ok(ResourceRef::new(key))
    }

    /// URN in the provider's `urn:pulumi:<stack>::<project>::<type>::<name>` form
    pub fn urn(&self, key: &ResourceKey) -> String {
        format!(
            "urn:pulumi:{}::{}::{}::{}",
            self.stack,
            self.project,
            key.kind.type_token(),
            key.name
        )
    }

    pub fn get(&self, key: &ResourceKey) -> Option<&ResourceNode> {
        self.index.get(key).map(|&i| &self.nodes[i])
    }

    pub fn node(&self, resource: &ResourceRef) -> Option<&ResourceNode> {
        self.get(resource.key())
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.index.contains_key(key)
    }

    /// Nodes in declaration order
    pub fn nodes(&self) -> &[ResourceNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn of_kind(&self, kind: ResourceKind) -> impl Iterator<Item = &ResourceNode> {
        self.nodes.iter().filter(move |n| n.kind() == kind)
    }

    pub fn count_of(&self, kind: ResourceKind) -> usize {
        self.of_kind(kind).count()
    }

    /// Every resource name in the graph, in declaration order
    pub fn names(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.name()).collect()
    }

    /// Nodes ordered so every dependency precedes its dependents
    ///
    /// Uses Kahn's algorithm; among ready nodes the earliest declared wins,
    /// so the order is deterministic for identical inputs.
    pub fn topological_order(&self) -> GraphResult<Vec<&ResourceNode>> {
        let n = self.nodes.len();
        let mut in_degree = vec![0usize; n];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];

        for (i, node) in self.nodes.iter().enumerate() {
            for dep in node.dependencies() {
                let &j = self
                    .index
                    .get(&dep)
                    .ok_or_else(|| GraphError::DanglingReference {
                        from: node.key.clone(),
                        to: dep.clone(),
                    })?;
                in_degree[i] += 1;
                dependents[j].push(i);
            }
        }

        let mut ready: BTreeSet<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);

        while let Some(i) = ready.pop_first() {
            order.push(&self.nodes[i]);
            for &d in &dependents[i] {
                in_degree[d] -= 1;
                if in_degree[d] == 0 {
                    ready.insert(d);
                }
            }
        }

        if order.len() != n {
            let stuck = (0..n)
                .filter(|&i| in_degree[i] > 0)
                .map(|i| self.nodes[i].key.to_string())
                .collect();
            return Err(GraphError::Cycle(stuck));
        }

        Ok(order)
    }

    /// Render the graph as a plan document
    pub fn plan(&self) -> GraphResult<Plan> {
        Plan::from_graph(self)
    }
}
