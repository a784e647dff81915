// Copyright (c) 2025 - Cowboy AI, Inc.
//! Plan Documents
//!
//! A serializable view of a graph in creation order. Plans are what the
//! `preview` command prints; two plans built from identical inputs differ
//! only in `generated_at`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::{GraphResult, ResourceGraph};

/// One resource as it appears in a plan
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedResource {
    pub id: Uuid,
    pub urn: String,
    #[serde(rename = "type")]
    pub type_token: String,
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    pub properties: Value,
}

/// Ordered deployment plan for one stack
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub project: String,
    pub stack: String,
    pub generated_at: DateTime<Utc>,
    pub resources: Vec<PlannedResource>,
}

impl Plan {
    pub fn from_graph(graph: &ResourceGraph) -> GraphResult<Self> {
        let resources = graph
            .topological_order()?
            .into_iter()
            .map(|node| PlannedResource {
                id: node.id,
                urn: node.urn.clone(),
                type_token: node.kind().type_token().to_string(),
                name: node.name().to_string(),
                depends_on: node
                    .dependencies()
                    .iter()
                    .map(|dep| graph.urn(dep))
                    .collect(),
                properties: node.properties.clone(),
            })
            .collect();

        Ok(Self {
            project: graph.project().to_string(),
            stack: graph.stack().to_string(),
            generated_at: Utc::now(),
            resources,
        })
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
