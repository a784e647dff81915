// Copyright (c) 2025 - Cowboy AI, Inc.
//! Deployment Context
//!
//! Immutable per-deployment values (project, environment, region and the
//! base tag set) handed explicitly to every module function.

use serde::Serialize;

use crate::domain::{Environment, Tags};

/// Value of the `Project` tag stamped on every resource
pub const PROJECT_TAG: &str = "mpdw";

/// Everything a module needs to know about the deployment it declares into
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentContext {
    project: String,
    environment: Environment,
    region: String,
}

impl DeploymentContext {
    pub fn new(
        project: impl Into<String>,
        environment: Environment,
        region: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            environment,
            region: region.into(),
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Shorthand for the environment string
    pub fn env(&self) -> &str {
        self.environment.as_str()
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Tags shared by every resource in the deployment
    pub fn base_tags(&self) -> Tags {
        Tags::new()
            .with("Project", PROJECT_TAG)
            .with("pulumi:Project", self.project.as_str())
            .with("pulumi:Stack", self.environment.as_str())
    }

    /// Base tags plus a `purpose` tag
    pub fn tags(&self, purpose: &str) -> Tags {
        self.base_tags().with("purpose", purpose)
    }

    /// Availability zone names for the first `count` zones of the region
    pub fn availability_zones(&self, count: usize) -> Vec<String> {
        (b'a'..=b'z')
            .take(count)
            .map(|suffix| format!("{}{}", self.region, suffix as char))
            .collect()
    }
}
