// Copyright (c) 2025 - Cowboy AI, Inc.
//! Backend Service Taxonomy
//!
//! The services the load balancers expose, with the ports and health checks
//! their target groups use. Every service except Tableau runs on the EMR
//! master node and is therefore registered dynamically once the cluster
//! reports running instances.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which load balancer fronts a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Exposure {
    /// Internet-facing ALB on 443
    External,
    /// Internal ALB for data engineers
    Internal,
    /// Network load balancer (plain TCP)
    Network,
}

/// Target protocol spoken by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetProtocol {
    #[serde(rename = "HTTP")]
    Http,
    #[serde(rename = "HTTPS")]
    Https,
    #[serde(rename = "TCP")]
    Tcp,
}

impl TargetProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "HTTP",
            Self::Https => "HTTPS",
            Self::Tcp => "TCP",
        }
    }
}

/// A backend reachable through one of the load balancers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendService {
    /// Tableau Server on the BI host
    Tableau,
    /// JupyterHub on the EMR master
    JupyterHub,
    /// Apache Livy job-submission API
    Livy,
    /// HDFS NameNode web UI
    HdfsUi,
    /// Presto coordinator UI
    Presto,
    /// HiveServer2 JDBC endpoint
    HiveServer,
}

impl BackendService {
    pub const ALL: [BackendService; 6] = [
        Self::Tableau,
        Self::JupyterHub,
        Self::Livy,
        Self::HdfsUi,
        Self::Presto,
        Self::HiveServer,
    ];

    /// Short name used in resource names and host headers
    pub fn slug(&self) -> &'static str {
        match self {
            Self::Tableau => "tableau",
            Self::JupyterHub => "jupyter",
            Self::Livy => "livy",
            Self::HdfsUi => "hdfs",
            Self::Presto => "presto",
            Self::HiveServer => "hive",
        }
    }

    pub fn port(&self) -> u16 {
        match self {
            Self::Tableau => 80,
            Self::JupyterHub => 9443,
            Self::Livy => 8998,
            Self::HdfsUi => 9870,
            Self::Presto => 8889,
            Self::HiveServer => 10000,
        }
    }

    pub fn protocol(&self) -> TargetProtocol {
        match self {
            Self::JupyterHub => TargetProtocol::Https,
            Self::HiveServer => TargetProtocol::Tcp,
            _ => TargetProtocol::Http,
        }
    }

    pub fn health_check_path(&self) -> Option<&'static str> {
        match self {
            Self::Tableau | Self::HdfsUi => Some("/"),
            Self::JupyterHub => Some("/hub/health"),
            Self::Livy => Some("/sessions"),
            Self::Presto => Some("/v1/info"),
            Self::HiveServer => None,
        }
    }

    pub fn exposure(&self) -> Exposure {
        match self {
            Self::Tableau | Self::JupyterHub => Exposure::External,
            Self::Livy | Self::HdfsUi | Self::Presto => Exposure::Internal,
            Self::HiveServer => Exposure::Network,
        }
    }

    /// Whether targets come from EMR nodes discovered after cluster creation
    pub fn is_cluster_backed(&self) -> bool {
        !matches!(self, Self::Tableau)
    }
}

impl fmt::Display for BackendService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.slug())
    }
}
