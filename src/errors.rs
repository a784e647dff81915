// Copyright (c) 2025 - Cowboy AI, Inc.
//! Error types for platform operations

use thiserror::Error;

use crate::bootstrap::BootstrapError;
use crate::config::ConfigError;
use crate::domain::{EnvironmentError, NetworkError};
use crate::graph::GraphError;
use crate::keypair::KeyPairError;
use crate::provisioning::ProvisionError;
use crate::registration::RegistrationError;
use crate::validation::ValidationError;

/// Errors that can occur while declaring, validating or applying a stack
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Stack configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Invalid environment name
    #[error(transparent)]
    Environment(#[from] EnvironmentError),

    /// Address planning error
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// Resource graph error
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Stack invariant violation
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Graph execution error
    #[error(transparent)]
    Provision(#[from] ProvisionError),

    /// Target registration error
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    /// Metadata database bootstrap error
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),

    /// Key pair generation error
    #[error(transparent)]
    KeyPair(#[from] KeyPairError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for platform operations
pub type PlatformResult<T> = Result<T, PlatformError>;

impl From<serde_json::Error> for PlatformError {
    fn from(err: serde_json::Error) -> Self {
        PlatformError::Serialization(err.to_string())
    }
}
