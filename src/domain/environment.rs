// Copyright (c) 2025 - Cowboy AI, Inc.
//! Environment (Stack Name) Value Object

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Environment validation error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnvironmentError {
    #[error("Environment name is empty")]
    Empty,

    #[error("Environment name exceeds maximum length of 16 characters: {0}")]
    TooLong(String),

    #[error("Invalid character in environment name: {0}")]
    InvalidCharacter(char),

    #[error("Environment name must start with a letter: {0}")]
    LeadingDigit(String),
}

/// Deployment environment, e.g. `dev` or `staging`
///
/// The environment is concatenated into every resource name, including
/// names AWS restricts to alphanumerics (RDS database names) and names
/// capped at 32 characters (load balancers, target groups).
///
/// Invariants:
/// - 1 to 16 characters
/// - Lowercase ASCII letters and digits only
/// - Starts with a letter
///
/// Because no separator characters are allowed, two distinct environments
/// can never render to the same resource name.
///
/// # Examples
///
/// ```rust
/// use data_platform_infra::domain::Environment;
///
/// let env = Environment::new("dev").unwrap();
/// assert_eq!(env.as_str(), "dev");
///
/// assert!(Environment::new("").is_err());
/// assert!(Environment::new("Dev").is_err());
/// assert!(Environment::new("dev-1").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Environment(String);

impl Environment {
    /// Maximum environment name length
    pub const MAX_LENGTH: usize = 16;

    pub fn new(name: impl Into<String>) -> Result<Self, EnvironmentError> {
        let name = name.into();

        if name.is_empty() {
            return Err(EnvironmentError::Empty);
        }

        if name.len() > Self::MAX_LENGTH {
            return Err(EnvironmentError::TooLong(name));
        }

        if let Some(ch) = name
            .chars()
            .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit()))
        {
            return Err(EnvironmentError::InvalidCharacter(ch));
        }

        if name.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(EnvironmentError::LeadingDigit(name));
        }

        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Environment {
    type Err = EnvironmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Environment {
    type Error = EnvironmentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Environment> for String {
    fn from(env: Environment) -> Self {
        env.0
    }
}

impl AsRef<str> for Environment {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
