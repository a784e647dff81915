// Copyright (c) 2025 - Cowboy AI, Inc.
//! Secret configuration values

use serde::{Deserialize, Deserializer};
use std::fmt;

/// A credential read from the stack configuration
///
/// Stack files may carry either a plaintext value or a provider-encrypted
/// `secure:` ciphertext. The value never appears in `Debug` or `Display`
/// output, so secrets cannot leak through logs or rendered plans.
#[derive(Clone, PartialEq, Eq)]
pub enum Secret {
    Plain(String),
    Encrypted(String),
}

impl Secret {
    pub fn plain(value: impl Into<String>) -> Self {
        Self::Plain(value.into())
    }

    /// The plaintext, if the value is not encrypted
    pub fn expose(&self) -> Option<&str> {
        match self {
            Self::Plain(value) => Some(value),
            Self::Encrypted(_) => None,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, Self::Encrypted(_))
    }

    /// Replace the value with the contents of an environment variable, if set
    pub fn or_env(self, var: &str) -> Self {
        match std::env::var(var) {
            Ok(value) if !value.is_empty() => Self::Plain(value),
            _ => self,
        }
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(_) => write!(f, "Secret([REDACTED])"),
            Self::Encrypted(_) => write!(f, "Secret([ENCRYPTED])"),
        }
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[secret]")
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSecret {
    Plain(String),
    Secure { secure: String },
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match RawSecret::deserialize(deserializer)? {
            RawSecret::Plain(value) => Self::Plain(value),
            RawSecret::Secure { secure } => Self::Encrypted(secure),
        })
    }
}
