// Copyright (c) 2025 - Cowboy AI, Inc.
//! EC2 Key Pair Generation
//!
//! Creates the `app-mpdw-<env>` key pair the Tableau host and the EMR nodes
//! are launched with, using the AWS CLI profile `mpdw-<env>`. The CLI's JSON
//! answer is split into two files in the output directory:
//!
//! - `app-mpdw-keyinfo-<env>.json`: name, fingerprint and pair id
//! - `app-mpdw-keypair-<env>.pem`: the private key, mode 0600

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;
use tracing::{info, warn};

use crate::domain::Environment;

/// Key pair errors
#[derive(Debug, Error)]
pub enum KeyPairError {
    /// The AWS CLI could not be started
    #[error("Failed to run {program}: {reason}")]
    Spawn { program: String, reason: String },

    /// The AWS CLI exited unsuccessfully
    #[error("create-key-pair exited with {status}: {stderr}")]
    CommandFailed { status: String, stderr: String },

    /// The CLI output is not a key pair description
    #[error("Unexpected create-key-pair output: {0}")]
    Parse(String),

    /// A key file could not be written
    #[error("Failed to write {path}: {reason}")]
    Io { path: String, reason: String },
}

pub type KeyPairResult<T> = Result<T, KeyPairError>;

/// Name of the environment's key pair
pub fn key_name(env: &str) -> String {
    format!("app-mpdw-{}", env)
}

/// AWS CLI profile for the environment's account
pub fn profile_name(env: &str) -> String {
    format!("mpdw-{}", env)
}

pub fn key_info_file(env: &str) -> String {
    format!("app-mpdw-keyinfo-{}.json", env)
}

pub fn private_key_file(env: &str) -> String {
    format!("app-mpdw-keypair-{}.pem", env)
}

/// A `create-key-pair` invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPairRequest {
    pub environment: String,
    pub key_name: String,
    pub profile: String,
    pub program: String,
}

impl KeyPairRequest {
    pub fn for_environment(env: &Environment) -> Self {
        Self {
            environment: env.as_str().to_string(),
            key_name: key_name(env.as_str()),
            profile: profile_name(env.as_str()),
            program: "aws".to_string(),
        }
    }

    /// Run a different executable in place of `aws`
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn command_args(&self) -> Vec<String> {
        [
            "ec2",
            "create-key-pair",
            "--key-name",
            self.key_name.as_str(),
            "--key-type",
            "rsa",
            "--key-format",
            "pem",
            "--profile",
            self.profile.as_str(),
        ]
        .into_iter()
        .map(str::to_string)
        .collect()
    }
}

/// `create-key-pair` output
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KeyMaterial {
    pub key_name: String,
    #[serde(default)]
    pub key_fingerprint: String,
    #[serde(default)]
    pub key_pair_id: Option<String>,
    #[serde(skip_serializing)]
    pub key_material: String,
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("key_name", &self.key_name)
            .field("key_fingerprint", &self.key_fingerprint)
            .field("key_pair_id", &self.key_pair_id)
            .finish_non_exhaustive()
    }
}

pub fn parse_key_pair(output: &str) -> KeyPairResult<KeyMaterial> {
    let material: KeyMaterial =
        serde_json::from_str(output).map_err(|e| KeyPairError::Parse(e.to_string()))?;
    if !material.key_material.contains("PRIVATE KEY") {
        return Err(KeyPairError::Parse("KeyMaterial is not a PEM private key".to_string()));
    }
    Ok(material)
}

/// Paths written by [`persist`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPairFiles {
    pub info: PathBuf,
    pub private_key: PathBuf,
}

fn write_file(path: &Path, contents: &str, private: bool) -> KeyPairResult<()> {
    let io_error = |e: std::io::Error| KeyPairError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    };
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    if private {
        owner_only(&mut options);
    }
    let mut file = options.open(path).map_err(io_error)?;
    if private {
        // A file that already existed keeps its old mode through `open`
        restrict(&file).map_err(io_error)?;
    }
    file.write_all(contents.as_bytes()).map_err(io_error)?;
    Ok(())
}

#[cfg(unix)]
fn owner_only(options: &mut OpenOptions) {
    use std::os::unix::fs::OpenOptionsExt;
    options.mode(0o600);
}

#[cfg(unix)]
fn restrict(file: &File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn owner_only(_options: &mut OpenOptions) {}

#[cfg(not(unix))]
fn restrict(_file: &File) -> std::io::Result<()> {
    Ok(())
}

/// Write the key description and the private key into `dir`
pub fn persist(material: &KeyMaterial, env: &str, dir: impl AsRef<Path>) -> KeyPairResult<KeyPairFiles> {
    let dir = dir.as_ref();
    let files = KeyPairFiles {
        info: dir.join(key_info_file(env)),
        private_key: dir.join(private_key_file(env)),
    };
    let info = serde_json::to_string_pretty(material).map_err(|e| KeyPairError::Parse(e.to_string()))?;
    write_file(&files.info, &info, false)?;
    write_file(&files.private_key, &material.key_material, true)?;
    Ok(files)
}

/// Create the key pair through the AWS CLI and persist it into `dir`
pub async fn generate_key_pair(
    request: &KeyPairRequest,
    dir: impl AsRef<Path>,
) -> KeyPairResult<KeyPairFiles> {
    info!(key = %request.key_name, profile = %request.profile, "creating key pair");
    let output = Command::new(&request.program)
        .args(request.command_args())
        .output()
        .await
        .map_err(|e| KeyPairError::Spawn {
            program: request.program.clone(),
            reason: e.to_string(),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        warn!(status = %output.status, "create-key-pair failed");
        return Err(KeyPairError::CommandFailed {
            status: output.status.to_string(),
            stderr,
        });
    }

    let material = parse_key_pair(&String::from_utf8_lossy(&output.stdout))?;
    let files = persist(&material, &request.environment, dir)?;
    info!(
        key = %material.key_name,
        fingerprint = %material.key_fingerprint,
        private_key = %files.private_key.display(),
        "key pair created"
    );
    Ok(files)
}
