// Copyright (c) 2025 - Cowboy AI, Inc.
//! Stack Configuration
//!
//! Typed per-environment settings loaded from a Pulumi-style stack file
//! (`Pulumi.<stack>.yaml`). Keys live under a top-level `config:` map and may
//! be namespaced with the project name:
//!
//! ```yaml
//! config:
//!   aws:region: us-west-2
//!   data-platform:vpc:
//!     numberOfAvailabilityZones: 2
//!     numberOfNatGateways: 1
//!   data-platform:masterPassword:
//!     secure: AAABAJ...
//! ```
//!
//! Every section is deserialized into an explicit schema and then checked
//! for cross-field invariants, so a malformed stack file fails before any
//! resource is declared, with an error naming the offending key.

mod secret;

pub use secret::Secret;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::domain::{Environment, Ipv4Cidr, NetworkError, SubnetAllocator};

/// Region used when the stack file does not set `aws:region`
pub const DEFAULT_REGION: &str = "us-west-2";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The stack file could not be read
    #[error("Failed to read stack file {path}: {reason}")]
    Io { path: String, reason: String },

    /// The stack file is not valid YAML
    #[error("Failed to parse stack file: {0}")]
    Parse(String),

    /// A required key is absent
    #[error("Missing required configuration key: {0}")]
    MissingKey(String),

    /// A key is present but does not match its schema
    #[error("Malformed configuration key {key}: {reason}")]
    Malformed { key: String, reason: String },

    /// A key matches its schema but violates an invariant
    #[error("Invalid configuration value {key}: {reason}")]
    Invalid { key: String, reason: String },
}

/// VPC sizing (`vpc`)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VpcConfig {
    pub number_of_availability_zones: usize,
    pub number_of_nat_gateways: usize,
    #[serde(default = "default_vpc_cidr")]
    pub cidr_block: Ipv4Cidr,
    #[serde(default = "default_public_mask")]
    pub public_subnet_mask: u8,
    #[serde(default = "default_private_mask")]
    pub private_subnet_mask: u8,
}

/// Subnet blocks for every availability zone, one list per tier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetBlocks {
    pub private: Vec<Ipv4Cidr>,
    pub public: Vec<Ipv4Cidr>,
}

impl VpcConfig {
    /// Carve one private and one public block per zone out of `cidr_block`
    ///
    /// Private blocks are larger, so they are carved first to keep every
    /// block aligned.
    pub fn subnet_blocks(&self) -> Result<SubnetBlocks, NetworkError> {
        let mut allocator = SubnetAllocator::new(self.cidr_block);
        let zones = self.number_of_availability_zones;
        let private = (0..zones)
            .map(|_| allocator.allocate(self.private_subnet_mask))
            .collect::<Result<Vec<_>, _>>()?;
        let public = (0..zones)
            .map(|_| allocator.allocate(self.public_subnet_mask))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SubnetBlocks { private, public })
    }
}

fn default_vpc_cidr() -> Ipv4Cidr {
    Ipv4Cidr::from_parts(std::net::Ipv4Addr::new(10, 1, 0, 0), 16)
        .unwrap_or_else(|_| unreachable!("10.1.0.0/16 is a valid block"))
}

fn default_public_mask() -> u8 {
    20
}

fn default_private_mask() -> u8 {
    19
}

/// EBS volume types accepted for data volumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EbsVolumeType {
    Gp2,
    #[default]
    Gp3,
    Io1,
    Io2,
}

impl EbsVolumeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gp2 => "gp2",
            Self::Gp3 => "gp3",
            Self::Io1 => "io1",
            Self::Io2 => "io2",
        }
    }
}

/// BI host settings (`ec2`)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ec2Config {
    pub instance_type: String,
    pub ami: String,
    #[serde(default)]
    pub key_name: Option<String>,
    #[serde(default = "default_volume_size")]
    pub volume_size: u32,
    #[serde(default)]
    pub volume_type: EbsVolumeType,
}

fn default_volume_size() -> u32 {
    100
}

/// Metadata database settings (`rds`)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RdsConfig {
    pub engine: String,
    pub engine_version: String,
    pub port: u16,
    pub master_username: String,
    pub hive_username: String,
    #[serde(default)]
    pub iam_database_authentication_enabled: bool,
    pub instance_class: String,
    #[serde(default = "default_allocated_storage")]
    pub allocated_storage: u32,
}

fn default_allocated_storage() -> u32 {
    20
}

/// One EMR instance group (`emr.masterInstanceGroup` etc.)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceGroupConfig {
    pub instance_type: String,
    #[serde(default = "default_instance_count")]
    pub instance_count: u32,
    #[serde(default)]
    pub ebs_volume_size: Option<u32>,
    #[serde(default)]
    pub ebs_volume_type: EbsVolumeType,
    #[serde(default)]
    pub bid_price: Option<String>,
}

fn default_instance_count() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScaleDownBehavior {
    #[default]
    TerminateAtTaskCompletion,
    TerminateAtInstanceHour,
}

impl ScaleDownBehavior {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TerminateAtTaskCompletion => "TERMINATE_AT_TASK_COMPLETION",
            Self::TerminateAtInstanceHour => "TERMINATE_AT_INSTANCE_HOUR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum ComputeUnitType {
    #[default]
    Instances,
    InstanceFleetUnits,
    #[serde(rename = "VCPU")]
    Vcpu,
}

impl ComputeUnitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Instances => "Instances",
            Self::InstanceFleetUnits => "InstanceFleetUnits",
            Self::Vcpu => "VCPU",
        }
    }
}

/// Bounds for the EMR managed scaling policy (`emr.managedScaling`)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedScalingConfig {
    #[serde(default)]
    pub unit_type: ComputeUnitType,
    pub minimum_capacity_units: u32,
    pub maximum_capacity_units: u32,
}

/// EMR cluster settings (`emr`)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmrConfig {
    pub applications: Vec<String>,
    pub release_label: String,
    #[serde(default)]
    pub os_release_label: Option<String>,
    pub master_instance_group: InstanceGroupConfig,
    pub core_instance_group: InstanceGroupConfig,
    #[serde(default)]
    pub task_instance_group: Option<InstanceGroupConfig>,
    #[serde(default = "default_root_volume")]
    pub ebs_root_volume_size: u32,
    #[serde(default)]
    pub scale_down_behavior: ScaleDownBehavior,
    #[serde(default)]
    pub managed_scaling: Option<ManagedScalingConfig>,
    /// Provision a second cluster dedicated to notebooks
    #[serde(default)]
    pub notebook_cluster: bool,
}

fn default_root_volume() -> u32 {
    30
}

/// Load balancer settings (`alb`)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbConfig {
    pub certificate_arn: String,
    pub base_domain: String,
    #[serde(default)]
    pub network_load_balancer: bool,
}

/// Credentials (`masterPassword`, `hivePassword`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackSecrets {
    pub master_password: Secret,
    pub hive_password: Secret,
}

impl StackSecrets {
    pub const MASTER_PASSWORD: &'static str = "masterPassword";
    pub const HIVE_PASSWORD: &'static str = "hivePassword";

    /// Secrets keyed by the placeholder names used in resource properties
    pub fn by_name(&self) -> BTreeMap<String, Secret> {
        BTreeMap::from([
            (Self::MASTER_PASSWORD.to_string(), self.master_password.clone()),
            (Self::HIVE_PASSWORD.to_string(), self.hive_password.clone()),
        ])
    }
}

/// Fully validated configuration for one stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackConfig {
    pub stack: Environment,
    pub project: String,
    pub region: String,
    pub vpc: VpcConfig,
    pub ec2: Ec2Config,
    pub rds: RdsConfig,
    pub emr: EmrConfig,
    pub alb: AlbConfig,
    pub secrets: StackSecrets,
}

#[derive(Deserialize)]
struct StackFile {
    #[serde(default)]
    config: BTreeMap<String, serde_yaml::Value>,
}

/// Raw key/value view over a stack file
struct ConfigValues<'a> {
    project: &'a str,
    values: BTreeMap<String, serde_yaml::Value>,
}

impl ConfigValues<'_> {
    fn get(&self, key: &str) -> Option<&serde_yaml::Value> {
        self.values
            .get(&format!("{}:{}", self.project, key))
            .or_else(|| self.values.get(key))
    }

    fn require_object<T: DeserializeOwned>(&self, key: &str) -> Result<T, ConfigError> {
        let value = self
            .get(key)
            .ok_or_else(|| ConfigError::MissingKey(key.to_string()))?;
        serde_yaml::from_value(value.clone()).map_err(|e| ConfigError::Malformed {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    fn require_secret(&self, key: &str) -> Result<Secret, ConfigError> {
        self.require_object(key)
    }
}

impl StackConfig {
    /// Load and validate a stack file from disk
    pub fn load(
        project: &str,
        stack: Environment,
        path: impl AsRef<Path>,
    ) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        debug!(path = %path.display(), "loaded stack file");
        Self::from_yaml_str(project, stack, &contents)
    }

    /// Parse and validate a stack file's contents
    pub fn from_yaml_str(
        project: &str,
        stack: Environment,
        yaml: &str,
    ) -> Result<Self, ConfigError> {
        let file: StackFile =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let values = ConfigValues {
            project,
            values: file.config,
        };

        let region = match values.values.get("aws:region") {
            Some(value) => serde_yaml::from_value::<String>(value.clone()).map_err(|e| {
                ConfigError::Malformed {
                    key: "aws:region".to_string(),
                    reason: e.to_string(),
                }
            })?,
            None => DEFAULT_REGION.to_string(),
        };

        let config = Self {
            stack,
            project: project.to_string(),
            region,
            vpc: values.require_object("vpc")?,
            ec2: values.require_object("ec2")?,
            rds: values.require_object("rds")?,
            emr: values.require_object("emr")?,
            alb: values.require_object("alb")?,
            secrets: StackSecrets {
                master_password: values.require_secret(StackSecrets::MASTER_PASSWORD)?,
                hive_password: values.require_secret(StackSecrets::HIVE_PASSWORD)?,
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field invariants
    pub fn validate(&self) -> Result<(), ConfigError> {
        let vpc = &self.vpc;
        if vpc.number_of_availability_zones < 2 {
            return Err(invalid(
                "vpc.numberOfAvailabilityZones",
                "load balancers require subnets in at least 2 availability zones",
            ));
        }
        if vpc.number_of_availability_zones > 6 {
            return Err(invalid("vpc.numberOfAvailabilityZones", "at most 6 zones are supported"));
        }
        if vpc.number_of_nat_gateways > vpc.number_of_availability_zones {
            return Err(invalid(
                "vpc.numberOfNatGateways",
                format!(
                    "{} NAT gateways exceed {} availability zones",
                    vpc.number_of_nat_gateways, vpc.number_of_availability_zones
                ),
            ));
        }
        for (key, mask) in [
            ("vpc.publicSubnetMask", vpc.public_subnet_mask),
            ("vpc.privateSubnetMask", vpc.private_subnet_mask),
        ] {
            if mask <= vpc.cidr_block.prefix_length() || mask > 28 {
                return Err(invalid(
                    key,
                    format!(
                        "/{} must be longer than the VPC's /{} and at most /28",
                        mask,
                        vpc.cidr_block.prefix_length()
                    ),
                ));
            }
        }

        if let Err(err) = vpc.subnet_blocks() {
            return Err(invalid(
                "vpc.numberOfAvailabilityZones",
                format!(
                    "{} zones of /{} private and /{} public subnets do not fit in {}: {}",
                    vpc.number_of_availability_zones,
                    vpc.private_subnet_mask,
                    vpc.public_subnet_mask,
                    vpc.cidr_block,
                    err
                ),
            ));
        }

        if self.rds.port == 0 {
            return Err(invalid("rds.port", "port must be non-zero"));
        }

        let emr = &self.emr;
        if emr.applications.is_empty() {
            return Err(invalid("emr.applications", "at least one application is required"));
        }
        if !matches!(emr.master_instance_group.instance_count, 1 | 3) {
            return Err(invalid(
                "emr.masterInstanceGroup.instanceCount",
                "EMR supports 1 or 3 master nodes",
            ));
        }
        if emr.core_instance_group.instance_count == 0 {
            return Err(invalid(
                "emr.coreInstanceGroup.instanceCount",
                "at least one core node is required",
            ));
        }
        if let Some(scaling) = &emr.managed_scaling {
            if scaling.minimum_capacity_units == 0
                || scaling.minimum_capacity_units > scaling.maximum_capacity_units
            {
                return Err(invalid(
                    "emr.managedScaling",
                    format!(
                        "capacity bounds {}..{} are not a valid range",
                        scaling.minimum_capacity_units, scaling.maximum_capacity_units
                    ),
                ));
            }
        }

        if !self.alb.certificate_arn.starts_with("arn:aws:acm:") {
            return Err(invalid("alb.certificateArn", "expected an ACM certificate ARN"));
        }
        if self.alb.base_domain.trim().is_empty() {
            return Err(invalid("alb.baseDomain", "base domain must not be empty"));
        }

        Ok(())
    }
}

fn invalid(key: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STACK: &str = r#"
config:
  aws:region: eu-west-1
  data-platform:vpc:
    numberOfAvailabilityZones: 2
    numberOfNatGateways: 1
  data-platform:ec2:
    instanceType: m5.2xlarge
    ami: ami-0123456789abcdef0
  data-platform:rds:
    engine: mysql
    engineVersion: "8.0"
    port: 3306
    masterUsername: admin
    hiveUsername: hive
    instanceClass: db.t3.medium
  data-platform:emr:
    applications: [Hadoop, Hive, Spark, Livy, Presto, JupyterHub]
    releaseLabel: emr-6.9.0
    masterInstanceGroup:
      instanceType: m5.xlarge
    coreInstanceGroup:
      instanceType: m5.xlarge
      instanceCount: 2
  data-platform:alb:
    certificateArn: arn:aws:acm:eu-west-1:123456789012:certificate/abc
    baseDomain: data.example.com
  data-platform:masterPassword: master-secret
  data-platform:hivePassword:
    secure: AAABAJ1x
"#;

    fn dev() -> Environment {
        Environment::new("dev").unwrap()
    }

    #[test]
    fn test_load_applies_defaults() {
        let config = StackConfig::from_yaml_str("data-platform", dev(), STACK).unwrap();
        assert_eq!(config.region, "eu-west-1");
        assert_eq!(config.vpc.cidr_block.as_cidr(), "10.1.0.0/16");
        assert_eq!(config.vpc.public_subnet_mask, 20);
        assert_eq!(config.ec2.volume_size, 100);
        assert_eq!(config.emr.ebs_root_volume_size, 30);
        assert_eq!(
            config.emr.scale_down_behavior,
            ScaleDownBehavior::TerminateAtTaskCompletion
        );
        assert_eq!(config.emr.master_instance_group.instance_count, 1);
        assert!(!config.emr.notebook_cluster);
        assert!(config.secrets.hive_password.is_encrypted());
    }

    #[test]
    fn test_unnamespaced_keys_are_accepted() {
        let yaml = STACK.replace("data-platform:", "");
        let config = StackConfig::from_yaml_str("data-platform", dev(), &yaml).unwrap();
        assert_eq!(config.rds.port, 3306);
    }

    #[test]
    fn test_missing_section_names_key() {
        let yaml = STACK.replace("data-platform:alb:", "data-platform:unused:");
        let err = StackConfig::from_yaml_str("data-platform", dev(), &yaml).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey(ref key) if key == "alb"));
    }

    #[test]
    fn test_missing_field_names_field() {
        let yaml = STACK.replace("    numberOfNatGateways: 1\n", "");
        let err = StackConfig::from_yaml_str("data-platform", dev(), &yaml).unwrap_err();
        match err {
            ConfigError::Malformed { key, reason } => {
                assert_eq!(key, "vpc");
                assert!(reason.contains("numberOfNatGateways"), "{reason}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_nat_gateways_bounded_by_zones() {
        let yaml = STACK.replace("numberOfNatGateways: 1", "numberOfNatGateways: 3");
        let err = StackConfig::from_yaml_str("data-platform", dev(), &yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "vpc.numberOfNatGateways"));
    }

    #[test]
    fn test_zones_must_fit_in_vpc_block() {
        // Six /19 + /20 pairs need 96k addresses of a /16
        let yaml = STACK.replace("numberOfAvailabilityZones: 2", "numberOfAvailabilityZones: 6");
        let err = StackConfig::from_yaml_str("data-platform", dev(), &yaml).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { ref key, .. } if key == "vpc.numberOfAvailabilityZones"
        ));
    }

    #[test]
    fn test_smaller_masks_fit_six_zones() {
        let yaml = STACK.replace(
            "numberOfAvailabilityZones: 2\n",
            "numberOfAvailabilityZones: 6\n    privateSubnetMask: 21\n    publicSubnetMask: 22\n",
        );
        let config = StackConfig::from_yaml_str("data-platform", dev(), &yaml).unwrap();

        let blocks = config.vpc.subnet_blocks().unwrap();
        assert_eq!(blocks.private.len(), 6);
        assert_eq!(blocks.public.len(), 6);
        assert_eq!(blocks.private[0].as_cidr(), "10.1.0.0/21");
        assert_eq!(blocks.public[0].as_cidr(), "10.1.48.0/22");
    }
}
