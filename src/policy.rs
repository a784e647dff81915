// Copyright (c) 2025 - Cowboy AI, Inc.
//! IAM Policy Documents
//!
//! Typed trust and permission documents, serialized in the exact shape AWS
//! expects (`Version`, `Statement`, `Effect`, ...).

use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};

/// Policy language version
pub const POLICY_VERSION: &str = "2012-10-17";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Effect {
    Allow,
    Deny,
}

/// Who a statement applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    /// `"*"`
    Anyone,
    /// `{"Service": [...]}`
    Service(Vec<String>),
}

impl Serialize for Principal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Anyone => serializer.serialize_str("*"),
            Self::Service(services) => {
                BTreeMap::from([("Service", services)]).serialize(serializer)
            }
        }
    }
}

/// `{ operator: { key: [values] } }`
pub type Condition = BTreeMap<String, BTreeMap<String, Vec<String>>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Statement {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    pub effect: Effect,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<Principal>,
    pub action: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub resource: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
}

impl Statement {
    pub fn allow<I, S>(actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Effect::Allow, actions)
    }

    pub fn deny<I, S>(actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Effect::Deny, actions)
    }

    fn new<I, S>(effect: Effect, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sid: None,
            effect,
            principal: None,
            action: actions.into_iter().map(Into::into).collect(),
            resource: Vec::new(),
            condition: None,
        }
    }

    pub fn sid(mut self, sid: impl Into<String>) -> Self {
        self.sid = Some(sid.into());
        self
    }

    pub fn principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn resources<I, S>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resource = resources.into_iter().map(Into::into).collect();
        self
    }

    pub fn condition(
        mut self,
        operator: impl Into<String>,
        key: impl Into<String>,
        values: Vec<String>,
    ) -> Self {
        self.condition
            .get_or_insert_with(BTreeMap::new)
            .entry(operator.into())
            .or_default()
            .insert(key.into(), values);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: String,
    pub statement: Vec<Statement>,
}

impl PolicyDocument {
    pub fn new(statements: Vec<Statement>) -> Self {
        Self {
            version: POLICY_VERSION.to_string(),
            statement: statements,
        }
    }

    /// Trust policy letting the given service principals assume a role
    pub fn assume_role<I, S>(services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(vec![Statement::allow(["sts:AssumeRole"]).principal(
            Principal::Service(services.into_iter().map(Into::into).collect()),
        )])
    }
}

/// `arn:aws:s3:::<bucket>` for a bucket name
pub fn bucket_arn(bucket: &str) -> String {
    format!("arn:aws:s3:::{}", bucket)
}

/// `arn:aws:s3:::<bucket>/*` for a bucket name
pub fn bucket_objects_arn(bucket: &str) -> String {
    format!("arn:aws:s3:::{}/*", bucket)
}

/// Bucket name from an S3 bucket or object ARN
pub fn bucket_of_arn(arn: &str) -> Option<&str> {
    let rest = arn.strip_prefix("arn:aws:s3:::")?;
    let bucket = rest.split('/').next()?;
    (!bucket.is_empty()).then_some(bucket)
}

/// Pattern matching any session of an assumed role, for `aws:ARN` conditions
pub fn assumed_role_pattern(role: &str) -> String {
    format!(
        "arn:aws:sts::${{aws:ResourceAccount}}:assumed-role/{}/*",
        role
    )
}

/// Deny-by-default bucket policy
///
/// Denies reads (`ListBucket`, `GetObject`) and writes (`PutObject`,
/// `DeleteObject`) to every principal whose session ARN does not match one
/// of the allowed roles. The two action groups are separate statements so
/// either can later be relaxed on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketAccessPolicy {
    pub bucket: String,
    pub allowed_roles: Vec<String>,
}

impl BucketAccessPolicy {
    pub const READ_ACTIONS: [&'static str; 2] = ["s3:ListBucket", "s3:GetObject"];
    pub const WRITE_ACTIONS: [&'static str; 2] = ["s3:PutObject", "s3:DeleteObject"];

    pub fn new(bucket: impl Into<String>, allowed_roles: Vec<String>) -> Self {
        Self {
            bucket: bucket.into(),
            allowed_roles,
        }
    }

    pub fn document(&self) -> PolicyDocument {
        let patterns: Vec<String> = self
            .allowed_roles
            .iter()
            .map(|role| assumed_role_pattern(role))
            .collect();
        let deny = |actions: [&str; 2]| {
            Statement::deny(actions)
                .principal(Principal::Anyone)
                .resources([bucket_arn(&self.bucket), bucket_objects_arn(&self.bucket)])
                .condition("StringNotLike", "aws:ARN", patterns.clone())
        };
        PolicyDocument::new(vec![deny(Self::READ_ACTIONS), deny(Self::WRITE_ACTIONS)])
    }
}

/// Role name from an `assumed-role` session pattern
pub fn role_of_pattern(pattern: &str) -> Option<&str> {
    let (_, rest) = pattern.split_once(":assumed-role/")?;
    let role = rest.strip_suffix("/*")?;
    (!role.is_empty() && !role.contains('/')).then_some(role)
}

/// Buckets named by the resources of `s3:` statements that allow access
///
/// Reads a rendered document, so it works on policies taken back out of a
/// resource graph.
pub fn granted_buckets(policy: &serde_json::Value) -> BTreeSet<String> {
    let Some(statements) = policy.get("Statement").and_then(|s| s.as_array()) else {
        return BTreeSet::new();
    };
    statements
        .iter()
        .filter(|s| s.get("Effect").and_then(|e| e.as_str()) == Some("Allow"))
        .filter(|s| {
            s.get("Action")
                .and_then(|a| a.as_array())
                .is_some_and(|actions| {
                    actions
                        .iter()
                        .filter_map(|a| a.as_str())
                        .any(|a| a.starts_with("s3:"))
                })
        })
        .filter_map(|s| s.get("Resource").and_then(|r| r.as_array()))
        .flatten()
        .filter_map(|arn| arn.as_str().and_then(bucket_of_arn).map(str::to_string))
        .collect()
}

/// Roles exempted by every deny statement of a rendered bucket policy
///
/// A role counts as allowed only if no deny statement applies to it.
pub fn exempt_roles(policy: &serde_json::Value) -> Vec<String> {
    let Some(statements) = policy.get("Statement").and_then(|s| s.as_array()) else {
        return Vec::new();
    };
    let mut exempt: Option<Vec<String>> = None;
    for statement in statements {
        if statement.get("Effect").and_then(|e| e.as_str()) != Some("Deny") {
            continue;
        }
        let roles: Vec<String> = statement
            .pointer("/Condition/StringNotLike/aws:ARN")
            .and_then(|v| v.as_array())
            .map(|patterns| {
                patterns
                    .iter()
                    .filter_map(|p| p.as_str().and_then(role_of_pattern))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        exempt = Some(match exempt {
            None => roles,
            Some(previous) => previous.into_iter().filter(|r| roles.contains(r)).collect(),
        });
    }
    exempt.unwrap_or_default()
}
