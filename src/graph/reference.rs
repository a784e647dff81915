// Copyright (c) 2025 - Cowboy AI, Inc.
//! Output and Secret References
//!
//! Resource properties are plain JSON. A property that depends on another
//! resource's output embeds a reference token instead of a value:
//!
//! ```text
//! {{ref:<kind>/<name>.<attribute>}}     output of another resource
//! {{secret:<name>}}                     stack secret, resolved at apply time
//! ```
//!
//! Tokens may stand alone (the resolved value keeps its JSON type) or be
//! embedded in a longer string (the resolved value is interpolated). The
//! double-brace syntax never collides with IAM policy variables such as
//! `${aws:ResourceAccount}`, which must reach AWS verbatim.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

use super::ResourceKind;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Identity of a declared resource: kind plus logical name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    pub kind: ResourceKind,
    pub name: String,
}

impl ResourceKey {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// Handle to a resource declared in a [`ResourceGraph`](super::ResourceGraph)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceRef {
    key: ResourceKey,
}

impl ResourceRef {
    pub(crate) fn new(key: ResourceKey) -> Self {
        Self { key }
    }

    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    pub fn kind(&self) -> ResourceKind {
        self.key.kind
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    /// Reference to an arbitrary output attribute
    pub fn output(&self, attribute: impl Into<String>) -> OutputRef {
        OutputRef {
            resource: self.key.clone(),
            attribute: attribute.into(),
        }
    }

    pub fn id(&self) -> OutputRef {
        self.output("id")
    }

    pub fn arn(&self) -> OutputRef {
        self.output("arn")
    }
}

/// Reference to one output attribute of a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputRef {
    pub resource: ResourceKey,
    pub attribute: String,
}

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{OPEN}ref:{}.{}{CLOSE}", self.resource, self.attribute)
    }
}

impl Serialize for OutputRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl From<OutputRef> for Value {
    fn from(reference: OutputRef) -> Self {
        Value::String(reference.to_string())
    }
}

/// Reference to a named stack secret
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SecretRef(pub String);

impl fmt::Display for SecretRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{OPEN}secret:{}{CLOSE}", self.0)
    }
}

impl Serialize for SecretRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A token found inside a property value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Token {
    Output(OutputRef),
    Secret(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Output(output) => write!(f, "{}", output),
            Self::Secret(name) => write!(f, "{}", SecretRef(name.clone())),
        }
    }
}

fn parse_token(inner: &str) -> Option<Token> {
    if let Some(name) = inner.strip_prefix("secret:") {
        return (!name.is_empty()).then(|| Token::Secret(name.to_string()));
    }
    let body = inner.strip_prefix("ref:")?;
    let (kind, rest) = body.split_once('/')?;
    let (name, attribute) = rest.rsplit_once('.')?;
    let kind = kind.parse::<ResourceKind>().ok()?;
    if name.is_empty() || attribute.is_empty() {
        return None;
    }
    Some(Token::Output(OutputRef {
        resource: ResourceKey::new(kind, name),
        attribute: attribute.to_string(),
    }))
}

/// Split a string into literal text and tokens
fn scan(s: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut rest = s;
    while let Some(start) = rest.find(OPEN) {
        let after = &rest[start + OPEN.len()..];
        let Some(end) = after.find(CLOSE) else {
            break;
        };
        match parse_token(&after[..end]) {
            Some(token) => {
                if start > 0 {
                    segments.push(Segment::Text(&rest[..start]));
                }
                segments.push(Segment::Token(token));
            }
            None => segments.push(Segment::Text(&rest[..start + OPEN.len() + end + CLOSE.len()])),
        }
        rest = &after[end + CLOSE.len()..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Text(rest));
    }
    segments
}

enum Segment<'a> {
    Text(&'a str),
    Token(Token),
}

/// Collect every token referenced anywhere inside a JSON value
pub fn tokens_in(value: &Value) -> Vec<Token> {
    let mut tokens = Vec::new();
    collect(value, &mut tokens);
    tokens
}

fn collect(value: &Value, tokens: &mut Vec<Token>) {
    match value {
        Value::String(s) => {
            for segment in scan(s) {
                if let Segment::Token(token) = segment {
                    tokens.push(token);
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect(item, tokens)),
        Value::Object(map) => map.values().for_each(|item| collect(item, tokens)),
        _ => {}
    }
}

/// Replace every token in `value` using `lookup`
///
/// Returns the first token `lookup` could not resolve.
pub fn resolve<F>(value: &Value, lookup: &F) -> Result<Value, Token>
where
    F: Fn(&Token) -> Option<Value>,
{
    match value {
        Value::String(s) => {
            let segments = scan(s);
            if let [Segment::Token(token)] = segments.as_slice() {
                return lookup(token).ok_or_else(|| token.clone());
            }
            let mut out = String::with_capacity(s.len());
            for segment in segments {
                match segment {
                    Segment::Text(text) => out.push_str(text),
                    Segment::Token(token) => match lookup(&token) {
                        Some(Value::String(resolved)) => out.push_str(&resolved),
                        Some(other) => out.push_str(&other.to_string()),
                        None => return Err(token),
                    },
                }
            }
            Ok(Value::String(out))
        }
        Value::Array(items) => items
            .iter()
            .map(|item| resolve(item, lookup))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut resolved = serde_json::Map::with_capacity(map.len());
            for (key, item) in map {
                resolved.insert(key.clone(), resolve(item, lookup)?);
            }
            Ok(Value::Object(resolved))
        }
        other => Ok(other.clone()),
    }
}
