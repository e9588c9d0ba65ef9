//! Identifier newtypes shared across the engine

use serde::{Deserialize, Serialize};

/// Opaque live-resource identifier (instance id, DB identifier, function name, ...).
///
/// Two identifiers are equal iff their strings are equal; no normalization
/// is applied.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::Deref,
    derive_more::From,
)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// AWS account handle (12-digit account id)
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::Deref,
)]
#[serde(transparent)]
pub struct AccountHandle(String);

impl AccountHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// AWS region name (e.g. `us-east-1`)
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::Deref,
)]
#[serde(transparent)]
pub struct RegionId(String);

impl RegionId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse a comma-separated region list, dropping blanks and duplicates
    /// while keeping first-seen order.
    pub fn parse_list(s: &str) -> Vec<RegionId> {
        let mut regions: Vec<RegionId> = Vec::new();
        for name in s.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if !regions.iter().any(|r| r.as_str() == name) {
                regions.push(RegionId::new(name));
            }
        }
        regions
    }
}

/// Where a state document lives: an S3 bucket and object key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
#[display("s3://{bucket}/{key}")]
pub struct DocumentLocation {
    pub bucket: String,
    pub key: String,
}

impl DocumentLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}
