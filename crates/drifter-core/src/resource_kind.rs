//! Supported resource types and the scan catalog
//!
//! Every resource type the engine understands is a variant of [`ResourceKind`].
//! A [`Catalog`] is the caller-chosen subset that a run actually scans;
//! anything outside it is ignored by the parser and never enumerated.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Types of AWS resources tracked for drift
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    /// EC2 instance
    #[serde(rename = "aws_instance")]
    Ec2Instance,
    /// RDS database instance
    #[serde(rename = "aws_db_instance")]
    DbInstance,
    /// Lambda function
    #[serde(rename = "aws_lambda_function")]
    LambdaFunction,
    /// Auto Scaling group (owns EC2 instances)
    #[serde(rename = "aws_autoscaling_group")]
    AutoScalingGroup,
}

impl ResourceKind {
    /// Every kind, in report order.
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Ec2Instance,
        ResourceKind::DbInstance,
        ResourceKind::LambdaFunction,
        ResourceKind::AutoScalingGroup,
    ];

    /// Terraform resource type name for this kind
    pub fn terraform_type(self) -> &'static str {
        match self {
            ResourceKind::Ec2Instance => "aws_instance",
            ResourceKind::DbInstance => "aws_db_instance",
            ResourceKind::LambdaFunction => "aws_lambda_function",
            ResourceKind::AutoScalingGroup => "aws_autoscaling_group",
        }
    }

    /// Look up a kind by its Terraform resource type name.
    pub fn from_terraform_type(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.terraform_type() == name)
    }

    /// State attributes holding the live identifier, in order of preference.
    ///
    /// RDS instances are addressed by `identifier` (the DB instance
    /// identifier); older state files and some providers only carry `id`.
    pub fn identifier_fields(self) -> &'static [&'static str] {
        match self {
            ResourceKind::DbInstance => &["identifier", "id"],
            ResourceKind::Ec2Instance
            | ResourceKind::LambdaFunction
            | ResourceKind::AutoScalingGroup => &["id"],
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.terraform_type())
    }
}

impl FromStr for ResourceKind {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_terraform_type(s).ok_or_else(|| CatalogError::UnknownType(s.to_string()))
    }
}

/// Catalog configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("unsupported resource type '{0}' (supported: aws_instance, aws_db_instance, aws_lambda_function, aws_autoscaling_group)")]
    UnknownType(String),

    #[error("resource catalog is empty")]
    Empty,
}

/// The set of resource kinds a run scans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    kinds: BTreeSet<ResourceKind>,
}

impl Catalog {
    /// Build a catalog from explicit kinds.
    pub fn new(kinds: impl IntoIterator<Item = ResourceKind>) -> Result<Self, CatalogError> {
        let kinds: BTreeSet<_> = kinds.into_iter().collect();
        if kinds.is_empty() {
            return Err(CatalogError::Empty);
        }
        Ok(Self { kinds })
    }

    pub fn contains(&self, kind: ResourceKind) -> bool {
        self.kinds.contains(&kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = ResourceKind> + '_ {
        self.kinds.iter().copied()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            kinds: ResourceKind::ALL.into_iter().collect(),
        }
    }
}

/// Parse a comma-separated list of Terraform type names.
impl FromStr for Catalog {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kinds = s
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(ResourceKind::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(kinds)
    }
}
