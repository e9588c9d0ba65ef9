//! Configuration types for a scan

use crate::output::OutputFormat;
use drifter_core::{AccountHandle, AggregatorConfig, Catalog, RegionId};
use std::path::{Path, PathBuf};

/// What to scan
#[derive(Debug, Clone)]
pub struct ScopeConfig {
    /// Regions enumerated in every account
    pub regions: Vec<RegionId>,
    /// Resource kinds to reconcile
    pub catalog: Catalog,
    /// Explicit accounts; `None` means every account in the organization
    pub accounts: Option<Vec<AccountHandle>>,
}

/// AWS access configuration
#[derive(Debug, Clone)]
pub struct AwsConfig {
    /// Region for global calls (Organizations, STS, S3 bucket listing)
    pub home_region: String,
    /// AWS profile name (overrides default credential resolution)
    pub aws_profile: Option<String>,
    /// Role assumed in each member account
    pub role_name: String,
    /// Object key suffix identifying state documents
    pub state_suffix: String,
}

/// Runtime behavior flags
#[derive(Debug, Clone)]
pub struct RuntimeFlags {
    /// Cap on concurrently scanned accounts
    pub max_concurrent_accounts: Option<usize>,
    /// Stop at the first skipped unit of work
    pub fail_fast: bool,
    /// Report file path (stdout when unset)
    pub output: Option<PathBuf>,
    pub format: OutputFormat,
}

/// Configuration for a scan run
///
/// Composed of focused sub-configs. Fields are accessible both through the
/// sub-configs and through flat accessor methods.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub scope: ScopeConfig,
    pub aws: AwsConfig,
    pub flags: RuntimeFlags,
}

impl RunConfig {
    pub fn regions(&self) -> &[RegionId] {
        &self.scope.regions
    }

    pub fn catalog(&self) -> &Catalog {
        &self.scope.catalog
    }

    pub fn accounts(&self) -> Option<&[AccountHandle]> {
        self.scope.accounts.as_deref()
    }

    pub fn home_region(&self) -> &str {
        &self.aws.home_region
    }

    pub fn aws_profile(&self) -> Option<&str> {
        self.aws.aws_profile.as_deref()
    }

    pub fn role_name(&self) -> &str {
        &self.aws.role_name
    }

    pub fn state_suffix(&self) -> &str {
        &self.aws.state_suffix
    }

    pub fn output(&self) -> Option<&Path> {
        self.flags.output.as_deref()
    }

    pub fn format(&self) -> OutputFormat {
        self.flags.format
    }

    /// Engine configuration for this run.
    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            regions: self.scope.regions.clone(),
            catalog: self.scope.catalog.clone(),
            max_concurrent_accounts: self.flags.max_concurrent_accounts,
            fail_fast: self.flags.fail_fast,
        }
    }
}
