//! Shared AWS configuration context
//!
//! Provides `AwsContext` for loading AWS SDK configuration once and
//! creating service clients from it. A context is bound to one region and
//! one set of credentials; `with_region` and `assume_role` derive new
//! contexts without touching the original.

use super::account::get_current_account_id;
use anyhow::{Context, Result};
use aws_config::sts::AssumeRoleProvider;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use drifter_core::AccountHandle;
use std::sync::Arc;
use tracing::debug;

/// Shared AWS configuration context for creating service clients.
///
/// # Example
/// ```ignore
/// let home = AwsContext::new("us-east-1", None).await;
/// let member = home.assume_role("arn:aws:iam::123456789012:role/Scan", "drifter").await?;
/// let ec2 = member.with_region("eu-west-1").ec2_client();
/// ```
#[derive(Clone)]
pub struct AwsContext {
    config: Arc<SdkConfig>,
    region: String,
    account: Option<AccountHandle>,
}

/// Construct a client wrapper from a shared context.
pub trait FromAwsContext {
    fn from_context(ctx: &AwsContext) -> Self;
}

impl AwsContext {
    /// Load AWS configuration for the specified region.
    ///
    /// Credentials come from the environment, config files or instance
    /// roles; `profile` selects a named profile instead of the default.
    pub async fn new(region: &str, profile: Option<&str>) -> Self {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region.to_string()));
        if let Some(profile) = profile {
            loader = loader.profile_name(profile);
        }
        let config = loader.load().await;

        Self {
            config: Arc::new(config),
            region: region.to_string(),
            account: None,
        }
    }

    /// Same credentials, different region.
    pub fn with_region(&self, region: &str) -> Self {
        if region == self.region {
            return self.clone();
        }
        let config = self
            .config
            .to_builder()
            .region(Region::new(region.to_string()))
            .build();

        Self {
            config: Arc::new(config),
            region: region.to_string(),
            account: self.account.clone(),
        }
    }

    /// Assume `role_arn` and return a context using the resulting credentials.
    ///
    /// The credentials are validated eagerly with STS `GetCallerIdentity`, so
    /// a missing role or trust policy fails here rather than on the first
    /// real API call.
    pub async fn assume_role(&self, role_arn: &str, session_name: &str) -> Result<Self> {
        let provider = AssumeRoleProvider::builder(role_arn)
            .session_name(session_name)
            .configure(&self.config)
            .build()
            .await;

        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(self.region.clone()))
            .credentials_provider(provider)
            .load()
            .await;

        let account = get_current_account_id(&config)
            .await
            .with_context(|| format!("Failed to assume role {role_arn}"))?;
        debug!(role_arn = %role_arn, account = %account, "Assumed role");

        Ok(Self {
            config: Arc::new(config),
            region: self.region.clone(),
            account: Some(account),
        })
    }

    /// Get the underlying SDK config for direct client construction.
    pub fn sdk_config(&self) -> &SdkConfig {
        &self.config
    }

    /// Get the region string.
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Account the credentials belong to, when known.
    pub fn account(&self) -> Option<&AccountHandle> {
        self.account.as_ref()
    }

    pub fn autoscaling_client(&self) -> aws_sdk_autoscaling::Client {
        aws_sdk_autoscaling::Client::new(self.sdk_config())
    }

    pub fn ec2_client(&self) -> aws_sdk_ec2::Client {
        aws_sdk_ec2::Client::new(self.sdk_config())
    }

    pub fn lambda_client(&self) -> aws_sdk_lambda::Client {
        aws_sdk_lambda::Client::new(self.sdk_config())
    }

    pub fn organizations_client(&self) -> aws_sdk_organizations::Client {
        aws_sdk_organizations::Client::new(self.sdk_config())
    }

    pub fn rds_client(&self) -> aws_sdk_rds::Client {
        aws_sdk_rds::Client::new(self.sdk_config())
    }

    pub fn s3_client(&self) -> aws_sdk_s3::Client {
        aws_sdk_s3::Client::new(self.sdk_config())
    }

    pub fn sts_client(&self) -> aws_sdk_sts::Client {
        aws_sdk_sts::Client::new(self.sdk_config())
    }
}

impl std::fmt::Debug for AwsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsContext")
            .field("region", &self.region)
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_region_keeps_account() {
        let ctx = AwsContext::new("us-east-1", None).await;
        let west = ctx.with_region("us-west-2");
        assert_eq!(west.region(), "us-west-2");
        assert_eq!(
            west.sdk_config().region().map(|r| r.as_ref()),
            Some("us-west-2")
        );
        assert!(west.account().is_none());
        assert_eq!(ctx.region(), "us-east-1");
    }

    #[tokio::test]
    #[ignore = "requires AWS credentials"]
    async fn test_context_creation() {
        let ctx = AwsContext::new("us-east-2", None).await;
        assert_eq!(ctx.region(), "us-east-2");
    }
}
