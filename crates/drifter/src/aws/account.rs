//! AWS account identity and the organization account directory

use super::context::{AwsContext, FromAwsContext};
use anyhow::{Context, Result};
use drifter_core::{AccountDirectory, AccountHandle};
use tracing::{debug, info};

/// Fetch the current AWS account ID from credentials via STS GetCallerIdentity
///
/// This operation requires no special permissions - it always succeeds if
/// credentials are valid.
pub async fn get_current_account_id(config: &aws_config::SdkConfig) -> Result<AccountHandle> {
    let sts = aws_sdk_sts::Client::new(config);
    let identity = sts
        .get_caller_identity()
        .send()
        .await
        .context("Failed to get AWS caller identity - check credentials")?;

    let account = identity
        .account()
        .context("No account ID returned from STS GetCallerIdentity")?;

    Ok(AccountHandle::new(account))
}

/// Every account in the caller's AWS Organization.
///
/// Must be used from the organization's management account (or a delegated
/// administrator); member accounts get `AccessDeniedException`.
#[derive(Debug, Clone)]
pub struct OrganizationDirectory {
    client: aws_sdk_organizations::Client,
}

impl FromAwsContext for OrganizationDirectory {
    fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.organizations_client(),
        }
    }
}

impl AccountDirectory for OrganizationDirectory {
    async fn list_accounts(&self) -> Result<Vec<AccountHandle>> {
        let mut accounts = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let response = self
                .client
                .list_accounts()
                .set_next_token(next_token.take())
                .send()
                .await
                .context("Failed to list organization accounts")?;

            for account in response.accounts() {
                if let Some(id) = account.id() {
                    debug!(account = %id, name = ?account.name(), "Found account");
                    accounts.push(AccountHandle::new(id));
                }
            }

            match response.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }

        info!(count = accounts.len(), "Listed organization accounts");
        Ok(accounts)
    }
}
