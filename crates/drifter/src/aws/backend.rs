//! `AccountBackend` over real AWS accounts

use super::context::{AwsContext, FromAwsContext};
use super::inventory::Inventory;
use super::state_store::StateStore;
use anyhow::{Result, ensure};
use chrono::Utc;
use drifter_core::defaults::{SESSION_NAME, role_arn};
use drifter_core::{
    AccountBackend, AccountHandle, Catalog, DocumentListing, DocumentLocation, LiveInventory,
    RegionId,
};
use tracing::debug;

/// Credentials and per-account caches for one member account
pub struct AccountSession {
    ctx: AwsContext,
    store: StateStore,
}

/// Reaches member accounts by assuming a named role from a home context.
#[derive(Debug, Clone)]
pub struct AwsBackend {
    home: AwsContext,
    role_name: String,
    state_suffix: String,
}

impl AwsBackend {
    pub fn new(home: AwsContext, role_name: &str, state_suffix: &str) -> Self {
        Self {
            home,
            role_name: role_name.to_string(),
            state_suffix: state_suffix.to_string(),
        }
    }
}

impl AccountBackend for AwsBackend {
    type Credential = AccountSession;

    async fn assume_role(&self, account: &AccountHandle) -> Result<AccountSession> {
        let arn = role_arn(account, &self.role_name);
        let session_name = format!("{SESSION_NAME}-{}", Utc::now().timestamp());
        let ctx = self.home.assume_role(&arn, &session_name).await?;

        if let Some(actual) = ctx.account() {
            ensure!(
                actual == account,
                "Role {arn} resolved to account {actual}, expected {account}"
            );
        }
        debug!(account = %account, role = %self.role_name, "Account session ready");

        let store = StateStore::new(&ctx, &self.state_suffix);
        Ok(AccountSession { ctx, store })
    }

    async fn list_state_documents(&self, session: &AccountSession) -> Result<DocumentListing> {
        session.store.list_documents().await
    }

    async fn fetch_document(
        &self,
        session: &AccountSession,
        location: &DocumentLocation,
    ) -> Result<Vec<u8>> {
        session.store.fetch(location).await
    }

    async fn enumerate(
        &self,
        session: &AccountSession,
        region: &RegionId,
        catalog: &Catalog,
    ) -> Result<LiveInventory> {
        Inventory::from_context(&session.ctx.with_region(region))
            .enumerate(catalog)
            .await
    }
}
