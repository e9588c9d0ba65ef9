//! Collaborator interfaces the engine consumes
//!
//! The engine never talks to a cloud provider directly. These traits are
//! implemented by the AWS layer in the `drifter` crate and by the in-memory
//! fake in `drifter-test-utils`.

use crate::reconcile::LiveInventory;
use crate::resource_kind::Catalog;
use crate::types::{AccountHandle, DocumentLocation, RegionId};
use anyhow::Result;
use std::future::Future;

/// Organization-wide account directory.
pub trait AccountDirectory: Send + Sync {
    /// List every account to scan
    fn list_accounts(&self) -> impl Future<Output = Result<Vec<AccountHandle>>> + Send;
}

/// Per-account access to state documents and live resources.
pub trait AccountBackend: Send + Sync + 'static {
    /// Account-scoped credential produced by role assumption
    type Credential: Send + Sync + 'static;

    /// Obtain a least-privilege credential for an account
    fn assume_role(
        &self,
        account: &AccountHandle,
    ) -> impl Future<Output = Result<Self::Credential>> + Send;

    /// Discover candidate state documents visible to the credential
    fn list_state_documents(
        &self,
        credential: &Self::Credential,
    ) -> impl Future<Output = Result<DocumentListing>> + Send;

    /// Read one state document
    fn fetch_document(
        &self,
        credential: &Self::Credential,
        location: &DocumentLocation,
    ) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// Enumerate live resources of the catalog's kinds in one region
    fn enumerate(
        &self,
        credential: &Self::Credential,
        region: &RegionId,
        catalog: &Catalog,
    ) -> impl Future<Output = Result<LiveInventory>> + Send;
}

/// State documents found in one account, plus the buckets that could not be
/// read.
///
/// A bucket failure does not fail the listing, but it must reach the engine so
/// the scan can be reported as partial.
#[derive(Debug, Default)]
pub struct DocumentListing {
    pub documents: Vec<DocumentLocation>,
    /// `(bucket, error)` for every bucket that was skipped
    pub skipped_buckets: Vec<(String, anyhow::Error)>,
}

impl DocumentListing {
    pub fn new(documents: Vec<DocumentLocation>) -> Self {
        Self {
            documents,
            skipped_buckets: Vec::new(),
        }
    }

    pub fn skip_bucket(&mut self, bucket: impl Into<String>, error: anyhow::Error) {
        self.skipped_buckets.push((bucket.into(), error));
    }
}

/// Directory over a fixed list of accounts.
#[derive(Debug, Clone)]
pub struct StaticDirectory {
    accounts: Vec<AccountHandle>,
}

impl StaticDirectory {
    pub fn new(accounts: Vec<AccountHandle>) -> Self {
        Self { accounts }
    }
}

impl AccountDirectory for StaticDirectory {
    async fn list_accounts(&self) -> Result<Vec<AccountHandle>> {
        Ok(self.accounts.clone())
    }
}
