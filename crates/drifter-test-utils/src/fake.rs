//! In-memory cloud for engine tests
//!
//! [`FakeCloud`] implements both collaborator traits over fixed data, with
//! switches to make any account, document or region fail. Clones share
//! their call counters, so one clone can be handed to the aggregator as the
//! directory and another as the backend.

use anyhow::{Result, anyhow, bail};
use drifter_core::{
    AccountBackend, AccountDirectory, AccountHandle, Catalog, DocumentListing, DocumentLocation,
    LiveInventory, RegionId,
};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Counters shared by every clone of a [`FakeCloud`].
#[derive(Debug, Default)]
pub struct CallStats {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    enumerations: Mutex<Vec<(AccountHandle, RegionId)>>,
}

impl CallStats {
    /// Highest number of remote calls observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Every `(account, region)` enumeration performed, in call order.
    pub fn enumerations(&self) -> Vec<(AccountHandle, RegionId)> {
        self.enumerations
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeCloud {
    accounts: Vec<AccountHandle>,
    directory_error: Option<String>,
    documents: BTreeMap<AccountHandle, Vec<(DocumentLocation, Vec<u8>)>>,
    inventories: HashMap<(AccountHandle, RegionId), LiveInventory>,
    failing_roles: HashSet<AccountHandle>,
    hanging_roles: HashSet<AccountHandle>,
    panicking_roles: HashSet<AccountHandle>,
    failing_listings: HashSet<AccountHandle>,
    failing_buckets: HashSet<(AccountHandle, String)>,
    failing_fetches: HashSet<DocumentLocation>,
    failing_regions: HashSet<(AccountHandle, RegionId)>,
    latency: Option<Duration>,
    stats: Arc<CallStats>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an account to the directory.
    pub fn account(mut self, account: &str) -> Self {
        self.accounts.push(AccountHandle::new(account));
        self
    }

    /// Store a state document in an account, adding the account if needed.
    pub fn document(mut self, account: &str, bucket: &str, key: &str, body: Vec<u8>) -> Self {
        let handle = AccountHandle::new(account);
        if !self.accounts.contains(&handle) {
            self.accounts.push(handle.clone());
        }
        self.documents
            .entry(handle)
            .or_default()
            .push((DocumentLocation::new(bucket, key), body));
        self
    }

    /// Set the live resources of one account/region.
    pub fn inventory(mut self, account: &str, region: &str, live: LiveInventory) -> Self {
        self.inventories
            .insert((AccountHandle::new(account), RegionId::new(region)), live);
        self
    }

    pub fn fail_directory(mut self, message: &str) -> Self {
        self.directory_error = Some(message.to_string());
        self
    }

    pub fn fail_role(mut self, account: &str) -> Self {
        self.failing_roles.insert(AccountHandle::new(account));
        self
    }

    /// Role assumption for this account never completes.
    pub fn hang_role(mut self, account: &str) -> Self {
        self.hanging_roles.insert(AccountHandle::new(account));
        self
    }

    /// Role assumption for this account panics inside the task.
    pub fn panic_role(mut self, account: &str) -> Self {
        self.panicking_roles.insert(AccountHandle::new(account));
        self
    }

    pub fn fail_listing(mut self, account: &str) -> Self {
        self.failing_listings.insert(AccountHandle::new(account));
        self
    }

    /// The bucket is reported as unreadable; its documents are not listed.
    pub fn fail_bucket(mut self, account: &str, bucket: &str) -> Self {
        self.failing_buckets
            .insert((AccountHandle::new(account), bucket.to_string()));
        self
    }

    pub fn fail_fetch(mut self, bucket: &str, key: &str) -> Self {
        self.failing_fetches
            .insert(DocumentLocation::new(bucket, key));
        self
    }

    pub fn fail_region(mut self, account: &str, region: &str) -> Self {
        self.failing_regions
            .insert((AccountHandle::new(account), RegionId::new(region)));
        self
    }

    /// Delay every backend call, to make overlapping tasks observable.
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn stats(&self) -> Arc<CallStats> {
        Arc::clone(&self.stats)
    }

    async fn remote_call(&self) {
        self.stats.enter();
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.stats.exit();
    }
}

impl AccountDirectory for FakeCloud {
    async fn list_accounts(&self) -> Result<Vec<AccountHandle>> {
        if let Some(message) = &self.directory_error {
            bail!("{message}");
        }
        Ok(self.accounts.clone())
    }
}

impl AccountBackend for FakeCloud {
    type Credential = AccountHandle;

    async fn assume_role(&self, account: &AccountHandle) -> Result<AccountHandle> {
        if self.hanging_roles.contains(account) {
            std::future::pending::<()>().await;
        }
        self.remote_call().await;
        if self.panicking_roles.contains(account) {
            panic!("role assumption panicked for {account}");
        }
        if self.failing_roles.contains(account) {
            bail!("AccessDenied: not authorized to assume role in {account}");
        }
        Ok(account.clone())
    }

    async fn list_state_documents(&self, account: &AccountHandle) -> Result<DocumentListing> {
        self.remote_call().await;
        if self.failing_listings.contains(account) {
            bail!("AccessDenied: ListBuckets");
        }

        let mut listing = DocumentListing::default();
        let mut skipped = BTreeSet::new();
        for (location, _) in self.documents.get(account).into_iter().flatten() {
            let key = (account.clone(), location.bucket.clone());
            if !self.failing_buckets.contains(&key) {
                listing.documents.push(location.clone());
            } else if skipped.insert(location.bucket.clone()) {
                listing.skip_bucket(
                    location.bucket.as_str(),
                    anyhow!("AccessDenied: GetBucketLocation on {}", location.bucket),
                );
            }
        }
        Ok(listing)
    }

    async fn fetch_document(
        &self,
        account: &AccountHandle,
        location: &DocumentLocation,
    ) -> Result<Vec<u8>> {
        self.remote_call().await;
        if self.failing_fetches.contains(location) {
            bail!("NoSuchKey: {location}");
        }
        self.documents
            .get(account)
            .and_then(|docs| docs.iter().find(|(loc, _)| loc == location))
            .map(|(_, body)| body.clone())
            .ok_or_else(|| anyhow!("NoSuchKey: {location}"))
    }

    async fn enumerate(
        &self,
        account: &AccountHandle,
        region: &RegionId,
        catalog: &Catalog,
    ) -> Result<LiveInventory> {
        self.remote_call().await;
        if let Ok(mut calls) = self.stats.enumerations.lock() {
            calls.push((account.clone(), region.clone()));
        }

        let key = (account.clone(), region.clone());
        if self.failing_regions.contains(&key) {
            bail!("UnauthorizedOperation: {region} is disabled");
        }

        let Some(stored) = self.inventories.get(&key) else {
            return Ok(LiveInventory::default());
        };
        let mut live = LiveInventory::default();
        for (kind, id) in stored.iter().filter(|(kind, _)| catalog.contains(*kind)) {
            live.insert(kind, id.clone());
        }
        for link in stored.links() {
            if catalog.contains(link.owner_kind) {
                live.link(link.clone());
            }
        }
        Ok(live)
    }
}
