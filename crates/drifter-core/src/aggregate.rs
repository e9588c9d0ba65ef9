//! Multi-account scan orchestration
//!
//! [`Aggregator`] fans out one task per account, runs parse → enumerate →
//! reconcile inside each task, and folds every partial [`Classification`]
//! into a single [`GlobalResult`].
//!
//! Failures below the account directory never abort the run. They are
//! recorded as [`SkipReason`]s on the owning task's [`AccountReport`], so a
//! finished scan can be audited for completeness.

use crate::backend::{AccountBackend, AccountDirectory};
use crate::error::{ScanError, SkipReason};
use crate::reconcile::{Classification, LiveInventory, reconcile};
use crate::resource_kind::Catalog;
use crate::state::{ParseStats, parse_state};
use crate::types::{AccountHandle, RegionId};
use anyhow::Context;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Scan scope and scheduling options
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Regions to enumerate in every account
    pub regions: Vec<RegionId>,
    /// Resource kinds to parse and enumerate
    pub catalog: Catalog,
    /// Cap on concurrently scanned accounts (unbounded when `None`)
    pub max_concurrent_accounts: Option<usize>,
    /// Cancel all remaining work on the first skipped unit
    pub fail_fast: bool,
}

impl AggregatorConfig {
    pub fn new(regions: Vec<RegionId>, catalog: Catalog) -> Self {
        Self {
            regions,
            catalog,
            max_concurrent_accounts: None,
            fail_fast: false,
        }
    }
}

/// The process-wide classification, mutated only through [`GlobalResult::fold`].
#[derive(Debug, Default)]
pub struct GlobalResult {
    inner: Mutex<Classification>,
}

impl GlobalResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one partial classification under the lock.
    ///
    /// The whole merge happens inside one critical section, so concurrent
    /// folds never expose an id in both sets and never lose a managed
    /// discovery to a stale unmanaged one.
    pub async fn fold(&self, partial: &Classification) {
        let mut global = self.inner.lock().await;
        global.merge(partial);
        debug_assert!(global.is_disjoint());
    }

    /// Copy of the current state.
    pub async fn snapshot(&self) -> Classification {
        self.inner.lock().await.clone()
    }

    pub fn into_inner(self) -> Classification {
        self.inner.into_inner()
    }
}

/// What one account task did.
#[derive(Debug, Clone)]
pub struct AccountReport {
    pub account: AccountHandle,
    /// State documents fetched and parsed successfully
    pub documents_scanned: usize,
    /// Regions enumerated successfully
    pub regions_enumerated: usize,
    pub parse_stats: ParseStats,
    pub skips: Vec<SkipReason>,
    pub cancelled: bool,
}

impl AccountReport {
    fn new(account: AccountHandle) -> Self {
        Self {
            account,
            documents_scanned: 0,
            regions_enumerated: 0,
            parse_stats: ParseStats::default(),
            skips: Vec::new(),
            cancelled: false,
        }
    }
}

/// Final result of a scan.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub classification: Classification,
    /// Per-account reports, sorted by account
    pub accounts: Vec<AccountReport>,
}

impl ScanOutcome {
    /// Every skipped unit of work, across accounts.
    pub fn skips(&self) -> impl Iterator<Item = &SkipReason> {
        self.accounts.iter().flat_map(|a| a.skips.iter())
    }

    /// True when nothing was skipped or cancelled.
    pub fn is_complete(&self) -> bool {
        self.skips().next().is_none()
    }

    /// Parser statistics summed over every scanned document.
    pub fn parse_stats(&self) -> ParseStats {
        let mut total = ParseStats::default();
        for account in &self.accounts {
            total.absorb(&account.parse_stats);
        }
        total
    }

    pub fn documents_scanned(&self) -> usize {
        self.accounts.iter().map(|a| a.documents_scanned).sum()
    }
}

/// Drives a scan over every account from a directory.
pub struct Aggregator<D, B> {
    directory: D,
    backend: Arc<B>,
    config: Arc<AggregatorConfig>,
    cancel: CancellationToken,
}

impl<D, B> Aggregator<D, B>
where
    D: AccountDirectory,
    B: AccountBackend,
{
    pub fn new(directory: D, backend: B, config: AggregatorConfig) -> Self {
        Self {
            directory,
            backend: Arc::new(backend),
            config: Arc::new(config),
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation token (e.g. wired to Ctrl-C).
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Scan every account and return the merged classification.
    ///
    /// Fails only when the account directory cannot be listed.
    pub async fn run(&self) -> Result<ScanOutcome, ScanError> {
        let accounts = self
            .directory
            .list_accounts()
            .await
            .map_err(ScanError::AccountDirectory)?;

        info!(
            accounts = accounts.len(),
            regions = ?self.config.regions,
            max_concurrent = ?self.config.max_concurrent_accounts,
            "Starting drift scan"
        );

        let global = Arc::new(GlobalResult::new());
        let limiter = self
            .config
            .max_concurrent_accounts
            .map(|n| Arc::new(Semaphore::new(n.max(1))));

        let mut tasks = JoinSet::new();
        let mut owners: HashMap<tokio::task::Id, AccountHandle> = HashMap::new();

        for account in accounts {
            let task = AccountTask {
                account: account.clone(),
                backend: Arc::clone(&self.backend),
                config: Arc::clone(&self.config),
                global: Arc::clone(&global),
                cancel: self.cancel.clone(),
            };
            let limiter = limiter.clone();

            let handle = tasks.spawn(async move {
                let _permit = match limiter {
                    Some(semaphore) => match task.guard(semaphore.acquire_owned()).await {
                        Some(permit) => permit.ok(),
                        None => {
                            let report = AccountReport::new(task.account.clone());
                            return task.cancelled(report);
                        }
                    },
                    None => None,
                };
                task.run().await
            });
            owners.insert(handle.id(), account);
        }

        let mut reports = Vec::with_capacity(owners.len());
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, report)) => reports.push(report),
                Err(e) => {
                    if self.config.fail_fast && !self.cancel.is_cancelled() {
                        warn!("Fail-fast enabled, cancelling remaining work");
                        self.cancel.cancel();
                    }
                    let Some(account) = owners.remove(&e.id()) else {
                        warn!(error = %e, "Account task failed");
                        continue;
                    };
                    warn!(account = %account, error = %e, "Account task failed");
                    let mut report = AccountReport::new(account.clone());
                    report.skips.push(SkipReason::account(
                        &account,
                        &anyhow::anyhow!("account task failed: {e}"),
                    ));
                    reports.push(report);
                }
            }
        }
        reports.sort_by(|a, b| a.account.cmp(&b.account));

        let classification = match Arc::try_unwrap(global) {
            Ok(global) => global.into_inner(),
            Err(shared) => shared.snapshot().await,
        };

        let outcome = ScanOutcome {
            classification,
            accounts: reports,
        };

        if outcome.is_complete() {
            info!(
                managed = outcome.classification.managed_count(),
                unmanaged = outcome.classification.unmanaged_count(),
                documents = outcome.documents_scanned(),
                "Drift scan complete"
            );
        } else {
            warn!(
                managed = outcome.classification.managed_count(),
                unmanaged = outcome.classification.unmanaged_count(),
                documents = outcome.documents_scanned(),
                skipped = outcome.skips().count(),
                "Drift scan finished with skipped work; results may be partial"
            );
        }

        Ok(outcome)
    }
}

/// Everything one account task needs, owned so it can move onto the runtime.
struct AccountTask<B> {
    account: AccountHandle,
    backend: Arc<B>,
    config: Arc<AggregatorConfig>,
    global: Arc<GlobalResult>,
    cancel: CancellationToken,
}

impl<B: AccountBackend> AccountTask<B> {
    async fn run(self) -> AccountReport {
        let mut report = AccountReport::new(self.account.clone());
        let account = &self.account;

        let credential = match self.guard(self.backend.assume_role(account)).await {
            None => return self.cancelled(report),
            Some(Err(e)) => {
                let e = e.context("role assumption failed");
                self.skip(&mut report, SkipReason::account(account, &e));
                return report;
            }
            Some(Ok(credential)) => credential,
        };

        let listing = match self
            .guard(self.backend.list_state_documents(&credential))
            .await
        {
            None => return self.cancelled(report),
            Some(Err(e)) => {
                let e = e.context("state document listing failed");
                self.skip(&mut report, SkipReason::account(account, &e));
                return report;
            }
            Some(Ok(listing)) => listing,
        };
        for (bucket, e) in &listing.skipped_buckets {
            self.skip(&mut report, SkipReason::bucket(account, bucket, e));
        }
        let locations = listing.documents;
        debug!(account = %account, documents = locations.len(), "Found state documents");

        // Enumerated at most once per region; `None` marks a region that failed.
        let mut inventories: HashMap<RegionId, Option<LiveInventory>> = HashMap::new();

        for location in &locations {
            let document = match self
                .guard(self.backend.fetch_document(&credential, location))
                .await
            {
                None => return self.cancelled(report),
                Some(Err(e)) => {
                    let e = e.context("fetch failed");
                    self.skip(&mut report, SkipReason::document(account, location, &e));
                    continue;
                }
                Some(Ok(document)) => document,
            };

            let parsed = match parse_state(&document, &self.config.catalog)
                .context("parse failed")
            {
                Ok(parsed) => parsed,
                Err(e) => {
                    self.skip(&mut report, SkipReason::document(account, location, &e));
                    continue;
                }
            };
            report.documents_scanned += 1;
            report.parse_stats.absorb(&parsed.stats);
            debug!(
                account = %account,
                location = %location,
                declared = parsed.managed.len(),
                "Parsed state document"
            );

            self.global
                .fold(&Classification::seeded(&parsed.managed))
                .await;

            for region in &self.config.regions {
                if !inventories.contains_key(region) {
                    let enumerated = match self
                        .guard(
                            self.backend
                                .enumerate(&credential, region, &self.config.catalog),
                        )
                        .await
                    {
                        None => return self.cancelled(report),
                        Some(Ok(live)) => {
                            debug!(
                                account = %account,
                                region = %region,
                                live = live.len(),
                                "Enumerated region"
                            );
                            report.regions_enumerated += 1;
                            Some(live)
                        }
                        Some(Err(e)) => {
                            let e = e.context("enumeration failed");
                            self.skip(&mut report, SkipReason::region(account, region, &e));
                            None
                        }
                    };
                    inventories.insert(region.clone(), enumerated);
                }

                let Some(Some(live)) = inventories.get(region) else {
                    continue;
                };
                self.global.fold(&reconcile(&parsed.managed, live)).await;
            }
        }

        report
    }

    /// Run a remote call unless the scan is cancelled first.
    async fn guard<F: Future>(&self, fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            out = fut => Some(out),
        }
    }

    fn skip(&self, report: &mut AccountReport, reason: SkipReason) {
        match &reason {
            SkipReason::Account { account, error } => {
                warn!(account = %account, error = %error, "Skipping account");
            }
            SkipReason::Bucket {
                account,
                bucket,
                error,
            } => {
                warn!(
                    account = %account,
                    bucket = %bucket,
                    error = %error,
                    "Skipping state bucket"
                );
            }
            SkipReason::Document {
                account,
                location,
                error,
            } => {
                warn!(
                    account = %account,
                    location = %location,
                    error = %error,
                    "Skipping state document"
                );
            }
            SkipReason::Region {
                account,
                region,
                error,
            } => {
                warn!(account = %account, region = %region, error = %error, "Skipping region");
            }
            SkipReason::Cancelled { account } => {
                info!(account = %account, "Account scan cancelled");
            }
        }
        report.skips.push(reason);

        if self.config.fail_fast && !self.cancel.is_cancelled() {
            warn!(account = %self.account, "Fail-fast enabled, cancelling remaining work");
            self.cancel.cancel();
        }
    }

    fn cancelled(&self, mut report: AccountReport) -> AccountReport {
        info!(account = %self.account, "Account scan cancelled");
        report.cancelled = true;
        report.skips.push(SkipReason::Cancelled {
            account: self.account.clone(),
        });
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource_kind::ResourceKind;
    use crate::types::ResourceId;

    fn classification(managed: &[&str], unmanaged: &[&str]) -> Classification {
        let mut c = Classification::default();
        for id in managed {
            c.mark_managed(ResourceKind::Ec2Instance, ResourceId::from(*id));
        }
        for id in unmanaged {
            c.mark_unmanaged(ResourceKind::Ec2Instance, ResourceId::from(*id));
        }
        c
    }

    #[tokio::test]
    async fn test_fold_is_order_independent() {
        let partials = [
            classification(&["i-1"], &["i-2", "i-3"]),
            classification(&[], &["i-1", "i-4"]),
            classification(&["i-3"], &[]),
        ];
        let orders: [[usize; 3]; 6] = [
            [0, 1, 2],
            [0, 2, 1],
            [1, 0, 2],
            [1, 2, 0],
            [2, 0, 1],
            [2, 1, 0],
        ];

        let mut results = Vec::new();
        for order in orders {
            let global = GlobalResult::new();
            for i in order {
                global.fold(&partials[i]).await;
            }
            results.push(global.into_inner());
        }

        let expected = classification(&["i-1", "i-3"], &["i-2", "i-4"]);
        for result in results {
            assert_eq!(result, expected);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_folds_keep_managed() {
        let global = Arc::new(GlobalResult::new());
        let mut tasks = JoinSet::new();

        for n in 0..64 {
            let global = Arc::clone(&global);
            tasks.spawn(async move {
                let partial = if n % 2 == 0 {
                    classification(&["i-shared"], &[])
                } else {
                    classification(&[], &["i-shared", "i-stray"])
                };
                global.fold(&partial).await;
                let seen = global.snapshot().await;
                assert!(seen.is_disjoint());
            });
        }
        while let Some(joined) = tasks.join_next().await {
            joined.unwrap();
        }

        let result = global.snapshot().await;
        assert!(result.is_managed(ResourceKind::Ec2Instance, &"i-shared".into()));
        assert!(result.is_unmanaged(ResourceKind::Ec2Instance, &"i-stray".into()));
        assert!(!result.is_unmanaged(ResourceKind::Ec2Instance, &"i-shared".into()));
    }
}
