//! Scan error taxonomy
//!
//! Only [`ScanError`] escapes a run. Everything below the account directory
//! is absorbed where it happens and recorded as a [`SkipReason`], so the
//! final result is a best-effort union of whatever could be scanned.

use crate::types::{AccountHandle, DocumentLocation, RegionId};
use serde::Serialize;
use thiserror::Error;

/// Fatal scan errors
#[derive(Debug, Error)]
pub enum ScanError {
    /// The organization account directory could not be listed
    #[error("failed to list accounts")]
    AccountDirectory(#[source] anyhow::Error),
}

/// A unit of work that was skipped, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "level", rename_all = "snake_case")]
pub enum SkipReason {
    /// Role assumption or account-wide listing failed; the account was skipped
    Account {
        account: AccountHandle,
        error: String,
    },
    /// A state bucket could not be located or listed; its documents were not scanned
    Bucket {
        account: AccountHandle,
        bucket: String,
        error: String,
    },
    /// One state document could not be fetched or parsed
    Document {
        account: AccountHandle,
        location: DocumentLocation,
        error: String,
    },
    /// Live enumeration failed for one region of one account
    Region {
        account: AccountHandle,
        region: RegionId,
        error: String,
    },
    /// The account's task was cancelled before it finished
    Cancelled { account: AccountHandle },
}

impl SkipReason {
    pub fn account(account: &AccountHandle, error: &anyhow::Error) -> Self {
        SkipReason::Account {
            account: account.clone(),
            error: render(error),
        }
    }

    pub fn bucket(account: &AccountHandle, bucket: &str, error: &anyhow::Error) -> Self {
        SkipReason::Bucket {
            account: account.clone(),
            bucket: bucket.to_string(),
            error: render(error),
        }
    }

    pub fn document(
        account: &AccountHandle,
        location: &DocumentLocation,
        error: &anyhow::Error,
    ) -> Self {
        SkipReason::Document {
            account: account.clone(),
            location: location.clone(),
            error: render(error),
        }
    }

    pub fn region(account: &AccountHandle, region: &RegionId, error: &anyhow::Error) -> Self {
        SkipReason::Region {
            account: account.clone(),
            region: region.clone(),
            error: render(error),
        }
    }

    pub fn account_handle(&self) -> &AccountHandle {
        match self {
            SkipReason::Account { account, .. }
            | SkipReason::Bucket { account, .. }
            | SkipReason::Document { account, .. }
            | SkipReason::Region { account, .. }
            | SkipReason::Cancelled { account } => account,
        }
    }
}

/// Render an error with its full cause chain on one line.
fn render(error: &anyhow::Error) -> String {
    format!("{error:#}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_error_chain_is_preserved() {
        let err = Err::<(), _>(anyhow::anyhow!("AccessDenied"))
            .context("assume role")
            .unwrap_err();
        let skip = SkipReason::account(&AccountHandle::new("111111111111"), &err);
        match skip {
            SkipReason::Account { error, .. } => assert_eq!(error, "assume role: AccessDenied"),
            other => panic!("unexpected skip: {other:?}"),
        }
    }

    #[test]
    fn test_skip_serializes_with_level_tag() {
        let skip = SkipReason::Cancelled {
            account: AccountHandle::new("222222222222"),
        };
        let json = serde_json::to_value(&skip).unwrap();
        assert_eq!(json["level"], "cancelled");
        assert_eq!(json["account"], "222222222222");
    }
}
