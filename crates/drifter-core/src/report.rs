//! Drift report document
//!
//! The JSON shape is stable and consumed by other tools:
//!
//! ```json
//! {
//!   "Managed by IaC": { "aws_instance": ["i-1"] },
//!   "Not managed": { "aws_instance": ["i-2"] },
//!   "total resources managed": 1,
//!   "unmanaged resources": 1
//! }
//! ```
//!
//! A `"diagnostics"` object is appended only when a scan skipped work or the
//! parser left entries out.

use crate::aggregate::ScanOutcome;
use crate::error::SkipReason;
use crate::reconcile::Classification;
use crate::resource_kind::ResourceKind;
use crate::state::ParseStats;
use crate::types::ResourceId;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Identifier lists keyed by Terraform type name
pub type KindListing = BTreeMap<ResourceKind, Vec<ResourceId>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriftReport {
    #[serde(rename = "Managed by IaC")]
    pub managed: KindListing,
    #[serde(rename = "Not managed")]
    pub unmanaged: KindListing,
    #[serde(rename = "total resources managed")]
    pub total_managed: usize,
    #[serde(rename = "unmanaged resources")]
    pub total_unmanaged: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<Diagnostics>,
}

/// Everything a scan could not account for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkipReason>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub unsupported_types: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub unresolvable_instances: BTreeMap<ResourceKind, usize>,
}

impl Diagnostics {
    pub fn new(skipped: Vec<SkipReason>, stats: ParseStats) -> Self {
        Self {
            skipped,
            unsupported_types: stats.unsupported_types,
            unresolvable_instances: stats.unresolvable_instances,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.skipped.is_empty()
            && self.unsupported_types.is_empty()
            && self.unresolvable_instances.is_empty()
    }
}

fn listing(sets: &BTreeMap<ResourceKind, BTreeSet<ResourceId>>) -> KindListing {
    sets.iter()
        .filter(|(_, ids)| !ids.is_empty())
        .map(|(kind, ids)| (*kind, ids.iter().cloned().collect()))
        .collect()
}

impl DriftReport {
    pub fn from_classification(classification: &Classification) -> Self {
        let managed = listing(classification.managed());
        let unmanaged = listing(classification.unmanaged());
        Self {
            total_managed: managed.values().map(Vec::len).sum(),
            total_unmanaged: unmanaged.values().map(Vec::len).sum(),
            managed,
            unmanaged,
            diagnostics: None,
        }
    }

    /// Attach diagnostics; empty diagnostics are dropped.
    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = (!diagnostics.is_empty()).then_some(diagnostics);
        self
    }

    /// Report for a finished scan, diagnostics included.
    pub fn from_outcome(outcome: &ScanOutcome) -> Self {
        let skipped = outcome.skips().cloned().collect();
        Self::from_classification(&outcome.classification)
            .with_diagnostics(Diagnostics::new(skipped, outcome.parse_stats()))
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AccountHandle;
    use serde_json::json;

    fn sample() -> Classification {
        let mut c = Classification::default();
        c.mark_managed(ResourceKind::Ec2Instance, "i-1".into());
        c.mark_managed(ResourceKind::DbInstance, "db-1".into());
        c.mark_unmanaged(ResourceKind::Ec2Instance, "i-3".into());
        c.mark_unmanaged(ResourceKind::Ec2Instance, "i-2".into());
        c.mark_unmanaged(ResourceKind::DbInstance, "db-2".into());
        c
    }

    #[test]
    fn test_report_shape() {
        let report = DriftReport::from_classification(&sample());
        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(
            value,
            json!({
                "Managed by IaC": {"aws_instance": ["i-1"], "aws_db_instance": ["db-1"]},
                "Not managed": {"aws_instance": ["i-2", "i-3"], "aws_db_instance": ["db-2"]},
                "total resources managed": 2,
                "unmanaged resources": 3
            })
        );
    }

    #[test]
    fn test_empty_classification() {
        let value = serde_json::to_value(DriftReport::from_classification(
            &Classification::default(),
        ))
        .unwrap();
        assert_eq!(
            value,
            json!({
                "Managed by IaC": {},
                "Not managed": {},
                "total resources managed": 0,
                "unmanaged resources": 0
            })
        );
    }

    #[test]
    fn test_empty_diagnostics_are_omitted() {
        let report = DriftReport::from_classification(&sample())
            .with_diagnostics(Diagnostics::default());
        let value = serde_json::to_value(&report).unwrap();
        assert!(value.get("diagnostics").is_none());
        assert_eq!(value.as_object().unwrap().len(), 4);
    }

    #[test]
    fn test_diagnostics_are_attached() {
        let mut stats = ParseStats::default();
        stats.unsupported_types.insert("aws_vpc".to_string(), 3);
        let skipped = vec![SkipReason::Cancelled {
            account: AccountHandle::new("111111111111"),
        }];

        let report = DriftReport::from_classification(&sample())
            .with_diagnostics(Diagnostics::new(skipped, stats));
        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(value["diagnostics"]["unsupported_types"]["aws_vpc"], 3);
        assert_eq!(value["diagnostics"]["skipped"][0]["level"], "cancelled");
        assert!(value["diagnostics"].get("unresolvable_instances").is_none());
    }
}
