//! Managed/unmanaged classification
//!
//! [`reconcile`] classifies one region's live resources against the
//! identifiers declared by one state document. [`Classification`] is the
//! result type and also the unit that gets folded into the global result.
//!
//! Key invariants:
//! - For every kind, `managed ∩ unmanaged = ∅` after every mutation
//! - Managed is sticky: once an id is managed, nothing moves it back
//! - Merging is set union, so it is commutative and idempotent

use crate::resource_kind::ResourceKind;
use crate::state::ManagedSet;
use crate::types::ResourceId;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Parent/child relation between live resources (e.g. an Auto Scaling
/// group owning an EC2 instance).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OwnershipLink {
    pub owner_kind: ResourceKind,
    pub owner_id: ResourceId,
    pub member_kind: ResourceKind,
    pub member_id: ResourceId,
}

impl OwnershipLink {
    /// An EC2 instance launched by an Auto Scaling group.
    pub fn scaling_group_member(
        group: impl Into<ResourceId>,
        instance: impl Into<ResourceId>,
    ) -> Self {
        Self {
            owner_kind: ResourceKind::AutoScalingGroup,
            owner_id: group.into(),
            member_kind: ResourceKind::Ec2Instance,
            member_id: instance.into(),
        }
    }
}

/// Live resources found in one region.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveInventory {
    resources: BTreeMap<ResourceKind, BTreeSet<ResourceId>>,
    links: Vec<OwnershipLink>,
}

impl LiveInventory {
    /// Record a live resource. Duplicates collapse.
    pub fn insert(&mut self, kind: ResourceKind, id: impl Into<ResourceId>) {
        self.resources.entry(kind).or_default().insert(id.into());
    }

    /// Record an ownership link. The member is not implicitly recorded as live.
    pub fn link(&mut self, link: OwnershipLink) {
        self.links.push(link);
    }

    pub fn ids(&self, kind: ResourceKind) -> impl Iterator<Item = &ResourceId> {
        self.resources.get(&kind).into_iter().flatten()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ResourceKind, &ResourceId)> {
        self.resources
            .iter()
            .flat_map(|(kind, ids)| ids.iter().map(move |id| (*kind, id)))
    }

    pub fn links(&self) -> &[OwnershipLink] {
        &self.links
    }

    /// Number of live resources across all kinds.
    pub fn len(&self) -> usize {
        self.resources.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Disjoint managed/unmanaged identifier sets, per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    managed: BTreeMap<ResourceKind, BTreeSet<ResourceId>>,
    unmanaged: BTreeMap<ResourceKind, BTreeSet<ResourceId>>,
}

impl Classification {
    /// Classification holding every declared id as managed and nothing else.
    pub fn seeded(managed: &ManagedSet) -> Self {
        let mut out = Self::default();
        for (kind, id) in managed.iter() {
            out.mark_managed(kind, id.clone());
        }
        out
    }

    /// Mark an id managed, evicting it from the unmanaged set if present.
    pub fn mark_managed(&mut self, kind: ResourceKind, id: ResourceId) {
        if let Some(unmanaged) = self.unmanaged.get_mut(&kind) {
            unmanaged.remove(&id);
            if unmanaged.is_empty() {
                self.unmanaged.remove(&kind);
            }
        }
        self.managed.entry(kind).or_default().insert(id);
    }

    /// Mark an id unmanaged unless it is already managed.
    ///
    /// Returns `false` when the id was kept managed.
    pub fn mark_unmanaged(&mut self, kind: ResourceKind, id: ResourceId) -> bool {
        if self.is_managed(kind, &id) {
            return false;
        }
        self.unmanaged.entry(kind).or_default().insert(id);
        true
    }

    pub fn is_managed(&self, kind: ResourceKind, id: &ResourceId) -> bool {
        self.managed.get(&kind).is_some_and(|ids| ids.contains(id))
    }

    pub fn is_unmanaged(&self, kind: ResourceKind, id: &ResourceId) -> bool {
        self.unmanaged.get(&kind).is_some_and(|ids| ids.contains(id))
    }

    /// Fold another classification into this one.
    ///
    /// Managed ids are unioned first and evict matching unmanaged ids; the
    /// incoming unmanaged ids are then added only where not managed here.
    pub fn merge(&mut self, other: &Classification) {
        for (kind, ids) in &other.managed {
            for id in ids {
                self.mark_managed(*kind, id.clone());
            }
        }
        for (kind, ids) in &other.unmanaged {
            for id in ids {
                self.mark_unmanaged(*kind, id.clone());
            }
        }
    }

    pub fn managed(&self) -> &BTreeMap<ResourceKind, BTreeSet<ResourceId>> {
        &self.managed
    }

    pub fn unmanaged(&self) -> &BTreeMap<ResourceKind, BTreeSet<ResourceId>> {
        &self.unmanaged
    }

    pub fn managed_count(&self) -> usize {
        self.managed.values().map(BTreeSet::len).sum()
    }

    pub fn unmanaged_count(&self) -> usize {
        self.unmanaged.values().map(BTreeSet::len).sum()
    }

    /// True when no kind has an id in both sets.
    pub fn is_disjoint(&self) -> bool {
        self.unmanaged.iter().all(|(kind, unmanaged)| {
            self.managed
                .get(kind)
                .is_none_or(|managed| managed.is_disjoint(unmanaged))
        })
    }
}

/// Classify one region's live resources against one document's declarations.
pub fn reconcile(managed: &ManagedSet, live: &LiveInventory) -> Classification {
    let mut out = Classification::seeded(managed);

    let mut owners: HashMap<(ResourceKind, &ResourceId), Vec<(ResourceKind, &ResourceId)>> =
        HashMap::new();
    for link in live.links() {
        owners
            .entry((link.member_kind, &link.member_id))
            .or_default()
            .push((link.owner_kind, &link.owner_id));
    }

    for (kind, id) in live.iter() {
        if out.is_managed(kind, id) {
            continue;
        }

        let owned_by_managed = owners.get(&(kind, id)).is_some_and(|parents| {
            parents
                .iter()
                .any(|(owner_kind, owner_id)| managed.contains(*owner_kind, owner_id))
        });

        if owned_by_managed {
            out.mark_managed(kind, id.clone());
        } else {
            out.mark_unmanaged(kind, id.clone());
        }
    }

    debug_assert!(out.is_disjoint());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn managed(pairs: &[(ResourceKind, &str)]) -> ManagedSet {
        pairs.iter().map(|(k, id)| (*k, ResourceId::from(*id))).collect()
    }

    fn ids(set: Option<&BTreeSet<ResourceId>>) -> Vec<&str> {
        set.map(|s| s.iter().map(ResourceId::as_str).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_declared_and_live_split() {
        let declared = managed(&[
            (ResourceKind::DbInstance, "db-1"),
            (ResourceKind::Ec2Instance, "i-1"),
        ]);
        let mut live = LiveInventory::default();
        live.insert(ResourceKind::Ec2Instance, "i-1");
        live.insert(ResourceKind::Ec2Instance, "i-2");
        live.insert(ResourceKind::DbInstance, "db-1");
        live.insert(ResourceKind::DbInstance, "db-2");

        let result = reconcile(&declared, &live);

        assert_eq!(ids(result.managed().get(&ResourceKind::Ec2Instance)), vec!["i-1"]);
        assert_eq!(ids(result.managed().get(&ResourceKind::DbInstance)), vec!["db-1"]);
        assert_eq!(ids(result.unmanaged().get(&ResourceKind::Ec2Instance)), vec!["i-2"]);
        assert_eq!(ids(result.unmanaged().get(&ResourceKind::DbInstance)), vec!["db-2"]);
        assert_eq!(result.managed_count(), 2);
        assert_eq!(result.unmanaged_count(), 2);
    }

    #[test]
    fn test_scaling_group_membership_propagates() {
        let declared = managed(&[(ResourceKind::AutoScalingGroup, "asg-1")]);
        let mut live = LiveInventory::default();
        live.insert(ResourceKind::Ec2Instance, "i-9");
        live.link(OwnershipLink::scaling_group_member("asg-1", "i-9"));

        let result = reconcile(&declared, &live);

        assert!(result.is_managed(ResourceKind::Ec2Instance, &"i-9".into()));
        assert_eq!(result.unmanaged_count(), 0);
    }

    #[test]
    fn test_unmanaged_group_does_not_propagate() {
        let declared = managed(&[(ResourceKind::AutoScalingGroup, "asg-1")]);
        let mut live = LiveInventory::default();
        live.insert(ResourceKind::AutoScalingGroup, "asg-2");
        live.insert(ResourceKind::Ec2Instance, "i-7");
        live.insert(ResourceKind::Ec2Instance, "i-8");
        live.link(OwnershipLink::scaling_group_member("asg-2", "i-7"));

        let result = reconcile(&declared, &live);

        assert!(result.is_unmanaged(ResourceKind::Ec2Instance, &"i-7".into()));
        assert!(result.is_unmanaged(ResourceKind::Ec2Instance, &"i-8".into()));
        assert!(result.is_unmanaged(ResourceKind::AutoScalingGroup, &"asg-2".into()));
    }

    #[test]
    fn test_declared_but_not_live_stays_managed() {
        let declared = managed(&[(ResourceKind::LambdaFunction, "pending-fn")]);
        let result = reconcile(&declared, &LiveInventory::default());
        assert!(result.is_managed(ResourceKind::LambdaFunction, &"pending-fn".into()));
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let declared = managed(&[(ResourceKind::Ec2Instance, "i-1")]);
        let mut live = LiveInventory::default();
        live.insert(ResourceKind::Ec2Instance, "i-1");
        live.insert(ResourceKind::Ec2Instance, "i-2");
        live.insert(ResourceKind::Ec2Instance, "i-2");

        assert_eq!(reconcile(&declared, &live), reconcile(&declared, &live));
        assert_eq!(live.len(), 2);
    }

    #[test]
    fn test_mark_managed_evicts_unmanaged() {
        let mut c = Classification::default();
        assert!(c.mark_unmanaged(ResourceKind::Ec2Instance, "i-1".into()));
        c.mark_managed(ResourceKind::Ec2Instance, "i-1".into());
        assert!(c.is_managed(ResourceKind::Ec2Instance, &"i-1".into()));
        assert!(!c.is_unmanaged(ResourceKind::Ec2Instance, &"i-1".into()));
        assert!(c.unmanaged().is_empty());

        assert!(!c.mark_unmanaged(ResourceKind::Ec2Instance, "i-1".into()));
        assert!(c.is_disjoint());
    }

    #[test]
    fn test_merge_managed_wins_in_either_order() {
        let mut seen_managed = Classification::default();
        seen_managed.mark_managed(ResourceKind::Ec2Instance, "i-1".into());
        let mut seen_unmanaged = Classification::default();
        seen_unmanaged.mark_unmanaged(ResourceKind::Ec2Instance, "i-1".into());
        seen_unmanaged.mark_unmanaged(ResourceKind::Ec2Instance, "i-2".into());

        let mut a = seen_managed.clone();
        a.merge(&seen_unmanaged);
        let mut b = seen_unmanaged.clone();
        b.merge(&seen_managed);

        assert_eq!(a, b);
        assert!(a.is_managed(ResourceKind::Ec2Instance, &"i-1".into()));
        assert!(a.is_unmanaged(ResourceKind::Ec2Instance, &"i-2".into()));
        assert!(a.is_disjoint());

        let before = a.clone();
        a.merge(&seen_unmanaged);
        assert_eq!(a, before);
    }
}
