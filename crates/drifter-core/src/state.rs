//! Terraform state parsing
//!
//! Turns a raw `.tfstate` document into the set of identifiers it declares,
//! per resource kind. Only the parts of the state format needed for drift
//! detection are decoded: `resources[].type` and
//! `resources[].instances[].attributes`.
//!
//! Parsing is tolerant. Entries of types outside the catalog and instances
//! without a resolvable identifier are skipped, but counted in
//! [`ParseStats`] so callers can see what was left out.

use crate::resource_kind::{Catalog, ResourceKind};
use crate::types::ResourceId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// State document parsing errors
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("state document is not valid Terraform state JSON")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct StateDocument {
    #[serde(default)]
    resources: Vec<StateResource>,
}

#[derive(Debug, Deserialize)]
struct StateResource {
    #[serde(rename = "type")]
    resource_type: String,
    #[serde(default)]
    instances: Vec<StateInstance>,
}

#[derive(Debug, Deserialize)]
struct StateInstance {
    #[serde(default)]
    attributes: serde_json::Map<String, serde_json::Value>,
}

/// Identifiers declared by one state document, per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagedSet {
    ids: BTreeMap<ResourceKind, BTreeSet<ResourceId>>,
}

impl ManagedSet {
    pub fn insert(&mut self, kind: ResourceKind, id: ResourceId) {
        self.ids.entry(kind).or_default().insert(id);
    }

    pub fn contains(&self, kind: ResourceKind, id: &ResourceId) -> bool {
        self.ids.get(&kind).is_some_and(|ids| ids.contains(id))
    }

    /// Declared identifiers of one kind.
    pub fn ids(&self, kind: ResourceKind) -> impl Iterator<Item = &ResourceId> {
        self.ids.get(&kind).into_iter().flatten()
    }

    /// All `(kind, id)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (ResourceKind, &ResourceId)> {
        self.ids
            .iter()
            .flat_map(|(kind, ids)| ids.iter().map(move |id| (*kind, id)))
    }

    pub fn len(&self) -> usize {
        self.ids.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<(ResourceKind, ResourceId)> for ManagedSet {
    fn from_iter<T: IntoIterator<Item = (ResourceKind, ResourceId)>>(iter: T) -> Self {
        let mut set = ManagedSet::default();
        for (kind, id) in iter {
            set.insert(kind, id);
        }
        set
    }
}

/// What the parser skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParseStats {
    /// Resource entries whose type is unsupported or outside the catalog, by raw type name
    pub unsupported_types: BTreeMap<String, usize>,
    /// Instances with no resolvable identifier, by kind
    pub unresolvable_instances: BTreeMap<ResourceKind, usize>,
}

impl ParseStats {
    /// Add another document's counts into this one.
    pub fn absorb(&mut self, other: &ParseStats) {
        for (name, count) in &other.unsupported_types {
            *self.unsupported_types.entry(name.clone()).or_default() += count;
        }
        for (kind, count) in &other.unresolvable_instances {
            *self.unresolvable_instances.entry(*kind).or_default() += count;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.unsupported_types.is_empty() && self.unresolvable_instances.is_empty()
    }
}

/// Result of parsing one state document.
#[derive(Debug, Clone, Default)]
pub struct ParsedState {
    pub managed: ManagedSet,
    pub stats: ParseStats,
}

/// Outcome of resolving an instance identifier.
#[derive(Debug, PartialEq, Eq)]
enum Resolution {
    Resolved(ResourceId),
    Unresolvable,
}

/// Resolve an instance's identifier through the kind's fallback field list.
///
/// A field resolves only when it holds a non-empty string.
fn resolve_identifier(
    kind: ResourceKind,
    attributes: &serde_json::Map<String, serde_json::Value>,
) -> Resolution {
    kind.identifier_fields()
        .iter()
        .find_map(|field| match attributes.get(*field) {
            Some(serde_json::Value::String(s)) if !s.is_empty() => {
                Some(Resolution::Resolved(ResourceId::new(s.as_str())))
            }
            _ => None,
        })
        .unwrap_or(Resolution::Unresolvable)
}

/// Parse a Terraform state document into its declared identifiers.
pub fn parse_state(document: &[u8], catalog: &Catalog) -> Result<ParsedState, ParseError> {
    let state: StateDocument = serde_json::from_slice(document)?;
    let mut parsed = ParsedState::default();

    for resource in state.resources {
        let kind = match ResourceKind::from_terraform_type(&resource.resource_type) {
            Some(kind) if catalog.contains(kind) => kind,
            _ => {
                *parsed
                    .stats
                    .unsupported_types
                    .entry(resource.resource_type)
                    .or_default() += 1;
                continue;
            }
        };

        for instance in &resource.instances {
            match resolve_identifier(kind, &instance.attributes) {
                Resolution::Resolved(id) => parsed.managed.insert(kind, id),
                Resolution::Unresolvable => {
                    *parsed.stats.unresolvable_instances.entry(kind).or_default() += 1;
                }
            }
        }
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(doc: serde_json::Value) -> ParsedState {
        parse_state(doc.to_string().as_bytes(), &Catalog::default()).unwrap()
    }

    #[test]
    fn test_db_instance_identifier_fallback_chain() {
        let parsed = parse(json!({
            "resources": [{
                "type": "aws_db_instance",
                "instances": [
                    {"attributes": {"identifier": "db-1", "id": "db-ABCDEF"}},
                    {"attributes": {"id": "db-2"}},
                    {"attributes": {"identifier": "", "id": "db-3"}},
                    {"attributes": {"identifier": 42}}
                ]
            }]
        }));

        let ids: Vec<&str> = parsed
            .managed
            .ids(ResourceKind::DbInstance)
            .map(ResourceId::as_str)
            .collect();
        assert_eq!(ids, vec!["db-1", "db-2", "db-3"]);
        assert_eq!(
            parsed.stats.unresolvable_instances.get(&ResourceKind::DbInstance),
            Some(&1)
        );
    }

    #[test]
    fn test_non_db_kinds_use_id_only() {
        let parsed = parse(json!({
            "resources": [{
                "type": "aws_instance",
                "instances": [
                    {"attributes": {"id": "i-1"}},
                    {"attributes": {"identifier": "i-2"}}
                ]
            }]
        }));

        assert!(parsed.managed.contains(ResourceKind::Ec2Instance, &"i-1".into()));
        assert!(!parsed.managed.contains(ResourceKind::Ec2Instance, &"i-2".into()));
        assert_eq!(parsed.managed.len(), 1);
    }

    #[test]
    fn test_unsupported_types_are_counted_not_rejected() {
        let parsed = parse(json!({
            "resources": [
                {"type": "aws_s3_bucket", "instances": [{"attributes": {"id": "b"}}]},
                {"type": "aws_s3_bucket", "instances": []},
                {"type": "aws_lambda_function", "instances": [{"attributes": {"id": "fn"}}]}
            ]
        }));

        assert_eq!(parsed.stats.unsupported_types.get("aws_s3_bucket"), Some(&2));
        assert!(
            parsed
                .managed
                .contains(ResourceKind::LambdaFunction, &"fn".into())
        );
    }

    #[test]
    fn test_kinds_outside_catalog_are_ignored() {
        let catalog: Catalog = "aws_instance".parse().unwrap();
        let doc = json!({
            "resources": [
                {"type": "aws_instance", "instances": [{"attributes": {"id": "i-1"}}]},
                {"type": "aws_lambda_function", "instances": [{"attributes": {"id": "fn"}}]}
            ]
        });
        let parsed = parse_state(doc.to_string().as_bytes(), &catalog).unwrap();

        assert_eq!(parsed.managed.len(), 1);
        assert_eq!(
            parsed.stats.unsupported_types.get("aws_lambda_function"),
            Some(&1)
        );
    }

    #[test]
    fn test_missing_sections_are_empty() {
        assert!(parse(json!({"version": 4})).managed.is_empty());
        assert!(
            parse(json!({"resources": [{"type": "aws_instance"}]}))
                .managed
                .is_empty()
        );
        let parsed = parse(json!({"resources": [{"type": "aws_instance", "instances": [{}]}]}));
        assert_eq!(
            parsed.stats.unresolvable_instances.get(&ResourceKind::Ec2Instance),
            Some(&1)
        );
    }

    #[test]
    fn test_malformed_documents_fail() {
        let catalog = Catalog::default();
        assert!(parse_state(b"not json", &catalog).is_err());
        assert!(parse_state(br#"{"resources": "nope"}"#, &catalog).is_err());
        assert!(parse_state(br#"{"resources": [{"instances": []}]}"#, &catalog).is_err());
    }

    #[test]
    fn test_duplicate_declarations_collapse() {
        let parsed = parse(json!({
            "resources": [
                {"type": "aws_instance", "instances": [{"attributes": {"id": "i-1"}}]},
                {"type": "aws_instance", "instances": [{"attributes": {"id": "i-1"}}]}
            ]
        }));
        assert_eq!(parsed.managed.len(), 1);
    }

    #[test]
    fn test_stats_absorb() {
        let mut total = ParseStats::default();
        let mut one = ParseStats::default();
        one.unsupported_types.insert("aws_vpc".to_string(), 2);
        one.unresolvable_instances.insert(ResourceKind::Ec2Instance, 1);
        total.absorb(&one);
        total.absorb(&one);
        assert_eq!(total.unsupported_types["aws_vpc"], 4);
        assert_eq!(total.unresolvable_instances[&ResourceKind::Ec2Instance], 2);
    }
}
