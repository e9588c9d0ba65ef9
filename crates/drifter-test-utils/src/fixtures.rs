//! Terraform state document builders

use drifter_core::ResourceKind;
use serde_json::{Value, json};

/// Builds `.tfstate` documents in the v4 layout.
///
/// ```
/// use drifter_core::ResourceKind;
/// use drifter_test_utils::StateDocBuilder;
///
/// let doc = StateDocBuilder::new()
///     .resource(ResourceKind::Ec2Instance, &["i-1", "i-2"])
///     .build();
/// assert!(!doc.is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct StateDocBuilder {
    resources: Vec<Value>,
}

impl StateDocBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// One resource block whose instances carry the given `id`s.
    pub fn resource(self, kind: ResourceKind, ids: &[&str]) -> Self {
        let attributes = ids.iter().map(|id| json!({ "id": id })).collect();
        self.raw(kind.terraform_type(), attributes)
    }

    /// An RDS instance carrying both `identifier` and the provider's `id`.
    pub fn db_instance(self, identifier: &str, id: &str) -> Self {
        self.raw(
            ResourceKind::DbInstance.terraform_type(),
            vec![json!({ "identifier": identifier, "id": id })],
        )
    }

    /// A resource block of any type with explicit instance attributes.
    pub fn raw(mut self, resource_type: &str, attributes: Vec<Value>) -> Self {
        let name = format!("r{}", self.resources.len());
        let instances: Vec<Value> = attributes
            .into_iter()
            .map(|attributes| json!({ "schema_version": 0, "attributes": attributes }))
            .collect();
        self.resources.push(json!({
            "mode": "managed",
            "type": resource_type,
            "name": name,
            "provider": "provider[\"registry.terraform.io/hashicorp/aws\"]",
            "instances": instances,
        }));
        self
    }

    pub fn to_value(&self) -> Value {
        json!({
            "version": 4,
            "terraform_version": "1.6.0",
            "serial": 1,
            "lineage": "00000000-0000-0000-0000-000000000000",
            "outputs": {},
            "resources": self.resources,
        })
    }

    pub fn build(&self) -> Vec<u8> {
        self.to_value().to_string().into_bytes()
    }
}
