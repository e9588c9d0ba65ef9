//! drifter-core - Drift detection engine
//!
//! Decides which live cloud resources are declared by Terraform state and
//! which are not, across many accounts and regions. This crate has no AWS
//! SDK dependencies; cloud access goes through the traits in [`backend`].
//!
//! ## Modules
//!
//! - [`resource_kind`]: Supported resource types and the scan catalog
//! - [`types`]: Identifier newtypes (resources, accounts, regions, documents)
//! - [`state`]: Terraform state parsing into declared identifier sets
//! - [`reconcile`]: Managed/unmanaged classification for one region
//! - [`aggregate`]: Concurrent multi-account scan and global fold
//! - [`report`]: The JSON drift report
//! - [`backend`]: Collaborator traits implemented by cloud layers
//! - [`error`]: Fatal errors and skip reasons
//! - [`defaults`]: Default configuration values

pub mod aggregate;
pub mod backend;
pub mod defaults;
pub mod error;
pub mod reconcile;
pub mod report;
pub mod resource_kind;
pub mod state;
pub mod types;

// Re-export commonly used types
pub use aggregate::{AccountReport, Aggregator, AggregatorConfig, GlobalResult, ScanOutcome};
pub use backend::{AccountBackend, AccountDirectory, DocumentListing, StaticDirectory};
pub use error::{ScanError, SkipReason};
pub use reconcile::{Classification, LiveInventory, OwnershipLink, reconcile};
pub use report::{Diagnostics, DriftReport};
pub use resource_kind::{Catalog, CatalogError, ResourceKind};
pub use state::{ManagedSet, ParseError, ParseStats, ParsedState, parse_state};
pub use types::{AccountHandle, DocumentLocation, RegionId, ResourceId};
