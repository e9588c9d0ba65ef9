//! AWS implementations of the engine's collaborators
//!
//! - context: SDK config loading, region re-targeting, role assumption
//! - account: caller identity and the Organizations account directory
//! - state_store: S3 discovery and retrieval of state documents
//! - inventory: EC2, RDS, Lambda and Auto Scaling enumeration
//! - backend: `AccountBackend` tying the above together per account

pub mod account;
pub mod backend;
pub mod context;
pub mod error;
pub mod inventory;
pub mod state_store;

pub use account::{OrganizationDirectory, get_current_account_id};
pub use backend::{AccountSession, AwsBackend};
pub use context::{AwsContext, FromAwsContext};
pub use error::{AwsError, classify_anyhow_error, classify_aws_error};
pub use inventory::Inventory;
pub use state_store::StateStore;
