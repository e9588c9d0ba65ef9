//! Shared test utilities for drifter
//!
//! ## Modules
//!
//! - [`fake`]: In-memory account directory and backend
//! - [`fixtures`]: Terraform state document builders
//! - [`aws`]: Region detection for live AWS tests

pub mod aws;
pub mod fake;
pub mod fixtures;

// Re-export commonly used items
pub use aws::get_test_region;
pub use fake::{CallStats, FakeCloud};
pub use fixtures::StateDocBuilder;
