//! drifter - Organization-wide drift detection for Terraform on AWS
//!
//! Wires the `drifter-core` engine to AWS: accounts come from AWS
//! Organizations, state documents from S3, and live resources from the
//! EC2, RDS, Lambda and Auto Scaling APIs.

pub mod aws;
pub mod config;
pub mod local;
pub mod output;
