//! Default configuration values shared between the engine and the CLI

use crate::types::AccountHandle;

/// Role assumed in every member account
pub const DEFAULT_ROLE_NAME: &str = "OrganizationAccountAccessRole";

/// Object key suffix identifying Terraform state documents
pub const DEFAULT_STATE_SUFFIX: &str = ".tfstate";

/// Region used for global API calls (Organizations, S3 bucket listing)
pub const DEFAULT_HOME_REGION: &str = "us-east-1";

/// Regions scanned when none are given
pub const DEFAULT_REGIONS: &[&str] = &["us-east-1", "us-west-2"];

/// Session name recorded on assumed-role credentials
pub const SESSION_NAME: &str = "drifter";

/// ARN of the scan role in an account.
pub fn role_arn(account: &AccountHandle, role_name: &str) -> String {
    format!("arn:aws:iam::{account}:role/{role_name}")
}
