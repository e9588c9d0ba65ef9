//! AWS error classification
//!
//! Maps SDK error codes to the few categories the scanner acts on: retry
//! throttled calls, treat vanished objects as skippable, and explain
//! permission failures.

use thiserror::Error;

/// AWS error categories for retry and skip logic
#[derive(Debug, Error)]
pub enum AwsError {
    /// Resource or object does not exist
    #[error("Resource not found: {message}")]
    NotFound { message: String },

    /// Caller lacks permission (missing role, trust policy or IAM action)
    #[error("Access denied: {message}")]
    AccessDenied { message: String },

    /// Rate limit exceeded (retryable with backoff)
    #[error("Rate limit exceeded")]
    Throttled,

    /// Generic AWS SDK error with code and message
    #[error("AWS error: {message}")]
    Sdk {
        code: Option<String>,
        message: String,
    },
}

impl AwsError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, AwsError::NotFound { .. })
    }

    pub fn is_access_denied(&self) -> bool {
        matches!(self, AwsError::AccessDenied { .. })
    }

    /// Check if this is a retryable error
    pub fn is_retryable(&self) -> bool {
        matches!(self, AwsError::Throttled)
    }

    /// Get a user-friendly suggestion for resolving this error, if available.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            AwsError::AccessDenied { .. } => Some(
                "Check that the scan role exists in the target account and trusts the caller, \
                 or pass --role-name.",
            ),
            AwsError::Sdk { code: Some(c), .. } => suggestion_for_code(c),
            _ => None,
        }
    }
}

/// Known AWS error codes for "not found" conditions
const NOT_FOUND_CODES: &[&str] = &[
    "NoSuchBucket",
    "NoSuchKey",
    "NotFound",
    "DBInstanceNotFound",
    "DBInstanceNotFoundFault",
    "ResourceNotFoundException",
    "AccountNotFoundException",
];

/// Known AWS error codes for permission failures
const ACCESS_DENIED_CODES: &[&str] = &[
    "AccessDenied",
    "AccessDeniedException",
    "AuthFailure",
    "AuthorizationError",
    "UnauthorizedOperation",
    "InvalidClientTokenId",
    "UnrecognizedClientException",
];

/// Known AWS error codes for throttling/rate limiting
const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "RequestLimitExceeded",
    "TooManyRequestsException",
    "RequestThrottled",
    "SlowDown",
];

/// Classify an AWS SDK error using the error code.
pub fn classify_aws_error(code: Option<&str>, message: Option<&str>) -> AwsError {
    let message = message.unwrap_or("Unknown error").to_string();

    match code {
        Some(c) if NOT_FOUND_CODES.contains(&c) => AwsError::NotFound { message },
        Some(c) if ACCESS_DENIED_CODES.contains(&c) => AwsError::AccessDenied { message },
        Some(c) if THROTTLING_CODES.contains(&c) => AwsError::Throttled,
        _ => AwsError::Sdk {
            code: code.map(|s| s.to_string()),
            message,
        },
    }
}

/// Downcast `$cause` to `SdkError<$op>` and classify it from its metadata.
macro_rules! classify_sdk_cause {
    ($cause:expr, $($sdk:ident :: $op:ident :: $err:ident),+ $(,)?) => {
        $(
            if let Some(e) = $cause
                .downcast_ref::<$sdk::error::SdkError<$sdk::operation::$op::$err>>()
            {
                use $sdk::error::ProvideErrorMetadata;
                return classify_aws_error(e.code(), e.message());
            }
        )+
    };
}

/// Classify an error from an anyhow::Error by extracting the AWS error code.
///
/// Walks the error chain looking for the SDK operation errors this crate
/// produces. Falls back to string matching on the Debug representation if
/// no typed error is found.
pub fn classify_anyhow_error(error: &anyhow::Error) -> AwsError {
    for cause in error.chain() {
        classify_sdk_cause!(
            cause,
            aws_sdk_ec2::describe_instances::DescribeInstancesError,
            aws_sdk_rds::describe_db_instances::DescribeDBInstancesError,
            aws_sdk_lambda::list_functions::ListFunctionsError,
            aws_sdk_autoscaling::describe_auto_scaling_groups::DescribeAutoScalingGroupsError,
            aws_sdk_organizations::list_accounts::ListAccountsError,
            aws_sdk_s3::list_buckets::ListBucketsError,
            aws_sdk_s3::get_bucket_location::GetBucketLocationError,
            aws_sdk_s3::list_objects_v2::ListObjectsV2Error,
            aws_sdk_s3::get_object::GetObjectError,
            aws_sdk_sts::get_caller_identity::GetCallerIdentityError,
        );
    }

    // Fallback: extract error code from debug string representation
    let debug_str = format!("{:?}", error);
    if let Some(code) = extract_error_code(&debug_str) {
        return classify_aws_error(Some(&code), Some(&error.to_string()));
    }

    AwsError::Sdk {
        code: None,
        message: error.to_string(),
    }
}

/// Extract an AWS error code from a debug string representation
fn extract_error_code(debug_str: &str) -> Option<String> {
    // An explicit `code: Some("...")` field is authoritative
    if let Some(start) = debug_str.find("code: Some(\"") {
        let rest = &debug_str[start + 12..];
        if let Some(end) = rest.find('"') {
            return Some(rest[..end].to_string());
        }
    }

    // Longest match first so "ThrottlingException" beats "Throttling"
    let mut known: Vec<&str> = NOT_FOUND_CODES
        .iter()
        .chain(ACCESS_DENIED_CODES)
        .chain(THROTTLING_CODES)
        .copied()
        .collect();
    known.sort_by_key(|code| std::cmp::Reverse(code.len()));
    known
        .into_iter()
        .find(|code| debug_str.contains(code))
        .map(str::to_string)
}

/// Error code to user-friendly suggestion mapping
const SUGGESTIONS: &[(&str, &str)] = &[
    (
        "AWSOrganizationsNotInUseException",
        "The caller's account is not in an organization. Pass --accounts explicitly.",
    ),
    (
        "ExpiredToken",
        "Credentials have expired. Refresh them (e.g. `aws sso login`) and retry.",
    ),
    (
        "ExpiredTokenException",
        "Credentials have expired. Refresh them (e.g. `aws sso login`) and retry.",
    ),
    (
        "OptInRequired",
        "The region is not enabled for this account. Remove it from --regions.",
    ),
];

/// Get a user-friendly suggestion for a known error code.
fn suggestion_for_code(code: &str) -> Option<&'static str> {
    SUGGESTIONS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, s)| *s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_codes() {
        for code in NOT_FOUND_CODES {
            let err = classify_aws_error(Some(code), Some("some message"));
            assert!(err.is_not_found(), "Expected NotFound for code: {code}");
        }
    }

    #[test]
    fn access_denied_codes() {
        for code in ACCESS_DENIED_CODES {
            let err = classify_aws_error(Some(code), Some("msg"));
            assert!(err.is_access_denied(), "Expected AccessDenied for code: {code}");
            assert!(err.suggestion().is_some());
        }
    }

    #[test]
    fn throttling_codes() {
        for code in THROTTLING_CODES {
            let err = classify_aws_error(Some(code), Some("msg"));
            assert!(err.is_retryable(), "Expected retryable for code: {code}");
            assert!(matches!(err, AwsError::Throttled));
        }
    }

    #[test]
    fn unknown_and_missing_codes() {
        let err = classify_aws_error(Some("SomeNewError"), Some("details"));
        assert!(matches!(err, AwsError::Sdk { .. }));
        assert!(!err.is_retryable());

        let err2 = classify_aws_error(None, Some("something failed"));
        assert!(matches!(err2, AwsError::Sdk { code: None, .. }));
    }

    #[test]
    fn extract_code_from_code_field() {
        let debug_str = r#"SdkError { code: Some("SomeRandomCode"), message: "fail" }"#;
        assert_eq!(
            extract_error_code(debug_str).as_deref(),
            Some("SomeRandomCode")
        );
    }

    #[test]
    fn extract_prefers_longest_known_code() {
        assert_eq!(
            extract_error_code("ServiceError(ThrottlingException)").as_deref(),
            Some("ThrottlingException")
        );
        assert_eq!(
            extract_error_code("ServiceError(AccessDeniedException)").as_deref(),
            Some("AccessDeniedException")
        );
    }

    #[test]
    fn extract_none_from_unrelated_string() {
        assert!(extract_error_code("connection refused").is_none());
    }

    #[test]
    fn classify_plain_anyhow_error() {
        let err = anyhow::anyhow!("service error: RequestLimitExceeded");
        assert!(classify_anyhow_error(&err).is_retryable());

        let err = anyhow::anyhow!("dispatch failure");
        assert!(matches!(
            classify_anyhow_error(&err),
            AwsError::Sdk { code: None, .. }
        ));
    }

    #[test]
    fn suggestions_for_known_codes() {
        for (code, _) in SUGGESTIONS {
            assert!(
                suggestion_for_code(code).is_some(),
                "No suggestion for code: {code}"
            );
        }
        assert!(suggestion_for_code("SomeUnknownCode").is_none());
    }
}
