//! Terraform state documents stored in S3

use super::context::{AwsContext, FromAwsContext};
use super::error::classify_anyhow_error;
use anyhow::{Context, Result};
use drifter_core::{DocumentListing, DocumentLocation};
use drifter_core::defaults::{DEFAULT_HOME_REGION, DEFAULT_STATE_SUFFIX};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Region a bucket lives in, from its `GetBucketLocation` constraint.
///
/// Buckets in us-east-1 report no constraint, and very old eu-west-1
/// buckets report the legacy `EU` value.
pub fn bucket_region(location_constraint: Option<&str>) -> &str {
    match location_constraint {
        None | Some("") => DEFAULT_HOME_REGION,
        Some("EU") => "eu-west-1",
        Some(region) => region,
    }
}

/// Continuation token for the next `ListObjectsV2` page, if there is one.
///
/// A truncated page without a token ends the listing rather than restarting it.
fn next_page_token(is_truncated: Option<bool>, token: Option<&str>) -> Option<String> {
    match (is_truncated, token) {
        (Some(true), Some(token)) => Some(token.to_string()),
        (Some(true), None) => {
            warn!("Truncated object listing without a continuation token");
            None
        }
        _ => None,
    }
}

/// Discovers and reads state documents in every bucket an account can see.
pub struct StateStore {
    ctx: AwsContext,
    suffix: String,
    bucket_regions: Mutex<HashMap<String, String>>,
}

impl FromAwsContext for StateStore {
    fn from_context(ctx: &AwsContext) -> Self {
        Self::new(ctx, DEFAULT_STATE_SUFFIX)
    }
}

impl StateStore {
    pub fn new(ctx: &AwsContext, suffix: &str) -> Self {
        Self {
            ctx: ctx.clone(),
            suffix: suffix.to_string(),
            bucket_regions: Mutex::new(HashMap::new()),
        }
    }

    /// List state documents across all buckets.
    ///
    /// A bucket whose location or contents cannot be read is returned in
    /// [`DocumentListing::skipped_buckets`]; only a failure to list buckets
    /// at all is an error.
    pub async fn list_documents(&self) -> Result<DocumentListing> {
        let buckets = self.list_buckets().await?;
        let mut listing = DocumentListing::default();

        for bucket in &buckets {
            match self.list_bucket_documents(bucket).await {
                Ok(found) => listing.documents.extend(found),
                Err(e) => {
                    debug!(
                        bucket = %bucket,
                        account = ?self.ctx.account(),
                        access_denied = classify_anyhow_error(&e).is_access_denied(),
                        "Bucket unreadable"
                    );
                    listing.skip_bucket(bucket.as_str(), e);
                }
            }
        }

        debug!(
            account = ?self.ctx.account(),
            buckets = buckets.len(),
            documents = listing.documents.len(),
            skipped = listing.skipped_buckets.len(),
            "Listed state documents"
        );
        Ok(listing)
    }

    /// Read one state document.
    pub async fn fetch(&self, location: &DocumentLocation) -> Result<Vec<u8>> {
        let region = self.region_of(&location.bucket).await?;
        let response = self
            .ctx
            .with_region(&region)
            .s3_client()
            .get_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
            .with_context(|| format!("Failed to get {location}"))?;

        let body = response
            .body
            .collect()
            .await
            .with_context(|| format!("Failed to read body of {location}"))?;

        Ok(body.into_bytes().to_vec())
    }

    async fn list_buckets(&self) -> Result<Vec<String>> {
        let client = self.ctx.s3_client();
        let mut buckets = Vec::new();
        let mut continuation_token = None;

        loop {
            let mut request = client.list_buckets();
            if let Some(token) = &continuation_token {
                request = request.continuation_token(token);
            }

            let response = request.send().await.context("Failed to list buckets")?;
            buckets.extend(
                response
                    .buckets()
                    .iter()
                    .filter_map(|b| b.name())
                    .map(str::to_string),
            );

            match response.continuation_token() {
                Some(token) => continuation_token = Some(token.to_string()),
                None => break,
            }
        }

        Ok(buckets)
    }

    async fn list_bucket_documents(&self, bucket: &str) -> Result<Vec<DocumentLocation>> {
        let region = self.region_of(bucket).await?;
        let client = self.ctx.with_region(&region).s3_client();
        let mut documents = Vec::new();
        let mut continuation_token = None;

        loop {
            let mut request = client.list_objects_v2().bucket(bucket);
            if let Some(token) = &continuation_token {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .with_context(|| format!("Failed to list objects in {bucket}"))?;

            for object in response.contents() {
                if let Some(key) = object.key().filter(|k| k.ends_with(&self.suffix)) {
                    documents.push(DocumentLocation::new(bucket, key));
                }
            }

            match next_page_token(response.is_truncated(), response.next_continuation_token()) {
                Some(token) => continuation_token = Some(token),
                None => break,
            }
        }

        Ok(documents)
    }

    /// Bucket region, looked up once per bucket.
    async fn region_of(&self, bucket: &str) -> Result<String> {
        if let Some(region) = self
            .bucket_regions
            .lock()
            .ok()
            .and_then(|cache| cache.get(bucket).cloned())
        {
            return Ok(region);
        }

        let response = self
            .ctx
            .s3_client()
            .get_bucket_location()
            .bucket(bucket)
            .send()
            .await
            .with_context(|| format!("Failed to get location of bucket {bucket}"))?;

        let constraint = response.location_constraint().map(|c| c.as_str());
        let region = bucket_region(constraint).to_string();
        if let Ok(mut cache) = self.bucket_regions.lock() {
            cache.insert(bucket.to_string(), region.clone());
        }
        Ok(region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_region_normalization() {
        assert_eq!(bucket_region(None), "us-east-1");
        assert_eq!(bucket_region(Some("")), "us-east-1");
        assert_eq!(bucket_region(Some("EU")), "eu-west-1");
        assert_eq!(bucket_region(Some("ap-south-1")), "ap-south-1");
    }

    #[test]
    fn test_next_page_token() {
        assert_eq!(next_page_token(Some(true), Some("abc")), Some("abc".to_string()));
        assert_eq!(next_page_token(Some(false), Some("abc")), None);
        assert_eq!(next_page_token(None, None), None);
    }

    #[test]
    fn test_truncated_page_without_token_stops() {
        assert_eq!(next_page_token(Some(true), None), None);
    }
}
