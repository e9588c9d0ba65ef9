//! Live AWS checks
//!
//! Run with: cargo test -p drifter --test aws_live -- --ignored
//! Uses the default credential chain and AWS_REGION/AWS_DEFAULT_REGION.

use drifter::aws::{AwsContext, FromAwsContext, Inventory, StateStore, get_current_account_id};
use drifter_core::{Catalog, ResourceKind};
use drifter_test_utils::get_test_region;

#[tokio::test]
#[ignore = "requires AWS credentials"]
async fn test_caller_identity() {
    let ctx = AwsContext::new(&get_test_region(), None).await;
    let account = get_current_account_id(ctx.sdk_config())
        .await
        .expect("credentials should resolve");
    assert_eq!(account.as_str().len(), 12);
}

#[tokio::test]
#[ignore = "requires AWS credentials"]
async fn test_enumerate_current_account() {
    let ctx = AwsContext::new(&get_test_region(), None).await;
    let live = Inventory::from_context(&ctx)
        .enumerate(&Catalog::default())
        .await
        .expect("enumeration should succeed with read-only access");

    // Every linked member must also be recorded as a live instance
    for link in live.links() {
        assert_eq!(link.owner_kind, ResourceKind::AutoScalingGroup);
        assert!(live.ids(ResourceKind::Ec2Instance).any(|id| *id == link.member_id));
    }
}

#[tokio::test]
#[ignore = "requires AWS credentials"]
async fn test_list_state_documents() {
    let ctx = AwsContext::new(&get_test_region(), None).await;
    let listing = StateStore::from_context(&ctx)
        .list_documents()
        .await
        .expect("bucket listing should succeed");

    for location in listing.documents {
        assert!(location.key.ends_with(".tfstate"));
    }
}
