//! Live resource enumeration for one account and region

use super::context::{AwsContext, FromAwsContext};
use super::error::classify_anyhow_error;
use anyhow::{Context, Result};
use aws_sdk_ec2::types::Filter;
use backon::{ExponentialBuilder, Retryable};
use drifter_core::{Catalog, LiveInventory, OwnershipLink, ResourceKind};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Instance states that still count as live
const LIVE_INSTANCE_STATES: &[&str] = &["pending", "running", "stopping", "stopped"];

/// Backoff for throttled list/describe calls
fn throttle_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(500))
        .with_max_delay(Duration::from_secs(20))
        .with_max_times(6)
}

/// Run one API page request, retrying while AWS throttles it.
async fn with_throttle_retry<T, F, Fut>(operation: &str, region: &str, call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    call.retry(throttle_backoff())
        .when(|e| classify_anyhow_error(e).is_retryable())
        .notify(|e, dur| {
            warn!(
                operation = %operation,
                region = %region,
                delay = ?dur,
                error = %e,
                "AWS rate limited, backing off..."
            );
        })
        .await
}

/// Auto Scaling group and its current member instances
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalingGroup {
    pub name: String,
    pub instance_ids: Vec<String>,
}

/// Enumerates live resources in the context's region.
pub struct Inventory {
    ctx: AwsContext,
}

impl FromAwsContext for Inventory {
    fn from_context(ctx: &AwsContext) -> Self {
        Self { ctx: ctx.clone() }
    }
}

/// Run `fut` only when `kind` is in the catalog.
async fn when_cataloged<T: Default>(
    catalog: &Catalog,
    kind: ResourceKind,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    if catalog.contains(kind) {
        fut.await
    } else {
        Ok(T::default())
    }
}

/// Combine per-service listings into one inventory.
///
/// Scaling group members are recorded as live instances (when instances are
/// cataloged) even if `DescribeInstances` did not return them, and each
/// member gets an ownership link to its group.
fn assemble(
    catalog: &Catalog,
    instances: Vec<String>,
    databases: Vec<String>,
    functions: Vec<String>,
    groups: Vec<ScalingGroup>,
) -> LiveInventory {
    let mut live = LiveInventory::default();
    for id in instances {
        live.insert(ResourceKind::Ec2Instance, id);
    }
    for id in databases {
        live.insert(ResourceKind::DbInstance, id);
    }
    for name in functions {
        live.insert(ResourceKind::LambdaFunction, name);
    }
    for group in groups {
        for instance_id in &group.instance_ids {
            if catalog.contains(ResourceKind::Ec2Instance) {
                live.insert(ResourceKind::Ec2Instance, instance_id.as_str());
            }
            live.link(OwnershipLink::scaling_group_member(
                group.name.as_str(),
                instance_id.as_str(),
            ));
        }
        live.insert(ResourceKind::AutoScalingGroup, group.name);
    }
    live
}

impl Inventory {
    /// Enumerate every catalog kind in this region.
    ///
    /// Scaling group members are recorded as live instances and linked to
    /// their group, so a declared group covers its instances.
    pub async fn enumerate(&self, catalog: &Catalog) -> Result<LiveInventory> {
        let (instances, databases, functions, groups) = tokio::join!(
            when_cataloged(catalog, ResourceKind::Ec2Instance, self.list_instances()),
            when_cataloged(catalog, ResourceKind::DbInstance, self.list_db_instances()),
            when_cataloged(catalog, ResourceKind::LambdaFunction, self.list_functions()),
            when_cataloged(
                catalog,
                ResourceKind::AutoScalingGroup,
                self.list_scaling_groups()
            ),
        );

        let live = assemble(catalog, instances?, databases?, functions?, groups?);

        debug!(
            region = %self.ctx.region(),
            account = ?self.ctx.account(),
            resources = live.len(),
            links = live.links().len(),
            "Enumerated live resources"
        );
        Ok(live)
    }

    /// EC2 instance ids, excluding shutting-down and terminated instances.
    pub async fn list_instances(&self) -> Result<Vec<String>> {
        let client = self.ctx.ec2_client();
        let region = self.ctx.region();
        let filter = Filter::builder()
            .name("instance-state-name")
            .set_values(Some(
                LIVE_INSTANCE_STATES.iter().map(|s| s.to_string()).collect(),
            ))
            .build();

        let mut ids = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let response = with_throttle_retry("DescribeInstances", region, || async {
                client
                    .describe_instances()
                    .filters(filter.clone())
                    .set_next_token(next_token.clone())
                    .send()
                    .await
                    .with_context(|| format!("Failed to describe EC2 instances in {region}"))
            })
            .await?;

            for reservation in response.reservations() {
                for instance in reservation.instances() {
                    if let Some(id) = instance.instance_id() {
                        ids.push(id.to_string());
                    }
                }
            }

            match response.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }

        debug!(region = %region, count = ids.len(), "Found EC2 instances");
        Ok(ids)
    }

    /// RDS DB instance identifiers.
    pub async fn list_db_instances(&self) -> Result<Vec<String>> {
        let client = self.ctx.rds_client();
        let region = self.ctx.region();

        let mut ids = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let response = with_throttle_retry("DescribeDBInstances", region, || async {
                client
                    .describe_db_instances()
                    .set_marker(marker.clone())
                    .send()
                    .await
                    .with_context(|| format!("Failed to describe RDS instances in {region}"))
            })
            .await?;

            ids.extend(
                response
                    .db_instances()
                    .iter()
                    .filter_map(|db| db.db_instance_identifier())
                    .map(str::to_string),
            );

            match response.marker() {
                Some(next) => marker = Some(next.to_string()),
                None => break,
            }
        }

        debug!(region = %region, count = ids.len(), "Found RDS instances");
        Ok(ids)
    }

    /// Lambda function names.
    pub async fn list_functions(&self) -> Result<Vec<String>> {
        let client = self.ctx.lambda_client();
        let region = self.ctx.region();

        let mut names = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let response = with_throttle_retry("ListFunctions", region, || async {
                client
                    .list_functions()
                    .set_marker(marker.clone())
                    .send()
                    .await
                    .with_context(|| format!("Failed to list Lambda functions in {region}"))
            })
            .await?;

            names.extend(
                response
                    .functions()
                    .iter()
                    .filter_map(|f| f.function_name())
                    .map(str::to_string),
            );

            match response.next_marker() {
                Some(next) => marker = Some(next.to_string()),
                None => break,
            }
        }

        debug!(region = %region, count = names.len(), "Found Lambda functions");
        Ok(names)
    }

    /// Auto Scaling groups with their member instance ids.
    pub async fn list_scaling_groups(&self) -> Result<Vec<ScalingGroup>> {
        let client = self.ctx.autoscaling_client();
        let region = self.ctx.region();

        let mut groups = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let response = with_throttle_retry("DescribeAutoScalingGroups", region, || async {
                client
                    .describe_auto_scaling_groups()
                    .set_next_token(next_token.clone())
                    .send()
                    .await
                    .with_context(|| {
                        format!("Failed to describe Auto Scaling groups in {region}")
                    })
            })
            .await?;

            for group in response.auto_scaling_groups() {
                groups.push(ScalingGroup {
                    name: group.auto_scaling_group_name().to_string(),
                    instance_ids: group
                        .instances()
                        .iter()
                        .map(|i| i.instance_id().to_string())
                        .collect(),
                });
            }

            match response.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }

        debug!(region = %region, count = groups.len(), "Found Auto Scaling groups");
        Ok(groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states_are_not_live() {
        assert!(!LIVE_INSTANCE_STATES.contains(&"terminated"));
        assert!(!LIVE_INSTANCE_STATES.contains(&"shutting-down"));
        assert!(LIVE_INSTANCE_STATES.contains(&"stopped"));
    }

    #[tokio::test]
    async fn test_uncataloged_kinds_are_not_called() {
        let catalog: Catalog = "aws_instance".parse().unwrap();
        let skipped: Result<Vec<String>> = when_cataloged(
            &catalog,
            ResourceKind::LambdaFunction,
            async { anyhow::bail!("should not run") },
        )
        .await;
        assert!(skipped.unwrap().is_empty());
    }

    fn group(name: &str, members: &[&str]) -> ScalingGroup {
        ScalingGroup {
            name: name.to_string(),
            instance_ids: members.iter().map(|m| m.to_string()).collect(),
        }
    }

    #[test]
    fn test_scaling_group_members_are_live_and_linked() {
        let live = assemble(
            &Catalog::default(),
            vec!["i-1".to_string(), "i-solo".to_string()],
            vec!["db-1".to_string()],
            vec!["fn-1".to_string()],
            // i-2 belongs to the group but was not in DescribeInstances
            vec![group("web", &["i-1", "i-2"])],
        );

        let mut instances: Vec<&str> = live
            .ids(ResourceKind::Ec2Instance)
            .map(|id| id.as_str())
            .collect();
        instances.sort_unstable();
        assert_eq!(instances, vec!["i-1", "i-2", "i-solo"]);
        assert!(live.ids(ResourceKind::AutoScalingGroup).any(|id| id.as_str() == "web"));
        assert!(live.ids(ResourceKind::DbInstance).any(|id| id.as_str() == "db-1"));
        assert!(live.ids(ResourceKind::LambdaFunction).any(|id| id.as_str() == "fn-1"));

        assert_eq!(
            live.links(),
            &[
                OwnershipLink::scaling_group_member("web", "i-1"),
                OwnershipLink::scaling_group_member("web", "i-2"),
            ]
        );
    }

    #[test]
    fn test_members_not_recorded_when_instances_uncataloged() {
        let catalog: Catalog = "aws_autoscaling_group".parse().unwrap();
        let live = assemble(
            &catalog,
            Vec::new(),
            Vec::new(),
            Vec::new(),
            vec![group("web", &["i-1"])],
        );

        assert_eq!(live.ids(ResourceKind::Ec2Instance).count(), 0);
        assert!(live.ids(ResourceKind::AutoScalingGroup).any(|id| id.as_str() == "web"));
        assert_eq!(live.links().len(), 1);
    }
}
