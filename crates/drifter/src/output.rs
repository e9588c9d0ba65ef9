//! Report output: JSON document and terminal summary

use anyhow::{Context, Result};
use comfy_table::{Cell, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use drifter_core::{DriftReport, ResourceKind, ScanOutcome, SkipReason};
use std::io::Write;
use std::path::Path;
use tracing::info;

/// How the scan result is rendered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// The drift report as pretty-printed JSON
    #[default]
    Json,
    /// Per-kind summary table plus skipped work
    Table,
}

/// Write the JSON report to `path`, or to stdout when `path` is `None`.
pub fn write_report(report: &DriftReport, path: Option<&Path>) -> Result<()> {
    let json = report
        .to_json_pretty()
        .context("Failed to serialize drift report")?;

    match path {
        Some(path) => {
            std::fs::write(path, format!("{json}\n"))
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            info!(path = %path.display(), "Report written");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{json}").context("Failed to write report to stdout")?;
        }
    }
    Ok(())
}

/// Summary table of managed/unmanaged counts per resource type.
pub fn summary_table(report: &DriftReport) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Resource Type"),
            Cell::new("Managed"),
            Cell::new("Not Managed"),
        ]);

    let count = |listing: &drifter_core::report::KindListing, kind: ResourceKind| {
        listing.get(&kind).map_or(0, Vec::len)
    };

    for kind in ResourceKind::ALL {
        let managed = count(&report.managed, kind);
        let unmanaged = count(&report.unmanaged, kind);
        if managed == 0 && unmanaged == 0 {
            continue;
        }
        table.add_row(vec![
            Cell::new(kind.terraform_type()),
            Cell::new(managed),
            Cell::new(unmanaged),
        ]);
    }

    table.add_row(vec![
        Cell::new("Total"),
        Cell::new(report.total_managed),
        Cell::new(report.total_unmanaged),
    ]);
    table
}

/// Table of skipped work, if any.
pub fn skipped_table<'a>(skips: impl IntoIterator<Item = &'a SkipReason>) -> Option<Table> {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Account"),
            Cell::new("Skipped"),
            Cell::new("Reason"),
        ]);

    let mut rows = 0;
    for skip in skips {
        let (what, reason) = match skip {
            SkipReason::Account { error, .. } => ("account".to_string(), error.as_str()),
            SkipReason::Bucket { bucket, error, .. } => (format!("s3://{bucket}"), error.as_str()),
            SkipReason::Document {
                location, error, ..
            } => (location.to_string(), error.as_str()),
            SkipReason::Region { region, error, .. } => {
                (format!("region {region}"), error.as_str())
            }
            SkipReason::Cancelled { .. } => ("remaining work".to_string(), "cancelled"),
        };
        table.add_row(vec![
            Cell::new(skip.account_handle()),
            Cell::new(what),
            Cell::new(reason),
        ]);
        rows += 1;
    }

    (rows > 0).then_some(table)
}

/// Print the human-readable summary of a scan to stdout.
pub fn print_summary(outcome: &ScanOutcome, report: &DriftReport) {
    println!("\n=== Drift Summary ===\n");
    println!("{}", summary_table(report));

    if let Some(skipped) = skipped_table(outcome.skips()) {
        println!("\n=== Skipped (results may be partial) ===\n");
        println!("{skipped}");
    }

    for (kind, ids) in &report.unmanaged {
        println!("\n{kind} not managed:");
        for id in ids {
            println!("  {id}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drifter_core::{AccountHandle, Classification, RegionId};

    fn report() -> DriftReport {
        let mut c = Classification::default();
        c.mark_managed(ResourceKind::Ec2Instance, "i-1".into());
        c.mark_unmanaged(ResourceKind::LambdaFunction, "stray".into());
        DriftReport::from_classification(&c)
    }

    #[test]
    fn test_summary_table_rows() {
        let rendered = summary_table(&report()).to_string();
        assert!(rendered.contains("aws_instance"));
        assert!(rendered.contains("aws_lambda_function"));
        assert!(!rendered.contains("aws_db_instance"));
        assert!(rendered.contains("Total"));
    }

    #[test]
    fn test_skipped_table() {
        assert!(skipped_table(std::iter::empty()).is_none());

        let skips = [SkipReason::region(
            &AccountHandle::new("123456789012"),
            &RegionId::new("ap-east-1"),
            &anyhow::anyhow!("OptInRequired"),
        )];
        let rendered = skipped_table(&skips).unwrap().to_string();
        assert!(rendered.contains("123456789012"));
        assert!(rendered.contains("region ap-east-1"));
    }

    #[test]
    fn test_write_report_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");

        write_report(&report(), Some(&path)).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["total resources managed"], 1);
        assert_eq!(written["Not managed"]["aws_lambda_function"][0], "stray");
    }
}
