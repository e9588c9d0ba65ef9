//! drifter: find AWS resources that no Terraform state declares
//!
//! Scans every account in an AWS Organization (or an explicit list), reads
//! the Terraform state documents each account keeps in S3, and compares
//! them with the live resources in the requested regions.

use anyhow::{Context, Result, ensure};
use clap::{Parser, Subcommand};
use drifter::aws::{
    AwsBackend, AwsContext, FromAwsContext, OrganizationDirectory, classify_anyhow_error,
    get_current_account_id,
};
use drifter::config::{self, RunConfig};
use drifter::output::{self, OutputFormat};
use drifter_core::defaults::{
    DEFAULT_HOME_REGION, DEFAULT_REGIONS, DEFAULT_ROLE_NAME, DEFAULT_STATE_SUFFIX,
};
use drifter_core::{
    AccountDirectory, AccountHandle, Aggregator, Catalog, DriftReport, RegionId, ScanOutcome,
    StaticDirectory,
};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "drifter")]
#[command(about = "Detect AWS resources not managed by Terraform")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

/// Arguments for the scan command
#[derive(clap::Args, Debug)]
struct ScanArgs {
    /// Comma-separated regions to enumerate in every account
    #[arg(long, default_value_t = DEFAULT_REGIONS.join(","))]
    regions: String,

    /// Comma-separated Terraform resource types to reconcile (default: all supported)
    #[arg(long)]
    types: Option<Catalog>,

    /// Comma-separated account IDs (default: every account in the organization)
    #[arg(long)]
    accounts: Option<String>,

    /// Role assumed in each account
    #[arg(long, default_value = DEFAULT_ROLE_NAME)]
    role_name: String,

    /// Region for Organizations, STS and S3 bucket listing
    #[arg(long, default_value = DEFAULT_HOME_REGION)]
    home_region: String,

    /// AWS profile to use (overrides AWS_PROFILE env var)
    #[arg(long)]
    aws_profile: Option<String>,

    /// Object key suffix identifying state documents
    #[arg(long, default_value = DEFAULT_STATE_SUFFIX)]
    state_suffix: String,

    /// Maximum number of accounts scanned concurrently
    #[arg(long)]
    max_concurrent_accounts: Option<usize>,

    /// Stop at the first account, document or region that cannot be scanned
    #[arg(long)]
    fail_fast: bool,

    /// Write the JSON report to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,
}

impl ScanArgs {
    fn parse_accounts(&self) -> Option<Vec<AccountHandle>> {
        self.accounts.as_ref().map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(AccountHandle::new)
                .collect()
        })
    }
}

impl From<ScanArgs> for RunConfig {
    fn from(args: ScanArgs) -> Self {
        let accounts = args.parse_accounts();
        Self {
            scope: config::ScopeConfig {
                regions: RegionId::parse_list(&args.regions),
                catalog: args.types.unwrap_or_default(),
                accounts,
            },
            aws: config::AwsConfig {
                home_region: args.home_region,
                aws_profile: args.aws_profile,
                role_name: args.role_name,
                state_suffix: args.state_suffix,
            },
            flags: config::RuntimeFlags {
                max_concurrent_accounts: args.max_concurrent_accounts,
                fail_fast: args.fail_fast,
                output: args.output,
                format: args.format,
            },
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan accounts and report managed vs unmanaged resources
    Scan(Box<ScanArgs>),

    /// Parse a local state file and print what it declares
    Parse {
        /// Path to a .tfstate file
        file: PathBuf,

        /// Comma-separated Terraform resource types to extract (default: all supported)
        #[arg(long)]
        types: Option<Catalog>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&e);
        std::process::exit(1);
    }
}

/// Print error in a user-friendly way
fn print_error(e: &anyhow::Error) {
    use std::io::Write;

    let mut stderr = std::io::stderr();

    let _ = writeln!(stderr, "\n\x1b[1;31mError:\x1b[0m {e}");

    let mut source = e.source();
    while let Some(cause) = source {
        let _ = writeln!(stderr, "  \x1b[33mCaused by:\x1b[0m {cause}");
        source = cause.source();
    }

    if let Some(hint) = classify_anyhow_error(e).suggestion() {
        let _ = writeln!(stderr, "\n\x1b[36mHint:\x1b[0m {hint}");
    }

    if std::env::var("RUST_BACKTRACE").is_err() {
        let _ = writeln!(
            stderr,
            "\n\x1b[2mSet RUST_BACKTRACE=1 for a detailed backtrace\x1b[0m"
        );
    } else {
        let backtrace = e.backtrace();
        if backtrace.status() == std::backtrace::BacktraceStatus::Captured {
            let _ = writeln!(stderr, "\n\x1b[2mBacktrace:\x1b[0m\n{backtrace}");
        }
    }
}

/// Logs go to stderr so stdout carries only the report.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        // Reduce noise from AWS SDK (show only warnings and errors)
        EnvFilter::new("info,aws_config=warn,aws_smithy_runtime=warn,aws_sdk_sts=warn")
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<()> {
    let args = Args::parse();
    init_tracing();

    match args.command {
        Command::Scan(scan_args) => {
            let config: RunConfig = (*scan_args).into();
            handle_scan(config).await?;
        }
        Command::Parse { file, types } => {
            let report = drifter::local::state_file_report(&file, &types.unwrap_or_default())?;
            output::write_report(&report, None)?;
        }
    }

    Ok(())
}

/// Handle the scan command
async fn handle_scan(config: RunConfig) -> Result<()> {
    ensure!(!config.regions().is_empty(), "No regions to scan");
    if let Some(accounts) = config.accounts() {
        ensure!(!accounts.is_empty(), "--accounts was given but lists no accounts");
    }
    if let Some(profile) = config.aws_profile() {
        info!(profile = %profile, "Using AWS profile");
    }

    info!(
        regions = ?config.regions(),
        types = ?config.catalog().iter().map(|k| k.terraform_type()).collect::<Vec<_>>(),
        role = %config.role_name(),
        home_region = %config.home_region(),
        "Starting drift scan"
    );

    let home = AwsContext::new(config.home_region(), config.aws_profile()).await;
    let caller = get_current_account_id(home.sdk_config()).await?;
    info!(account = %caller, "AWS credentials validated");

    let backend = AwsBackend::new(home.clone(), config.role_name(), config.state_suffix());
    let cancel = CancellationToken::new();
    spawn_ctrl_c_handler(cancel.clone());

    let outcome = match config.accounts() {
        Some(accounts) => {
            let directory = StaticDirectory::new(accounts.to_vec());
            run_scan(directory, backend, &config, cancel).await?
        }
        None => {
            let directory = OrganizationDirectory::from_context(&home);
            run_scan(directory, backend, &config, cancel).await?
        }
    };

    let report = DriftReport::from_outcome(&outcome);
    match config.format() {
        OutputFormat::Json => output::write_report(&report, config.output())?,
        OutputFormat::Table => {
            output::print_summary(&outcome, &report);
            if let Some(path) = config.output() {
                output::write_report(&report, Some(path))?;
            }
        }
    }

    Ok(())
}

async fn run_scan<D: AccountDirectory>(
    directory: D,
    backend: AwsBackend,
    config: &RunConfig,
    cancel: CancellationToken,
) -> Result<ScanOutcome> {
    Aggregator::new(directory, backend, config.aggregator_config())
        .with_cancellation(cancel)
        .run()
        .await
        .context("Drift scan failed")
}

/// Cancel the scan on Ctrl-C; work already folded is still reported.
fn spawn_ctrl_c_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling remaining work");
            cancel.cancel();
        }
    });
}
