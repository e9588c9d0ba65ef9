//! Offline inspection of a local state file

use anyhow::{Context, Result};
use drifter_core::{Catalog, Classification, Diagnostics, DriftReport, parse_state};
use std::path::Path;
use tracing::debug;

/// Parse a state file from disk and report what it declares.
///
/// Everything declared is listed as managed; `"Not managed"` is always
/// empty since nothing live is enumerated. Skipped entries show up under
/// `diagnostics`.
pub fn state_file_report(path: &Path, catalog: &Catalog) -> Result<DriftReport> {
    let document =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let parsed = parse_state(&document, catalog)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    debug!(
        path = %path.display(),
        declared = parsed.managed.len(),
        "Parsed local state file"
    );

    Ok(
        DriftReport::from_classification(&Classification::seeded(&parsed.managed))
            .with_diagnostics(Diagnostics::new(Vec::new(), parsed.stats)),
    )
}
