// Output: terminal display and the JSON report handed to renderers.

pub mod terminal;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::info;

use crate::cluster::grid::GridResult;
use crate::pipeline::RunReport;

/// Truncate a string to at most `max_chars` characters, appending "..." if truncated.
///
/// Unlike byte slicing (`&text[..120]`), this respects UTF-8 character boundaries
/// and will never panic on multi-byte characters like emoji or accented letters.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    let char_count = text.chars().count();
    if char_count <= max_chars {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_chars).collect();
        format!("{truncated}...")
    }
}

/// File name for a report generated at the report's own timestamp.
pub fn report_file_name(report: &RunReport) -> String {
    format!("report_{}.json", report.generated_at.format("%Y-%m-%d_%H-%M-%S"))
}

/// Write `report` as pretty JSON into `dir`, creating it if needed.
/// Returns the path written.
pub fn write_json_report(report: &RunReport, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create report directory: {}", dir.display()))?;

    let path = dir.join(report_file_name(report));
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    std::fs::write(&path, json)
        .with_context(|| format!("Failed to write report: {}", path.display()))?;

    info!(path = %path.display(), clusters = report.clusters.len(), "Report written");
    Ok(path)
}

/// Write parameter-sweep results as pretty JSON into `dir`, named by `at`.
pub fn write_grid_results(results: &[GridResult], dir: &Path, at: DateTime<Utc>) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create report directory: {}", dir.display()))?;

    let path = dir.join(format!("grid_search_{}.json", at.format("%Y-%m-%d_%H-%M-%S")));
    let json = serde_json::to_string_pretty(results).context("Failed to serialize grid results")?;
    std::fs::write(&path, json)
        .with_context(|| format!("Failed to write grid results: {}", path.display()))?;

    info!(path = %path.display(), combinations = results.len(), "Grid results written");
    Ok(path)
}
