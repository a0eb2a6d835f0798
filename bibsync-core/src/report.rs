//! Machine-readable health report artifact.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::FilesystemError;
use crate::health::HealthReport;

/// Default report location, relative to the working directory.
pub const DEFAULT_REPORT_PATH: &str = "temp/bib_health_report.json";

pub fn default_report_path() -> PathBuf {
    PathBuf::from(DEFAULT_REPORT_PATH)
}

/// Render the flagged entries as a JSON array of `{citation_key, issues}`.
pub fn render_report(report: &HealthReport) -> String {
    serde_json::to_string_pretty(&report.issues).unwrap_or_else(|_| "[]".to_string())
}

/// Write the report, creating parent directories as needed.
pub fn write_report(path: &Path, report: &HealthReport) -> Result<(), FilesystemError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| FilesystemError::new("create", parent, e))?;
    }

    let mut json = render_report(report);
    json.push('\n');
    fs::write(path, json).map_err(|e| FilesystemError::new("write", path, e))?;

    info!(path = %path.display(), flagged = report.issues.len(), "wrote health report");
    Ok(())
}
