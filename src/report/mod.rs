//! Run artifacts: JUnit results, HTML summaries and the JSONL event log.
//!
//! Reports are write-only; nothing in the pipeline reads them back.

pub mod eventlog;
pub mod html;
pub mod junit;

use crate::core::error::{Error, Result};
use crate::core::types::PlatformReport;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").expect("static pattern")
});

/// Captured command output fit for XML 1.0 text.
///
/// Colour escapes are stripped; other control characters are dropped
/// except tab, newline and carriage return.
pub fn printable(output: &str) -> String {
    ANSI_ESCAPE
        .replace_all(output, "")
        .chars()
        .filter(|&c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
        .collect()
}

/// `<reports>/<platform>/test-results.xml`
pub fn junit_path(reports_dir: &Path, platform: &str) -> PathBuf {
    reports_dir.join(platform).join("test-results.xml")
}

/// `<reports>/<platform>/report.html`
pub fn html_path(reports_dir: &Path, platform: &str) -> PathBuf {
    reports_dir.join(platform).join("report.html")
}

/// Write both report files for a platform.
pub fn write_platform_reports(reports_dir: &Path, report: &PlatformReport) -> Result<()> {
    let dir = reports_dir.join(&report.platform);
    std::fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;

    let xml = junit::render(report)?;
    let xml_path = junit_path(reports_dir, &report.platform);
    std::fs::write(&xml_path, xml).map_err(|e| Error::io(&xml_path, e))?;

    let page_path = html_path(reports_dir, &report.platform);
    let page = html::render(report)?;
    std::fs::write(&page_path, page).map_err(|e| Error::io(&page_path, e))?;
    Ok(())
}
