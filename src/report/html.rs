//! Human-readable HTML summary of a platform unit.

use super::printable;
use crate::core::error::{Error, Result};
use crate::core::types::{PlatformReport, UnitOutcome};
use quick_xml::escape::escape;
use std::fmt::Write;

const STYLE: &str = "body{font-family:sans-serif}table{border-collapse:collapse}\
td,th{border:1px solid #ccc;padding:4px 8px}.passed{color:#2a7d2a}.failed{color:#b00020}";

/// Render a platform report as a standalone HTML page.
pub fn render(report: &PlatformReport) -> Result<String> {
    let mut out = String::new();
    write_page(&mut out, report).map_err(|e| Error::Report(format!("html: {}", e)))?;
    Ok(out)
}

fn write_page(out: &mut String, report: &PlatformReport) -> std::fmt::Result {
    let title = format!("Tool builds: {} ({})", report.platform, report.arch);
    writeln!(out, "<!DOCTYPE html>")?;
    writeln!(out, "<html><head><meta charset=\"utf-8\">")?;
    writeln!(out, "<title>{}</title>", escape(&title))?;
    writeln!(out, "<style>{}</style></head><body>", STYLE)?;
    writeln!(out, "<h1>{}</h1>", escape(&title))?;

    if let UnitOutcome::SetupFailed { ref stage, ref error } = report.outcome {
        writeln!(
            out,
            "<p class=\"failed\">{} stage failed</p><pre>{}</pre>",
            stage,
            escape(&printable(error))
        )?;
    }

    writeln!(
        out,
        "<p>{} passed, {} failed in {:.1}s</p>",
        report.passed(),
        report.failed(),
        report.duration.as_secs_f64()
    )?;
    writeln!(
        out,
        "<table><tr><th>Pair</th><th>Decision</th><th>Status</th><th>Time</th><th>Uploaded</th></tr>"
    )?;
    for r in &report.results {
        let status = r.status.to_string();
        let decision = r.decision.map(|d| d.to_string()).unwrap_or_default();
        writeln!(
            out,
            "<tr><td>{}</td><td>{}</td><td class=\"{}\">{}</td><td>{:.1}s</td><td>{}</td></tr>",
            escape(&r.pair_id),
            escape(&decision),
            status.to_lowercase(),
            status,
            r.duration.as_secs_f64(),
            escape(&r.uploaded.join(", "))
        )?;
        if let Some(ref message) = r.message {
            writeln!(
                out,
                "<tr><td colspan=\"5\"><pre>{}</pre></td></tr>",
                escape(&printable(message))
            )?;
        }
    }
    writeln!(out, "</table></body></html>")
}
