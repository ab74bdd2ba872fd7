//! Append-only JSONL event log, one file per platform.

use crate::core::error::{Error, Result};
use crate::core::types::{PipelineEvent, TimestampedEvent};
use std::io::Write;
use std::path::{Path, PathBuf};

/// UTC timestamp, RFC 3339 with second precision.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Generate a run ID.
pub fn generate_run_id() -> String {
    let nanos = chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_default() as u64;
    format!("r-{:012x}", nanos & 0xFFFF_FFFF_FFFF)
}

/// Derive the event log path for a platform.
pub fn event_log_path(state_dir: &Path, platform: &str) -> PathBuf {
    state_dir.join(platform).join("events.jsonl")
}

/// Append an event to the platform's event log.
pub fn append_event(state_dir: &Path, platform: &str, event: PipelineEvent) -> Result<()> {
    let path = event_log_path(state_dir, platform);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    let te = TimestampedEvent {
        ts: now_rfc3339(),
        event,
    };
    let json = serde_json::to_string(&te)?;

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| Error::io(&path, e))?;
    writeln!(file, "{}", json).map_err(|e| Error::io(&path, e))?;
    Ok(())
}

/// Read every event of a platform's log. A missing log is empty.
pub fn read_events(state_dir: &Path, platform: &str) -> Result<Vec<TimestampedEvent>> {
    let path = event_log_path(state_dir, platform);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
    content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).map_err(Error::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_rfc3339() {
        let ts = now_rfc3339();
        assert!(ts.starts_with("20"));
        assert!(ts.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }

    #[test]
    fn test_generate_run_id() {
        let id = generate_run_id();
        assert!(id.starts_with("r-"));
        assert_eq!(id.len(), 14);
    }

    #[test]
    fn test_append_and_read_events() {
        let dir = tempfile::tempdir().unwrap();
        append_event(
            dir.path(),
            "linux",
            PipelineEvent::UnitStarted {
                platform: "linux".into(),
                run_id: "r-1".into(),
                prebake_version: "0.3.0".into(),
            },
        )
        .unwrap();
        append_event(
            dir.path(),
            "linux",
            PipelineEvent::BuildFailed {
                platform: "linux".into(),
                pair: "cmake/3.25.3::Release".into(),
                error: "exit 1".into(),
            },
        )
        .unwrap();

        let raw = std::fs::read_to_string(event_log_path(dir.path(), "linux")).unwrap();
        assert_eq!(raw.lines().count(), 2);
        assert!(raw.contains("\"event\":\"build_failed\""));

        let events = read_events(dir.path(), "linux").unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[1].event,
            PipelineEvent::BuildFailed { ref pair, .. } if pair == "cmake/3.25.3::Release"
        ));
    }

    #[test]
    fn test_read_missing_log() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_events(dir.path(), "ghost").unwrap().is_empty());
    }
}
