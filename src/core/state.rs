//! Pipeline state: run lock, build ledger and lineage health.
//!
//! Everything lives under the state directory:
//!
//! ```text
//! state/
//!   <lineage>/run.lock          one active run per lineage
//!   <lineage>/health.yaml       health after the last completed run
//!   <platform>/builds.lock.yaml per-pair ledger of the last run
//!   <platform>/events.jsonl     append-only event log
//! ```

use super::error::{Error, Result};
use super::types::{Health, PairStatus, PlatformReport};
use crate::report::eventlog::now_rfc3339;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Turn a branch name into a single path component.
///
/// Names that need rewriting get a short hash of the original so distinct
/// branches such as `feature/x` and `feature-x` never share state.
pub fn lineage_key(branch: &str) -> String {
    let key: String = branch
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let key = if key.is_empty() || key.chars().all(|c| c == '.') {
        "default".to_string()
    } else {
        key
    };
    if key == branch {
        key
    } else {
        let digest = blake3::hash(branch.as_bytes()).to_hex();
        format!("{}-{}", key, &digest.as_str()[..8])
    }
}

// ============================================================================
// Run lock
// ============================================================================

/// Exclusive marker for an active run; removed when dropped.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Create `state/<lineage>/run.lock`, failing if it already exists.
    pub fn acquire(state_dir: &Path, lineage: &str, run_id: &str) -> Result<Self> {
        let dir = state_dir.join(lineage_key(lineage));
        std::fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
        let path = dir.join("run.lock");
        let mut file = match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(Error::RunInProgress {
                    lineage: lineage.to_string(),
                    path,
                });
            }
            Err(e) => return Err(Error::io(&path, e)),
        };
        writeln!(file, "run_id: {}\npid: {}", run_id, std::process::id())
            .map_err(|e| Error::io(&path, e))?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "cannot remove run lock");
        }
    }
}

// ============================================================================
// Atomic YAML files
// ============================================================================

fn save_yaml_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    let yaml = serde_yaml_ng::to_string(value)?;
    let tmp_path = path.with_extension("yaml.tmp");
    std::fs::write(&tmp_path, &yaml).map_err(|e| Error::io(&tmp_path, e))?;
    std::fs::rename(&tmp_path, path).map_err(|e| Error::io(path, e))?;
    Ok(())
}

fn load_yaml<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    Ok(Some(serde_yaml_ng::from_str(&content)?))
}

// ============================================================================
// Build ledger
// ============================================================================

/// Per-platform record of the last run's pairs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildLedger {
    pub schema: String,
    pub platform: String,
    pub run_id: String,
    pub generated_at: String,
    pub generator: String,
    pub builds: IndexMap<String, BuildEntry>,
}

/// One pair in the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildEntry {
    pub status: PairStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,
    pub fingerprint: String,
    pub finished_at: String,
    pub duration_seconds: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uploaded: Vec<String>,
}

impl BuildLedger {
    /// Ledger for a finished platform unit.
    pub fn from_report(run_id: &str, report: &PlatformReport) -> Self {
        let finished_at = now_rfc3339();
        let builds = report
            .results
            .iter()
            .map(|r| {
                (
                    r.pair_id.clone(),
                    BuildEntry {
                        status: r.status,
                        decision: r.decision.map(|d| d.to_string()),
                        fingerprint: r.fingerprint.clone(),
                        finished_at: finished_at.clone(),
                        duration_seconds: r.duration.as_secs_f64(),
                        uploaded: r.uploaded.clone(),
                    },
                )
            })
            .collect();
        Self {
            schema: "1.0".to_string(),
            platform: report.platform.clone(),
            run_id: run_id.to_string(),
            generated_at: finished_at,
            generator: format!("prebake {}", env!("CARGO_PKG_VERSION")),
            builds,
        }
    }
}

/// `<state>/<platform>/builds.lock.yaml`
pub fn ledger_path(state_dir: &Path, platform: &str) -> PathBuf {
    state_dir.join(platform).join("builds.lock.yaml")
}

pub fn save_ledger(state_dir: &Path, ledger: &BuildLedger) -> Result<()> {
    save_yaml_atomic(&ledger_path(state_dir, &ledger.platform), ledger)
}

/// Load a platform's ledger. Returns None if the file doesn't exist.
pub fn load_ledger(state_dir: &Path, platform: &str) -> Result<Option<BuildLedger>> {
    load_yaml(&ledger_path(state_dir, platform))
}

// ============================================================================
// Lineage health
// ============================================================================

/// Health of a lineage after its last run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthRecord {
    pub lineage: String,
    pub health: Health,
    pub run_id: String,
    pub recorded_at: String,
}

/// `<state>/<lineage>/health.yaml`
pub fn health_path(state_dir: &Path, lineage: &str) -> PathBuf {
    state_dir.join(lineage_key(lineage)).join("health.yaml")
}

pub fn load_health(state_dir: &Path, lineage: &str) -> Result<Option<HealthRecord>> {
    load_yaml(&health_path(state_dir, lineage))
}

pub fn save_health(state_dir: &Path, lineage: &str, health: Health, run_id: &str) -> Result<()> {
    let record = HealthRecord {
        lineage: lineage.to_string(),
        health,
        run_id: run_id.to_string(),
        recorded_at: now_rfc3339(),
    };
    save_yaml_atomic(&health_path(state_dir, lineage), &record)
}
