//! Executor: per-platform tool-build units and their fan-out.
//!
//! Each unit runs its stages in order: environment setup, authentication
//! (only when uploading), then one build per planned pair. Units share
//! nothing mutable; everything a unit needs travels in its [`UnitContext`].

use super::changeset::ChangeSet;
use super::error::{Error, Result};
use super::planner::{BuildPair, PlatformBatch};
use super::state;
use super::types::*;
use crate::pkgmgr::{self, summary};
use crate::report::{self, eventlog};
use crate::transport::{ExecOutput, Invocation, Runner};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Lines of command output kept in failure messages.
const FAILURE_TAIL: usize = 40;

/// Run-wide settings shared by every unit.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub run_id: String,
    pub force: ForceBuild,
    /// Remote to upload built tools to; None disables uploading
    pub upload_remote: Option<String>,
    pub reports_dir: PathBuf,
    pub state_dir: PathBuf,
}

/// Everything one platform unit needs, owned by that unit.
#[derive(Debug, Clone)]
pub struct UnitContext {
    pub run_id: String,
    pub platform: String,
    pub arch: String,
    pub host: Host,
    pub workdir: Option<String>,
    pub env: Vec<(String, String)>,
    pub setup: Vec<String>,
    pub program: String,
    pub upload_remote: Option<String>,
    pub force: ForceBuild,
    pub upload_exclude: Vec<String>,
    pub reports_dir: PathBuf,
    pub state_dir: PathBuf,
    pub failure: FailurePolicy,
}

impl UnitContext {
    pub fn for_platform(config: &PipelineConfig, name: &str, opts: &RunOptions) -> Result<Self> {
        let platform = config
            .platforms
            .get(name)
            .ok_or_else(|| Error::UnknownPlatform(name.to_string()))?;
        Ok(Self {
            run_id: opts.run_id.clone(),
            platform: name.to_string(),
            arch: platform.arch.clone(),
            host: platform.host.clone(),
            workdir: platform.workdir.clone(),
            env: platform
                .env
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            setup: platform.setup.clone(),
            program: config.package_manager.program.clone(),
            upload_remote: opts.upload_remote.clone(),
            force: opts.force,
            upload_exclude: config.upload_exclude.clone(),
            reports_dir: opts.reports_dir.clone(),
            state_dir: opts.state_dir.clone(),
            failure: config.policy.failure,
        })
    }

    /// Apply the platform's workdir and environment.
    fn prepare(&self, invocation: Invocation) -> Invocation {
        let mut inv = invocation.cwd(self.workdir.as_deref());
        for (key, value) in &self.env {
            inv = inv.env(key.clone(), value.clone());
        }
        inv
    }

    fn exec(&self, runner: &dyn Runner, invocation: Invocation) -> Result<ExecOutput> {
        runner.run(&self.host, &self.prepare(invocation))
    }

    fn log_event(&self, event: PipelineEvent) {
        if let Err(e) = eventlog::append_event(&self.state_dir, &self.platform, event) {
            tracing::warn!(platform = %self.platform, error = %e, "event log write failed");
        }
    }
}

/// Cache decision for one pair.
///
/// A forced build skips the probe. Otherwise a successful probe means the
/// prebuilt artifact is reused.
pub fn decide(runner: &dyn Runner, ctx: &UnitContext, pair: &BuildPair) -> Result<BuildDecision> {
    if ctx.force != ForceBuild::No {
        return Ok(BuildDecision::Build(BuildReason::Forced));
    }
    let probe = pkgmgr::probe_invocation(&ctx.program, &pair.tool.reference, &pair.config);
    if ctx.exec(runner, probe)?.success() {
        Ok(BuildDecision::Fetch)
    } else {
        Ok(BuildDecision::Build(BuildReason::Missing))
    }
}

/// File name component for a pair id.
fn pair_slug(pair_id: &str) -> String {
    pair_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '_' })
        .collect()
}

/// Directory and file for a pair's create summary. Scoped by platform so
/// units sharing a host never read each other's summaries.
fn summary_location(ctx: &UnitContext, pair: &BuildPair) -> (String, String) {
    let base = pair.config.build_folder.as_deref().unwrap_or(".prebake");
    let dir = format!("{}/{}", base.trim_end_matches('/'), pair_slug(&ctx.platform));
    let file = format!("{}/{}.json", dir, pair_slug(&pair.pair_id));
    (dir, file)
}

struct PairOutcome {
    installed: Vec<InstalledRef>,
    uploaded: Vec<String>,
}

/// Build (or fetch) one pair. `Ok(Err(msg))` is a pair failure; `Err` is
/// an infrastructure failure that aborts the run.
fn execute_pair(
    runner: &dyn Runner,
    ctx: &UnitContext,
    pair: &BuildPair,
    decision: BuildDecision,
) -> Result<std::result::Result<PairOutcome, String>> {
    if decision == BuildDecision::Fetch {
        return Ok(Ok(PairOutcome {
            installed: Vec::new(),
            uploaded: Vec::new(),
        }));
    }

    let (out_dir, summary_path) = summary_location(ctx, pair);
    let mkdir = ctx.exec(runner, Invocation::new("mkdir").args(["-p", out_dir.as_str()]))?;
    if !mkdir.success() {
        return Ok(Err(format!("cannot create {}: {}", out_dir, mkdir.tail(5))));
    }

    let folder = pair.recipe_folder.to_string_lossy();
    let create = pkgmgr::create_invocation(
        &ctx.program,
        &pkgmgr::CreateRequest {
            recipe_folder: &folder,
            reference: &pair.tool.reference,
            config: &pair.config,
            tool_options: &pair.tool.options,
            force: ctx.force,
            summary_path: &summary_path,
        },
    );
    let out = ctx.exec(runner, create)?;
    if !out.success() {
        return Ok(Err(format!(
            "create exited {}:\n{}",
            out.exit_code,
            out.tail(FAILURE_TAIL)
        )));
    }

    let cat = ctx.exec(runner, Invocation::new("cat").arg(summary_path.as_str()))?;
    if !cat.success() {
        return Ok(Err(format!("cannot read {}: {}", summary_path, cat.tail(5))));
    }
    let installed = match summary::parse_create_summary(&cat.stdout) {
        Ok(i) => i,
        Err(e) => return Ok(Err(format!("invalid create summary: {}", e))),
    };

    let mut uploaded = Vec::new();
    if let Some(ref remote) = ctx.upload_remote {
        for reference in summary::upload_candidates(&installed, &ctx.upload_exclude) {
            let parsed: RecipeRef = reference.parse()?;
            let up = ctx.exec(
                runner,
                pkgmgr::upload_invocation(&ctx.program, &parsed, remote),
            )?;
            if !up.success() {
                return Ok(Err(format!(
                    "upload of {} to {} failed:\n{}",
                    reference,
                    remote,
                    up.tail(FAILURE_TAIL)
                )));
            }
            uploaded.push(reference);
        }
    }
    Ok(Ok(PairOutcome {
        installed,
        uploaded,
    }))
}

fn run_pair(runner: &dyn Runner, ctx: &UnitContext, pair: &BuildPair) -> Result<PairResult> {
    let start = Instant::now();
    let decision = decide(runner, ctx, pair)?;
    tracing::info!(platform = %ctx.platform, pair = %pair.pair_id, %decision, "tool build");
    ctx.log_event(PipelineEvent::BuildStarted {
        platform: ctx.platform.clone(),
        pair: pair.pair_id.clone(),
        decision: decision.to_string(),
    });

    let outcome = execute_pair(runner, ctx, pair, decision)?;
    let duration = start.elapsed();
    let mut result = PairResult {
        pair_id: pair.pair_id.clone(),
        tool: pair.tool.label(),
        config: pair.config_name.clone(),
        fingerprint: pair.fingerprint.clone(),
        status: PairStatus::Passed,
        decision: Some(decision),
        message: None,
        duration,
        installed: Vec::new(),
        uploaded: Vec::new(),
    };
    match outcome {
        Ok(done) => {
            result.installed = done.installed;
            result.uploaded = done.uploaded;
            ctx.log_event(PipelineEvent::BuildPassed {
                platform: ctx.platform.clone(),
                pair: pair.pair_id.clone(),
                duration_seconds: duration.as_secs_f64(),
                fingerprint: pair.fingerprint.clone(),
            });
        }
        Err(message) => {
            tracing::error!(platform = %ctx.platform, pair = %pair.pair_id, "tool build failed");
            ctx.log_event(PipelineEvent::BuildFailed {
                platform: ctx.platform.clone(),
                pair: pair.pair_id.clone(),
                error: message.clone(),
            });
            result.status = PairStatus::Failed;
            result.message = Some(message);
        }
    }
    Ok(result)
}

/// Run the setup and authentication stages. Returns the failure, if any.
fn run_setup(runner: &dyn Runner, ctx: &UnitContext) -> Result<Option<(SetupStage, String)>> {
    for line in &ctx.setup {
        let out = ctx.exec(runner, Invocation::shell(line.as_str()))?;
        if !out.success() {
            return Ok(Some((
                SetupStage::Environment,
                format!("`{}` exited {}:\n{}", line, out.exit_code, out.tail(FAILURE_TAIL)),
            )));
        }
    }
    if let Some(ref remote) = ctx.upload_remote {
        let out = ctx.exec(runner, pkgmgr::auth_invocation(&ctx.program, remote))?;
        if !out.success() {
            return Ok(Some((
                SetupStage::Authentication,
                format!("login to {} failed:\n{}", remote, out.tail(FAILURE_TAIL)),
            )));
        }
    }
    Ok(None)
}

/// Run one platform unit to completion and write its artifacts.
pub fn run_platform(
    runner: &dyn Runner,
    ctx: &UnitContext,
    batch: &PlatformBatch,
) -> Result<PlatformReport> {
    let start = Instant::now();
    tracing::info!(platform = %ctx.platform, pairs = batch.pairs.len(), "unit started");
    ctx.log_event(PipelineEvent::UnitStarted {
        platform: ctx.platform.clone(),
        run_id: ctx.run_id.clone(),
        prebake_version: env!("CARGO_PKG_VERSION").to_string(),
    });

    let mut results = Vec::new();
    let outcome = match run_setup(runner, ctx)? {
        Some((stage, error)) => {
            tracing::error!(platform = %ctx.platform, %stage, "setup stage failed");
            ctx.log_event(PipelineEvent::StageFailed {
                platform: ctx.platform.clone(),
                stage,
                error: error.clone(),
            });
            UnitOutcome::SetupFailed { stage, error }
        }
        None => {
            for pair in &batch.pairs {
                let result = run_pair(runner, ctx, pair)?;
                let failed = result.status == PairStatus::Failed;
                results.push(result);
                if failed && ctx.failure == FailurePolicy::StopOnFirst {
                    tracing::warn!(
                        platform = %ctx.platform,
                        pair = %pair.pair_id,
                        "stopping platform after first failure"
                    );
                    break;
                }
            }
            UnitOutcome::Completed
        }
    };

    let report = PlatformReport {
        platform: ctx.platform.clone(),
        arch: ctx.arch.clone(),
        outcome,
        results,
        duration: start.elapsed(),
    };
    finish_unit(ctx, &report)?;
    Ok(report)
}

fn finish_unit(ctx: &UnitContext, report: &PlatformReport) -> Result<()> {
    report::write_platform_reports(&ctx.reports_dir, report)?;
    state::save_ledger(
        &ctx.state_dir,
        &state::BuildLedger::from_report(&ctx.run_id, report),
    )?;
    ctx.log_event(PipelineEvent::UnitCompleted {
        platform: ctx.platform.clone(),
        run_id: ctx.run_id.clone(),
        passed: report.passed() as u32,
        failed: report.failed() as u32,
        total_seconds: report.duration.as_secs_f64(),
    });
    tracing::info!(
        platform = %ctx.platform,
        passed = report.passed(),
        failed = report.failed(),
        "unit completed"
    );
    Ok(())
}

/// Run every unit, concurrently when `parallel`, and join them all.
///
/// Reports come back in input order. The first unit error is returned
/// only after every unit has finished.
pub fn run_batches(
    runner: Arc<dyn Runner>,
    units: Vec<(UnitContext, PlatformBatch)>,
    parallel: bool,
) -> Result<Vec<PlatformReport>> {
    let outcomes: Vec<Result<PlatformReport>> = if parallel && units.len() > 1 {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Infrastructure(format!("cannot start runtime: {}", e)))?;
        rt.block_on(async {
            let handles: Vec<_> = units
                .into_iter()
                .map(|(ctx, batch)| {
                    let runner = Arc::clone(&runner);
                    let platform = ctx.platform.clone();
                    let handle = tokio::task::spawn_blocking(move || {
                        run_platform(runner.as_ref(), &ctx, &batch)
                    });
                    (platform, handle)
                })
                .collect();
            let mut outcomes = Vec::with_capacity(handles.len());
            for (platform, handle) in handles {
                outcomes.push(handle.await.unwrap_or_else(|e| {
                    Err(Error::Infrastructure(format!(
                        "unit '{}' did not complete: {}",
                        platform, e
                    )))
                }));
            }
            outcomes
        })
    } else {
        units
            .iter()
            .map(|(ctx, batch)| run_platform(runner.as_ref(), ctx, batch))
            .collect()
    };

    let mut reports = Vec::with_capacity(outcomes.len());
    let mut first_error = None;
    for outcome in outcomes {
        match outcome {
            Ok(report) => reports.push(report),
            Err(e) => {
                tracing::error!(error = %e, "platform unit aborted");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(reports),
    }
}

// ============================================================================
// Run summary
// ============================================================================

/// Recipe publication results for a run.
#[derive(Debug, Clone, Default)]
pub struct RecipeStage {
    pub changeset: Option<ChangeSet>,
    /// References exported into the local cache
    pub exported: Vec<String>,
    /// References uploaded to the branch remote
    pub uploaded: Vec<String>,
    pub lint_findings: Vec<LintFinding>,
}

/// Aggregate of everything a run produced.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub run_id: String,
    pub platforms: Vec<PlatformReport>,
    pub skipped_platforms: Vec<String>,
    pub recipes: RecipeStage,
    pub duration: Duration,
}

impl RunSummary {
    pub fn passed(&self) -> usize {
        self.platforms.iter().map(PlatformReport::passed).sum()
    }

    pub fn failed(&self) -> usize {
        self.platforms.iter().map(PlatformReport::failed).sum()
    }

    /// Units that never reached their builds.
    pub fn setup_failures(&self) -> usize {
        self.platforms
            .iter()
            .filter(|p| p.outcome != UnitOutcome::Completed)
            .count()
    }

    pub fn health(&self) -> Health {
        if self.platforms.iter().all(PlatformReport::is_healthy) {
            Health::Healthy
        } else {
            Health::Unhealthy
        }
    }

    /// Lint findings exist; does not affect health.
    pub fn degraded(&self) -> bool {
        !self.recipes.lint_findings.is_empty()
    }

    /// One-line summary for logs and notifications.
    pub fn headline(&self) -> String {
        let mut line = format!(
            "{} passed, {} failed across {} platform(s)",
            self.passed(),
            self.failed(),
            self.platforms.len()
        );
        if self.setup_failures() > 0 {
            line.push_str(&format!(", {} setup failure(s)", self.setup_failures()));
        }
        if self.degraded() {
            line.push_str(&format!(
                ", {} lint finding(s)",
                self.recipes.lint_findings.len()
            ));
        }
        line
    }
}
