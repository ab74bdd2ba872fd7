//! A full pipeline run.
//!
//! lock → select → plan → change set → lint → recipe upload → fan-out →
//! aggregate → notify

use super::catalog::Catalog;
use super::changeset::{self, ChangeSet};
use super::error::Result;
use super::executor::{self, RecipeStage, RunOptions, RunSummary, UnitContext};
use super::notify::{self, NotificationSink, NotifyRequest};
use super::planner::{self, BuildPlan};
use super::selector::{self, PlatformFilter, SelectionPolicy};
use super::state::RunLock;
use super::types::{ForceBuild, Host, PipelineConfig};
use crate::report::eventlog;
use crate::transport::Runner;
use crate::vcs::Git;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Inputs for one run.
pub struct RunRequest<'a> {
    pub config: &'a PipelineConfig,
    /// Root of the recipe repository checkout
    pub repo_root: &'a Path,
    pub filter: PlatformFilter,
    pub selection: SelectionPolicy,
    /// Branch being built; names the lineage
    pub branch: &'a str,
    /// Upstream branch qualifier for change proposals
    pub source_branch: Option<&'a str>,
    pub change_proposal: bool,
    /// Publish these packages instead of the detected change set
    pub packages: &'a [String],
    pub upload: bool,
    pub upload_all: bool,
    /// Export recipes into the local cache even when not uploading
    pub export_only: bool,
    pub force: ForceBuild,
    pub reports_dir: &'a Path,
    pub state_dir: &'a Path,
}

impl RunRequest<'_> {
    pub fn catalog(&self) -> Catalog {
        Catalog::new(self.repo_root.join(&self.config.recipes_dir))
    }

    /// Remote for this branch, or None when not uploading.
    pub fn upload_remote(&self) -> Option<String> {
        self.upload
            .then(|| self.config.remotes.select(self.branch).to_string())
    }

    fn notify_request(&self) -> NotifyRequest<'_> {
        NotifyRequest {
            state_dir: self.state_dir,
            pipeline: &self.config.name,
            lineage: self.branch,
            channel: self
                .config
                .notify
                .as_ref()
                .map(|n| n.channel.as_str())
                .unwrap_or_default(),
            change_proposal: self.change_proposal,
        }
    }
}

/// Resolve the change set, lint it, then export and upload its recipes.
pub fn recipe_stage(runner: &dyn Runner, req: &RunRequest<'_>) -> Result<RecipeStage> {
    let lint = req.config.lint.as_ref();
    let remote = req.upload_remote();
    let publish = remote.is_some() || req.export_only;
    if lint.is_none() && !publish {
        return Ok(RecipeStage::default());
    }

    let catalog = req.catalog();
    let changeset = if req.packages.is_empty() {
        let repo = req.repo_root.to_string_lossy();
        let git = Git::new(runner, Some(&*repo));
        changeset::resolve(
            &git,
            &catalog,
            &req.config.recipes_dir,
            req.upload_all,
            &req.config.upstream,
            req.source_branch,
        )?
    } else {
        ChangeSet::selected(&catalog, req.packages)?
    };
    tracing::info!(
        folders = changeset.targets().len(),
        all = matches!(changeset, ChangeSet::All(_)),
        "recipe change set"
    );

    let host = Host::default();
    let lint_findings = match lint {
        Some(settings) => changeset::lint_recipes(runner, &host, settings, &catalog, &changeset)?,
        None => Vec::new(),
    };
    let exported = if publish {
        changeset::upload_recipes(
            runner,
            &host,
            &req.config.package_manager.program,
            &catalog,
            &changeset,
            remote.as_deref(),
        )?
    } else {
        Vec::new()
    };
    let uploaded = if remote.is_some() {
        exported.clone()
    } else {
        Vec::new()
    };
    Ok(RecipeStage {
        changeset: Some(changeset),
        exported,
        uploaded,
        lint_findings,
    })
}

/// Run the whole pipeline for one branch.
///
/// Planning happens before any command runs, so configuration and catalog
/// errors leave no trace. A run-fatal error after that point counts as an
/// unhealthy run for notification purposes before it is returned.
/// Notification failures are logged and never fail the run.
pub fn run(
    runner: Arc<dyn Runner>,
    sink: &dyn NotificationSink,
    req: &RunRequest<'_>,
) -> Result<RunSummary> {
    let start = Instant::now();
    let run_id = eventlog::generate_run_id();
    let lock = RunLock::acquire(req.state_dir, req.branch, &run_id)?;
    tracing::info!(
        run_id = %run_id,
        branch = req.branch,
        lock = %lock.path().display(),
        "run started"
    );

    let selected = selector::select_platforms_checked(req.config, &req.filter, req.selection)?;
    let plan = planner::plan(req.config, &req.catalog(), &selected)?;
    for skipped in &plan.skipped_platforms {
        tracing::info!(platform = %skipped, "platform does not build tools; skipped");
    }

    let notify_req = req.notify_request();
    let summary = match execute(runner, req, plan, &run_id, start) {
        Ok(summary) => summary,
        Err(e) if e.is_fatal_to_run() => {
            tracing::error!(run_id = %run_id, error = %e, "run aborted");
            if let Err(ne) = notify::notify_aborted(sink, &notify_req, &run_id, &e) {
                tracing::error!(error = %ne, "notification failed");
            }
            return Err(e);
        }
        Err(e) => return Err(e),
    };

    if let Err(e) = notify::notify_run(sink, &notify_req, &summary) {
        tracing::error!(error = %e, "notification failed");
    }

    tracing::info!(health = %summary.health(), "{}", summary.headline());
    Ok(summary)
}

/// Everything after planning: recipes, then the platform fan-out.
fn execute(
    runner: Arc<dyn Runner>,
    req: &RunRequest<'_>,
    plan: BuildPlan,
    run_id: &str,
    start: Instant,
) -> Result<RunSummary> {
    let recipes = recipe_stage(runner.as_ref(), req)?;

    let opts = RunOptions {
        run_id: run_id.to_string(),
        force: req.force,
        upload_remote: req.upload_remote(),
        reports_dir: req.reports_dir.to_path_buf(),
        state_dir: req.state_dir.to_path_buf(),
    };
    let units = plan
        .batches
        .into_iter()
        .map(|batch| Ok((UnitContext::for_platform(req.config, &batch.platform, &opts)?, batch)))
        .collect::<Result<Vec<_>>>()?;
    let platforms =
        executor::run_batches(runner, units, req.config.policy.parallel_platforms)?;

    Ok(RunSummary {
        run_id: run_id.to_string(),
        platforms,
        skipped_platforms: plan.skipped_platforms,
        recipes,
        duration: start.elapsed(),
    })
}
