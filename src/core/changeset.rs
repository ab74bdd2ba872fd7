//! Recipe change sets: which recipe folders changed since the last merge.
//!
//! The change set drives the recipe upload stage and the lint stage. It is
//! either the whole catalog or the folders touched between the merge
//! boundary and `HEAD`.

use super::catalog::{Catalog, RecipeTarget};
use super::error::{Error, Result};
use super::types::{Host, LintFinding, LintSettings, RecipeRef, UpstreamSettings};
use crate::pkgmgr;
use crate::transport::{Invocation, Runner};
use crate::vcs::Git;
use indexmap::IndexSet;
use std::path::Path;

/// Recipe folders a run publishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeSet {
    /// Every folder in the catalog
    All(Vec<RecipeTarget>),
    /// Folders changed since the merge boundary
    Changed(Vec<RecipeTarget>),
    /// Every folder of explicitly named packages
    Selected(Vec<RecipeTarget>),
}

impl ChangeSet {
    /// Every folder of the named packages, in the order given.
    pub fn selected(catalog: &Catalog, packages: &[String]) -> Result<Self> {
        let mut targets: IndexSet<RecipeTarget> = IndexSet::new();
        for package in packages {
            if !catalog.root().join(package).is_dir() {
                return Err(Error::Catalog(format!("no recipe for package '{}'", package)));
            }
            targets.extend(catalog.targets_of(package)?);
        }
        Ok(Self::Selected(targets.into_iter().collect()))
    }

    pub fn targets(&self) -> &[RecipeTarget] {
        match self {
            Self::All(t) | Self::Changed(t) | Self::Selected(t) => t,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.targets().is_empty()
    }
}

/// Resolve the change set for a run.
///
/// `source_branch` qualifies the upstream branch for change proposals; it
/// falls back to `upstream.branch`.
pub fn resolve(
    git: &Git<'_>,
    catalog: &Catalog,
    recipes_dir: &str,
    upload_all: bool,
    upstream: &UpstreamSettings,
    source_branch: Option<&str>,
) -> Result<ChangeSet> {
    if upload_all {
        return Ok(ChangeSet::All(catalog.all_targets()?));
    }
    let branch = source_branch.unwrap_or(&upstream.branch);
    let base = merge_boundary(git, &format!("{}/{}", upstream.remote, branch))?;
    tracing::info!(base = %base, "recipe change boundary");
    let files = git.changed_files(&base, "HEAD")?;
    Ok(ChangeSet::Changed(map_changed_files(
        catalog,
        recipes_dir,
        &files,
    )?))
}

/// Merge base of `HEAD` and the upstream ref; the previous merge when
/// building the upstream branch itself.
pub fn merge_boundary(git: &Git<'_>, upstream_ref: &str) -> Result<String> {
    let head = git.rev_parse("HEAD")?;
    let base = git.merge_base("HEAD", upstream_ref)?;
    if base == head {
        git.rev_parse("HEAD^1")
    } else {
        Ok(base)
    }
}

/// Map repository paths to recipe folders.
///
/// `recipes_dir` is relative to the repository root; a leading `./` is
/// ignored since git reports paths without it. A file inside `<recipes_dir>/<pkg>/<folder>/` maps to that folder; a file
/// directly under `<recipes_dir>/<pkg>/` maps to every folder of the
/// package. Folders that no longer exist are dropped.
pub fn map_changed_files(
    catalog: &Catalog,
    recipes_dir: &str,
    files: &[String],
) -> Result<Vec<RecipeTarget>> {
    let dir = recipes_dir.trim_start_matches("./").trim_end_matches('/');
    let prefix = format!("{}/", dir);
    let mut targets: IndexSet<RecipeTarget> = IndexSet::new();
    for file in files {
        let Some(rest) = file.strip_prefix(&prefix) else {
            continue;
        };
        let parts: Vec<&str> = rest.split('/').collect();
        match parts.as_slice() {
            [package, folder, _, ..] => {
                let target = RecipeTarget {
                    package: package.to_string(),
                    folder: folder.to_string(),
                };
                if catalog.folder_path(&target).is_dir() {
                    targets.insert(target);
                }
            }
            [package, _file] => {
                if catalog.root().join(package).is_dir() {
                    targets.extend(catalog.targets_of(package)?);
                }
            }
            _ => {}
        }
    }
    Ok(targets.into_iter().collect())
}

/// Export the recipe of every version in the change set, then upload it
/// when a remote is given.
///
/// Each package is removed from the local cache before its first export so
/// stale exports never reach the remote. Returns the exported references.
/// Any failure is fatal to the run.
pub fn upload_recipes(
    runner: &dyn Runner,
    host: &Host,
    program: &str,
    catalog: &Catalog,
    changeset: &ChangeSet,
    remote: Option<&str>,
) -> Result<Vec<String>> {
    let mut purged: IndexSet<&str> = IndexSet::new();
    let mut exported = Vec::new();
    for target in changeset.targets() {
        if purged.insert(target.package.as_str()) {
            run_recipe_step(
                runner,
                host,
                &target.package,
                pkgmgr::remove_invocation(program, &target.package),
            )?;
        }
        let folder = catalog.folder_path(target);
        let folder_str = folder.to_string_lossy();
        for version in catalog.versions_in_folder(target)? {
            let reference: RecipeRef = format!("{}/{}", target.package, version).parse()?;
            let label = reference.to_string();
            run_recipe_step(
                runner,
                host,
                &label,
                pkgmgr::export_invocation(program, &folder_str, &reference),
            )?;
            if let Some(remote) = remote {
                run_recipe_step(
                    runner,
                    host,
                    &label,
                    pkgmgr::upload_recipe_invocation(program, &reference, remote),
                )?;
                tracing::info!(reference = %reference, remote, "recipe uploaded");
            } else {
                tracing::info!(reference = %reference, "recipe exported");
            }
            exported.push(label);
        }
    }
    Ok(exported)
}

fn run_recipe_step(
    runner: &dyn Runner,
    host: &Host,
    subject: &str,
    invocation: Invocation,
) -> Result<()> {
    let out = runner.run(host, &invocation)?;
    if out.success() {
        return Ok(());
    }
    Err(Error::RecipeUpload(format!(
        "{} ({}): {}",
        subject,
        invocation.command_line(),
        out.tail(20)
    )))
}

/// Run the lint command over each changed folder.
///
/// Findings are degraded results and never fail the run.
pub fn lint_recipes(
    runner: &dyn Runner,
    host: &Host,
    lint: &LintSettings,
    catalog: &Catalog,
    changeset: &ChangeSet,
) -> Result<Vec<LintFinding>> {
    let Some((program, leading)) = lint.command.split_first() else {
        return Ok(Vec::new());
    };
    let mut findings = Vec::new();
    for target in changeset.targets() {
        let folder = catalog.folder_path(target);
        let invocation = Invocation::new(program.as_str())
            .args(leading.iter().cloned())
            .arg(folder.to_string_lossy());
        let out = runner.run(host, &invocation)?;
        if !out.success() {
            tracing::warn!(folder = %folder.display(), "lint findings");
            findings.push(LintFinding {
                folder: display_folder(catalog, &folder),
                output: out.tail(40),
            });
        }
    }
    Ok(findings)
}

fn display_folder(catalog: &Catalog, folder: &Path) -> String {
    folder
        .strip_prefix(catalog.root())
        .unwrap_or(folder)
        .to_string_lossy()
        .to_string()
}
