//! Merge the public recipe index into the local fork.
//!
//! A clean merge is pushed straight to the fork's branch. A conflicting
//! merge is aborted and handed to a pull request instead, carrying the
//! conflict details in its body. The outcome name is written to
//! [`MERGE_UPSTREAM_STATUS`] so CI can branch on it.

use super::Git;
use crate::core::error::{Error, Result};
use crate::core::types::MergeUpstreamSettings;
use crate::transport::Runner;
use serde::Deserialize;
use std::fmt;
use std::path::Path;

/// Status file written in the checkout root.
pub const MERGE_UPSTREAM_STATUS: &str = ".merge-upstream-status";

const PR_TITLE: &str = "Merge in changes from conan-io/master";
const LOG_FORMAT: &str = "--pretty=format:%h -%d %s (%cr) <%an>";

/// Outcome of a merge attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStatus {
    /// The fork already contained the index
    UpToDate,
    /// The merge was clean and has been pushed
    Merged,
    /// Conflicts were handed to a pull request
    PullRequest,
}

impl fmt::Display for MergeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UpToDate => write!(f, "UP_TO_DATE"),
            Self::Merged => write!(f, "MERGED"),
            Self::PullRequest => write!(f, "PULL_REQUEST"),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullRequestSummary {
    url: String,
    head_ref_name: String,
    head_repository_owner: Owner,
}

#[derive(Debug, Deserialize)]
struct Owner {
    login: String,
}

/// Merge the index into the fork, falling back to a pull request.
pub fn merge_upstream(
    runner: &dyn Runner,
    settings: &MergeUpstreamSettings,
    repo: &Path,
) -> Result<MergeStatus> {
    let repo_str = repo.to_string_lossy();
    let git = Git::new(runner, Some(&*repo_str));
    check_preconditions(&git, settings)?;
    tracing::info!(
        index = %settings.cci.url,
        fork = %settings.upstream.url(),
        branch = %settings.upstream.branch,
        "merge upstream"
    );

    let status_path = repo.join(MERGE_UPSTREAM_STATUS);
    match std::fs::remove_file(&status_path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(Error::io(&status_path, e)),
    }

    let status = preserving_checkout(&git, || {
        with_merge_remote(&git, settings, || merge_or_propose(&git, settings))
    })?;

    tracing::info!(%status, path = %status_path.display(), "write merge status");
    std::fs::write(&status_path, status.to_string()).map_err(|e| Error::io(&status_path, e))?;
    Ok(status)
}

fn check_preconditions(git: &Git<'_>, settings: &MergeUpstreamSettings) -> Result<()> {
    if !git.is_clean()? {
        return Err(Error::Merge(
            "the local worktree has uncommitted changes".to_string(),
        ));
    }
    let host = &settings.upstream.host;
    let auth = git.tool("gh", &["auth", "status", "--hostname", host])?;
    if !auth.success() {
        return Err(Error::Merge(format!(
            "GitHub CLI must be logged in to {} (or GH_TOKEN set)",
            host
        )));
    }
    Ok(())
}

/// Run `f`, then put the original branch back on its original commit.
fn preserving_checkout<T>(git: &Git<'_>, f: impl FnOnce() -> Result<T>) -> Result<T> {
    let branch = git.output(&["rev-parse", "--abbrev-ref", "HEAD"])?;
    let commit = git.rev_parse("HEAD")?;
    let result = f();

    tracing::info!(branch = %branch, "restore checkout");
    let restored = if branch == "HEAD" {
        git.run(&["checkout", "--quiet", "--detach", &commit])
            .and_then(|_| git.run(&["reset", "--hard", "HEAD"]))
    } else {
        git.run(&["checkout", "--quiet", "--force", &branch])
            .and_then(|_| git.run(&["reset", "--hard", &commit]))
    };
    match (result, restored) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), restored) => {
            if let Err(r) = restored {
                tracing::warn!(error = %r, "cannot restore checkout");
            }
            Err(e)
        }
    }
}

/// Run `f` with a temporary remote pointing at the fork.
fn with_merge_remote<T>(
    git: &Git<'_>,
    settings: &MergeUpstreamSettings,
    f: impl FnOnce() -> Result<T>,
) -> Result<T> {
    let name = settings.upstream.remote_name.as_str();
    let url = settings.upstream.url();
    let result = point_remote(git, name, &url).and_then(|_| f());

    if let Err(e) = git.status_of(&["remote", "remove", name]) {
        tracing::warn!(remote = name, error = %e, "cannot remove merge remote");
    }
    result
}

fn point_remote(git: &Git<'_>, name: &str, url: &str) -> Result<()> {
    let existing = git.status_of(&["remote", "get-url", name])?;
    if existing.success() && !existing.stdout.trim().is_empty() {
        git.run(&["remote", "set-url", name, url])?;
    } else {
        git.run(&["remote", "add", name, url])?;
    }
    git.run(&["remote", "update", name])
}

fn merge_or_propose(git: &Git<'_>, settings: &MergeUpstreamSettings) -> Result<MergeStatus> {
    let remote = &settings.upstream.remote_name;
    let branch = &settings.upstream.branch;
    let tracking = format!("{}/{}", remote, branch);

    git.run(&["checkout", "--quiet", "--detach", &tracking])?;
    git.run(&["fetch", &settings.cci.url, &settings.cci.branch])?;
    let merge = git.status_of(&[
        "merge",
        "--no-ff",
        "--no-edit",
        "--into-name",
        branch,
        "FETCH_HEAD",
    ])?;

    if merge.success() {
        let range = format!("{}..HEAD", tracking);
        let count: u64 = git
            .output(&["rev-list", &range, "--count"])?
            .parse()
            .map_err(|e| Error::Vcs(format!("unexpected rev-list output: {}", e)))?;
        if count == 0 {
            tracing::info!("fork is already up to date");
            return Ok(MergeStatus::UpToDate);
        }
        tracing::info!(commits = count, "push merge");
        git.run(&["push", remote, &format!("HEAD:refs/heads/{}", branch)])?;
        return Ok(MergeStatus::Merged);
    }

    let unmerged = git.status_of(&["ls-files", "-u"])?;
    if !(unmerged.success() && !unmerged.stdout.trim().is_empty()) {
        return Err(Error::Merge(format!(
            "merge failed without conflicts (exit {}): {}",
            merge.exit_code,
            merge.tail(20)
        )));
    }

    tracing::info!("merge has conflicts, opening a pull request");
    let body = pr_body(git, settings);
    git.run(&["merge", "--abort"])?;
    open_pull_request(git, settings, &body?)?;
    Ok(MergeStatus::PullRequest)
}

/// Pull request body listing the conflicting files and the commits that
/// touched them on each side.
fn pr_body(git: &Git<'_>, settings: &MergeUpstreamSettings) -> Result<String> {
    let files = git.output(&["diff", "--no-color", "--name-only", "--diff-filter=U"])?;
    let upstream = git.output(&["log", "--no-color", "--merge", "HEAD..MERGE_HEAD", LOG_FORMAT])?;
    let local = git.output(&["log", "--no-color", "--merge", "MERGE_HEAD..HEAD", LOG_FORMAT])?;
    Ok(format!(
        "Merge changes from conan-io/conan-center-index into {branch}.\n\n\
         This PR was automatically created due to merge conflicts in the automated merge.\n\n\
         ## Conflict information\n\n\
         ### List of conflict files\n\n{files}\n\n\
         ### Commits for conflict files on `conan-io`\n\n{upstream}\n\n\
         ### Commits for conflict files, local\n\n{local}\n",
        branch = settings.upstream.branch,
    ))
}

fn open_pull_request(git: &Git<'_>, settings: &MergeUpstreamSettings, body: &str) -> Result<()> {
    let pr = &settings.pull_request;
    let fork = pr.fork_name();
    let repo = settings.upstream.repo_slug();

    git.run(&["fetch", &settings.cci.url, &settings.cci.branch])?;
    git.run(&[
        "push",
        "--force",
        &pr.url(),
        &format!("FETCH_HEAD:refs/heads/{}", pr.merge_branch_name),
    ])?;

    let listed = gh(
        git,
        &[
            "pr",
            "list",
            "--repo",
            &repo,
            "--json",
            "number,url,author,headRefName,headRepositoryOwner",
        ],
    )?;
    let existing: Vec<PullRequestSummary> = if listed.trim().is_empty() {
        Vec::new()
    } else {
        serde_json::from_str::<Vec<PullRequestSummary>>(&listed)?
            .into_iter()
            .filter(|p| p.head_ref_name == pr.merge_branch_name && p.head_repository_owner.login == fork)
            .collect()
    };

    match existing.as_slice() {
        [] => {
            let head = format!("{}:{}", fork, pr.merge_branch_name);
            let labels = pr.labels.join(",");
            let reviewers = pr.reviewers.join(",");
            let mut args: Vec<&str> = vec![
                "pr",
                "create",
                "--repo",
                repo.as_str(),
                "--base",
                settings.upstream.branch.as_str(),
                "--title",
                PR_TITLE,
                "--body",
                body,
                "--head",
                head.as_str(),
            ];
            if !pr.labels.is_empty() {
                args.extend(["--label", labels.as_str()]);
            }
            if let Some(ref assignee) = pr.assignee {
                args.extend(["--assignee", assignee.as_str()]);
            }
            if !pr.reviewers.is_empty() {
                args.extend(["--reviewer", reviewers.as_str()]);
            }
            tracing::info!(repo = %repo, head = %head, "create pull request");
            gh(git, &args)?;
        }
        [one] => {
            tracing::info!(url = %one.url, "update existing pull request");
            gh(git, &["pr", "edit", "--repo", &repo, &one.url, "--body", body])?;
        }
        many => {
            return Err(Error::Merge(format!(
                "{} open pull requests from {}:{}; expected at most one",
                many.len(),
                fork,
                pr.merge_branch_name
            )));
        }
    }
    Ok(())
}

fn gh(git: &Git<'_>, args: &[&str]) -> Result<String> {
    let out = git.tool("gh", args)?;
    if !out.success() {
        return Err(Error::Merge(format!(
            "gh {} failed: {}",
            args.first().copied().unwrap_or_default(),
            out.tail(20)
        )));
    }
    Ok(out.stdout)
}
