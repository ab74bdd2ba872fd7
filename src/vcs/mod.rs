//! Git helpers over a [`Runner`].
//!
//! All repository access goes through the same runner seam as the package
//! manager, so tests can script git output.

pub mod merge;

use crate::core::error::{Error, Result};
use crate::core::types::Host;
use crate::transport::{ExecOutput, Invocation, Runner};

/// A checkout on the local host.
pub struct Git<'a> {
    runner: &'a dyn Runner,
    host: Host,
    cwd: Option<String>,
}

impl<'a> Git<'a> {
    pub fn new(runner: &'a dyn Runner, cwd: Option<&str>) -> Self {
        Self {
            runner,
            host: Host::default(),
            cwd: cwd.map(str::to_string),
        }
    }

    fn invocation(&self, program: &str, args: &[&str]) -> Invocation {
        Invocation::new(program)
            .args(args.iter().copied())
            .cwd(self.cwd.as_deref())
    }

    /// Run git and return the raw output, whatever the exit code.
    pub fn status_of(&self, args: &[&str]) -> Result<ExecOutput> {
        self.runner.run(&self.host, &self.invocation("git", args))
    }

    /// Run git and return trimmed stdout; a non-zero exit is an error.
    pub fn output(&self, args: &[&str]) -> Result<String> {
        let out = self.status_of(args)?;
        if !out.success() {
            return Err(Error::Vcs(format!(
                "git {} failed (exit {}): {}",
                args.join(" "),
                out.exit_code,
                out.stderr.trim()
            )));
        }
        Ok(out.stdout.trim().to_string())
    }

    /// Run git for its side effect.
    pub fn run(&self, args: &[&str]) -> Result<()> {
        self.output(args).map(|_| ())
    }

    /// Run another program (the forge CLI) in the same checkout.
    pub fn tool(&self, program: &str, args: &[&str]) -> Result<ExecOutput> {
        self.runner.run(&self.host, &self.invocation(program, args))
    }

    pub fn rev_parse(&self, rev: &str) -> Result<String> {
        self.output(&["rev-parse", rev])
    }

    pub fn merge_base(&self, a: &str, b: &str) -> Result<String> {
        self.output(&["merge-base", a, b])
    }

    /// Files changed between two revisions.
    pub fn changed_files(&self, base: &str, head: &str) -> Result<Vec<String>> {
        Ok(self
            .output(&["diff", "--name-only", base, head])?
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Current branch name, or None when detached.
    pub fn current_branch(&self) -> Result<Option<String>> {
        let out = self.status_of(&["symbolic-ref", "-q", "--short", "HEAD"])?;
        if out.success() {
            Ok(Some(out.stdout.trim().to_string()))
        } else {
            Ok(None)
        }
    }

    /// Whether the worktree and index match HEAD.
    pub fn is_clean(&self) -> Result<bool> {
        Ok(self.status_of(&["diff-index", "--quiet", "HEAD", "--"])?.success())
    }

    pub fn remotes(&self) -> Result<Vec<String>> {
        Ok(self
            .output(&["remote"])?
            .lines()
            .map(str::to_string)
            .collect())
    }
}
