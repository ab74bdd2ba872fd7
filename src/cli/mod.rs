//! CLI subcommands: init, validate, plan, upload-recipes, run, status,
//! merge-upstream, completions.

use crate::core::catalog::Catalog;
use crate::core::error::{Error, Result};
use crate::core::notify::{LogSink, NotificationSink, WebhookSink};
use crate::core::pipeline::{self, RunRequest};
use crate::core::selector::{self, PlatformFilter, SelectionPolicy};
use crate::core::types::{ForceBuild, Health, PipelineConfig, UnitOutcome};
use crate::core::{executor, parser, planner, state};
use crate::transport::{Runner, ShellRunner};
use crate::vcs::{merge, Git};
use clap::{CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "prebake",
    version,
    about = "Recipe index pipeline: platform fan-out, prebuilt tool builds, recipe uploads"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new pipeline
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Validate pipeline.yaml without running anything
    Validate {
        /// Path to pipeline.yaml
        #[arg(short, long, default_value = "pipeline.yaml")]
        file: PathBuf,
    },

    /// Show the build pairs a run would execute
    Plan {
        /// Path to pipeline.yaml
        #[arg(short, long, default_value = "pipeline.yaml")]
        file: PathBuf,

        /// Recipe repository checkout
        #[arg(long, default_value = ".")]
        repo: PathBuf,

        /// Platform to plan for, or "all"
        #[arg(short, long, default_value = "all")]
        platform: PlatformFilter,

        /// An unknown platform selects nothing instead of failing
        #[arg(long)]
        lenient: bool,
    },

    /// Export and upload changed recipes only
    UploadRecipes {
        /// Path to pipeline.yaml
        #[arg(short, long, default_value = "pipeline.yaml")]
        file: PathBuf,

        /// Recipe repository checkout
        #[arg(long, default_value = ".")]
        repo: PathBuf,

        /// Branch being built (default: current checkout)
        #[arg(long, env = "BRANCH_NAME")]
        branch: Option<String>,

        /// Upstream branch of a change proposal
        #[arg(long, env = "CHANGE_TARGET")]
        change_target: Option<String>,

        /// Upload every recipe, not just the changed ones
        #[arg(long)]
        upload_all: bool,

        /// Publish only these packages (repeatable)
        #[arg(long = "package", value_name = "NAME")]
        packages: Vec<String>,

        /// Export into the local cache without uploading
        #[arg(long)]
        no_upload: bool,
    },

    /// Run the pipeline
    Run {
        /// Path to pipeline.yaml
        #[arg(short, long, default_value = "pipeline.yaml")]
        file: PathBuf,

        /// Recipe repository checkout
        #[arg(long, default_value = ".")]
        repo: PathBuf,

        /// Platform to run, or "all"
        #[arg(short, long, default_value = "all")]
        platform: PlatformFilter,

        /// An unknown platform selects nothing instead of failing
        #[arg(long)]
        lenient: bool,

        /// Branch being built (default: current checkout)
        #[arg(long, env = "BRANCH_NAME")]
        branch: Option<String>,

        /// Upstream branch of a change proposal
        #[arg(long, env = "CHANGE_TARGET")]
        change_target: Option<String>,

        /// Change proposal id; marks the run as a proposal
        #[arg(long, env = "CHANGE_ID")]
        change_id: Option<String>,

        /// Upload recipes and built tools
        #[arg(long)]
        upload: bool,

        /// Upload every recipe, not just the changed ones
        #[arg(long)]
        upload_all: bool,

        /// Force building from source: no, package, with-requirements
        #[arg(long, default_value = "no")]
        force: ForceBuild,

        /// Report directory
        #[arg(long, default_value = "reports")]
        reports_dir: PathBuf,

        /// State directory
        #[arg(long, default_value = "state")]
        state_dir: PathBuf,
    },

    /// Show the last run's ledgers and lineage health
    Status {
        /// State directory
        #[arg(long, default_value = "state")]
        state_dir: PathBuf,

        /// Show one platform or lineage only
        #[arg(short, long)]
        platform: Option<String>,
    },

    /// Merge the public index into the fork, or open a pull request
    MergeUpstream {
        /// Path to pipeline.yaml
        #[arg(short, long, default_value = "pipeline.yaml")]
        file: PathBuf,

        /// Fork checkout
        #[arg(long, default_value = ".")]
        repo: PathBuf,
    },

    /// Print shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Plan {
            file,
            repo,
            platform,
            lenient,
        } => cmd_plan(&file, &repo, &platform, selection(lenient)),
        Commands::UploadRecipes {
            file,
            repo,
            branch,
            change_target,
            upload_all,
            packages,
            no_upload,
        } => cmd_upload_recipes(
            &file,
            &repo,
            branch.as_deref(),
            change_target.as_deref(),
            RecipeScope {
                upload_all,
                packages: &packages,
                upload: !no_upload,
            },
        ),
        Commands::Run {
            file,
            repo,
            platform,
            lenient,
            branch,
            change_target,
            change_id,
            upload,
            upload_all,
            force,
            reports_dir,
            state_dir,
        } => {
            let config = parse_and_validate(&file)?;
            let branch = resolve_branch(&ShellRunner, &repo, branch.as_deref())?;
            let req = RunRequest {
                config: &config,
                repo_root: &repo,
                filter: platform,
                selection: selection(lenient),
                branch: &branch,
                source_branch: change_target.as_deref(),
                change_proposal: change_id.is_some(),
                packages: &[],
                upload,
                upload_all,
                export_only: false,
                force,
                reports_dir: &reports_dir,
                state_dir: &state_dir,
            };
            cmd_run(&req)
        }
        Commands::Status {
            state_dir,
            platform,
        } => cmd_status(&state_dir, platform.as_deref()),
        Commands::MergeUpstream { file, repo } => cmd_merge_upstream(&file, &repo),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "prebake", &mut std::io::stdout());
            Ok(())
        }
    }
}

fn selection(lenient: bool) -> SelectionPolicy {
    if lenient {
        SelectionPolicy::Lenient
    } else {
        SelectionPolicy::Strict
    }
}

const TEMPLATE: &str = r#"version: "1.0"
name: my-recipe-index
recipes_dir: recipes

remotes:
  production: conan-index
  staging: conan-index-staging
  production_branches: [develop, master]

upstream:
  remote: origin
  branch: develop

policy:
  parallel_platforms: true
  failure: continue_independent

prebuilt_tools:
  - cmake/3.25.3

platforms:
  linux:
    arch: x86_64
    build_tools: true
    configs:
      Release:
        profile: linux-gcc-release
"#;

fn cmd_init(path: &Path) -> Result<()> {
    let config_path = path.join("pipeline.yaml");
    if config_path.exists() {
        return Err(Error::InvalidConfiguration(format!(
            "{} already exists",
            config_path.display()
        )));
    }

    let state_dir = path.join("state");
    std::fs::create_dir_all(&state_dir).map_err(|e| Error::io(&state_dir, e))?;
    std::fs::write(&config_path, TEMPLATE).map_err(|e| Error::io(&config_path, e))?;

    println!("Initialized prebake pipeline at {}", path.display());
    println!("  Created: {}", config_path.display());
    println!("  Created: {}/", state_dir.display());
    Ok(())
}

fn cmd_validate(file: &Path) -> Result<()> {
    let config = parse_and_validate(file)?;
    let tools: usize = config
        .platforms
        .values()
        .filter(|p| p.build_tools)
        .map(|p| config.tools_for(p).len())
        .sum();
    println!(
        "OK: {} ({} platforms, {} tool builds)",
        config.name,
        config.platforms.len(),
        tools
    );
    Ok(())
}

/// Load a validated pipeline file, printing every finding.
fn parse_and_validate(file: &Path) -> Result<PipelineConfig> {
    let loaded = parser::load_validated(file);
    if let Err(Error::Validation(ref errors)) = loaded {
        for e in errors {
            eprintln!("  ERROR: {}", e);
        }
    }
    loaded
}

/// Branch from the flag/environment, else the current checkout.
fn resolve_branch(runner: &dyn Runner, repo: &Path, branch: Option<&str>) -> Result<String> {
    if let Some(b) = branch.filter(|b| !b.is_empty()) {
        return Ok(b.to_string());
    }
    let repo_str = repo.to_string_lossy();
    Git::new(runner, Some(&*repo_str))
        .current_branch()?
        .ok_or_else(|| {
            Error::InvalidConfiguration(
                "cannot determine branch (detached HEAD); pass --branch".to_string(),
            )
        })
}

fn cmd_plan(
    file: &Path,
    repo: &Path,
    filter: &PlatformFilter,
    policy: SelectionPolicy,
) -> Result<()> {
    let config = parse_and_validate(file)?;
    let selected = selector::select_platforms_checked(&config, filter, policy)?;
    let catalog = Catalog::new(repo.join(&config.recipes_dir));
    let plan = planner::plan(&config, &catalog, &selected)?;
    print_plan(&config.name, &plan);
    Ok(())
}

/// Display a plan to stdout.
fn print_plan(name: &str, plan: &planner::BuildPlan) {
    println!(
        "Planning: {} ({} pairs on {} platforms)",
        name,
        plan.pair_count(),
        plan.batches.len()
    );
    println!();
    for batch in &plan.batches {
        println!("{}:", batch.platform);
        for pair in &batch.pairs {
            println!("  + {}  {}", pair.pair_id, pair.fingerprint);
        }
    }
    if !plan.skipped_platforms.is_empty() {
        println!();
        println!("Skipped (no tool builds): {}", plan.skipped_platforms.join(", "));
    }
}

/// Which recipes `upload-recipes` publishes, and where.
struct RecipeScope<'a> {
    upload_all: bool,
    packages: &'a [String],
    upload: bool,
}

fn cmd_upload_recipes(
    file: &Path,
    repo: &Path,
    branch: Option<&str>,
    change_target: Option<&str>,
    scope: RecipeScope<'_>,
) -> Result<()> {
    let config = parse_and_validate(file)?;
    let runner = ShellRunner;
    let branch = resolve_branch(&runner, repo, branch)?;
    let req = RunRequest {
        config: &config,
        repo_root: repo,
        filter: PlatformFilter::All,
        selection: SelectionPolicy::Strict,
        branch: &branch,
        source_branch: change_target,
        change_proposal: false,
        packages: scope.packages,
        upload: scope.upload,
        upload_all: scope.upload_all,
        export_only: !scope.upload,
        force: ForceBuild::No,
        reports_dir: Path::new("reports"),
        state_dir: Path::new("state"),
    };
    let stage = pipeline::recipe_stage(&runner, &req)?;
    for finding in &stage.lint_findings {
        println!("  LINT: {}", finding.folder);
    }
    if scope.upload {
        println!(
            "Uploaded {} recipe(s) to {}",
            stage.uploaded.len(),
            config.remotes.select(&branch)
        );
    } else {
        println!("Exported {} recipe(s)", stage.exported.len());
    }
    for reference in &stage.exported {
        println!("  {}", reference);
    }
    Ok(())
}

fn notification_sink(config: &PipelineConfig) -> Box<dyn NotificationSink> {
    match config.notify {
        Some(ref settings) => match WebhookSink::from_env(settings) {
            Ok(sink) => Box::new(sink),
            Err(e) => {
                tracing::warn!(error = %e, "webhook unavailable; notifications go to the log");
                Box::new(LogSink)
            }
        },
        None => Box::new(LogSink),
    }
}

fn cmd_run(req: &RunRequest<'_>) -> Result<()> {
    let sink = notification_sink(req.config);
    let summary = pipeline::run(Arc::new(ShellRunner), sink.as_ref(), req)?;
    print_summary(&summary);
    if summary.health() == Health::Unhealthy {
        return Err(Error::BuildsFailed(
            summary.failed() + summary.setup_failures(),
        ));
    }
    Ok(())
}

fn print_summary(summary: &executor::RunSummary) {
    if !summary.recipes.uploaded.is_empty() {
        println!("Recipes uploaded: {}", summary.recipes.uploaded.len());
    }
    for finding in &summary.recipes.lint_findings {
        println!("  LINT: {}", finding.folder);
    }
    for report in &summary.platforms {
        match &report.outcome {
            UnitOutcome::Completed => println!(
                "{} ({}): {} passed, {} failed ({:.1}s)",
                report.platform,
                report.arch,
                report.passed(),
                report.failed(),
                report.duration.as_secs_f64()
            ),
            UnitOutcome::SetupFailed { stage, .. } => {
                println!("{} ({}): {} stage FAILED", report.platform, report.arch, stage)
            }
        }
        for result in &report.results {
            let decision = result
                .decision
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!("    {} {} [{}]", result.status, result.pair_id, decision);
        }
    }
    println!();
    println!("Run {}: {}", summary.run_id, summary.headline());
}

fn cmd_status(state_dir: &Path, filter: Option<&str>) -> Result<()> {
    let entries = std::fs::read_dir(state_dir).map_err(|e| Error::io(state_dir, e))?;

    let mut names: Vec<String> = entries
        .flatten()
        .filter(|entry| entry.path().is_dir())
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .filter(|name| filter.is_none_or(|f| f == name.as_str()))
        .collect();
    names.sort();

    let mut found = false;
    for name in &names {
        if let Some(record) = state::load_health(state_dir, name)? {
            found = true;
            println!(
                "Lineage: {} is {} (run {}, {})",
                record.lineage, record.health, record.run_id, record.recorded_at
            );
        }
        if let Some(ledger) = state::load_ledger(state_dir, name)? {
            found = true;
            println!("Platform: {} (run {})", ledger.platform, ledger.run_id);
            println!("  Generated: {}", ledger.generated_at);
            println!("  Generator: {}", ledger.generator);
            println!("  Builds: {}", ledger.builds.len());
            for (pair, entry) in &ledger.builds {
                let decision = entry.decision.as_deref().unwrap_or("-");
                println!(
                    "    {}: {} [{}] ({:.2}s)",
                    pair, entry.status, decision, entry.duration_seconds
                );
            }
            println!();
        }
    }

    if !found {
        println!("No state found. Run `prebake run` first.");
    }
    Ok(())
}

fn cmd_merge_upstream(file: &Path, repo: &Path) -> Result<()> {
    let config = parse_and_validate(file)?;
    let status = merge::merge_upstream(&ShellRunner, &config.merge_upstream, repo)?;
    println!("{}", status);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{PairResult, PairStatus, PlatformReport};
    use crate::transport::fake::{fail_output, ok_output, FakeRunner};
    use std::time::Duration;

    const VALID: &str = r#"
version: "1.0"
name: test-index
prebuilt_tools: [cmake/3.25.3]
platforms:
  linux:
    build_tools: true
    configs:
      Release: { profile: linux-release }
  docs: {}
"#;

    fn write_config(dir: &Path, yaml: &str) -> PathBuf {
        let path = dir.join("pipeline.yaml");
        std::fs::write(&path, yaml).unwrap();
        path
    }

    fn write_catalog(repo: &Path) {
        let root = repo.join("recipes");
        std::fs::create_dir_all(root.join("cmake/3.x")).unwrap();
        std::fs::write(
            root.join("cmake/config.yml"),
            "versions:\n  \"3.25.3\":\n    folder: \"3.x\"\n",
        )
        .unwrap();
    }

    #[test]
    fn test_init() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("index");
        std::fs::create_dir_all(&sub).unwrap();
        cmd_init(&sub).unwrap();
        assert!(sub.join("pipeline.yaml").exists());
        assert!(sub.join("state").is_dir());
    }

    #[test]
    fn test_init_template_validates() {
        let dir = tempfile::tempdir().unwrap();
        cmd_init(dir.path()).unwrap();
        cmd_validate(&dir.path().join("pipeline.yaml")).unwrap();
    }

    #[test]
    fn test_init_already_exists() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pipeline.yaml"), "exists").unwrap();
        assert!(cmd_init(dir.path()).is_err());
    }

    #[test]
    fn test_validate_valid() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_config(dir.path(), VALID);
        cmd_validate(&file).unwrap();
    }

    #[test]
    fn test_validate_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_config(
            dir.path(),
            r#"
version: "2.0"
name: ""
platforms: {}
"#,
        );
        let err = cmd_validate(&file).unwrap_err();
        assert!(matches!(err, Error::Validation(ref v) if v.len() == 3));
    }

    #[test]
    fn test_plan() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_config(dir.path(), VALID);
        write_catalog(dir.path());
        cmd_plan(&file, dir.path(), &PlatformFilter::All, SelectionPolicy::Strict).unwrap();
    }

    #[test]
    fn test_plan_unknown_platform() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_config(dir.path(), VALID);
        write_catalog(dir.path());
        let filter = PlatformFilter::Named("solaris".into());
        assert!(matches!(
            cmd_plan(&file, dir.path(), &filter, SelectionPolicy::Strict),
            Err(Error::UnknownPlatform(_))
        ));
        cmd_plan(&file, dir.path(), &filter, SelectionPolicy::Lenient).unwrap();
    }

    #[test]
    fn test_plan_missing_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_config(dir.path(), VALID);
        assert!(cmd_plan(&file, dir.path(), &PlatformFilter::All, SelectionPolicy::Strict).is_err());
    }

    #[test]
    fn test_resolve_branch_prefers_flag() {
        let runner = FakeRunner::ok();
        let branch = resolve_branch(&runner, Path::new("."), Some("release/1.x")).unwrap();
        assert_eq!(branch, "release/1.x");
        assert!(runner.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_resolve_branch_from_checkout() {
        let runner = FakeRunner::new(|_, _| Ok(ok_output("develop\n")));
        assert_eq!(
            resolve_branch(&runner, Path::new("."), Some("")).unwrap(),
            "develop"
        );
        let detached = FakeRunner::new(|_, _| Ok(fail_output(1, "")));
        assert!(resolve_branch(&detached, Path::new("."), None).is_err());
    }

    #[test]
    fn test_status_empty() {
        let dir = tempfile::tempdir().unwrap();
        cmd_status(dir.path(), None).unwrap();
    }

    #[test]
    fn test_status_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(cmd_status(&dir.path().join("nope"), None).is_err());
    }

    #[test]
    fn test_status_with_ledger_and_health() {
        let dir = tempfile::tempdir().unwrap();
        let report = PlatformReport {
            platform: "linux".into(),
            arch: "x86_64".into(),
            outcome: UnitOutcome::Completed,
            results: vec![PairResult {
                pair_id: "cmake/3.25.3::Release".into(),
                tool: "cmake/3.25.3".into(),
                config: "Release".into(),
                fingerprint: "blake3:00".into(),
                status: PairStatus::Passed,
                decision: None,
                message: None,
                duration: Duration::from_millis(1500),
                installed: Vec::new(),
                uploaded: Vec::new(),
            }],
            duration: Duration::from_secs(2),
        };
        state::save_ledger(dir.path(), &state::BuildLedger::from_report("r-1", &report)).unwrap();
        state::save_health(dir.path(), "develop", Health::Healthy, "r-1").unwrap();
        cmd_status(dir.path(), None).unwrap();
        cmd_status(dir.path(), Some("linux")).unwrap();
    }

    #[test]
    fn test_dispatch_init_and_validate() {
        let dir = tempfile::tempdir().unwrap();
        dispatch(Commands::Init {
            path: dir.path().to_path_buf(),
        })
        .unwrap();
        dispatch(Commands::Validate {
            file: dir.path().join("pipeline.yaml"),
        })
        .unwrap();
    }

    #[test]
    fn test_cli_parses_run_flags() {
        let cli = Cli::try_parse_from([
            "prebake",
            "run",
            "--platform",
            "linux",
            "--branch",
            "develop",
            "--force",
            "with-requirements",
            "--upload",
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                platform,
                force,
                upload,
                branch,
                ..
            } => {
                assert_eq!(platform, PlatformFilter::Named("linux".into()));
                assert_eq!(force, ForceBuild::WithRequirements);
                assert!(upload);
                assert_eq!(branch.as_deref(), Some("develop"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_parses_upload_recipes_scope() {
        let cli = Cli::try_parse_from([
            "prebake",
            "upload-recipes",
            "--package",
            "zlib",
            "--package",
            "cmake",
            "--no-upload",
        ])
        .unwrap();
        match cli.command {
            Commands::UploadRecipes {
                packages,
                no_upload,
                upload_all,
                ..
            } => {
                assert_eq!(packages, vec!["zlib", "cmake"]);
                assert!(no_upload);
                assert!(!upload_all);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_validate_prints_findings_through_loader() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_config(dir.path(), "version: \"1.0\"\nname: x\nplatforms: {}\n");
        assert!(matches!(
            parse_and_validate(&file),
            Err(Error::Validation(ref v)) if v.len() == 1
        ));
        assert!(matches!(
            parse_and_validate(&dir.path().join("missing.yaml")),
            Err(Error::Io { .. })
        ));
    }

    #[test]
    fn test_cli_rejects_bad_force_mode() {
        assert!(Cli::try_parse_from(["prebake", "run", "--force", "always"]).is_err());
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }
}
