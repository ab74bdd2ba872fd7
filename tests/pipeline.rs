//! End-to-end runs through the public API with a scripted runner.

use prebake::core::error::Result;
use prebake::core::notify::{Notification, NotificationSink};
use prebake::core::parser::parse_config;
use prebake::core::pipeline::{self, RunRequest};
use prebake::core::selector::{PlatformFilter, SelectionPolicy};
use prebake::core::state;
use prebake::core::types::{
    BuildDecision, BuildReason, ForceBuild, Health, Host, PairStatus, PipelineConfig,
};
use prebake::report::{self, eventlog};
use prebake::transport::{ExecOutput, Invocation, Runner};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

const PIPELINE: &str = r##"
version: "1.0"
name: recipe-index
notify:
  channel: "#recipes"
upload_exclude: [msys2]
prebuilt_tools:
  - cmake/3.25.3
  - package: ninja/1.11.1
    configs: [Release]
platforms:
  linux:
    build_tools: true
    host: { addr: localhost }
    configs:
      Release: { profile: linux-gcc-release }
      Debug: { profile: linux-gcc-debug, build_folder: out }
  windows:
    arch: x86_64
    build_tools: true
    configs:
      Release: { profile: msvc-release, settings: { compiler.runtime: dynamic } }
      Debug: { profile: msvc-debug }
  macos:
    arch: armv8
    build_tools: false
"##;

const CREATE_SUMMARY: &str = r#"{"installed": [
    {"recipe": {"id": "cmake/3.25.3#4b0c2f"}, "packages": [{"built": true}]},
    {"recipe": {"id": "msys2/cci.latest"}, "packages": [{"built": true}]},
    {"recipe": {"id": "openssl/3.1.0"}, "packages": [{"built": false}]}
]}"#;

/// Answers by program and first argument; records every command line.
struct ScriptedRunner {
    calls: Mutex<Vec<String>>,
    failing_platform_profile: Option<&'static str>,
}

impl ScriptedRunner {
    fn new(failing_platform_profile: Option<&'static str>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing_platform_profile,
        }
    }

    fn lines(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

fn output(exit_code: i32, stdout: &str) -> ExecOutput {
    ExecOutput {
        exit_code,
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

impl Runner for ScriptedRunner {
    fn run(&self, _host: &Host, invocation: &Invocation) -> Result<ExecOutput> {
        let line = invocation.command_line();
        self.calls.lock().unwrap().push(line.clone());
        let first = invocation.args.first().map(String::as_str);
        Ok(match (invocation.program.as_str(), first) {
            // Nothing is cached
            ("conan", Some("install")) => output(1, ""),
            ("conan", Some("create")) => match self.failing_platform_profile {
                Some(profile) if line.contains(profile) => output(1, "compiler crashed"),
                _ => output(0, ""),
            },
            ("cat", _) => output(0, CREATE_SUMMARY),
            _ => output(0, ""),
        })
    }
}

#[derive(Default)]
struct RecordingSink {
    sent: Mutex<Vec<Notification>>,
}

impl NotificationSink for RecordingSink {
    fn send(&self, notification: &Notification) -> Result<()> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

struct Workspace {
    _dir: tempfile::TempDir,
    repo: PathBuf,
    reports: PathBuf,
    state: PathBuf,
}

fn workspace() -> Workspace {
    let dir = tempfile::tempdir().unwrap();
    let repo = dir.path().join("repo");
    for (package, version, folder) in [("cmake", "3.25.3", "3.x"), ("ninja", "1.11.1", "all")] {
        let root = repo.join("recipes").join(package);
        std::fs::create_dir_all(root.join(folder)).unwrap();
        std::fs::write(
            root.join("config.yml"),
            format!("versions:\n  \"{version}\":\n    folder: \"{folder}\"\n"),
        )
        .unwrap();
    }
    Workspace {
        reports: dir.path().join("reports"),
        state: dir.path().join("state"),
        repo,
        _dir: dir,
    }
}

fn request<'a>(
    config: &'a PipelineConfig,
    ws: &'a Workspace,
    branch: &'a str,
) -> RunRequest<'a> {
    RunRequest {
        config,
        repo_root: &ws.repo,
        filter: PlatformFilter::All,
        selection: SelectionPolicy::Strict,
        branch,
        source_branch: None,
        change_proposal: false,
        packages: &[],
        upload: true,
        upload_all: true,
        export_only: false,
        force: ForceBuild::No,
        reports_dir: &ws.reports,
        state_dir: &ws.state,
    }
}

fn count(lines: &[String], prefix: &str) -> usize {
    lines.iter().filter(|l| l.starts_with(prefix)).count()
}

#[test]
fn test_capable_platforms_build_every_default_config() {
    let ws = workspace();
    let config = parse_config(PIPELINE).unwrap();
    let runner = Arc::new(ScriptedRunner::new(None));
    let sink = RecordingSink::default();

    let summary = pipeline::run(runner.clone(), &sink, &request(&config, &ws, "develop")).unwrap();

    let names: Vec<&str> = summary.platforms.iter().map(|p| p.platform.as_str()).collect();
    assert_eq!(names, vec!["linux", "windows"]);
    assert_eq!(summary.skipped_platforms, vec!["macos"]);
    for report in &summary.platforms {
        let pairs: Vec<&str> = report.results.iter().map(|r| r.pair_id.as_str()).collect();
        assert_eq!(
            pairs,
            vec![
                "cmake/3.25.3::Release",
                "cmake/3.25.3::Debug",
                "ninja/1.11.1::Release"
            ]
        );
        assert!(report
            .results
            .iter()
            .all(|r| r.decision == Some(BuildDecision::Build(BuildReason::Missing))));
    }
    assert_eq!(summary.health(), Health::Healthy);
    assert!(sink.sent.lock().unwrap().is_empty());

    let lines = runner.lines();
    assert_eq!(count(&lines, "conan create"), 6);
    assert_eq!(count(&lines, "conan user -p -r conan-index"), 2);
    // every installed reference except excluded packages is uploaded
    assert_eq!(count(&lines, "conan upload -r conan-index cmake/3.25.3@ --all --check"), 6);
    assert_eq!(count(&lines, "conan upload -r conan-index openssl/3.1.0@ --all --check"), 6);
    assert!(!lines.iter().any(|l| l.contains("msys2/cci.latest@")));
    // recipes are published before any tool build
    let first_create = lines.iter().position(|l| l.starts_with("conan create")).unwrap();
    let last_export = lines.iter().rposition(|l| l.starts_with("conan export")).unwrap();
    assert!(last_export < first_create);
    assert_eq!(summary.recipes.uploaded, vec!["cmake/3.25.3", "ninja/1.11.1"]);
    // stale cache exports are purged before publishing
    assert_eq!(count(&lines, "conan remove"), 2);

    for platform in ["linux", "windows"] {
        assert!(report::junit_path(&ws.reports, platform).exists());
        assert!(report::html_path(&ws.reports, platform).exists());
        let ledger = state::load_ledger(&ws.state, platform).unwrap().unwrap();
        assert_eq!(ledger.builds.len(), 3);
        let events = eventlog::read_events(&ws.state, platform).unwrap();
        assert!(events.len() >= 8);
    }
    assert!(state::load_ledger(&ws.state, "macos").unwrap().is_none());
}

#[test]
fn test_consecutive_unhealthy_runs_notify_once_then_recover() {
    let ws = workspace();
    let config = parse_config(PIPELINE).unwrap();
    let sink = RecordingSink::default();
    let req = request(&config, &ws, "develop");

    for _ in 0..2 {
        let broken = Arc::new(ScriptedRunner::new(Some("msvc-debug")));
        let summary = pipeline::run(broken, &sink, &req).unwrap();
        assert_eq!(summary.health(), Health::Unhealthy);
        let windows = &summary.platforms[1];
        assert_eq!(windows.failed(), 1);
        assert_eq!(windows.passed(), 2);
        assert_eq!(summary.platforms[0].failed(), 0);
    }
    {
        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].channel, "#recipes");
        assert!(sent[0].text.contains("windows: cmake/3.25.3::Debug"));
    }

    let fixed = Arc::new(ScriptedRunner::new(None));
    pipeline::run(fixed, &sink, &req).unwrap();
    let sent = sink.sent.lock().unwrap();
    assert_eq!(sent.len(), 2);
    assert!(sent[1].text.contains("healthy again"));
    let health = state::load_health(&ws.state, "develop").unwrap().unwrap();
    assert_eq!(health.health, Health::Healthy);
}

#[test]
fn test_single_platform_feature_branch_uses_staging() {
    let ws = workspace();
    let config = parse_config(PIPELINE).unwrap();
    let runner = Arc::new(ScriptedRunner::new(None));
    let mut req = request(&config, &ws, "feature/new-tool");
    req.filter = PlatformFilter::Named("windows".into());

    let summary = pipeline::run(runner.clone(), &RecordingSink::default(), &req).unwrap();

    assert_eq!(summary.platforms.len(), 1);
    assert_eq!(summary.platforms[0].results.len(), 3);
    assert!(summary.platforms[0]
        .results
        .iter()
        .all(|r| r.status == PairStatus::Passed));
    let lines = runner.lines();
    assert_eq!(count(&lines, "conan user -p -r conan-index-staging"), 1);
    assert!(!lines.iter().any(|l| l.contains("-r conan-index ")));
    assert!(state::health_path(&ws.state, "feature/new-tool").exists());
}
