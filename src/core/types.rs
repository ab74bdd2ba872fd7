//! Pipeline document types and run-time records.
//!
//! Defines the YAML schema for platforms, build configurations, prebuilt
//! tools and remotes, plus the per-pair and per-platform results a run
//! produces. Configuration types derive Serialize/Deserialize so that
//! `pipeline.yaml` round-trips.

use super::error::{Error, Result};
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

// ============================================================================
// Top-level pipeline.yaml
// ============================================================================

/// Root configuration for a recipe index pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Schema version (must be "1.0")
    pub version: String,

    /// Human-readable pipeline name
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Root of the recipe catalog
    #[serde(default = "default_recipes_dir")]
    pub recipes_dir: String,

    #[serde(default)]
    pub package_manager: PackageManagerSettings,

    #[serde(default)]
    pub remotes: Remotes,

    /// Reference used to find the merge boundary for incremental uploads
    #[serde(default)]
    pub upstream: UpstreamSettings,

    #[serde(default)]
    pub notify: Option<NotifySettings>,

    #[serde(default)]
    pub lint: Option<LintSettings>,

    /// Package names never uploaded after a tool build
    #[serde(default)]
    pub upload_exclude: Vec<String>,

    #[serde(default)]
    pub policy: Policy,

    /// Tools built on every tool-build-capable platform
    #[serde(default)]
    pub prebuilt_tools: Vec<ToolEntry>,

    /// Platform registry (order-preserving)
    pub platforms: IndexMap<String, Platform>,

    #[serde(default)]
    pub merge_upstream: MergeUpstreamSettings,
}

fn default_recipes_dir() -> String {
    "recipes".to_string()
}

impl PipelineConfig {
    /// The tool list that applies to a platform.
    pub fn tools_for<'a>(&'a self, platform: &'a Platform) -> &'a [ToolEntry] {
        platform
            .prebuilt_tools
            .as_deref()
            .unwrap_or(&self.prebuilt_tools)
    }
}

/// The external package manager CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageManagerSettings {
    #[serde(default = "default_program")]
    pub program: String,
}

impl Default for PackageManagerSettings {
    fn default() -> Self {
        Self {
            program: default_program(),
        }
    }
}

fn default_program() -> String {
    "conan".to_string()
}

// ============================================================================
// Platforms
// ============================================================================

/// A named platform: one execution resource with its build configurations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Platform {
    /// CPU architecture tag
    #[serde(default = "default_arch")]
    pub arch: String,

    /// Whether this platform builds prebuilt tools
    #[serde(default)]
    pub build_tools: bool,

    /// Where the platform's commands execute
    #[serde(default)]
    pub host: Host,

    /// Checkout location on the host
    #[serde(default)]
    pub workdir: Option<String>,

    /// Extra environment for every command on this platform
    #[serde(default)]
    pub env: IndexMap<String, String>,

    /// Environment setup lines, run before anything else
    #[serde(default)]
    pub setup: Vec<String>,

    /// Declared build configurations
    #[serde(default)]
    pub configs: IndexMap<String, BuildConfig>,

    /// Default configuration list for tool builds (empty = all declared)
    #[serde(default)]
    pub tool_configs: Vec<String>,

    /// Replaces the top-level tool list for this platform
    #[serde(default)]
    pub prebuilt_tools: Option<Vec<ToolEntry>>,
}

fn default_arch() -> String {
    "x86_64".to_string()
}

impl Platform {
    /// Default configuration list, in declaration order.
    pub fn default_configs(&self) -> Vec<String> {
        if self.tool_configs.is_empty() {
            self.configs.keys().cloned().collect()
        } else {
            self.tool_configs.clone()
        }
    }
}

/// Execution host for a platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    /// Network address (IP or DNS)
    #[serde(default = "default_addr")]
    pub addr: String,

    /// SSH user
    #[serde(default = "default_user")]
    pub user: String,

    /// Path to SSH private key
    #[serde(default)]
    pub ssh_key: Option<String>,
}

impl Default for Host {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            user: default_user(),
            ssh_key: None,
        }
    }
}

fn default_addr() -> String {
    "localhost".to_string()
}

fn default_user() -> String {
    "root".to_string()
}

/// A named set of profile, settings and options applied to a build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Host profile
    pub profile: String,

    /// Build-context profile
    #[serde(default)]
    pub profile_build: Option<String>,

    /// Folder (relative to the workdir) for build outputs
    #[serde(default)]
    pub build_folder: Option<String>,

    /// Extra `--build` entries
    #[serde(default)]
    pub build: Vec<String>,

    #[serde(default)]
    pub settings: IndexMap<String, String>,

    #[serde(default)]
    pub options: Vec<BuildOption>,
}

// ============================================================================
// Recipe references
// ============================================================================

static REF_PART: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_+.\-]*$").expect("static pattern"));

/// `name/version[@user/channel]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecipeRef {
    pub name: String,
    pub version: String,
    /// `user/channel`
    pub qualifier: Option<String>,
}

impl RecipeRef {
    /// The reference as the package manager CLI expects it; an unqualified
    /// reference gets a trailing `@`.
    pub fn cli_ref(&self) -> String {
        match self.qualifier {
            Some(_) => self.to_string(),
            None => format!("{}@", self),
        }
    }
}

impl FromStr for RecipeRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidReference {
            reference: s.to_string(),
            reason: reason.to_string(),
        };
        // Drop a recipe revision, as found in package manager summaries
        let s_trim = s.split('#').next().unwrap_or(s);
        let (base, qualifier) = match s_trim.split_once('@') {
            Some((base, "")) => (base, None),
            Some((base, q)) => (base, Some(q)),
            None => (s_trim, None),
        };
        let (name, version) = base
            .split_once('/')
            .ok_or_else(|| invalid("expected name/version"))?;
        if !REF_PART.is_match(name) {
            return Err(invalid("bad package name"));
        }
        if !REF_PART.is_match(version) {
            return Err(invalid("bad version"));
        }
        if let Some(q) = qualifier {
            let ok = q
                .split_once('/')
                .is_some_and(|(u, c)| REF_PART.is_match(u) && REF_PART.is_match(c));
            if !ok {
                return Err(invalid("qualifier must be user/channel"));
            }
        }
        Ok(Self {
            name: name.to_string(),
            version: version.to_string(),
            qualifier: qualifier.map(str::to_string),
        })
    }
}

impl TryFrom<String> for RecipeRef {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<RecipeRef> for String {
    fn from(r: RecipeRef) -> String {
        r.to_string()
    }
}

impl fmt::Display for RecipeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.version)?;
        if let Some(ref q) = self.qualifier {
            write!(f, "@{}", q)?;
        }
        Ok(())
    }
}

// ============================================================================
// Build options
// ============================================================================

/// A package option passed to the package manager.
///
/// `shared` and `fPIC` are recognized and their values validated; any other
/// key is forwarded untouched through `Passthrough`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BuildOption {
    Shared { scope: Option<String>, value: bool },
    Fpic { scope: Option<String>, value: bool },
    Passthrough {
        scope: Option<String>,
        key: String,
        value: String,
    },
}

impl BuildOption {
    pub fn scope(&self) -> Option<&str> {
        match self {
            Self::Shared { scope, .. } | Self::Fpic { scope, .. } | Self::Passthrough { scope, .. } => {
                scope.as_deref()
            }
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Shared { .. } => "shared",
            Self::Fpic { .. } => "fPIC",
            Self::Passthrough { key, .. } => key,
        }
    }
}

fn parse_option_bool(option: &str, value: &str) -> Result<bool> {
    match value {
        "True" | "true" => Ok(true),
        "False" | "false" => Ok(false),
        _ => Err(Error::InvalidOption {
            option: option.to_string(),
            reason: format!("expected True or False, got '{}'", value),
        }),
    }
}

impl FromStr for BuildOption {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (lhs, value) = s.split_once('=').ok_or_else(|| Error::InvalidOption {
            option: s.to_string(),
            reason: "expected [scope:]key=value".to_string(),
        })?;
        let (scope, key) = match lhs.split_once(':') {
            Some((scope, key)) => (Some(scope.to_string()), key),
            None => (None, lhs),
        };
        if key.is_empty() || scope.as_deref() == Some("") {
            return Err(Error::InvalidOption {
                option: s.to_string(),
                reason: "empty scope or key".to_string(),
            });
        }
        Ok(match key {
            "shared" => Self::Shared {
                scope,
                value: parse_option_bool(s, value)?,
            },
            "fPIC" => Self::Fpic {
                scope,
                value: parse_option_bool(s, value)?,
            },
            _ => Self::Passthrough {
                scope,
                key: key.to_string(),
                value: value.to_string(),
            },
        })
    }
}

impl TryFrom<String> for BuildOption {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<BuildOption> for String {
    fn from(o: BuildOption) -> String {
        o.to_string()
    }
}

impl fmt::Display for BuildOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(scope) = self.scope() {
            write!(f, "{}:", scope)?;
        }
        match self {
            Self::Shared { value, .. } | Self::Fpic { value, .. } => {
                let v = if *value { "True" } else { "False" };
                write!(f, "{}={}", self.key(), v)
            }
            Self::Passthrough { key, value, .. } => write!(f, "{}={}", key, value),
        }
    }
}

// ============================================================================
// Prebuilt tools
// ============================================================================

/// A tool-build entry: a bare reference or a detailed map.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolEntry {
    Reference(String),
    Detailed(ToolDetail),
}

/// Detailed form of a tool-build entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDetail {
    pub package: String,

    #[serde(default)]
    pub options: Vec<String>,

    /// Explicit configuration list, narrowing the platform default
    #[serde(default)]
    pub configs: Vec<String>,

    /// Alternate recipe catalog root
    #[serde(default)]
    pub recipe_from: Option<String>,
}

/// A tool-build entry with its reference and options parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSpec {
    pub reference: RecipeRef,
    pub options: Vec<BuildOption>,
    pub configs: Vec<String>,
    pub recipe_from: Option<String>,
}

impl ToolEntry {
    /// Parse into a typed spec.
    pub fn spec(&self) -> Result<ToolSpec> {
        match self {
            Self::Reference(r) => Ok(ToolSpec {
                reference: r.parse()?,
                options: Vec::new(),
                configs: Vec::new(),
                recipe_from: None,
            }),
            Self::Detailed(d) => Ok(ToolSpec {
                reference: d.package.parse()?,
                options: d
                    .options
                    .iter()
                    .map(|o| o.parse())
                    .collect::<Result<Vec<_>>>()?,
                configs: d.configs.clone(),
                recipe_from: d.recipe_from.clone(),
            }),
        }
    }

    /// The raw reference string, for messages.
    pub fn package(&self) -> &str {
        match self {
            Self::Reference(r) => r,
            Self::Detailed(d) => &d.package,
        }
    }
}

impl ToolSpec {
    /// `package[_opt1_opt2]`, used in pair ids and reports.
    pub fn label(&self) -> String {
        if self.options.is_empty() {
            return self.reference.to_string();
        }
        let opts: Vec<String> = self.options.iter().map(ToString::to_string).collect();
        format!("{}_{}", self.reference, opts.join("_"))
    }
}

// ============================================================================
// Remotes, upstream, notify, lint, policy
// ============================================================================

/// The two artifact repository remotes, chosen by branch name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Remotes {
    #[serde(default = "default_production_remote")]
    pub production: String,

    #[serde(default = "default_staging_remote")]
    pub staging: String,

    /// Glob patterns of branches that publish to production
    #[serde(default = "default_production_branches")]
    pub production_branches: Vec<String>,
}

impl Default for Remotes {
    fn default() -> Self {
        Self {
            production: default_production_remote(),
            staging: default_staging_remote(),
            production_branches: default_production_branches(),
        }
    }
}

fn default_production_remote() -> String {
    "conan-index".to_string()
}

fn default_staging_remote() -> String {
    "conan-index-staging".to_string()
}

fn default_production_branches() -> Vec<String> {
    vec!["develop".to_string(), "master".to_string()]
}

impl Remotes {
    /// Production for branches matching `production_branches`, staging otherwise.
    pub fn select(&self, branch: &str) -> &str {
        let production = self.production_branches.iter().any(|p| {
            glob::Pattern::new(p)
                .map(|pat| pat.matches(branch))
                .unwrap_or(false)
        });
        if production {
            &self.production
        } else {
            &self.staging
        }
    }
}

/// Upstream reference for the recipe change-set boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamSettings {
    #[serde(default = "default_upstream_remote")]
    pub remote: String,

    #[serde(default = "default_upstream_branch")]
    pub branch: String,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            remote: default_upstream_remote(),
            branch: default_upstream_branch(),
        }
    }
}

fn default_upstream_remote() -> String {
    "origin".to_string()
}

fn default_upstream_branch() -> String {
    "develop".to_string()
}

/// Where health transitions are reported.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifySettings {
    pub channel: String,

    /// Environment variable holding the webhook URL
    #[serde(default = "default_webhook_env")]
    pub webhook_url_env: String,
}

fn default_webhook_env() -> String {
    "PIPELINE_WEBHOOK_URL".to_string()
}

/// Static analysis run over changed recipe folders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LintSettings {
    /// Program and leading arguments; the folder is appended
    pub command: Vec<String>,
}

/// Execution policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    /// Run platform units concurrently
    #[serde(default = "default_true")]
    pub parallel_platforms: bool,

    /// Failure handling within one platform
    #[serde(default)]
    pub failure: FailurePolicy,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            parallel_platforms: true,
            failure: FailurePolicy::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Failure handling strategy within a platform unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    StopOnFirst,
    #[default]
    ContinueIndependent,
}

// ============================================================================
// Merge upstream
// ============================================================================

/// Settings for merging the public recipe index into the local fork.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MergeUpstreamSettings {
    #[serde(default)]
    pub cci: IndexSourceSettings,

    #[serde(default)]
    pub upstream: ForkSettings,

    #[serde(default)]
    pub pull_request: PullRequestSettings,
}

/// The public recipe index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexSourceSettings {
    #[serde(default = "default_cci_url")]
    pub url: String,

    #[serde(default = "default_cci_branch")]
    pub branch: String,
}

impl Default for IndexSourceSettings {
    fn default() -> Self {
        Self {
            url: default_cci_url(),
            branch: default_cci_branch(),
        }
    }
}

fn default_cci_url() -> String {
    "git@github.com:conan-io/conan-center-index.git".to_string()
}

fn default_cci_branch() -> String {
    "master".to_string()
}

/// The fork the index is merged into.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForkSettings {
    #[serde(default = "default_forge_host")]
    pub host: String,

    #[serde(default)]
    pub organization: String,

    #[serde(default = "default_upstream_branch")]
    pub branch: String,

    /// Temporary git remote created for the merge
    #[serde(default = "default_merge_remote")]
    pub remote_name: String,
}

impl Default for ForkSettings {
    fn default() -> Self {
        Self {
            host: default_forge_host(),
            organization: String::new(),
            branch: default_upstream_branch(),
            remote_name: default_merge_remote(),
        }
    }
}

impl ForkSettings {
    pub fn url(&self) -> String {
        format!("git@{}:{}/conan-center-index.git", self.host, self.organization)
    }

    /// `host/org/repo`, as the forge CLI addresses it.
    pub fn repo_slug(&self) -> String {
        format!("{}/{}/conan-center-index", self.host, self.organization)
    }
}

fn default_forge_host() -> String {
    "github.com".to_string()
}

fn default_merge_remote() -> String {
    "merge-upstream-remote".to_string()
}

/// Pull request opened when the merge has conflicts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PullRequestSettings {
    #[serde(default = "default_forge_host")]
    pub host: String,

    /// Fork the PR head lives on (default: `$USER`)
    #[serde(default)]
    pub fork: Option<String>,

    #[serde(default = "default_merge_branch")]
    pub merge_branch_name: String,

    #[serde(default)]
    pub reviewers: Vec<String>,

    #[serde(default)]
    pub assignee: Option<String>,

    #[serde(default = "default_labels")]
    pub labels: Vec<String>,
}

impl Default for PullRequestSettings {
    fn default() -> Self {
        Self {
            host: default_forge_host(),
            fork: None,
            merge_branch_name: default_merge_branch(),
            reviewers: Vec::new(),
            assignee: None,
            labels: default_labels(),
        }
    }
}

impl PullRequestSettings {
    pub fn fork_name(&self) -> String {
        self.fork
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .unwrap_or_default()
    }

    pub fn url(&self) -> String {
        format!("git@{}:{}/conan-center-index.git", self.host, self.fork_name())
    }
}

fn default_merge_branch() -> String {
    "merge-from-conan-io".to_string()
}

fn default_labels() -> Vec<String> {
    vec!["from-conan-io".to_string()]
}

// ============================================================================
// Run-time records
// ============================================================================

/// How hard to force building from source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ForceBuild {
    /// Fetch prebuilt artifacts; build only what is missing
    #[default]
    No,
    /// Rebuild the tool itself
    Package,
    /// Rebuild the tool and all of its requirements
    WithRequirements,
}

impl FromStr for ForceBuild {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s {
            "no" | "false" => Ok(Self::No),
            "package" => Ok(Self::Package),
            "with-requirements" => Ok(Self::WithRequirements),
            other => Err(format!(
                "unknown force-build mode '{}' (no, package, with-requirements)",
                other
            )),
        }
    }
}

impl fmt::Display for ForceBuild {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::No => write!(f, "no"),
            Self::Package => write!(f, "package"),
            Self::WithRequirements => write!(f, "with-requirements"),
        }
    }
}

/// Why a pair is compiled from source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildReason {
    Forced,
    Missing,
}

/// Cache-hit/cache-miss decision for one pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildDecision {
    /// A prebuilt artifact exists and is reused
    Fetch,
    /// Compile from source
    Build(BuildReason),
}

impl fmt::Display for BuildDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch => write!(f, "FETCH"),
            Self::Build(BuildReason::Forced) => write!(f, "BUILD (forced)"),
            Self::Build(BuildReason::Missing) => write!(f, "BUILD (missing)"),
        }
    }
}

/// Pass/fail for one (tool × configuration) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairStatus {
    Passed,
    Failed,
}

impl fmt::Display for PairStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "PASSED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// A reference the package manager installed while creating a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledRef {
    pub reference: String,
    pub built: bool,
}

/// Result of one (tool × configuration) pair.
#[derive(Debug, Clone)]
pub struct PairResult {
    pub pair_id: String,
    pub tool: String,
    pub config: String,
    pub fingerprint: String,
    pub status: PairStatus,
    pub decision: Option<BuildDecision>,
    pub message: Option<String>,
    pub duration: Duration,
    pub installed: Vec<InstalledRef>,
    pub uploaded: Vec<String>,
}

/// Stage of a platform unit that precedes the builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupStage {
    Environment,
    Authentication,
}

impl fmt::Display for SetupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Environment => write!(f, "environment"),
            Self::Authentication => write!(f, "authentication"),
        }
    }
}

/// How a platform unit ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    Completed,
    SetupFailed { stage: SetupStage, error: String },
}

/// Everything one platform unit produced.
#[derive(Debug, Clone)]
pub struct PlatformReport {
    pub platform: String,
    pub arch: String,
    pub outcome: UnitOutcome,
    pub results: Vec<PairResult>,
    pub duration: Duration,
}

impl PlatformReport {
    pub fn passed(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.status == PairStatus::Passed)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.status == PairStatus::Failed)
            .count()
    }

    pub fn is_healthy(&self) -> bool {
        self.outcome == UnitOutcome::Completed && self.failed() == 0
    }
}

/// Health of a pipeline lineage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    Healthy,
    Unhealthy,
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// A degraded (non-fatal) static-analysis result for one recipe folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LintFinding {
    pub folder: String,
    pub output: String,
}

// ============================================================================
// Event log
// ============================================================================

/// Event for the per-platform JSONL log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    UnitStarted {
        platform: String,
        run_id: String,
        prebake_version: String,
    },
    StageFailed {
        platform: String,
        stage: SetupStage,
        error: String,
    },
    BuildStarted {
        platform: String,
        pair: String,
        decision: String,
    },
    BuildPassed {
        platform: String,
        pair: String,
        duration_seconds: f64,
        fingerprint: String,
    },
    BuildFailed {
        platform: String,
        pair: String,
        error: String,
    },
    UnitCompleted {
        platform: String,
        run_id: String,
        passed: u32,
        failed: u32,
        total_seconds: f64,
    },
}

/// Timestamped event wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampedEvent {
    pub ts: String,
    #[serde(flatten)]
    pub event: PipelineEvent,
}

// ============================================================================
// Tests
// ============================================================================
