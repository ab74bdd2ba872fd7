//! Build planning: expand tools × configurations per platform.
//!
//! Only tool-build-capable platforms get a batch. Every explicit
//! configuration list is checked before any pair is produced, so an invalid
//! entry yields no plan at all.

use super::catalog::Catalog;
use super::error::{Error, Result};
use super::types::{BuildConfig, PipelineConfig, Platform, ToolSpec};
use std::path::PathBuf;

/// One (tool × configuration) unit of work on a platform.
#[derive(Debug, Clone)]
pub struct BuildPair {
    pub platform: String,
    /// `<tool>[_<options>]::<config>`
    pub pair_id: String,
    pub tool: ToolSpec,
    pub config_name: String,
    pub config: BuildConfig,
    pub recipe_folder: PathBuf,
    /// BLAKE3 over the pair's desired inputs
    pub fingerprint: String,
}

/// The ordered pairs of one platform.
#[derive(Debug, Clone)]
pub struct PlatformBatch {
    pub platform: String,
    pub pairs: Vec<BuildPair>,
}

/// The full plan for a run.
#[derive(Debug, Clone, Default)]
pub struct BuildPlan {
    pub batches: Vec<PlatformBatch>,
    /// Selected platforms that do not build tools
    pub skipped_platforms: Vec<String>,
}

impl BuildPlan {
    pub fn pair_count(&self) -> usize {
        self.batches.iter().map(|b| b.pairs.len()).sum()
    }
}

/// Configuration names a tool builds with on a platform.
pub fn resolve_configs(platform: &Platform, tool: &ToolSpec) -> Vec<String> {
    if tool.configs.is_empty() {
        platform.default_configs()
    } else {
        tool.configs.clone()
    }
}

/// Plan tool builds for the selected platforms.
pub fn plan(config: &PipelineConfig, catalog: &Catalog, selected: &[&str]) -> Result<BuildPlan> {
    let mut capable: Vec<(&str, &Platform, Vec<ToolSpec>)> = Vec::new();
    let mut skipped_platforms = Vec::new();

    // Parse and check everything before producing a single pair
    for &name in selected {
        let platform = config
            .platforms
            .get(name)
            .ok_or_else(|| Error::UnknownPlatform(name.to_string()))?;
        if !platform.build_tools {
            skipped_platforms.push(name.to_string());
            continue;
        }
        let mut tools = Vec::new();
        for entry in config.tools_for(platform) {
            let tool = entry.spec().map_err(|e| {
                Error::InvalidConfiguration(format!("tool '{}': {}", entry.package(), e))
            })?;
            for config_name in resolve_configs(platform, &tool) {
                if !platform.configs.contains_key(&config_name) {
                    return Err(Error::InvalidConfiguration(format!(
                        "tool '{}' requests config '{}' which platform '{}' does not declare",
                        entry.package(),
                        config_name,
                        name
                    )));
                }
            }
            tools.push(tool);
        }
        capable.push((name, platform, tools));
    }

    let mut batches = Vec::new();
    for (name, platform, tools) in capable {
        let mut pairs = Vec::new();
        for tool in tools {
            let recipe_folder = match tool.recipe_from {
                Some(ref root) => Catalog::new(root).folder_for(&tool.reference)?,
                None => catalog.folder_for(&tool.reference)?,
            };
            for config_name in resolve_configs(platform, &tool) {
                let build_config = platform.configs[&config_name].clone();
                let fingerprint =
                    pair_fingerprint(platform, &tool, &config_name, &build_config, &recipe_folder);
                pairs.push(BuildPair {
                    platform: name.to_string(),
                    pair_id: pair_id(&tool, &config_name),
                    tool: tool.clone(),
                    config_name,
                    config: build_config,
                    recipe_folder: recipe_folder.clone(),
                    fingerprint,
                });
            }
        }
        batches.push(PlatformBatch {
            platform: name.to_string(),
            pairs,
        });
    }

    Ok(BuildPlan {
        batches,
        skipped_platforms,
    })
}

/// `<tool label>::<config>`.
pub fn pair_id(tool: &ToolSpec, config_name: &str) -> String {
    format!("{}::{}", tool.label(), config_name)
}

/// Fingerprint of everything that determines a pair's build.
/// Returns `"blake3:{hex}"`.
pub fn pair_fingerprint(
    platform: &Platform,
    tool: &ToolSpec,
    config_name: &str,
    config: &BuildConfig,
    recipe_folder: &std::path::Path,
) -> String {
    let mut hasher = blake3::Hasher::new();
    let mut field = |s: &str| {
        hasher.update(s.as_bytes());
        hasher.update(b"\0");
    };
    field(&platform.arch);
    field(&tool.reference.to_string());
    for option in &tool.options {
        field(&option.to_string());
    }
    field(config_name);
    field(&config.profile);
    field(config.profile_build.as_deref().unwrap_or(""));
    for entry in &config.build {
        field(entry);
    }
    for (key, value) in &config.settings {
        field(&format!("{}={}", key, value));
    }
    for option in &config.options {
        field(&option.to_string());
    }
    field(&recipe_folder.to_string_lossy());
    format!("blake3:{}", hasher.finalize().to_hex())
}
