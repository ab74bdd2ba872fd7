//! YAML parsing and validation of pipeline.yaml.
//!
//! Validation collects every finding instead of stopping at the first:
//! - Version must be "1.0"
//! - Default configuration lists must name declared configurations
//! - Explicit tool configuration lists must name configurations declared on
//!   every tool-build-capable platform the tool applies to
//! - Tool references and remote branch patterns must parse

use super::error::{Error, Result, ValidationError};
use super::types::*;
use std::path::Path;

/// Parse a pipeline.yaml file from disk.
pub fn parse_config_file(path: &Path) -> Result<PipelineConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    parse_config(&content)
}

/// Parse a pipeline.yaml from a string.
pub fn parse_config(yaml: &str) -> Result<PipelineConfig> {
    Ok(serde_yaml_ng::from_str(yaml)?)
}

/// Parse and validate, failing with every finding at once.
pub fn load_validated(path: &Path) -> Result<PipelineConfig> {
    let config = parse_config_file(path)?;
    let errors = validate_config(&config);
    if errors.is_empty() {
        Ok(config)
    } else {
        Err(Error::Validation(errors))
    }
}

fn push(errors: &mut Vec<ValidationError>, message: String) {
    errors.push(ValidationError { message });
}

/// Validate a parsed config. Returns a list of errors (empty = valid).
pub fn validate_config(config: &PipelineConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if config.version != "1.0" {
        push(
            &mut errors,
            format!("version must be \"1.0\", got \"{}\"", config.version),
        );
    }
    if config.name.is_empty() {
        push(&mut errors, "name must not be empty".to_string());
    }
    if config.platforms.is_empty() {
        push(&mut errors, "at least one platform must be declared".to_string());
    }
    if config.platforms.contains_key("all") {
        push(
            &mut errors,
            "'all' is reserved and cannot name a platform".to_string(),
        );
    }

    validate_remotes(config, &mut errors);

    for (name, platform) in &config.platforms {
        validate_platform(config, name, platform, &mut errors);
    }

    if let Some(ref notify) = config.notify {
        if notify.webhook_url_env.is_empty() {
            push(
                &mut errors,
                "notify.webhook_url_env must not be empty".to_string(),
            );
        }
    }
    if let Some(ref lint) = config.lint {
        if lint.command.is_empty() {
            push(&mut errors, "lint.command must not be empty".to_string());
        }
    }

    errors
}

fn validate_remotes(config: &PipelineConfig, errors: &mut Vec<ValidationError>) {
    if config.remotes.production.is_empty() || config.remotes.staging.is_empty() {
        push(
            errors,
            "remotes.production and remotes.staging must not be empty".to_string(),
        );
    }
    for pattern in &config.remotes.production_branches {
        if let Err(e) = glob::Pattern::new(pattern) {
            push(
                errors,
                format!("invalid production branch pattern '{}': {}", pattern, e),
            );
        }
    }
}

fn validate_platform(
    config: &PipelineConfig,
    name: &str,
    platform: &Platform,
    errors: &mut Vec<ValidationError>,
) {
    for (config_name, build_config) in &platform.configs {
        if build_config.profile.is_empty() {
            push(
                errors,
                format!(
                    "platform '{}' config '{}' has no profile",
                    name, config_name
                ),
            );
        }
    }

    for config_name in &platform.tool_configs {
        if !platform.configs.contains_key(config_name) {
            push(
                errors,
                format!(
                    "platform '{}' default config '{}' is not declared",
                    name, config_name
                ),
            );
        }
    }

    if platform.build_tools && platform.default_configs().is_empty() {
        push(
            errors,
            format!(
                "platform '{}' builds tools but has no configurations",
                name
            ),
        );
    }

    for entry in config.tools_for(platform) {
        let spec = match entry.spec() {
            Ok(spec) => spec,
            Err(e) => {
                push(errors, format!("platform '{}': {}", name, e));
                continue;
            }
        };
        if !platform.build_tools {
            continue;
        }
        for config_name in &spec.configs {
            if !platform.configs.contains_key(config_name) {
                push(
                    errors,
                    format!(
                        "tool '{}' requests config '{}' which platform '{}' does not declare",
                        spec.reference, config_name, name
                    ),
                );
            }
        }
    }
}
