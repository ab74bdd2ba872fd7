//! Platform selection from a filter value.
//!
//! `all` selects every declared platform; a declared name selects exactly
//! that platform; anything else selects nothing. Whether "nothing" is an
//! error is the caller's [`SelectionPolicy`].

use super::error::{Error, Result};
use super::types::PipelineConfig;
use std::fmt;
use std::str::FromStr;

/// Requested platform filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformFilter {
    All,
    Named(String),
}

impl FromStr for PlatformFilter {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        if s.is_empty() {
            return Err("platform filter must not be empty".to_string());
        }
        Ok(if s == "all" {
            Self::All
        } else {
            Self::Named(s.to_string())
        })
    }
}

impl fmt::Display for PlatformFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Named(n) => write!(f, "{}", n),
        }
    }
}

/// What to do when a named filter matches no declared platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SelectionPolicy {
    /// Unknown platform names are an error
    #[default]
    Strict,
    /// Unknown platform names select nothing
    Lenient,
}

/// Ordered subset of declared platform ids matching the filter.
pub fn select_platforms<'a>(config: &'a PipelineConfig, filter: &PlatformFilter) -> Vec<&'a str> {
    config
        .platforms
        .keys()
        .filter(|name| match filter {
            PlatformFilter::All => true,
            PlatformFilter::Named(n) => *name == n,
        })
        .map(String::as_str)
        .collect()
}

/// Select platforms, applying the policy for unmatched names.
pub fn select_platforms_checked<'a>(
    config: &'a PipelineConfig,
    filter: &PlatformFilter,
    policy: SelectionPolicy,
) -> Result<Vec<&'a str>> {
    let selected = select_platforms(config, filter);
    if let PlatformFilter::Named(ref name) = filter {
        if selected.is_empty() {
            match policy {
                SelectionPolicy::Strict => return Err(Error::UnknownPlatform(name.clone())),
                SelectionPolicy::Lenient => {
                    tracing::warn!(platform = %name, "filter matches no declared platform; nothing selected");
                }
            }
        }
    }
    Ok(selected)
}
