//! Parsing of the JSON summary written by `create --json`.

use crate::core::error::Result;
use crate::core::types::InstalledRef;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct CreateSummary {
    #[serde(default)]
    installed: Vec<InstalledEntry>,
}

#[derive(Debug, Deserialize)]
struct InstalledEntry {
    recipe: RecipeEntry,
    #[serde(default)]
    packages: Vec<PackageEntry>,
}

#[derive(Debug, Deserialize)]
struct RecipeEntry {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PackageEntry {
    #[serde(default)]
    built: bool,
}

/// Every reference the create step installed, and whether any of its
/// binaries were compiled rather than fetched.
pub fn parse_create_summary(json: &str) -> Result<Vec<InstalledRef>> {
    let summary: CreateSummary = serde_json::from_str(json)?;
    Ok(summary
        .installed
        .into_iter()
        .map(|entry| InstalledRef {
            reference: entry.recipe.id,
            built: entry.packages.iter().any(|p| p.built),
        })
        .collect())
}

/// References to upload after a build, minus excluded package names.
///
/// Revisions are stripped and duplicates dropped; unparseable ids are
/// skipped with a warning.
pub fn upload_candidates(installed: &[InstalledRef], exclude: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for entry in installed {
        let reference = match entry.reference.parse::<crate::core::types::RecipeRef>() {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(reference = %entry.reference, error = %e, "skipping upload");
                continue;
            }
        };
        if exclude.iter().any(|x| *x == reference.name) {
            continue;
        }
        let s = reference.to_string();
        if !out.contains(&s) {
            out.push(s);
        }
    }
    out
}
