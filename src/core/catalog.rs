//! Recipe catalog: directory-per-package, version-per-subdirectory.
//!
//! A package folder may carry a `config.yml` mapping versions to recipe
//! folders. Without it, every non-hidden subdirectory is a version.

use super::error::{Error, Result};
use super::types::RecipeRef;
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// `config.yml` at the top of a package folder.
#[derive(Debug, Deserialize)]
struct VersionsFile {
    versions: IndexMap<String, VersionEntry>,
}

#[derive(Debug, Deserialize)]
struct VersionEntry {
    folder: String,
}

/// One recipe folder of one package.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecipeTarget {
    pub package: String,
    /// Folder name below the package directory (e.g. `all`)
    pub folder: String,
}

/// Read-only view of a recipe catalog rooted at a directory.
#[derive(Debug, Clone)]
pub struct Catalog {
    root: PathBuf,
}

impl Catalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a recipe folder.
    pub fn folder_path(&self, target: &RecipeTarget) -> PathBuf {
        self.root.join(&target.package).join(&target.folder)
    }

    /// Map each version of a package to its recipe folder.
    pub fn versions_to_folders(&self, package: &str) -> Result<IndexMap<String, PathBuf>> {
        let package_dir = self.root.join(package);
        let config_yml = package_dir.join("config.yml");
        if config_yml.exists() {
            let content =
                std::fs::read_to_string(&config_yml).map_err(|e| Error::io(&config_yml, e))?;
            let parsed: VersionsFile = serde_yaml_ng::from_str(&content).map_err(|e| {
                Error::Catalog(format!("invalid {}: {}", config_yml.display(), e))
            })?;
            return Ok(parsed
                .versions
                .into_iter()
                .map(|(version, entry)| (version, package_dir.join(entry.folder)))
                .collect());
        }

        let mut versions: Vec<String> = visible_subdirs(&package_dir)?;
        versions.sort();
        Ok(versions
            .into_iter()
            .map(|v| {
                let path = package_dir.join(&v);
                (v, path)
            })
            .collect())
    }

    /// Recipe folder for a reference.
    pub fn folder_for(&self, reference: &RecipeRef) -> Result<PathBuf> {
        let versions = self.versions_to_folders(&reference.name)?;
        versions.get(&reference.version).cloned().ok_or_else(|| {
            Error::Catalog(format!(
                "no recipe folder for {} under {}",
                reference,
                self.root.display()
            ))
        })
    }

    /// Versions whose recipe lives in the given folder.
    pub fn versions_in_folder(&self, target: &RecipeTarget) -> Result<Vec<String>> {
        let wanted = self.folder_path(target);
        Ok(self
            .versions_to_folders(&target.package)?
            .into_iter()
            .filter(|(_, folder)| *folder == wanted)
            .map(|(version, _)| version)
            .collect())
    }

    /// Distinct recipe folders of a package that exist on disk.
    pub fn targets_of(&self, package: &str) -> Result<Vec<RecipeTarget>> {
        let mut targets: Vec<RecipeTarget> = Vec::new();
        for folder in self.versions_to_folders(package)?.values() {
            if !folder.is_dir() {
                continue;
            }
            let Some(name) = folder.file_name() else {
                continue;
            };
            let target = RecipeTarget {
                package: package.to_string(),
                folder: name.to_string_lossy().to_string(),
            };
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
        Ok(targets)
    }

    /// Every package in the catalog, sorted.
    pub fn packages(&self) -> Result<Vec<String>> {
        let mut packages = visible_subdirs(&self.root)?;
        packages.sort();
        Ok(packages)
    }

    /// Every recipe folder in the catalog.
    pub fn all_targets(&self) -> Result<Vec<RecipeTarget>> {
        let mut all = Vec::new();
        for package in self.packages()? {
            all.extend(self.targets_of(&package)?);
        }
        Ok(all)
    }
}

fn visible_subdirs(dir: &Path) -> Result<Vec<String>> {
    let entries = std::fs::read_dir(dir).map_err(|e| Error::io(dir, e))?;
    let mut names = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') || !entry.path().is_dir() {
            continue;
        }
        names.push(name);
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_catalog() -> (tempfile::TempDir, Catalog) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("recipes");
        // config.yml layout
        std::fs::create_dir_all(root.join("cmake/binary")).unwrap();
        std::fs::create_dir_all(root.join("cmake/3.x")).unwrap();
        std::fs::write(
            root.join("cmake/config.yml"),
            r#"
versions:
  "3.25.3":
    folder: "3.x"
  "3.24.0":
    folder: "3.x"
  "3.20.0":
    folder: binary
"#,
        )
        .unwrap();
        // Folder-per-version layout
        std::fs::create_dir_all(root.join("swig/dl")).unwrap();
        std::fs::create_dir_all(root.join("swig/4.0.2")).unwrap();
        std::fs::create_dir_all(root.join("swig/.hidden")).unwrap();
        std::fs::write(root.join("swig/README.md"), "docs").unwrap();
        let catalog = Catalog::new(root);
        (dir, catalog)
    }

    #[test]
    fn test_versions_from_config_yml() {
        let (_dir, catalog) = make_catalog();
        let versions = catalog.versions_to_folders("cmake").unwrap();
        assert_eq!(versions.len(), 3);
        assert!(versions["3.25.3"].ends_with("cmake/3.x"));
        assert!(versions["3.20.0"].ends_with("cmake/binary"));
    }

    #[test]
    fn test_versions_from_subdirs() {
        let (_dir, catalog) = make_catalog();
        let versions = catalog.versions_to_folders("swig").unwrap();
        let keys: Vec<_> = versions.keys().cloned().collect();
        assert_eq!(keys, vec!["4.0.2", "dl"]);
    }

    #[test]
    fn test_folder_for() {
        let (_dir, catalog) = make_catalog();
        let r: RecipeRef = "cmake/3.24.0".parse().unwrap();
        assert!(catalog.folder_for(&r).unwrap().ends_with("cmake/3.x"));
        let missing: RecipeRef = "cmake/9.9.9".parse().unwrap();
        assert!(matches!(catalog.folder_for(&missing), Err(Error::Catalog(_))));
        let no_pkg: RecipeRef = "ghost/1.0".parse().unwrap();
        assert!(catalog.folder_for(&no_pkg).is_err());
    }

    #[test]
    fn test_versions_in_folder() {
        let (_dir, catalog) = make_catalog();
        let target = RecipeTarget {
            package: "cmake".into(),
            folder: "3.x".into(),
        };
        assert_eq!(
            catalog.versions_in_folder(&target).unwrap(),
            vec!["3.25.3", "3.24.0"]
        );
    }

    #[test]
    fn test_targets_are_distinct() {
        let (_dir, catalog) = make_catalog();
        let targets = catalog.targets_of("cmake").unwrap();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].folder, "3.x");
        assert_eq!(targets[1].folder, "binary");
    }

    #[test]
    fn test_all_targets() {
        let (_dir, catalog) = make_catalog();
        assert_eq!(catalog.packages().unwrap(), vec!["cmake", "swig"]);
        assert_eq!(catalog.all_targets().unwrap().len(), 4);
    }

    #[test]
    fn test_invalid_config_yml() {
        let (_dir, catalog) = make_catalog();
        std::fs::write(catalog.root().join("swig/config.yml"), "versions: [1, 2]").unwrap();
        assert!(matches!(
            catalog.versions_to_folders("swig"),
            Err(Error::Catalog(_))
        ));
    }
}
