//! Package manager CLI invocations.
//!
//! Builds the argument vectors for probing, creating, uploading and
//! exporting packages. Nothing here runs a process; callers hand the
//! [`Invocation`]s to a [`crate::transport::Runner`].

pub mod summary;

use crate::core::types::{BuildConfig, ForceBuild, RecipeRef};
use crate::transport::Invocation;

/// Install arguments derived from a build configuration.
///
/// `missing` is dropped from the configuration's build list because the
/// build policy is decided separately by [`policy_args`].
pub fn install_args(config: &BuildConfig) -> Vec<String> {
    let mut args = vec!["--profile:host".to_string(), config.profile.clone()];
    if let Some(ref build_profile) = config.profile_build {
        args.push("--profile:build".to_string());
        args.push(build_profile.clone());
    }
    for (key, value) in &config.settings {
        args.push("-s".to_string());
        args.push(format!("{}={}", key, value));
    }
    for option in &config.options {
        args.push("-o".to_string());
        args.push(option.to_string());
    }
    for entry in config.build.iter().filter(|b| b.as_str() != "missing") {
        args.push("--build".to_string());
        args.push(entry.clone());
    }
    args
}

/// `--build` policy for a force mode.
pub fn policy_args(force: ForceBuild, package: &str) -> Vec<String> {
    match force {
        ForceBuild::No => vec!["--build".into(), "missing".into()],
        ForceBuild::Package => vec![
            "--build".into(),
            package.to_string(),
            "--build".into(),
            "missing".into(),
        ],
        ForceBuild::WithRequirements => vec!["--build".into()],
    }
}

/// Tool-specific options, applied to the host context.
pub fn tool_option_args(options: &[crate::core::types::BuildOption]) -> Vec<String> {
    options
        .iter()
        .flat_map(|o| ["--options:host".to_string(), o.to_string()])
        .collect()
}

/// Try to install a prebuilt package without compiling anything.
pub fn probe_invocation(program: &str, reference: &RecipeRef, config: &BuildConfig) -> Invocation {
    Invocation::new(program)
        .args(["install".to_string(), reference.cli_ref(), "--update".to_string()])
        .args(install_args(config))
        .args(["--build", "never"])
}

/// Everything `create` needs besides the program name.
pub struct CreateRequest<'a> {
    pub recipe_folder: &'a str,
    pub reference: &'a RecipeRef,
    pub config: &'a BuildConfig,
    pub tool_options: &'a [crate::core::types::BuildOption],
    pub force: ForceBuild,
    pub summary_path: &'a str,
}

/// Export and build a recipe, writing a JSON summary.
pub fn create_invocation(program: &str, req: &CreateRequest<'_>) -> Invocation {
    Invocation::new(program)
        .args([
            "create".to_string(),
            req.recipe_folder.to_string(),
            req.reference.cli_ref(),
            "--update".to_string(),
            "--json".to_string(),
            req.summary_path.to_string(),
        ])
        .args(install_args(req.config))
        .args(tool_option_args(req.tool_options))
        .args(policy_args(req.force, &req.reference.name))
}

/// Log in to a remote; credentials come from the package manager's own
/// environment variables.
pub fn auth_invocation(program: &str, remote: &str) -> Invocation {
    Invocation::new(program).args(["user", "-p", "-r", remote])
}

/// Upload a reference with all of its binaries.
pub fn upload_invocation(program: &str, reference: &RecipeRef, remote: &str) -> Invocation {
    Invocation::new(program).args([
        "upload".to_string(),
        "-r".to_string(),
        remote.to_string(),
        reference.cli_ref(),
        "--all".to_string(),
        "--check".to_string(),
    ])
}

/// Drop every cached recipe and binary of a package.
pub fn remove_invocation(program: &str, package: &str) -> Invocation {
    Invocation::new(program).args(["remove", package, "--force"])
}

/// Export a recipe folder into the local cache.
pub fn export_invocation(program: &str, recipe_folder: &str, reference: &RecipeRef) -> Invocation {
    Invocation::new(program).args([
        "export".to_string(),
        recipe_folder.to_string(),
        reference.cli_ref(),
    ])
}

/// Upload only the recipe of a reference.
pub fn upload_recipe_invocation(program: &str, reference: &RecipeRef, remote: &str) -> Invocation {
    Invocation::new(program).args([
        "upload".to_string(),
        "-r".to_string(),
        remote.to_string(),
        reference.cli_ref(),
        "--confirm".to_string(),
        "--check".to_string(),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::BuildOption;

    fn release_config() -> BuildConfig {
        serde_yaml_ng::from_str(
            r#"
profile: tools-release
profile_build: default
build: [missing, cmake]
settings: { build_type: Release }
options: ["shared=False"]
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_install_args_drop_missing() {
        let args = install_args(&release_config());
        assert_eq!(
            args,
            vec![
                "--profile:host",
                "tools-release",
                "--profile:build",
                "default",
                "-s",
                "build_type=Release",
                "-o",
                "shared=False",
                "--build",
                "cmake",
            ]
        );
    }

    #[test]
    fn test_policy_args() {
        assert_eq!(policy_args(ForceBuild::No, "cmake"), vec!["--build", "missing"]);
        assert_eq!(
            policy_args(ForceBuild::Package, "cmake"),
            vec!["--build", "cmake", "--build", "missing"]
        );
        assert_eq!(policy_args(ForceBuild::WithRequirements, "cmake"), vec!["--build"]);
    }

    #[test]
    fn test_probe_never_builds() {
        let r: RecipeRef = "cmake/3.25.3".parse().unwrap();
        let inv = probe_invocation("conan", &r, &release_config());
        assert_eq!(inv.args[0], "install");
        assert_eq!(inv.args[1], "cmake/3.25.3@");
        let n = inv.args.len();
        assert_eq!(&inv.args[n - 2..], ["--build", "never"]);
    }

    #[test]
    fn test_create_invocation() {
        let r: RecipeRef = "doxygen/1.9.4".parse().unwrap();
        let options = vec![BuildOption::Passthrough {
            scope: Some("doxygen".into()),
            key: "enable_search".into(),
            value: "False".into(),
        }];
        let config = release_config();
        let req = CreateRequest {
            recipe_folder: "recipes/doxygen/all",
            reference: &r,
            config: &config,
            tool_options: &options,
            force: ForceBuild::Package,
            summary_path: "build/create.json",
        };
        let line = create_invocation("conan", &req).command_line();
        assert!(line.starts_with(
            "conan create recipes/doxygen/all doxygen/1.9.4@ --update --json build/create.json --profile:host tools-release"
        ));
        assert!(line.contains("--options:host doxygen:enable_search=False"));
        assert!(line.ends_with("--build doxygen --build missing"));
    }

    #[test]
    fn test_upload_invocations() {
        let r: RecipeRef = "zlib/1.2.13".parse().unwrap();
        assert_eq!(
            upload_invocation("conan", &r, "prod").command_line(),
            "conan upload -r prod zlib/1.2.13@ --all --check"
        );
        assert_eq!(
            upload_recipe_invocation("conan", &r, "prod").command_line(),
            "conan upload -r prod zlib/1.2.13@ --confirm --check"
        );
        assert_eq!(
            export_invocation("conan", "recipes/zlib/all", &r).command_line(),
            "conan export recipes/zlib/all zlib/1.2.13@"
        );
        assert_eq!(auth_invocation("conan", "prod").command_line(), "conan user -p -r prod");
        assert_eq!(
            remove_invocation("conan", "zlib").command_line(),
            "conan remove zlib --force"
        );
    }
}
