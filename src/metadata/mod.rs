//! Build configuration file.
//!
//! An optional TOML file supplies defaults for every setting the command line
//! accepts. Values given on the command line win over the file, and the file wins
//! over the built-in defaults.
//!
//! ```toml
//! [package]
//! product_name = "COpenLDAP"
//! version = "2.5.5"
//!
//! [dependency]
//! url = "https://example.com/COpenSSL-static.xcframework.zip"
//! sha256 = "…"
//!
//! [build]
//! targets = ["macOS-macOS-arm64", "iOS-iOS-arm64"]
//! skip_existing_artifacts = true
//!
//! [deployment_targets]
//! ios = "13.0"
//! ```

use crate::error::{BundlerError, CliError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Library being built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PackageSection {
    /// Product name.
    pub product_name: Option<String>,
    /// Library version.
    pub version: Option<String>,
    /// Source tarball URL template.
    pub source_url: Option<String>,
    /// Expected SHA-256 of the tarball.
    pub source_sha256: Option<String>,
    /// Release URL template written into `Package.swift`.
    pub binary_url: Option<String>,
    /// Prefix of the frameworks' bundle identifier.
    pub bundle_identifier_prefix: Option<String>,
}

/// Co-dependency bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DependencySection {
    /// URL or path of the XCFramework.
    pub url: Option<String>,
    /// Expected SHA-256 of the archive.
    pub sha256: Option<String>,
}

/// Build behavior.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildSection {
    /// Targets as `sdk-platform-arch`.
    pub targets: Option<Vec<String>>,
    /// Work directory.
    pub work_directory: Option<PathBuf>,
    /// Result directory.
    pub result_directory: Option<PathBuf>,
    /// Reuse finished stages.
    pub skip_existing_artifacts: Option<bool>,
    /// SDK version suffix.
    pub sdk_version: Option<String>,
    /// Never embed bitcode.
    pub disable_bitcode: Option<bool>,
    /// Parallel jobs.
    pub jobs: Option<usize>,
    /// Flags appended to `configure`.
    pub configure_args: Option<Vec<String>>,
    /// System libraries of the dynamic library.
    pub link_libraries: Option<Vec<String>>,
    /// Xcode developer directory.
    pub developer_dir: Option<PathBuf>,
}

/// Contents of a configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// `[package]`
    pub package: PackageSection,
    /// `[dependency]`
    pub dependency: DependencySection,
    /// `[build]`
    pub build: BuildSection,
    /// `[deployment_targets]`, keyed like `macos` or `mac-catalyst`.
    pub deployment_targets: BTreeMap<String, String>,
}

impl BuildConfig {
    /// Parses a configuration document.
    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }
}

/// Loads the configuration file at `path`.
pub fn load_config(path: &Path) -> Result<BuildConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        BundlerError::Cli(CliError::ExecutionFailed {
            command: "read_config".to_string(),
            reason: format!("Failed to read {}: {}", path.display(), e),
        })
    })?;
    let config = BuildConfig::parse(&contents)?;
    log::debug!("Loaded configuration from {}", path.display());
    Ok(config)
}
