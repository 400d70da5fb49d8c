//! Command line argument parsing.
//!
//! Every setting is optional here: values given on the command line (or through
//! their environment variables) are layered over the configuration file, which is
//! layered over the built-in defaults.

use crate::bundler::{SettingsBuilder, TargetTriple};
use crate::error::{CliError, Result};
use crate::metadata::BuildConfig;
use clap::Parser;
use std::path::PathBuf;

/// Cross-builds OpenLDAP for Apple platforms into static and dynamic XCFrameworks
#[derive(Parser, Debug, Default)]
#[command(
    name = "xcframework_bundler",
    version,
    about = "Cross-builds OpenLDAP for Apple platforms into static and dynamic XCFrameworks",
    long_about = "Cross-builds a C library (OpenLDAP by default) against an OpenSSL XCFramework for
every configured sdk-platform-arch target, merges the targets of each platform into
multi-architecture artifacts and assembles a static and a dynamic XCFramework, their
zip archives and a Package.swift.

Usage:
  xcframework_bundler --dependency-url https://example.com/COpenSSL-static.xcframework.zip
  xcframework_bundler --config build.toml --skip-existing-artifacts
  xcframework_bundler --target iOS-iOS-arm64 --target iOS-iOS_Simulator-arm64 --dependency-url ./COpenSSL.xcframework
  xcframework_bundler --clean

Exit code 0 = both XCFrameworks, their archives and Package.swift exist in the result directory."
)]
pub struct Args {
    /// TOML configuration file
    #[arg(short, long, value_name = "PATH", env = "XCFRAMEWORK_BUNDLER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Product name (ASCII letters, digits and underscores)
    #[arg(long, value_name = "NAME")]
    pub product_name: Option<String>,

    /// Version of the library to build
    #[arg(long = "library-version", value_name = "VERSION")]
    pub library_version: Option<String>,

    /// Source tarball URL template; `{{ version }}` is replaced by the version
    #[arg(long, value_name = "TEMPLATE")]
    pub source_url: Option<String>,

    /// Expected SHA-256 of the source tarball
    #[arg(long, value_name = "HEX")]
    pub source_sha256: Option<String>,

    /// URL or path of the OpenSSL XCFramework (zip or directory)
    #[arg(long, value_name = "URL", env = "XCFRAMEWORK_BUNDLER_DEPENDENCY_URL")]
    pub dependency_url: Option<String>,

    /// Expected SHA-256 of the zipped OpenSSL XCFramework
    #[arg(long, value_name = "HEX")]
    pub dependency_sha256: Option<String>,

    /// Target to build as sdk-platform-arch; repeat or separate with commas
    #[arg(short, long = "target", value_name = "TARGET", value_delimiter = ',')]
    pub targets: Vec<String>,

    /// Work directory holding downloads and the staged build tree
    #[arg(short, long, value_name = "PATH")]
    pub work_dir: Option<PathBuf>,

    /// Directory receiving the final bundles (defaults to the work directory)
    #[arg(short, long, value_name = "PATH")]
    pub result_dir: Option<PathBuf>,

    /// Reuse finished stages instead of rebuilding them
    #[arg(long)]
    pub skip_existing_artifacts: bool,

    /// SDK version suffix (e.g. 17.0 for iPhoneOS17.0.sdk)
    #[arg(long, value_name = "VERSION")]
    pub sdk_version: Option<String>,

    /// Minimum deployment version as platform=version (macos, mac-catalyst, ios, tvos, watchos)
    #[arg(long = "min-version", value_name = "PLATFORM=VERSION")]
    pub min_versions: Vec<String>,

    /// Never embed bitcode
    #[arg(long)]
    pub disable_bitcode: bool,

    /// Maximum number of targets built at once (and make -j value)
    #[arg(short, long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Extra flag passed to configure, replacing the defaults; repeatable
    #[arg(long = "configure-arg", value_name = "FLAG", allow_hyphen_values = true)]
    pub configure_args: Vec<String>,

    /// Xcode developer directory
    #[arg(long, value_name = "PATH")]
    pub developer_dir: Option<PathBuf>,

    /// Release URL template for Package.swift (`{{ version }}`, `{{ product }}`, `{{ file }}`)
    #[arg(long, value_name = "TEMPLATE")]
    pub binary_url: Option<String>,

    /// Remove the build tree, the dependency copy and the produced bundles, then exit
    #[arg(long)]
    pub clean: bool,

    /// Stream the output of every external tool
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only print warnings and errors
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate arguments for consistency
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.jobs == Some(0) {
            return Err("--jobs must be at least 1".to_string());
        }
        for entry in &self.min_versions {
            match entry.split_once('=') {
                Some((platform, version)) if !platform.is_empty() && !version.is_empty() => {}
                _ => return Err(format!("--min-version expects platform=version, got {entry:?}")),
            }
        }
        Ok(())
    }

    /// Layers the arguments over `config` into a settings builder.
    pub fn settings_builder(&self, config: &BuildConfig) -> Result<SettingsBuilder> {
        self.validate()
            .map_err(|reason| CliError::InvalidArguments { reason })?;

        let mut builder = SettingsBuilder::new();
        let package = &config.package;
        let build = &config.build;

        if let Some(name) = self.product_name.as_ref().or(package.product_name.as_ref()) {
            builder = builder.product_name(name);
        }
        if let Some(version) = self.library_version.as_ref().or(package.version.as_ref()) {
            builder = builder.version(version);
        }
        if let Some(url) = self.source_url.as_ref().or(package.source_url.as_ref()) {
            builder = builder.source_url_template(url);
        }
        if let Some(sha) = self.source_sha256.as_ref().or(package.source_sha256.as_ref()) {
            builder = builder.source_sha256(Some(sha.clone()));
        }
        if let Some(url) = self.binary_url.as_ref().or(package.binary_url.as_ref()) {
            builder = builder.binary_url_template(url);
        }
        if let Some(prefix) = &package.bundle_identifier_prefix {
            builder = builder.bundle_identifier_prefix(prefix);
        }

        if let Some(url) = self.dependency_url.as_ref().or(config.dependency.url.as_ref()) {
            builder = builder.dependency_url(url);
        }
        if let Some(sha) = self
            .dependency_sha256
            .as_ref()
            .or(config.dependency.sha256.as_ref())
        {
            builder = builder.dependency_sha256(Some(sha.clone()));
        }

        let targets: Vec<String> = if self.targets.is_empty() {
            build.targets.clone().unwrap_or_default()
        } else {
            self.targets.clone()
        };
        if !targets.is_empty() {
            let targets = targets
                .iter()
                .map(|t| t.trim().parse::<TargetTriple>())
                .collect::<crate::bundler::Result<Vec<_>>>()?;
            builder = builder.targets(targets);
        }

        if let Some(dir) = self.work_dir.as_ref().or(build.work_directory.as_ref()) {
            builder = builder.work_directory(dir);
        }
        if let Some(dir) = self.result_dir.as_ref().or(build.result_directory.as_ref()) {
            builder = builder.result_directory(dir);
        }
        builder = builder.skip_existing_artifacts(
            self.skip_existing_artifacts || build.skip_existing_artifacts.unwrap_or(false),
        );
        if let Some(version) = self.sdk_version.as_ref().or(build.sdk_version.as_ref()) {
            builder = builder.sdk_version(Some(version.clone()));
        }
        builder =
            builder.disable_bitcode(self.disable_bitcode || build.disable_bitcode.unwrap_or(false));
        if let Some(jobs) = self.jobs.or(build.jobs) {
            builder = builder.jobs(jobs);
        }
        if !self.configure_args.is_empty() {
            builder = builder.configure_args(self.configure_args.clone());
        } else if let Some(args) = &build.configure_args {
            builder = builder.configure_args(args.clone());
        }
        if let Some(libraries) = &build.link_libraries {
            builder = builder.link_libraries(libraries.clone());
        }
        if let Some(dir) = self.developer_dir.as_ref().or(build.developer_dir.as_ref()) {
            builder = builder.developer_dir(dir);
        }

        for (platform, version) in &config.deployment_targets {
            builder = builder.deployment_target(platform, version);
        }
        for entry in &self.min_versions {
            if let Some((platform, version)) = entry.split_once('=') {
                builder = builder.deployment_target(platform.trim(), version.trim());
            }
        }
        Ok(builder)
    }
}
