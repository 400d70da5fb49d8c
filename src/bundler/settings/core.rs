//! Core Settings struct and implementations.

use super::{DependencySettings, PackageSettings, PlatformGroup, TargetTriple};
use crate::bundler::error::{Error, Result};
use crate::bundler::utils::template;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use url::Url;

/// Main settings for a pipeline run.
///
/// Constructed once via [`SettingsBuilder`](super::SettingsBuilder) and handed by
/// reference to every stage.
///
/// # Examples
///
/// ```no_run
/// use xcframework_bundler::bundler::SettingsBuilder;
///
/// # fn example() -> xcframework_bundler::bundler::Result<()> {
/// let settings = SettingsBuilder::new()
///     .work_directory("./openldap-workdir")
///     .dependency_url("file:///tmp/openssl.xcframework.zip")
///     .targets(vec!["iOS-iOS-arm64".parse()?])
///     .build()?;
/// assert_eq!(settings.product_name(), "COpenLDAP");
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Settings {
    /// Library metadata and source location.
    package: PackageSettings,

    /// Co-dependency bundle location.
    dependency: DependencySettings,

    /// Targets to build, sorted and deduplicated.
    targets: Vec<TargetTriple>,

    /// Absolute work directory; everything intermediate lives below it.
    work_directory: PathBuf,

    /// Absolute directory receiving the final bundles.
    result_directory: PathBuf,

    /// Skip stages whose output already exists.
    skip_existing_artifacts: bool,

    /// SDK version appended to the SDK directory name (`iPhoneOS15.0.sdk`).
    sdk_version: Option<String>,

    /// Minimum OS versions keyed by [`PlatformGroup::deployment_key`].
    deployment_targets: BTreeMap<String, String>,

    /// Do not embed bitcode in device builds.
    disable_bitcode: bool,

    /// Maximum number of concurrent target builds and `make` jobs.
    jobs: usize,

    /// Flags appended to `configure`.
    configure_args: Vec<String>,

    /// System libraries linked into the derived dynamic library.
    link_libraries: Vec<String>,

    /// Explicit Xcode developer directory.
    developer_dir: Option<PathBuf>,
}

impl Settings {
    /// Returns the product name.
    pub fn product_name(&self) -> &str {
        &self.package.product_name
    }

    /// Returns the library version.
    pub fn version_string(&self) -> &str {
        &self.package.version
    }

    /// Returns the package settings.
    pub fn package(&self) -> &PackageSettings {
        &self.package
    }

    /// Returns the dependency settings.
    pub fn dependency(&self) -> &DependencySettings {
        &self.dependency
    }

    /// Source tarball URL with the version substituted.
    pub fn source_url(&self) -> Result<Url> {
        let rendered = template::render(
            &self.package.source_url_template,
            &serde_json::json!({ "version": self.package.version }),
        )?;
        Url::parse(&rendered).map_err(|e| Error::InvalidUrl {
            url: rendered.clone(),
            reason: e.to_string(),
        })
    }

    /// Release URL of a bundle archive, as written into `Package.swift`.
    pub fn binary_url(&self, file: &str) -> Result<String> {
        template::render(
            &self.package.binary_url_template,
            &serde_json::json!({
                "version": self.package.version,
                "product": self.package.product_name,
                "file": file,
            }),
        )
    }

    /// Returns the configured targets.
    pub fn targets(&self) -> &[TargetTriple] {
        &self.targets
    }

    /// Targets grouped by (sdk, platform), in canonical order.
    pub fn groups(&self) -> BTreeMap<PlatformGroup, Vec<TargetTriple>> {
        let mut groups: BTreeMap<PlatformGroup, Vec<TargetTriple>> = BTreeMap::new();
        for target in &self.targets {
            groups.entry(target.group()).or_default().push(target.clone());
        }
        groups
    }

    /// Returns the work directory.
    pub fn work_directory(&self) -> &Path {
        &self.work_directory
    }

    /// Returns the result directory.
    pub fn result_directory(&self) -> &Path {
        &self.result_directory
    }

    /// Whether existing stage outputs are reused.
    pub fn skip_existing_artifacts(&self) -> bool {
        self.skip_existing_artifacts
    }

    /// Returns the SDK version, if pinned.
    pub fn sdk_version(&self) -> Option<&str> {
        self.sdk_version.as_deref()
    }

    /// Minimum OS version for a platform group.
    pub fn deployment_target(&self, group: &PlatformGroup) -> Result<&str> {
        let key = group.deployment_key();
        self.deployment_targets
            .get(&key)
            .map(String::as_str)
            .ok_or_else(|| {
                Error::InvalidConfiguration(format!("no minimum version configured for {key}"))
            })
    }

    /// Returns all configured minimum OS versions.
    pub fn deployment_targets(&self) -> &BTreeMap<String, String> {
        &self.deployment_targets
    }

    /// Whether bitcode is embedded for `target`.
    ///
    /// Only device builds embed bitcode; macOS and simulators never do.
    pub fn embeds_bitcode(&self, target: &TargetTriple) -> bool {
        let group = target.group();
        !self.disable_bitcode && !group.is_macos_family() && !group.is_simulator()
    }

    /// Returns the job count.
    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// Returns the extra `configure` flags.
    pub fn configure_args(&self) -> &[String] {
        &self.configure_args
    }

    /// Returns the system libraries linked into the dynamic library.
    pub fn link_libraries(&self) -> &[String] {
        &self.link_libraries
    }

    /// Returns the explicit developer directory, if any.
    pub fn developer_dir(&self) -> Option<&Path> {
        self.developer_dir.as_deref()
    }

    /// Creates a new Settings instance (used by SettingsBuilder).
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        package: PackageSettings,
        dependency: DependencySettings,
        targets: Vec<TargetTriple>,
        work_directory: PathBuf,
        result_directory: PathBuf,
        skip_existing_artifacts: bool,
        sdk_version: Option<String>,
        deployment_targets: BTreeMap<String, String>,
        disable_bitcode: bool,
        jobs: usize,
        configure_args: Vec<String>,
        link_libraries: Vec<String>,
        developer_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            package,
            dependency,
            targets,
            work_directory,
            result_directory,
            skip_existing_artifacts,
            sdk_version,
            deployment_targets,
            disable_bitcode,
            jobs,
            configure_args,
            link_libraries,
            developer_dir,
        }
    }
}
