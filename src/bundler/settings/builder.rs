//! Builder for constructing Settings.

use super::{
    DEFAULT_CONFIGURE_ARGS, DEFAULT_LINK_LIBRARIES, DEFAULT_TARGETS, DependencySettings,
    PackageSettings, Settings, TargetTriple, validate_identifier,
};
use crate::bundler::error::{Error, Result};
use path_absolutize::Absolutize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use url::Url;

/// Minimum OS versions used when none are configured.
pub const DEFAULT_DEPLOYMENT_TARGETS: &[(&str, &str)] = &[
    ("macos", "10.15"),
    ("mac-catalyst", "13.1"),
    ("ios", "12.0"),
    ("tvos", "12.0"),
    ("watchos", "5.0"),
];

/// Work directory used when none is configured.
pub const DEFAULT_WORK_DIRECTORY: &str = "./openldap-workdir";

/// Builder for constructing [`Settings`].
///
/// Every setter is optional except the dependency URL; [`SettingsBuilder::build`]
/// fills the defaults and validates the whole configuration before any path is
/// derived from it.
///
/// # Examples
///
/// ```no_run
/// use xcframework_bundler::bundler::SettingsBuilder;
///
/// # fn example() -> xcframework_bundler::bundler::Result<()> {
/// let settings = SettingsBuilder::new()
///     .product_name("COpenLDAP")
///     .version("2.5.5")
///     .dependency_url("https://example.com/openssl.xcframework.zip")
///     .skip_existing_artifacts(true)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct SettingsBuilder {
    package: PackageSettings,
    dependency_url: Option<String>,
    dependency_sha256: Option<String>,
    targets: Vec<TargetTriple>,
    work_directory: Option<PathBuf>,
    result_directory: Option<PathBuf>,
    skip_existing_artifacts: bool,
    sdk_version: Option<String>,
    deployment_targets: BTreeMap<String, String>,
    disable_bitcode: bool,
    jobs: Option<usize>,
    configure_args: Option<Vec<String>>,
    link_libraries: Option<Vec<String>>,
    developer_dir: Option<PathBuf>,
}

impl SettingsBuilder {
    /// Creates a new settings builder.
    pub fn new() -> Self {
        Default::default()
    }

    /// Sets the product name.
    pub fn product_name(mut self, name: impl Into<String>) -> Self {
        self.package.product_name = name.into();
        self
    }

    /// Sets the library version.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.package.version = version.into();
        self
    }

    /// Sets the source tarball URL template.
    pub fn source_url_template(mut self, template: impl Into<String>) -> Self {
        self.package.source_url_template = template.into();
        self
    }

    /// Sets the expected SHA-256 of the source tarball.
    pub fn source_sha256(mut self, sha256: Option<String>) -> Self {
        self.package.source_sha256 = sha256;
        self
    }

    /// Sets the release URL template written into `Package.swift`.
    pub fn binary_url_template(mut self, template: impl Into<String>) -> Self {
        self.package.binary_url_template = template.into();
        self
    }

    /// Sets the `CFBundleIdentifier` prefix of the generated frameworks.
    pub fn bundle_identifier_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.package.bundle_identifier_prefix = prefix.into();
        self
    }

    /// Sets the co-dependency bundle URL (or local path).
    ///
    /// # Required
    ///
    /// This field is required for building.
    pub fn dependency_url(mut self, url: impl Into<String>) -> Self {
        self.dependency_url = Some(url.into());
        self
    }

    /// Sets the expected SHA-256 of the co-dependency archive.
    pub fn dependency_sha256(mut self, sha256: Option<String>) -> Self {
        self.dependency_sha256 = sha256;
        self
    }

    /// Sets the targets to build.
    ///
    /// Default: [`DEFAULT_TARGETS`]
    pub fn targets(mut self, targets: Vec<TargetTriple>) -> Self {
        self.targets = targets;
        self
    }

    /// Sets the work directory.
    ///
    /// Default: [`DEFAULT_WORK_DIRECTORY`]
    pub fn work_directory<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.work_directory = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the result directory.
    ///
    /// Default: the work directory
    pub fn result_directory<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.result_directory = Some(path.as_ref().to_path_buf());
        self
    }

    /// Reuse stage outputs that already exist.
    pub fn skip_existing_artifacts(mut self, skip: bool) -> Self {
        self.skip_existing_artifacts = skip;
        self
    }

    /// Pins the SDK version.
    pub fn sdk_version(mut self, version: Option<String>) -> Self {
        self.sdk_version = version;
        self
    }

    /// Overrides the minimum OS version of one platform (`ios`, `mac-catalyst`...).
    pub fn deployment_target(mut self, platform: impl Into<String>, version: impl Into<String>) -> Self {
        self.deployment_targets.insert(platform.into(), version.into());
        self
    }

    /// Disables bitcode embedding.
    pub fn disable_bitcode(mut self, disable: bool) -> Self {
        self.disable_bitcode = disable;
        self
    }

    /// Sets the job count.
    ///
    /// Default: number of CPUs
    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = Some(jobs);
        self
    }

    /// Replaces the extra `configure` flags.
    pub fn configure_args(mut self, args: Vec<String>) -> Self {
        self.configure_args = Some(args);
        self
    }

    /// Replaces the system libraries linked into the dynamic library.
    pub fn link_libraries(mut self, libraries: Vec<String>) -> Self {
        self.link_libraries = Some(libraries);
        self
    }

    /// Sets the Xcode developer directory instead of asking `xcode-select`.
    pub fn developer_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.developer_dir = Some(path.as_ref().to_path_buf());
        self
    }

    /// Builds the settings.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidIdentifier`] for an unsafe product name
    /// - [`Error::InvalidTarget`] for targets outside the platform table
    /// - [`Error::InvalidUrl`] for malformed URLs or templates
    /// - [`Error::InvalidConfiguration`] for missing or contradictory values
    pub fn build(self) -> Result<Settings> {
        validate_identifier("product name", &self.package.product_name)?;
        if self.package.version.is_empty()
            || self.package.version.contains(['/', '\\'])
            || self.package.version.chars().any(char::is_whitespace)
        {
            return Err(Error::InvalidConfiguration(format!(
                "invalid library version {:?}",
                self.package.version
            )));
        }

        let targets = if self.targets.is_empty() {
            DEFAULT_TARGETS
                .iter()
                .map(|t| t.parse())
                .collect::<Result<Vec<TargetTriple>>>()?
        } else {
            self.targets
        };
        let targets: Vec<TargetTriple> = targets
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        for target in &targets {
            if target.group().xcframework_platform().is_none() {
                return Err(Error::InvalidTarget {
                    value: target.to_string(),
                    reason: "no XCFramework platform for this sdk/platform pair".to_string(),
                });
            }
        }

        let mut deployment_targets: BTreeMap<String, String> = DEFAULT_DEPLOYMENT_TARGETS
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        deployment_targets.extend(self.deployment_targets);
        for target in &targets {
            let key = target.group().deployment_key();
            if !deployment_targets.contains_key(&key) {
                return Err(Error::InvalidConfiguration(format!(
                    "no minimum version configured for {key} (needed by {target})"
                )));
            }
        }

        let work_directory = absolutize(
            self.work_directory
                .as_deref()
                .unwrap_or_else(|| Path::new(DEFAULT_WORK_DIRECTORY)),
        )?;
        let result_directory = match &self.result_directory {
            Some(dir) => absolutize(dir)?,
            None => work_directory.clone(),
        };

        let dependency_url = self.dependency_url.ok_or_else(|| {
            Error::InvalidConfiguration("the dependency bundle URL is required".to_string())
        })?;
        let dependency = DependencySettings {
            url: parse_location(&dependency_url)?,
            sha256: self.dependency_sha256.map(|s| s.to_lowercase()),
        };

        let jobs = self.jobs.unwrap_or_else(num_cpus::get);
        if jobs == 0 {
            return Err(Error::InvalidConfiguration(
                "the job count must be at least 1".to_string(),
            ));
        }

        let mut package = self.package;
        package.source_sha256 = package.source_sha256.map(|s| s.to_lowercase());

        let settings = Settings::new(
            package,
            dependency,
            targets,
            work_directory,
            result_directory,
            self.skip_existing_artifacts,
            self.sdk_version,
            deployment_targets,
            self.disable_bitcode,
            jobs,
            self.configure_args.unwrap_or_else(|| {
                DEFAULT_CONFIGURE_ARGS.iter().map(|s| s.to_string()).collect()
            }),
            self.link_libraries.unwrap_or_else(|| {
                DEFAULT_LINK_LIBRARIES.iter().map(|s| s.to_string()).collect()
            }),
            self.developer_dir,
        );

        // Templates are checked now so a typo fails before any download.
        check_scheme(&settings.source_url()?)?;
        let sample = settings.binary_url("check.zip")?;
        Url::parse(&sample).map_err(|e| Error::InvalidUrl {
            url: sample.clone(),
            reason: e.to_string(),
        })?;

        Ok(settings)
    }
}

fn absolutize(path: &Path) -> Result<PathBuf> {
    Ok(path
        .absolutize()
        .map_err(|e| Error::InvalidConfiguration(format!("{}: {e}", path.display())))?
        .into_owned())
}

fn check_scheme(url: &Url) -> Result<()> {
    match url.scheme() {
        "http" | "https" | "file" => Ok(()),
        other => Err(Error::InvalidUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme {other:?}"),
        }),
    }
}

/// Parses a URL, accepting plain filesystem paths as `file` URLs.
fn parse_location(location: &str) -> Result<Url> {
    let url = match Url::parse(location) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let path = absolutize(Path::new(location))?;
            Url::from_file_path(&path).map_err(|()| Error::InvalidUrl {
                url: location.to_string(),
                reason: "not an absolute path".to_string(),
            })?
        }
        Err(e) => {
            return Err(Error::InvalidUrl {
                url: location.to_string(),
                reason: e.to_string(),
            });
        }
    };
    check_scheme(&url)?;
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> SettingsBuilder {
        SettingsBuilder::new()
            .work_directory("/tmp/xcf-work")
            .dependency_url("https://example.com/openssl.xcframework.zip")
    }

    #[test]
    fn defaults_fill_targets_and_versions() {
        let settings = builder().build().unwrap();
        assert_eq!(settings.targets().len(), DEFAULT_TARGETS.len());
        assert_eq!(settings.result_directory(), Path::new("/tmp/xcf-work"));
        assert_eq!(
            settings.source_url().unwrap().as_str(),
            "https://www.openldap.org/software/download/OpenLDAP/openldap-release/openldap-2.5.5.tgz"
        );
        assert!(settings.jobs() >= 1);
    }

    #[test]
    fn rejects_unsafe_product_name() {
        let err = builder().product_name("Open-LDAP").build().unwrap_err();
        assert!(matches!(err, Error::InvalidIdentifier { .. }));
        let err = builder().product_name("").build().unwrap_err();
        assert!(matches!(err, Error::InvalidIdentifier { .. }));
    }

    #[test]
    fn rejects_targets_outside_matrix() {
        let err = builder()
            .targets(vec!["iOS-visionOS-arm64".parse().unwrap()])
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTarget { .. }));
    }

    #[test]
    fn requires_dependency() {
        let err = SettingsBuilder::new().build().unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }

    #[test]
    fn plain_paths_become_file_urls() {
        let settings = SettingsBuilder::new()
            .work_directory("/tmp/xcf-work")
            .dependency_url("/opt/deps/openssl.xcframework")
            .build()
            .unwrap();
        assert_eq!(settings.dependency().url.scheme(), "file");
    }

    #[test]
    fn rejects_unknown_scheme_and_bad_template() {
        let err = builder()
            .source_url_template("ftp://example.com/{{ version }}.tgz")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidUrl { .. }));
        assert!(builder().source_url_template("https://x/{{ vers }}").build().is_err());
    }

    #[test]
    fn targets_are_sorted_and_deduplicated() {
        let a: TargetTriple = "iOS-iOS-arm64".parse().unwrap();
        let b: TargetTriple = "iOS-iOS_Simulator-x86_64".parse().unwrap();
        let settings = builder()
            .targets(vec![b.clone(), a.clone(), b.clone()])
            .build()
            .unwrap();
        assert_eq!(settings.targets(), &[a, b]);
    }

    #[test]
    fn bitcode_only_for_devices() {
        let settings = builder().build().unwrap();
        assert!(settings.embeds_bitcode(&"iOS-iOS-arm64".parse().unwrap()));
        assert!(!settings.embeds_bitcode(&"iOS-iOS_Simulator-arm64".parse().unwrap()));
        assert!(!settings.embeds_bitcode(&"iOS-macOS-arm64".parse().unwrap()));
        let settings = builder().disable_bitcode(true).build().unwrap();
        assert!(!settings.embeds_bitcode(&"iOS-iOS-arm64".parse().unwrap()));
    }
}
