//! Target matrix types.
//!
//! A [`TargetTriple`] identifies one cross-compiled variant (sdk, platform, arch).
//! Targets sharing an (sdk, platform) pair form a [`PlatformGroup`]: the unit the
//! merge engine fuses and the unit an XCFramework sub-bundle describes.

use crate::bundler::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Separator used between triple components in directory names and on the CLI.
pub const TARGET_SEPARATOR: char = '-';

/// Returns `true` when `value` is non-empty and only made of ASCII letters, digits
/// and underscores.
pub fn is_safe_identifier(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Validates an identifier that will be used to derive path components.
pub fn validate_identifier(kind: &'static str, value: &str) -> Result<()> {
    if is_safe_identifier(value) {
        Ok(())
    } else {
        Err(Error::InvalidIdentifier {
            kind,
            value: value.to_string(),
        })
    }
}

/// XCFramework (platform, variant) pairs and the (sdk, platform) they map to.
const XCFRAMEWORK_PLATFORMS: &[(&str, Option<&str>, &str, &str)] = &[
    ("macos", None, "macOS", "macOS"),
    ("ios", None, "iOS", "iOS"),
    ("ios", Some("simulator"), "iOS", "iOS_Simulator"),
    ("ios", Some("maccatalyst"), "iOS", "macOS"),
    ("tvos", None, "tvOS", "tvOS"),
    ("tvos", Some("simulator"), "tvOS", "tvOS_Simulator"),
    ("watchos", None, "watchOS", "watchOS"),
    ("watchos", Some("simulator"), "watchOS", "watchOS_Simulator"),
];

/// One (sdk, platform) pair of the target matrix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlatformGroup {
    sdk: String,
    platform: String,
}

impl PlatformGroup {
    /// Creates a group after validating both components.
    pub fn new(sdk: impl Into<String>, platform: impl Into<String>) -> Result<Self> {
        let sdk = sdk.into();
        let platform = platform.into();
        validate_identifier("sdk", &sdk)?;
        validate_identifier("platform", &platform)?;
        Ok(Self { sdk, platform })
    }

    /// Maps an XCFramework (platform, variant) pair to a group.
    ///
    /// Returns `None` for pairs outside the known table.
    pub fn from_xcframework(platform: &str, variant: Option<&str>) -> Option<Self> {
        XCFRAMEWORK_PLATFORMS
            .iter()
            .find(|(p, v, _, _)| *p == platform && *v == variant)
            .map(|(_, _, sdk, platform)| Self {
                sdk: (*sdk).to_string(),
                platform: (*platform).to_string(),
            })
    }

    /// The XCFramework (platform, variant) pair describing this group.
    pub fn xcframework_platform(&self) -> Option<(&'static str, Option<&'static str>)> {
        XCFRAMEWORK_PLATFORMS
            .iter()
            .find(|(_, _, sdk, platform)| *sdk == self.sdk && *platform == self.platform)
            .map(|(p, v, _, _)| (*p, *v))
    }

    /// SDK component.
    pub fn sdk(&self) -> &str {
        &self.sdk
    }

    /// Platform component.
    pub fn platform(&self) -> &str {
        &self.platform
    }

    /// Directory name of the group in the staged layout.
    pub fn dir_name(&self) -> String {
        format!("{}{TARGET_SEPARATOR}{}", self.sdk, self.platform)
    }

    /// Name of the platform in Xcode's `Platforms/` and `SDKs/` directories.
    pub fn legacy_platform_name(&self) -> String {
        match self.platform.as_str() {
            "macOS" => "MacOSX".to_string(),
            "iOS" => "iPhoneOS".to_string(),
            "iOS_Simulator" => "iPhoneSimulator".to_string(),
            "tvOS" => "AppleTVOS".to_string(),
            "tvOS_Simulator" => "AppleTVSimulator".to_string(),
            "watchOS" => "WatchOS".to_string(),
            "watchOS_Simulator" => "WatchSimulator".to_string(),
            other => other.replace('_', ""),
        }
    }

    /// Name used to key minimum deployment versions (`macos`, `mac-catalyst`,
    /// `ios-simulator`...).
    pub fn platform_version_name(&self) -> String {
        match (self.platform.as_str(), self.sdk.as_str()) {
            ("macOS", "iOS") => "mac-catalyst".to_string(),
            ("macOS", _) => "macos".to_string(),
            ("iOS", _) => "ios".to_string(),
            ("iOS_Simulator", _) => "ios-simulator".to_string(),
            ("tvOS", _) => "tvos".to_string(),
            ("tvOS_Simulator", _) => "tvos-simulator".to_string(),
            ("watchOS", _) => "watchos".to_string(),
            ("watchOS_Simulator", _) => "watchos-simulator".to_string(),
            (other, _) => other.to_lowercase().replace('_', "-"),
        }
    }

    /// Key of the minimum deployment version applying to this group.
    ///
    /// Simulators share the version of their device platform.
    pub fn deployment_key(&self) -> String {
        let name = self.platform_version_name();
        match name.strip_suffix("-simulator") {
            Some(base) => base.to_string(),
            None => name,
        }
    }

    /// OS and environment components of the clang target triple.
    fn clang_os_and_environment(&self) -> (String, &'static str) {
        match (self.sdk.as_str(), self.platform.as_str()) {
            ("iOS", "macOS") => ("ios".to_string(), "-macabi"),
            (_, platform) if platform.ends_with("_Simulator") => (
                platform.trim_end_matches("_Simulator").to_lowercase(),
                "-simulator",
            ),
            (_, platform) => (platform.to_lowercase(), ""),
        }
    }

    /// Whether the group runs on macOS (native or Catalyst).
    ///
    /// Only these platforms allow `fork` and use versioned framework bundles.
    pub fn is_macos_family(&self) -> bool {
        self.platform == "macOS"
    }

    /// Whether the group targets a simulator.
    pub fn is_simulator(&self) -> bool {
        self.platform.ends_with("_Simulator")
    }
}

impl fmt::Display for PlatformGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dir_name())
    }
}

/// One cross-compiled build variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetTriple {
    sdk: String,
    platform: String,
    arch: String,
}

impl TargetTriple {
    /// Creates a triple after validating every component.
    pub fn new(
        sdk: impl Into<String>,
        platform: impl Into<String>,
        arch: impl Into<String>,
    ) -> Result<Self> {
        let sdk = sdk.into();
        let platform = platform.into();
        let arch = arch.into();
        validate_identifier("sdk", &sdk)?;
        validate_identifier("platform", &platform)?;
        validate_identifier("architecture", &arch)?;
        Ok(Self {
            sdk,
            platform,
            arch,
        })
    }

    /// Maps an XCFramework (platform, variant, arch) to a triple.
    ///
    /// Returns `Ok(None)` for (platform, variant) pairs outside the known table.
    pub fn from_xcframework(
        platform: &str,
        variant: Option<&str>,
        arch: &str,
    ) -> Result<Option<Self>> {
        match PlatformGroup::from_xcframework(platform, variant) {
            Some(group) => Ok(Some(Self::new(group.sdk, group.platform, arch)?)),
            None => Ok(None),
        }
    }

    /// SDK component.
    pub fn sdk(&self) -> &str {
        &self.sdk
    }

    /// Platform component.
    pub fn platform(&self) -> &str {
        &self.platform
    }

    /// Architecture component.
    pub fn arch(&self) -> &str {
        &self.arch
    }

    /// The (sdk, platform) group of this triple.
    pub fn group(&self) -> PlatformGroup {
        PlatformGroup {
            sdk: self.sdk.clone(),
            platform: self.platform.clone(),
        }
    }

    /// Canonical directory name: components joined by [`TARGET_SEPARATOR`].
    pub fn dir_name(&self) -> String {
        format!(
            "{}{TARGET_SEPARATOR}{}{TARGET_SEPARATOR}{}",
            self.sdk, self.platform, self.arch
        )
    }

    /// Legacy Xcode platform name (`iPhoneOS`, `MacOSX`...).
    pub fn legacy_platform_name(&self) -> String {
        self.group().legacy_platform_name()
    }

    /// Host triple passed to `configure --host`.
    pub fn host_triple(&self) -> String {
        if self.arch.starts_with("arm") {
            "arm-apple-darwin".to_string()
        } else {
            format!("{}-apple-darwin", self.arch)
        }
    }

    /// Clang `-target` value for the given minimum OS version.
    pub fn clang_target(&self, min_version: &str) -> String {
        let (os, environment) = self.group().clang_os_and_environment();
        format!("{}-apple-{os}{min_version}{environment}", self.arch)
    }
}

impl fmt::Display for TargetTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dir_name())
    }
}

impl FromStr for TargetTriple {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        let components: Vec<&str> = value.split(TARGET_SEPARATOR).collect();
        let [sdk, platform, arch] = components.as_slice() else {
            return Err(Error::InvalidTarget {
                value: value.to_string(),
                reason: "expected sdk-platform-arch".to_string(),
            });
        };
        Self::new(*sdk, *platform, *arch).map_err(|e| Error::InvalidTarget {
            value: value.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Targets built when none are configured.
pub const DEFAULT_TARGETS: &[&str] = &[
    "macOS-macOS-x86_64",
    "macOS-macOS-arm64",
    "iOS-iOS-arm64",
    "iOS-iOS_Simulator-x86_64",
    "iOS-iOS_Simulator-arm64",
    "iOS-macOS-x86_64",
    "iOS-macOS-arm64",
    "tvOS-tvOS-arm64",
    "tvOS-tvOS_Simulator-x86_64",
    "tvOS-tvOS_Simulator-arm64",
    "watchOS-watchOS-armv7k",
    "watchOS-watchOS-arm64_32",
    "watchOS-watchOS_Simulator-x86_64",
    "watchOS-watchOS_Simulator-arm64",
];
