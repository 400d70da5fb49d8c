//! XCFramework `Info.plist` codec.
//!
//! The same document type describes the co-dependency bundle we consume and the
//! bundles we produce, so a produced bundle can serve as a later dependency input.
//!
//! Decoding is schema-checked: the package type and format version tags are
//! validated first, then every `AvailableLibraries` element is decoded into
//! [`ExternalManifestEntry`] on its own so a bad entry is reported by position.

use crate::bundler::{
    PlatformGroup, TargetTriple,
    error::{Error, ErrorExt, Result},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// `CFBundlePackageType` of an XCFramework.
pub const PACKAGE_TYPE: &str = "XFWK";

/// Supported `XCFrameworkFormatVersion`.
pub const FORMAT_VERSION: &str = "1.0";

/// Top-level XCFramework manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XcFrameworkManifest {
    /// Always [`PACKAGE_TYPE`].
    #[serde(rename = "CFBundlePackageType")]
    pub package_type: String,

    /// Always [`FORMAT_VERSION`].
    #[serde(rename = "XCFrameworkFormatVersion")]
    pub format_version: String,

    /// One entry per sub-bundle.
    #[serde(rename = "AvailableLibraries")]
    pub available_libraries: Vec<ExternalManifestEntry>,
}

/// One sub-bundle of an XCFramework.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalManifestEntry {
    /// Sub-bundle directory name (`ios-arm64_x86_64-simulator`).
    #[serde(rename = "LibraryIdentifier")]
    pub library_identifier: String,

    /// Library inside the sub-bundle (`libssl.a`, `openssl.framework`).
    #[serde(rename = "LibraryPath")]
    pub library_path: String,

    /// Binary path inside a framework, written by recent toolchains.
    #[serde(rename = "BinaryPath", default, skip_serializing_if = "Option::is_none")]
    pub binary_path: Option<String>,

    /// Headers directory inside the sub-bundle.
    #[serde(rename = "HeadersPath", default, skip_serializing_if = "Option::is_none")]
    pub headers_path: Option<String>,

    /// Debug symbols directory inside the sub-bundle.
    #[serde(
        rename = "DebugSymbolsPath",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub debug_symbols_path: Option<String>,

    /// Architectures of the library.
    #[serde(rename = "SupportedArchitectures")]
    pub supported_architectures: Vec<String>,

    /// `macos`, `ios`, `tvos` or `watchos`.
    #[serde(rename = "SupportedPlatform")]
    pub supported_platform: String,

    /// `simulator` or `maccatalyst`.
    #[serde(
        rename = "SupportedPlatformVariant",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub supported_platform_variant: Option<String>,
}

impl ExternalManifestEntry {
    /// Describes the sub-bundle of `group` built for `architectures`.
    pub fn for_group(
        group: &PlatformGroup,
        architectures: &[String],
        library_path: impl Into<String>,
        headers_path: Option<String>,
    ) -> Result<Self> {
        let (platform, variant) =
            group
                .xcframework_platform()
                .ok_or_else(|| Error::InvalidTarget {
                    value: group.to_string(),
                    reason: "no XCFramework platform for this sdk/platform pair".to_string(),
                })?;
        let mut architectures = architectures.to_vec();
        architectures.sort();
        Ok(Self {
            library_identifier: Self::identifier(platform, &architectures, variant),
            library_path: library_path.into(),
            binary_path: None,
            headers_path,
            debug_symbols_path: None,
            supported_architectures: architectures,
            supported_platform: platform.to_string(),
            supported_platform_variant: variant.map(str::to_string),
        })
    }

    /// Sub-bundle directory name in the form the Xcode tooling uses.
    pub fn identifier(platform: &str, architectures: &[String], variant: Option<&str>) -> String {
        let mut identifier = format!("{platform}-{}", architectures.join("_"));
        if let Some(variant) = variant {
            identifier.push('-');
            identifier.push_str(variant);
        }
        identifier
    }

    /// Library name derived from the library path.
    ///
    /// `openssl.framework` gives `openssl`, `libssl.a` gives `ssl`.
    pub fn library_name(&self) -> String {
        let path = Path::new(&self.library_path);
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        match path.extension().and_then(|e| e.to_str()) {
            Some("a") | Some("dylib") => stem
                .strip_prefix("lib")
                .map(str::to_string)
                .unwrap_or(stem),
            _ => stem,
        }
    }

    /// Whether the library is a framework bundle.
    pub fn is_framework(&self) -> bool {
        Path::new(&self.library_path)
            .extension()
            .is_some_and(|e| e == "framework")
    }

    /// The targets this entry provides, one per architecture.
    ///
    /// # Errors
    ///
    /// [`Error::UnsupportedManifestEntry`] when the (platform, variant) pair is not
    /// part of the known table.
    pub fn targets(&self) -> Result<Vec<TargetTriple>> {
        let unsupported = || Error::UnsupportedManifestEntry {
            identifier: self.library_identifier.clone(),
            platform: self.supported_platform.clone(),
            variant: self.supported_platform_variant.clone(),
        };
        self.supported_architectures
            .iter()
            .map(|arch| {
                TargetTriple::from_xcframework(
                    &self.supported_platform,
                    self.supported_platform_variant.as_deref(),
                    arch,
                )?
                .ok_or_else(unsupported)
            })
            .collect()
    }
}

impl XcFrameworkManifest {
    /// Creates a manifest with the standard tags.
    pub fn new(available_libraries: Vec<ExternalManifestEntry>) -> Self {
        Self {
            package_type: PACKAGE_TYPE.to_string(),
            format_version: FORMAT_VERSION.to_string(),
            available_libraries,
        }
    }

    /// Reads and validates the manifest at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).fs_context("reading manifest", path)?;
        Self::parse(&bytes).map_err(|e| match e {
            Error::Plist(error) => Error::InvalidManifest {
                path: path.to_path_buf(),
                reason: error.to_string(),
            },
            other => other,
        })
    }

    /// Decodes and validates a manifest document (XML or binary property list).
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let value = plist::Value::from_reader(std::io::Cursor::new(bytes))?;
        Self::from_value(value)
    }

    /// Validates a decoded property list.
    pub fn from_value(value: plist::Value) -> Result<Self> {
        let plist::Value::Dictionary(mut root) = value else {
            return Err(Error::InvalidManifest {
                path: Default::default(),
                reason: "top-level value is not a dictionary".to_string(),
            });
        };

        let package_type = root
            .get("CFBundlePackageType")
            .and_then(plist::Value::as_string)
            .map(str::to_string);
        let format_version = root
            .get("XCFrameworkFormatVersion")
            .and_then(plist::Value::as_string)
            .map(str::to_string);
        if package_type.as_deref() != Some(PACKAGE_TYPE)
            || format_version.as_deref() != Some(FORMAT_VERSION)
        {
            return Err(Error::UnsupportedManifestVersion {
                package_type,
                format_version,
            });
        }

        let libraries = match root.remove("AvailableLibraries") {
            Some(plist::Value::Array(libraries)) => libraries,
            Some(_) => {
                return Err(Error::InvalidManifest {
                    path: Default::default(),
                    reason: "AvailableLibraries is not an array".to_string(),
                });
            }
            None => {
                return Err(Error::InvalidManifest {
                    path: Default::default(),
                    reason: "AvailableLibraries is missing".to_string(),
                });
            }
        };

        let available_libraries = libraries
            .iter()
            .enumerate()
            .map(|(index, value)| {
                plist::from_value::<ExternalManifestEntry>(value).map_err(|e| {
                    Error::InvalidManifestEntry {
                        index,
                        reason: e.to_string(),
                    }
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(available_libraries))
    }

    /// Encodes the manifest as an XML property list.
    pub fn to_xml(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        plist::to_writer_xml(&mut bytes, self)?;
        Ok(bytes)
    }

    /// Writes the manifest as an XML property list.
    pub fn write(&self, path: &Path) -> Result<()> {
        let bytes = self.to_xml()?;
        std::fs::write(path, bytes).fs_context("writing manifest", path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
	<key>AvailableLibraries</key>
	<array>
		<dict>
			<key>HeadersPath</key>
			<string>Headers</string>
			<key>LibraryIdentifier</key>
			<string>ios-arm64_x86_64-simulator</string>
			<key>LibraryPath</key>
			<string>libssl.a</string>
			<key>SupportedArchitectures</key>
			<array>
				<string>arm64</string>
				<string>x86_64</string>
			</array>
			<key>SupportedPlatform</key>
			<string>ios</string>
			<key>SupportedPlatformVariant</key>
			<string>simulator</string>
		</dict>
	</array>
	<key>CFBundlePackageType</key>
	<string>XFWK</string>
	<key>XCFrameworkFormatVersion</key>
	<string>1.0</string>
</dict>
</plist>
"#;

    #[test]
    fn parses_sample() {
        let manifest = XcFrameworkManifest::parse(SAMPLE.as_bytes()).unwrap();
        let entry = &manifest.available_libraries[0];
        assert_eq!(entry.library_name(), "ssl");
        assert_eq!(entry.headers_path.as_deref(), Some("Headers"));
        let targets = entry.targets().unwrap();
        assert_eq!(targets[0].to_string(), "iOS-iOS_Simulator-arm64");
        assert_eq!(targets[1].to_string(), "iOS-iOS_Simulator-x86_64");
    }

    #[test]
    fn rejects_wrong_tags() {
        let doc = SAMPLE.replace("<string>1.0</string>", "<string>2.0</string>");
        let err = XcFrameworkManifest::parse(doc.as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedManifestVersion { format_version: Some(ref v), .. } if v == "2.0"
        ));
    }

    #[test]
    fn rejects_mistyped_entry_field() {
        let doc = SAMPLE.replace("<string>libssl.a</string>", "<integer>3</integer>");
        let err = XcFrameworkManifest::parse(doc.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::InvalidManifestEntry { index: 0, .. }));
    }

    #[test]
    fn unknown_platform_pair_is_unsupported() {
        let doc = SAMPLE.replace("<string>simulator</string>", "<string>vr</string>");
        let manifest = XcFrameworkManifest::parse(doc.as_bytes()).unwrap();
        let err = manifest.available_libraries[0].targets().unwrap_err();
        assert!(matches!(err, Error::UnsupportedManifestEntry { .. }));
    }

    #[test]
    fn framework_names_and_identifiers() {
        let group = PlatformGroup::new("iOS", "macOS").unwrap();
        let entry = ExternalManifestEntry::for_group(
            &group,
            &["x86_64".to_string(), "arm64".to_string()],
            "COpenLDAP.framework",
            None,
        )
        .unwrap();
        assert_eq!(entry.library_identifier, "ios-arm64_x86_64-maccatalyst");
        assert_eq!(entry.library_name(), "COpenLDAP");
        assert!(entry.is_framework());
    }

    #[test]
    fn xml_round_trip() {
        let manifest = XcFrameworkManifest::parse(SAMPLE.as_bytes()).unwrap();
        let again = XcFrameworkManifest::parse(&manifest.to_xml().unwrap()).unwrap();
        assert_eq!(manifest, again);
    }
}
