//! `Package.swift` generation.

use crate::bundler::{Settings, error::Result, utils::template};
use serde::Serialize;

const PACKAGE_SWIFT_TEMPLATE: &str = r#"// swift-tools-version:5.3
import PackageDescription


/* Binary package definition for {{ product }}. */

let package = Package(
	name: "{{ product }}",
	platforms: [
{{#each platforms}}		.{{ this.name }}("{{ this.version }}"){{#unless @last}},{{/unless}}
{{/each}}	],
	products: [
{{#each targets}}		.library(name: "{{ this.name }}", targets: ["{{ this.name }}"]){{#unless @last}},{{/unless}}
{{/each}}	],
	targets: [
{{#each targets}}		.binaryTarget(name: "{{ this.name }}", url: "{{ this.url }}", checksum: "{{ this.checksum }}"){{#unless @last}},{{/unless}}
{{/each}}	]
)
"#;

/// A zipped XCFramework referenced from the package.
#[derive(Debug, Clone, Serialize)]
pub struct BinaryTarget {
    /// Target name (`COpenLDAP-static`).
    pub name: String,
    /// Download URL of the archive.
    pub url: String,
    /// SHA-256 of the archive.
    pub checksum: String,
}

#[derive(Serialize)]
struct Platform {
    name: &'static str,
    version: String,
}

#[derive(Serialize)]
struct PackageDescription<'a> {
    product: &'a str,
    platforms: Vec<Platform>,
    targets: &'a [BinaryTarget],
}

/// Swift package platform names and the deployment key constraining them.
const SWIFT_PLATFORMS: &[(&str, &str)] = &[
    ("macOS", "macos"),
    ("iOS", "ios"),
    ("tvOS", "tvos"),
    ("watchOS", "watchos"),
];

/// Renders `Package.swift` for `targets`.
///
/// Platform constraints are the minimum versions of the platforms the configured
/// targets cover.
pub fn render_package_swift(settings: &Settings, targets: &[BinaryTarget]) -> Result<String> {
    let keys: Vec<String> = settings
        .groups()
        .keys()
        .map(|group| group.deployment_key())
        .collect();
    let platforms = SWIFT_PLATFORMS
        .iter()
        .filter(|(_, key)| keys.iter().any(|k| k == key))
        .filter_map(|(name, key)| {
            settings.deployment_targets().get(*key).map(|version| Platform {
                name,
                version: version.clone(),
            })
        })
        .collect();

    template::render(
        PACKAGE_SWIFT_TEMPLATE,
        &PackageDescription {
            product: settings.product_name(),
            platforms,
            targets,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::{SettingsBuilder, TargetTriple};

    #[test]
    fn lists_targets_and_covered_platforms() {
        let settings = SettingsBuilder::new()
            .work_directory("/tmp/w")
            .dependency_url("/tmp/COpenSSL.xcframework")
            .targets(vec![
                "macOS-macOS-arm64".parse::<TargetTriple>().unwrap(),
                "iOS-iOS_Simulator-arm64".parse::<TargetTriple>().unwrap(),
            ])
            .build()
            .unwrap();
        let targets = vec![
            BinaryTarget {
                name: "COpenLDAP-static".into(),
                url: "https://example.com/COpenLDAP-static.xcframework.zip".into(),
                checksum: "aa".into(),
            },
            BinaryTarget {
                name: "COpenLDAP-dynamic".into(),
                url: "https://example.com/COpenLDAP-dynamic.xcframework.zip".into(),
                checksum: "bb".into(),
            },
        ];
        let text = render_package_swift(&settings, &targets).unwrap();
        assert!(text.starts_with("// swift-tools-version:5.3\n"));
        assert!(text.contains("\t\t.macOS(\"10.15\"),\n\t\t.iOS(\"12.0\")\n\t],"));
        assert!(!text.contains(".tvOS"));
        assert!(text.contains(
            ".binaryTarget(name: \"COpenLDAP-dynamic\", url: \"https://example.com/COpenLDAP-dynamic.xcframework.zip\", checksum: \"bb\")\n"
        ));
        assert!(text.contains(".library(name: \"COpenLDAP-static\", targets: [\"COpenLDAP-static\"]),\n"));
    }
}
