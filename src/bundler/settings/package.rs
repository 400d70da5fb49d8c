//! Library and dependency source settings.

use url::Url;

/// Product name used when none is configured.
pub const DEFAULT_PRODUCT_NAME: &str = "COpenLDAP";

/// Library version used when none is configured.
pub const DEFAULT_VERSION: &str = "2.5.5";

/// Source tarball URL template; `{{ version }}` is replaced by the library version.
pub const DEFAULT_SOURCE_URL_TEMPLATE: &str = "https://www.openldap.org/software/download/OpenLDAP/openldap-release/openldap-{{ version }}.tgz";

/// URL template of the released archives referenced from `Package.swift`.
///
/// Available placeholders: `{{ version }}`, `{{ product }}` and `{{ file }}`.
pub const DEFAULT_BINARY_URL_TEMPLATE: &str =
    "https://github.com/xcode-actions/{{ product }}/releases/download/{{ version }}/{{ file }}";

/// Configure flags for a library-only, static OpenLDAP build.
pub const DEFAULT_CONFIGURE_ARGS: &[&str] = &[
    "--disable-slapd",
    "--disable-shared",
    "--enable-static",
    "--without-cyrus-sasl",
    "--with-tls=openssl",
    "--with-yielding_select=yes",
];

/// System libraries the derived dynamic library links against.
pub const DEFAULT_LINK_LIBRARIES: &[&str] = &["resolv"];

/// Library being built and the archive it comes from.
///
/// # Examples
///
/// ```no_run
/// use xcframework_bundler::bundler::PackageSettings;
///
/// let settings = PackageSettings {
///     product_name: "COpenLDAP".into(),
///     version: "2.5.5".into(),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct PackageSettings {
    /// Name of the produced bundles and libraries.
    ///
    /// Restricted to ASCII letters, digits and underscores.
    pub product_name: String,

    /// Version of the library; substituted into the URL templates.
    pub version: String,

    /// Template of the source tarball URL.
    pub source_url_template: String,

    /// Expected SHA-256 of the tarball. `None` skips the integrity check.
    pub source_sha256: Option<String>,

    /// Template of the release URL written into `Package.swift`.
    pub binary_url_template: String,

    /// Prefix of the `CFBundleIdentifier` of the generated frameworks.
    pub bundle_identifier_prefix: String,
}

impl Default for PackageSettings {
    fn default() -> Self {
        Self {
            product_name: DEFAULT_PRODUCT_NAME.to_string(),
            version: DEFAULT_VERSION.to_string(),
            source_url_template: DEFAULT_SOURCE_URL_TEMPLATE.to_string(),
            source_sha256: None,
            binary_url_template: DEFAULT_BINARY_URL_TEMPLATE.to_string(),
            bundle_identifier_prefix: "org.openldap".to_string(),
        }
    }
}

/// Location of the co-dependency's multi-platform bundle.
#[derive(Debug, Clone)]
pub struct DependencySettings {
    /// `http`, `https` or `file` URL of a zipped XCFramework, or `file` URL of an
    /// XCFramework directory.
    pub url: Url,

    /// Expected SHA-256 of the archive. `None` skips the integrity check.
    pub sha256: Option<String>,
}
