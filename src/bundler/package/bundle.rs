//! Sub-bundle staging: static library plus headers, and framework bundles.

use crate::bundler::{
    PlatformGroup,
    error::{Error, ErrorExt, Result},
    utils::fs::symlink,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Umbrella header file name of a product.
pub fn umbrella_name(product: &str) -> String {
    format!("{product}.h")
}

/// Umbrella header including every merged header through the product namespace.
pub fn umbrella_header(product: &str, headers: &[PathBuf]) -> String {
    let umbrella = umbrella_name(product);
    let mut out = format!("/* Umbrella header of {product}. */\n\n");
    for header in headers {
        let name = header.to_string_lossy().replace('\\', "/");
        if name == umbrella {
            continue;
        }
        out.push_str(&format!("#include <{product}/{name}>\n"));
    }
    out
}

/// Module map of a static sub-bundle, placed in its `Headers/` directory.
pub fn static_module_map(product: &str) -> String {
    format!(
        "module {product} {{\n    umbrella header \"{product}/{}\"\n    export *\n}}\n",
        umbrella_name(product)
    )
}

/// Module map of a framework, placed in its `Modules/` directory.
pub fn framework_module_map(product: &str) -> String {
    format!(
        "framework module {product} {{\n    umbrella header \"{}\"\n    export *\n    module * {{ export * }}\n}}\n",
        umbrella_name(product)
    )
}

/// `Info.plist` of a framework bundle.
#[derive(Debug, Clone, Serialize)]
pub struct FrameworkInfo {
    #[serde(rename = "CFBundleDevelopmentRegion")]
    development_region: String,
    #[serde(rename = "CFBundleExecutable")]
    executable: String,
    #[serde(rename = "CFBundleIdentifier")]
    identifier: String,
    #[serde(rename = "CFBundleInfoDictionaryVersion")]
    info_dictionary_version: String,
    #[serde(rename = "CFBundleName")]
    name: String,
    #[serde(rename = "CFBundlePackageType")]
    package_type: String,
    #[serde(rename = "CFBundleShortVersionString")]
    short_version: String,
    #[serde(rename = "CFBundleVersion")]
    version: String,
    #[serde(rename = "CFBundleSupportedPlatforms")]
    supported_platforms: Vec<String>,
    #[serde(rename = "LSMinimumSystemVersion", skip_serializing_if = "Option::is_none")]
    minimum_system_version: Option<String>,
    #[serde(rename = "MinimumOSVersion", skip_serializing_if = "Option::is_none")]
    minimum_os_version: Option<String>,
}

impl FrameworkInfo {
    /// Describes the framework of `product` for `group`.
    pub fn new(
        product: &str,
        version: &str,
        identifier_prefix: &str,
        group: &PlatformGroup,
        min_version: &str,
    ) -> Self {
        let macos = group.is_macos_family();
        Self {
            development_region: "en".to_string(),
            executable: product.to_string(),
            identifier: format!("{identifier_prefix}.{product}"),
            info_dictionary_version: "6.0".to_string(),
            name: product.to_string(),
            package_type: "FMWK".to_string(),
            short_version: version.to_string(),
            version: version.to_string(),
            supported_platforms: vec![group.legacy_platform_name()],
            minimum_system_version: macos.then(|| min_version.to_string()),
            minimum_os_version: (!macos).then(|| min_version.to_string()),
        }
    }

    /// Writes the XML property list.
    pub fn write(&self, path: &Path) -> Result<()> {
        plist::to_file_xml(path, self)?;
        Ok(())
    }
}

/// Inputs of one group's sub-bundles.
#[derive(Debug, Clone)]
pub struct BundleInputs {
    /// Product name.
    pub product: String,
    /// Combined static library.
    pub static_library: PathBuf,
    /// Fat dynamic library.
    pub dynamic_library: PathBuf,
    /// Root of the reconciled headers.
    pub headers_dir: PathBuf,
    /// Reconciled headers relative to `headers_dir`.
    pub headers: Vec<PathBuf>,
    /// Framework metadata.
    pub info: FrameworkInfo,
    /// Versioned framework layout.
    pub versioned: bool,
}

fn copy(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent).fs_context("creating directory", parent)?;
    }
    std::fs::copy(from, to).fs_context("copying file", from)?;
    Ok(())
}

fn write(path: &Path, contents: impl AsRef<[u8]>) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).fs_context("creating directory", parent)?;
    }
    std::fs::write(path, contents).fs_context("writing file", path)
}

/// Copies the headers and adds the umbrella header unless one was installed.
fn stage_headers(inputs: &BundleInputs, dest: &Path) -> Result<()> {
    for header in &inputs.headers {
        copy(&inputs.headers_dir.join(header), &dest.join(header))?;
    }
    let umbrella = dest.join(umbrella_name(&inputs.product));
    if !umbrella.exists() {
        write(&umbrella, umbrella_header(&inputs.product, &inputs.headers))?;
    }
    Ok(())
}

/// Stages `lib<Product>.a`, `Headers/<Product>/…` and `Headers/module.modulemap`
/// into `dir`. Returns the library file name.
pub fn stage_static(inputs: &BundleInputs, dir: &Path) -> Result<String> {
    let library = inputs
        .static_library
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::GenericError("static library has no file name".to_string()))?;
    copy(&inputs.static_library, &dir.join(&library))?;
    let headers = dir.join("Headers");
    stage_headers(inputs, &headers.join(&inputs.product))?;
    write(
        &headers.join("module.modulemap"),
        static_module_map(&inputs.product),
    )?;
    Ok(library)
}

/// Stages `<Product>.framework` into `dir`. Returns the framework directory name.
///
/// macOS-family frameworks get the versioned layout (`Versions/A` with
/// `Versions/Current` and top-level symlinks), the others the shallow one.
pub fn stage_framework(inputs: &BundleInputs, dir: &Path) -> Result<String> {
    let name = format!("{}.framework", inputs.product);
    let framework = dir.join(&name);
    let product = &inputs.product;

    if inputs.versioned {
        let version = framework.join("Versions").join("A");
        copy(&inputs.dynamic_library, &version.join(product))?;
        stage_headers(inputs, &version.join("Headers"))?;
        write(
            &version.join("Modules").join("module.modulemap"),
            framework_module_map(product),
        )?;
        let resources = version.join("Resources");
        std::fs::create_dir_all(&resources).fs_context("creating directory", &resources)?;
        inputs.info.write(&resources.join("Info.plist"))?;

        let current = framework.join("Versions").join("Current");
        symlink(Path::new("A"), &current).fs_context("creating link", &current)?;
        for entry in [product.as_str(), "Headers", "Modules", "Resources"] {
            let link = framework.join(entry);
            symlink(&Path::new("Versions").join("Current").join(entry), &link)
                .fs_context("creating link", &link)?;
        }
    } else {
        copy(&inputs.dynamic_library, &framework.join(product))?;
        stage_headers(inputs, &framework.join("Headers"))?;
        write(
            &framework.join("Modules").join("module.modulemap"),
            framework_module_map(product),
        )?;
        inputs.info.write(&framework.join("Info.plist"))?;
    }
    Ok(name)
}
