//! Staged directory tree of a pipeline run.
//!
//! Every stage reads exclusively from the previous stage's directory, so the tree
//! doubles as the resumability contract: a stage whose output exists can be skipped.
//!
//! ```text
//! <work>/
//! ├── downloads/                         source tarball
//! ├── dependency/                        extracted co-dependency bundle
//! └── build/
//!     ├── step1.sources/<target>/        extracted, patched, configured sources
//!     ├── step2.installs/<target>/       install roots
//!     ├── step3.fat-archives/<group>/    one fused archive per library name
//!     ├── step3.extracted-objects/<group>/<arch>/
//!     ├── step3.derived-dylibs/<group>/  per-arch and fused dynamic libraries
//!     ├── step4.merged-headers/<group>/  reconciled header set
//!     ├── step4.merged-libs/<group>/     combined static library
//!     └── step5.final-bundles/{static,dynamic}/<group>/
//! ```

use crate::bundler::{
    PlatformGroup, Settings, TargetTriple,
    error::{ErrorExt, Result},
    settings::validate_identifier,
};
use std::path::{Path, PathBuf};

const BUILD_DIR: &str = "build";
const SOURCES_DIR: &str = "step1.sources";
const INSTALLS_DIR: &str = "step2.installs";
const FAT_ARCHIVES_DIR: &str = "step3.fat-archives";
const EXTRACTED_OBJECTS_DIR: &str = "step3.extracted-objects";
const DERIVED_DYLIBS_DIR: &str = "step3.derived-dylibs";
const MERGED_HEADERS_DIR: &str = "step4.merged-headers";
const MERGED_LIBS_DIR: &str = "step4.merged-libs";
const FINAL_BUNDLES_DIR: &str = "step5.final-bundles";

/// Name of the build report written to the result directory.
pub const REPORT_FILE_NAME: &str = "build-report.json";

/// Paths of every stage of a run.
#[derive(Debug, Clone)]
pub struct BuildLayout {
    product_name: String,
    work_directory: PathBuf,
    result_directory: PathBuf,
}

impl BuildLayout {
    /// Creates a layout after validating the product name.
    pub fn new(
        product_name: &str,
        work_directory: impl Into<PathBuf>,
        result_directory: impl Into<PathBuf>,
    ) -> Result<Self> {
        validate_identifier("product name", product_name)?;
        Ok(Self {
            product_name: product_name.to_string(),
            work_directory: work_directory.into(),
            result_directory: result_directory.into(),
        })
    }

    /// Creates the layout described by `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(
            settings.product_name(),
            settings.work_directory(),
            settings.result_directory(),
        )
    }

    /// Product name the bundle paths are derived from.
    pub fn product_name(&self) -> &str {
        &self.product_name
    }

    /// Root of the intermediate tree.
    pub fn work_directory(&self) -> &Path {
        &self.work_directory
    }

    /// Directory receiving the final outputs.
    pub fn result_directory(&self) -> &Path {
        &self.result_directory
    }

    /// Download cache for the source tarball.
    pub fn downloads_dir(&self) -> PathBuf {
        self.work_directory.join("downloads")
    }

    /// Extraction directory of the co-dependency bundle.
    pub fn dependency_dir(&self) -> PathBuf {
        self.work_directory.join("dependency")
    }

    fn build_dir(&self) -> PathBuf {
        self.work_directory.join(BUILD_DIR)
    }

    fn stage_dir(&self, stage: &str) -> PathBuf {
        self.build_dir().join(stage)
    }

    /// Extracted and patched sources of one target.
    pub fn source_dir(&self, target: &TargetTriple) -> PathBuf {
        self.stage_dir(SOURCES_DIR).join(target.dir_name())
    }

    /// Install root (`--prefix`) of one target.
    pub fn install_dir(&self, target: &TargetTriple) -> PathBuf {
        self.stage_dir(INSTALLS_DIR).join(target.dir_name())
    }

    /// Fused multi-architecture archives of one group.
    pub fn fat_archives_dir(&self, group: &PlatformGroup) -> PathBuf {
        self.stage_dir(FAT_ARCHIVES_DIR).join(group.dir_name())
    }

    /// Object members of one architecture of a group, for relinking.
    pub fn extracted_objects_dir(&self, group: &PlatformGroup, arch: &str) -> PathBuf {
        self.stage_dir(EXTRACTED_OBJECTS_DIR)
            .join(group.dir_name())
            .join(arch)
    }

    /// Derived dynamic libraries of one group.
    pub fn derived_dylibs_dir(&self, group: &PlatformGroup) -> PathBuf {
        self.stage_dir(DERIVED_DYLIBS_DIR).join(group.dir_name())
    }

    /// Reconciled headers of one group.
    pub fn merged_headers_dir(&self, group: &PlatformGroup) -> PathBuf {
        self.stage_dir(MERGED_HEADERS_DIR).join(group.dir_name())
    }

    /// Combined static library directory of one group.
    pub fn merged_libs_dir(&self, group: &PlatformGroup) -> PathBuf {
        self.stage_dir(MERGED_LIBS_DIR).join(group.dir_name())
    }

    /// Combined static library of one group (`lib<Product>.a`).
    pub fn merged_lib_path(&self, group: &PlatformGroup) -> PathBuf {
        self.merged_libs_dir(group).join(self.static_library_name())
    }

    /// Staged static sub-bundle of one group.
    pub fn static_bundle_dir(&self, group: &PlatformGroup) -> PathBuf {
        self.stage_dir(FINAL_BUNDLES_DIR)
            .join("static")
            .join(group.dir_name())
    }

    /// Staged dynamic sub-bundle of one group.
    pub fn dynamic_bundle_dir(&self, group: &PlatformGroup) -> PathBuf {
        self.stage_dir(FINAL_BUNDLES_DIR)
            .join("dynamic")
            .join(group.dir_name())
    }

    /// File name of the combined static library.
    pub fn static_library_name(&self) -> String {
        format!("lib{}.a", self.product_name)
    }

    /// Static XCFramework in the result directory.
    pub fn static_xcframework(&self) -> PathBuf {
        self.result_directory
            .join(format!("{}-static.xcframework", self.product_name))
    }

    /// Dynamic XCFramework in the result directory.
    pub fn dynamic_xcframework(&self) -> PathBuf {
        self.result_directory
            .join(format!("{}-dynamic.xcframework", self.product_name))
    }

    /// Zip archive of a bundle: the bundle path with `.zip` appended.
    pub fn archive_path(bundle: &Path) -> PathBuf {
        let mut name = bundle.as_os_str().to_os_string();
        name.push(".zip");
        PathBuf::from(name)
    }

    /// Sibling path an output is staged at before it is renamed into place.
    pub fn staging_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_os_string();
        name.push(".partial");
        PathBuf::from(name)
    }

    /// `Package.swift` in the result directory.
    pub fn package_swift(&self) -> PathBuf {
        self.result_directory.join("Package.swift")
    }

    /// Build report in the result directory.
    pub fn report_path(&self) -> PathBuf {
        self.result_directory.join(REPORT_FILE_NAME)
    }

    /// Creates every stage directory.
    ///
    /// Per-target and per-group leaves are not created here: their existence marks a
    /// completed stage. Calling this repeatedly is harmless.
    pub async fn ensure(&self) -> Result<()> {
        let mut dirs = vec![
            self.downloads_dir(),
            self.dependency_dir(),
            self.result_directory.clone(),
        ];
        dirs.extend(
            [
                SOURCES_DIR,
                INSTALLS_DIR,
                FAT_ARCHIVES_DIR,
                EXTRACTED_OBJECTS_DIR,
                DERIVED_DYLIBS_DIR,
                MERGED_HEADERS_DIR,
                MERGED_LIBS_DIR,
            ]
            .iter()
            .map(|stage| self.stage_dir(stage)),
        );
        dirs.push(self.stage_dir(FINAL_BUNDLES_DIR).join("static"));
        dirs.push(self.stage_dir(FINAL_BUNDLES_DIR).join("dynamic"));

        for dir in dirs {
            tokio::fs::create_dir_all(&dir)
                .await
                .fs_context("creating stage directory", &dir)?;
        }
        log::debug!("✓ Build layout ready under {}", self.work_directory.display());
        Ok(())
    }

    /// Removes the build tree, the dependency copy and the final outputs.
    ///
    /// The download cache is kept.
    pub async fn clean(&self) -> Result<()> {
        let static_bundle = self.static_xcframework();
        let dynamic_bundle = self.dynamic_xcframework();
        let dirs = [
            self.build_dir(),
            self.dependency_dir(),
            static_bundle.clone(),
            dynamic_bundle.clone(),
            Self::staging_path(&static_bundle),
            Self::staging_path(&dynamic_bundle),
        ];
        for dir in dirs {
            if tokio::fs::try_exists(&dir).await.unwrap_or(false) {
                log::info!("Removing {}", dir.display());
                tokio::fs::remove_dir_all(&dir)
                    .await
                    .fs_context("removing directory", &dir)?;
            }
        }

        let files = [
            Self::archive_path(&static_bundle),
            Self::archive_path(&dynamic_bundle),
            Self::staging_path(&Self::archive_path(&static_bundle)),
            Self::staging_path(&Self::archive_path(&dynamic_bundle)),
            self.package_swift(),
            self.report_path(),
        ];
        for file in files {
            if tokio::fs::try_exists(&file).await.unwrap_or(false) {
                tokio::fs::remove_file(&file)
                    .await
                    .fs_context("removing file", &file)?;
            }
        }
        Ok(())
    }
}
