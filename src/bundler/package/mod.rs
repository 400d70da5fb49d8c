//! Package assembler.
//!
//! Turns the merged artifacts of every platform group into the final outputs:
//!
//! - `<Product>-static.xcframework`: one `lib<Product>.a` plus headers per group,
//! - `<Product>-dynamic.xcframework`: one `<Product>.framework` per group,
//! - a deterministic zip archive of each,
//! - `Package.swift` referencing the archives by URL and checksum.
//!
//! Each output is reused when skip-existing is enabled, it exists, and nothing it is
//! made from was recomputed during this run.

mod archive;
mod bundle;
mod swift;

pub use archive::zip_bundle;
pub use bundle::{
    BundleInputs, FrameworkInfo, framework_module_map, stage_framework, stage_static,
    static_module_map, umbrella_header,
};
pub use swift::{BinaryTarget, render_package_swift};

use crate::bundler::{
    BuildLayout, ExternalManifestEntry, PlatformGroup, Settings, XcFrameworkManifest,
    builder::checksum::calculate_sha256,
    error::{Error, ErrorExt, Result},
    merge::MergedPlatformArtifact,
    utils::fs,
};
use std::path::{Path, PathBuf};

/// A zipped bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleArchive {
    /// Archive path.
    pub path: PathBuf,
    /// SHA-256 of the archive, lowercase hex.
    pub checksum: String,
}

/// Outputs of the assembler.
#[derive(Debug, Clone)]
pub struct AssembledPackage {
    /// Static XCFramework.
    pub static_xcframework: PathBuf,
    /// Dynamic XCFramework.
    pub dynamic_xcframework: PathBuf,
    /// Static then dynamic archive.
    pub archives: Vec<BundleArchive>,
    /// Generated package descriptor.
    pub package_swift: PathBuf,
    /// Whether any output was recomputed during this run.
    pub recomputed: bool,
}

/// Linkage of an XCFramework.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Linkage {
    Static,
    Dynamic,
}

/// Assembles the final bundles.
pub struct Assembler<'a> {
    settings: &'a Settings,
    layout: &'a BuildLayout,
}

impl<'a> Assembler<'a> {
    /// Creates an assembler.
    pub fn new(settings: &'a Settings, layout: &'a BuildLayout) -> Self {
        Self { settings, layout }
    }

    async fn reusable(&self, path: &Path, recomputed: bool) -> bool {
        let reuse =
            self.settings.skip_existing_artifacts() && !recomputed && fs::exists(path).await;
        if reuse {
            log::info!("Reusing {}", path.display());
        }
        reuse
    }

    /// Assembles every output from the merged groups.
    pub async fn assemble(&self, merged: &[MergedPlatformArtifact]) -> Result<AssembledPackage> {
        if merged.is_empty() {
            return Err(Error::InvalidConfiguration(
                "no platform group to assemble".to_string(),
            ));
        }
        let mut recomputed = false;
        for artifact in merged {
            recomputed |= self.stage_group(artifact, artifact.recomputed).await?;
            recomputed |= artifact.recomputed;
        }

        let static_xcframework = self.layout.static_xcframework();
        let dynamic_xcframework = self.layout.dynamic_xcframework();
        recomputed |= self
            .write_xcframework(Linkage::Static, &static_xcframework, merged, recomputed)
            .await?;
        recomputed |= self
            .write_xcframework(Linkage::Dynamic, &dynamic_xcframework, merged, recomputed)
            .await?;

        let mut archives = Vec::with_capacity(2);
        for bundle in [&static_xcframework, &dynamic_xcframework] {
            let (archive, rezipped) = self.write_archive(bundle, recomputed).await?;
            recomputed |= rezipped;
            archives.push(archive);
        }

        let package_swift = self.layout.package_swift();
        if !self.reusable(&package_swift, recomputed).await {
            self.write_package_swift(&archives, &package_swift).await?;
            recomputed = true;
        }

        Ok(AssembledPackage {
            static_xcframework,
            dynamic_xcframework,
            archives,
            package_swift,
            recomputed,
        })
    }

    /// Stages both sub-bundles of one group. Returns whether they were restaged.
    async fn stage_group(&self, merged: &MergedPlatformArtifact, recomputed: bool) -> Result<bool> {
        let group = &merged.group;
        let static_dir = self.layout.static_bundle_dir(group);
        let dynamic_dir = self.layout.dynamic_bundle_dir(group);
        if self.reusable(&static_dir, recomputed).await
            && self.reusable(&dynamic_dir, recomputed).await
        {
            return Ok(false);
        }

        log::info!("Staging bundles of {group}");
        let inputs = self.bundle_inputs(merged)?;
        fs::create_dir_all(&static_dir, true).await?;
        fs::create_dir_all(&dynamic_dir, true).await?;
        let result = tokio::task::spawn_blocking({
            let static_dir = static_dir.clone();
            let dynamic_dir = dynamic_dir.clone();
            move || -> Result<()> {
                stage_static(&inputs, &static_dir)?;
                stage_framework(&inputs, &dynamic_dir)?;
                Ok(())
            }
        })
        .await?;
        if let Err(e) = result {
            fs::remove_dir_all(&static_dir).await?;
            fs::remove_dir_all(&dynamic_dir).await?;
            return Err(e);
        }
        Ok(true)
    }

    fn bundle_inputs(&self, merged: &MergedPlatformArtifact) -> Result<BundleInputs> {
        let group = &merged.group;
        let product = self.settings.product_name();
        Ok(BundleInputs {
            product: product.to_string(),
            static_library: merged.static_library.clone(),
            dynamic_library: merged.dynamic_library.clone(),
            headers_dir: merged.headers_dir.clone(),
            headers: merged.headers.clone(),
            info: FrameworkInfo::new(
                product,
                self.settings.version_string(),
                &self.settings.package().bundle_identifier_prefix,
                group,
                self.settings.deployment_target(group)?,
            ),
            versioned: group.is_macos_family(),
        })
    }

    fn staged_dir(&self, linkage: Linkage, group: &PlatformGroup) -> PathBuf {
        match linkage {
            Linkage::Static => self.layout.static_bundle_dir(group),
            Linkage::Dynamic => self.layout.dynamic_bundle_dir(group),
        }
    }

    fn manifest_entry(
        &self,
        linkage: Linkage,
        merged: &MergedPlatformArtifact,
    ) -> Result<ExternalManifestEntry> {
        match linkage {
            Linkage::Static => ExternalManifestEntry::for_group(
                &merged.group,
                &merged.architectures,
                self.layout.static_library_name(),
                Some("Headers".to_string()),
            ),
            Linkage::Dynamic => ExternalManifestEntry::for_group(
                &merged.group,
                &merged.architectures,
                format!("{}.framework", self.settings.product_name()),
                None,
            ),
        }
    }

    /// Writes one XCFramework. Returns whether it was rewritten.
    ///
    /// The bundle is filled next to its final location and renamed into place, so an
    /// existing bundle is always complete.
    async fn write_xcframework(
        &self,
        linkage: Linkage,
        bundle: &Path,
        merged: &[MergedPlatformArtifact],
        recomputed: bool,
    ) -> Result<bool> {
        if self.reusable(bundle, recomputed).await {
            return Ok(false);
        }
        log::info!("Writing {}", bundle.display());
        let partial = BuildLayout::staging_path(bundle);
        fs::create_dir_all(&partial, true).await?;

        if let Err(e) = self.fill_xcframework(linkage, &partial, merged).await {
            fs::remove_dir_all(&partial).await?;
            return Err(e);
        }
        fs::remove_dir_all(bundle).await?;
        tokio::fs::rename(&partial, bundle)
            .await
            .fs_context("renaming bundle", &partial)?;
        Ok(true)
    }

    async fn fill_xcframework(
        &self,
        linkage: Linkage,
        dir: &Path,
        merged: &[MergedPlatformArtifact],
    ) -> Result<()> {
        let mut entries = Vec::with_capacity(merged.len());
        for artifact in merged {
            let entry = self.manifest_entry(linkage, artifact)?;
            fs::copy_dir(
                &self.staged_dir(linkage, &artifact.group),
                &dir.join(&entry.library_identifier),
            )
            .await?;
            entries.push(entry);
        }

        let manifest = XcFrameworkManifest::new(entries);
        let path = dir.join("Info.plist");
        tokio::task::spawn_blocking(move || manifest.write(&path)).await?
    }

    /// Zips one XCFramework and checksums the archive.
    async fn write_archive(&self, bundle: &Path, recomputed: bool) -> Result<(BundleArchive, bool)> {
        let path = BuildLayout::archive_path(bundle);
        let rezipped = if self.reusable(&path, recomputed).await {
            false
        } else {
            log::info!("Archiving {}", bundle.display());
            let partial = BuildLayout::staging_path(&path);
            fs::remove_file(&partial).await?;
            let (bundle, archive) = (bundle.to_path_buf(), partial.clone());
            let written =
                tokio::task::spawn_blocking(move || zip_bundle(&bundle, &archive)).await?;
            if let Err(e) = written {
                fs::remove_file(&partial).await?;
                return Err(e);
            }
            tokio::fs::rename(&partial, &path)
                .await
                .fs_context("renaming archive", &partial)?;
            true
        };
        let checksum = calculate_sha256(&path).await?;
        Ok((BundleArchive { path, checksum }, rezipped))
    }

    async fn write_package_swift(&self, archives: &[BundleArchive], path: &Path) -> Result<()> {
        let mut targets = Vec::with_capacity(archives.len());
        for archive in archives {
            let file = archive
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            targets.push(BinaryTarget {
                name: file.trim_end_matches(".xcframework.zip").to_string(),
                url: self.settings.binary_url(&file)?,
                checksum: archive.checksum.clone(),
            });
        }
        let contents = render_package_swift(self.settings, &targets)?;
        log::info!("Writing {}", path.display());
        tokio::fs::write(path, contents)
            .await
            .fs_context("writing package description", path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::SettingsBuilder;

    fn settings(work: &Path, skip_existing: bool) -> Settings {
        SettingsBuilder::new()
            .dependency_url("/deps/COpenSSL.xcframework")
            .targets(vec!["iOS-iOS-arm64".parse().unwrap()])
            .work_directory(work)
            .skip_existing_artifacts(skip_existing)
            .build()
            .unwrap()
    }

    fn merged_group(root: &Path) -> MergedPlatformArtifact {
        let headers_dir = root.join("headers");
        std::fs::create_dir_all(&headers_dir).unwrap();
        std::fs::write(headers_dir.join("ldap.h"), b"int ldap_init(void);\n").unwrap();
        let static_library = root.join("libCOpenLDAP.a");
        std::fs::write(&static_library, b"!<arch>\n").unwrap();
        let dynamic_library = root.join("COpenLDAP");
        std::fs::write(&dynamic_library, b"dylib").unwrap();
        MergedPlatformArtifact {
            group: PlatformGroup::new("iOS", "iOS").unwrap(),
            architectures: vec!["arm64".to_string()],
            fat_archives: Vec::new(),
            static_library,
            headers_dir,
            headers: vec![PathBuf::from("ldap.h")],
            dynamic_library,
            advisories: Vec::new(),
            recomputed: false,
        }
    }

    async fn assemble(
        work: &Path,
        skip_existing: bool,
        merged: &[MergedPlatformArtifact],
    ) -> AssembledPackage {
        let settings = settings(work, skip_existing);
        let layout = BuildLayout::from_settings(&settings).unwrap();
        layout.ensure().await.unwrap();
        Assembler::new(&settings, &layout).assemble(merged).await.unwrap()
    }

    #[tokio::test]
    async fn second_run_reuses_every_output() {
        let temp = tempfile::tempdir().unwrap();
        let work = temp.path().join("work");
        let merged = [merged_group(temp.path())];

        let first = assemble(&work, true, &merged).await;
        assert!(first.recomputed);
        assert!(first.static_xcframework.join("Info.plist").is_file());
        assert!(!BuildLayout::staging_path(&first.static_xcframework).exists());

        let second = assemble(&work, true, &merged).await;
        assert!(!second.recomputed);
        assert_eq!(first.archives, second.archives);
    }

    #[tokio::test]
    async fn outputs_are_rebuilt_without_skip_existing() {
        let temp = tempfile::tempdir().unwrap();
        let work = temp.path().join("work");
        let merged = [merged_group(temp.path())];

        let first = assemble(&work, true, &merged).await;
        let stray = first.static_xcframework.join("stray.txt");
        std::fs::write(&stray, b"left over").unwrap();

        let rebuilt = assemble(&work, false, &merged).await;
        assert!(rebuilt.recomputed);
        assert!(!stray.exists());
        assert_eq!(first.archives, rebuilt.archives);
    }

    #[tokio::test]
    async fn recomputed_group_restages_with_skip_existing() {
        let temp = tempfile::tempdir().unwrap();
        let work = temp.path().join("work");
        let mut merged = [merged_group(temp.path())];

        let first = assemble(&work, true, &merged).await;
        let stray = first.dynamic_xcframework.join("stray.txt");
        std::fs::write(&stray, b"left over").unwrap();

        merged[0].recomputed = true;
        let again = assemble(&work, true, &merged).await;
        assert!(again.recomputed);
        assert!(!stray.exists());
    }
}
