//! Artifact merge engine.
//!
//! Fuses the build artifacts of every target of one platform group into:
//!
//! 1. one fat archive per static library file name, combined into `lib<Product>.a`;
//! 2. a reconciled header set, namespaced under the product name;
//! 3. a fat dynamic library relinked from the archives' object members.
//!
//! Each step writes into a scratch directory that replaces its stage directory only
//! once complete, so an existing stage directory is always a finished one. With
//! skip-existing enabled a finished stage is reused unless something upstream of it
//! was recomputed during this run.

mod dylib;
pub mod fat;
mod headers;
mod objects;

pub use dylib::{DylibLinker, LoadCommands, install_name, read_load_commands, relocation_args};
pub use headers::{HeaderSource, IncludeRewriter, ReconciledHeaders, reconcile_headers};
pub use objects::extract_objects;

use crate::bundler::{
    Advisory, BuildLayout, PlatformGroup, Settings, Toolchain,
    dependency::DependencyMap,
    error::{Error, ErrorExt, Result},
    target::{BuildArtifact, include_relative},
    utils::{OutputObserver, fs},
};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Multi-architecture outputs of one platform group.
#[derive(Debug, Clone)]
pub struct MergedPlatformArtifact {
    /// The merged group.
    pub group: PlatformGroup,
    /// Architectures, sorted.
    pub architectures: Vec<String>,
    /// One fat archive per static library file name, sorted by name.
    pub fat_archives: Vec<PathBuf>,
    /// Combined static library (`lib<Product>.a`).
    pub static_library: PathBuf,
    /// Root of the reconciled headers.
    pub headers_dir: PathBuf,
    /// Reconciled headers relative to `headers_dir`, sorted.
    pub headers: Vec<PathBuf>,
    /// Fat dynamic library.
    pub dynamic_library: PathBuf,
    /// Advisories raised while merging.
    pub advisories: Vec<Advisory>,
    /// Whether any output was recomputed during this run.
    pub recomputed: bool,
}

/// Groups the static libraries of `artifacts` by file name.
///
/// Every architecture must provide the same file names. The returned map lists,
/// per file name, the (architecture, absolute path) pairs in architecture order.
///
/// # Errors
///
/// - [`Error::DuplicateLibrary`] when one target installed a file name twice
/// - [`Error::MergeSetMismatch`] for the first library some architectures lack
pub fn validate_merge_set(
    group: &PlatformGroup,
    artifacts: &[BuildArtifact],
) -> Result<BTreeMap<String, Vec<(String, PathBuf)>>> {
    let mut plan: BTreeMap<String, Vec<(String, PathBuf)>> = BTreeMap::new();
    for artifact in artifacts {
        let arch = artifact.target().arch();
        for library in artifact.static_libraries() {
            let Some(name) = library.file_name() else {
                continue;
            };
            let name = name.to_string_lossy().into_owned();
            let entries = plan.entry(name.clone()).or_default();
            if let Some((_, first)) = entries.iter().find(|(a, _)| a == arch) {
                let first = first
                    .strip_prefix(artifact.install_root())
                    .unwrap_or(first)
                    .to_path_buf();
                return Err(Error::DuplicateLibrary {
                    target: artifact.target().to_string(),
                    library: name,
                    first,
                    second: library.clone(),
                });
            }
            entries.push((arch.to_string(), artifact.install_root().join(library)));
        }
    }

    let architectures: Vec<&str> = artifacts.iter().map(|a| a.target().arch()).collect();
    for (library, entries) in &plan {
        if entries.len() == architectures.len() {
            continue;
        }
        let present: Vec<String> = entries.iter().map(|(a, _)| a.clone()).collect();
        let missing = architectures
            .iter()
            .filter(|arch| !present.iter().any(|p| p == *arch))
            .map(|arch| arch.to_string())
            .collect();
        return Err(Error::MergeSetMismatch {
            group: group.to_string(),
            library: library.clone(),
            present,
            missing,
        });
    }
    Ok(plan)
}

/// Scratch sibling of a stage directory.
fn partial_dir(dir: &Path) -> PathBuf {
    let mut name = dir.as_os_str().to_os_string();
    name.push(".partial");
    PathBuf::from(name)
}

/// Merges the artifacts of platform groups.
pub struct MergeEngine<'a> {
    settings: &'a Settings,
    layout: &'a BuildLayout,
    toolchain: &'a Toolchain,
    dependency: &'a DependencyMap,
    observer: &'a dyn OutputObserver,
}

impl<'a> MergeEngine<'a> {
    /// Creates an engine.
    pub fn new(
        settings: &'a Settings,
        layout: &'a BuildLayout,
        toolchain: &'a Toolchain,
        dependency: &'a DependencyMap,
        observer: &'a dyn OutputObserver,
    ) -> Self {
        Self {
            settings,
            layout,
            toolchain,
            dependency,
            observer,
        }
    }

    /// Whether a finished stage directory can be reused.
    async fn reusable(&self, dir: &Path, recomputed: bool) -> bool {
        let reuse = self.settings.skip_existing_artifacts() && !recomputed && fs::exists(dir).await;
        if reuse {
            log::info!("Reusing {}", dir.display());
        }
        reuse
    }

    /// Empty scratch directory for `dir`.
    async fn begin(dir: &Path) -> Result<PathBuf> {
        let partial = partial_dir(dir);
        fs::create_dir_all(&partial, true).await?;
        Ok(partial)
    }

    /// Replaces `dir` with its completed scratch directory.
    async fn publish(dir: &Path) -> Result<()> {
        fs::remove_dir_all(dir).await?;
        let partial = partial_dir(dir);
        tokio::fs::rename(&partial, dir)
            .await
            .fs_context("renaming stage directory", &partial)
    }

    /// Merges the artifacts of `group`.
    ///
    /// `upstream_recomputed` tells whether any of the group's targets was rebuilt
    /// during this run.
    pub async fn merge(
        &self,
        group: &PlatformGroup,
        mut artifacts: Vec<BuildArtifact>,
        upstream_recomputed: bool,
    ) -> Result<MergedPlatformArtifact> {
        artifacts.sort_by(|a, b| a.target().arch().cmp(b.target().arch()));
        if let Some(stray) = artifacts.iter().find(|a| a.target().group() != *group) {
            return Err(Error::GenericError(format!(
                "target {} does not belong to {group}",
                stray.target()
            )));
        }
        let architectures: Vec<String> = artifacts
            .iter()
            .map(|a| a.target().arch().to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if architectures.len() != artifacts.len() {
            return Err(Error::GenericError(format!(
                "{group} has several targets for one architecture"
            )));
        }

        log::info!("Merging {group} ({})", architectures.join(", "));
        let plan = validate_merge_set(group, &artifacts)?;

        let (fat_archives, mut recomputed) =
            self.fuse_archives(group, &plan, upstream_recomputed).await?;
        let (static_library, combined) = self
            .combine_archives(group, &fat_archives, recomputed)
            .await?;
        recomputed |= combined;

        let headers_dir = self.layout.merged_headers_dir(group);
        let reconciled = self
            .reconcile_headers(group, &artifacts, &headers_dir, recomputed)
            .await?;

        let (dynamic_library, relinked) = self
            .derive_dylib(group, &artifacts, &fat_archives, recomputed)
            .await?;
        recomputed |= relinked;

        log::info!("✓ Merged {group}");
        Ok(MergedPlatformArtifact {
            group: group.clone(),
            architectures,
            fat_archives,
            static_library,
            headers_dir,
            headers: reconciled.headers,
            dynamic_library,
            advisories: reconciled.advisories,
            recomputed,
        })
    }

    async fn fuse_archives(
        &self,
        group: &PlatformGroup,
        plan: &BTreeMap<String, Vec<(String, PathBuf)>>,
        upstream_recomputed: bool,
    ) -> Result<(Vec<PathBuf>, bool)> {
        let dir = self.layout.fat_archives_dir(group);
        let archives: Vec<PathBuf> = plan.keys().map(|name| dir.join(name)).collect();
        if self.reusable(&dir, upstream_recomputed).await {
            return Ok((archives, false));
        }

        let partial = Self::begin(&dir).await?;
        let plan = plan.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            for (name, inputs) in &plan {
                log::debug!("Fusing {name}");
                fat::fuse_files(inputs, &partial.join(name))?;
            }
            Ok(())
        })
        .await??;
        Self::publish(&dir).await?;
        Ok((archives, true))
    }

    async fn combine_archives(
        &self,
        group: &PlatformGroup,
        fat_archives: &[PathBuf],
        recomputed: bool,
    ) -> Result<(PathBuf, bool)> {
        let dir = self.layout.merged_libs_dir(group);
        let library = self.layout.merged_lib_path(group);
        if self.reusable(&dir, recomputed).await {
            return Ok((library, false));
        }

        let partial = Self::begin(&dir).await?;
        self.toolchain
            .xcrun("libtool", &partial)
            .arg("-static")
            .arg("-o")
            .arg(partial.join(self.layout.static_library_name()))
            .args(fat_archives)
            .label(group.to_string())
            .run(self.observer)
            .await?;
        Self::publish(&dir).await?;
        Ok((library, true))
    }

    async fn reconcile_headers(
        &self,
        group: &PlatformGroup,
        artifacts: &[BuildArtifact],
        dir: &Path,
        recomputed: bool,
    ) -> Result<ReconciledHeaders> {
        if self.reusable(dir, recomputed).await {
            let dir = dir.to_path_buf();
            let headers = tokio::task::spawn_blocking(move || fs::list_files(&dir)).await??;
            return Ok(ReconciledHeaders {
                headers,
                advisories: Vec::new(),
            });
        }

        let sources: Vec<HeaderSource> = artifacts
            .iter()
            .map(|artifact| HeaderSource {
                arch: artifact.target().arch().to_string(),
                headers: artifact
                    .headers()
                    .iter()
                    .map(|h| (include_relative(h), artifact.install_root().join(h)))
                    .collect(),
            })
            .collect();
        let partial = Self::begin(dir).await?;
        let group = group.clone();
        let namespace = self.layout.product_name().to_string();
        let reconciled = tokio::task::spawn_blocking(move || {
            reconcile_headers(&group, &namespace, &sources, &partial)
        })
        .await??;
        Self::publish(dir).await?;
        Ok(reconciled)
    }

    async fn derive_dylib(
        &self,
        group: &PlatformGroup,
        artifacts: &[BuildArtifact],
        fat_archives: &[PathBuf],
        recomputed: bool,
    ) -> Result<(PathBuf, bool)> {
        let product = self.layout.product_name();
        let dir = self.layout.derived_dylibs_dir(group);
        let dylib = dir.join(product);
        if self.reusable(&dir, recomputed).await {
            return Ok((dylib, false));
        }

        let partial = Self::begin(&dir).await?;
        let linker = DylibLinker::new(self.settings, self.toolchain, self.dependency, self.observer);
        let install_name = install_name(product, group);
        let mut slices = Vec::with_capacity(artifacts.len());
        for artifact in artifacts {
            let target = artifact.target();
            let objects_dir = self.layout.extracted_objects_dir(group, target.arch());
            fs::remove_dir_all(&objects_dir).await?;

            let archives = fat_archives.to_vec();
            let arch = target.arch().to_string();
            let objects = tokio::task::spawn_blocking(move || {
                extract_objects(&archives, &arch, &objects_dir)
            })
            .await??;

            let output = partial.join(target.arch()).join(product);
            linker
                .link(target, &objects, &output, &install_name)
                .await?;
            slices.push((target.arch().to_string(), output));
        }

        let fused = partial.join(product);
        tokio::task::spawn_blocking(move || fat::fuse_files(&slices, &fused)).await??;
        Self::publish(&dir).await?;
        Ok((dylib, true))
    }
}
