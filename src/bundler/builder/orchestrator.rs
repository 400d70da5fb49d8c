//! Pipeline orchestration.
//!
//! This module provides the [`Pipeline`] that drives a whole run: it fetches the
//! inputs, builds every target, merges each platform group and assembles the final
//! bundles.

use crate::bundler::{
    Advisory, Assembler, BuildLayout, MergeEngine, MergedPlatformArtifact, PlatformGroup,
    Result, Settings,
    builder::Toolchain,
    dependency::DependencyMap,
    error::{Error, ErrorExt},
    target::{BuildArtifact, BuildContext, TargetBuild, TargetOutcome},
    utils::{LogObserver, OutputObserver},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// One produced archive.
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveSummary {
    /// File name of the archive.
    pub file_name: String,
    /// Full path of the archive.
    pub path: PathBuf,
    /// SHA-256 of the archive.
    pub checksum: String,
    /// Size in bytes.
    pub size: u64,
}

/// One target of the run.
#[derive(Debug, Clone, Serialize)]
pub struct TargetSummary {
    /// `sdk-platform-arch`.
    pub target: String,
    /// Whether the target was built during this run.
    pub rebuilt: bool,
    /// Installed headers.
    pub headers: usize,
    /// Installed static libraries.
    pub static_libraries: usize,
}

/// One merged platform group.
#[derive(Debug, Clone, Serialize)]
pub struct GroupSummary {
    /// `sdk-platform`.
    pub group: String,
    /// Merged architectures.
    pub architectures: Vec<String>,
    /// Fused archives, by file name.
    pub fat_archives: Vec<String>,
    /// Reconciled headers.
    pub headers: usize,
    /// Whether the merge was recomputed during this run.
    pub recomputed: bool,
}

/// Summary of a run, written to the result directory as JSON.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    /// Product name.
    pub product: String,
    /// Library version.
    pub version: String,
    /// Start of the run.
    pub started_at: DateTime<Utc>,
    /// End of the run.
    pub finished_at: DateTime<Utc>,
    /// Targets in canonical order.
    pub targets: Vec<TargetSummary>,
    /// Platform groups in canonical order.
    pub groups: Vec<GroupSummary>,
    /// Static XCFramework.
    pub static_xcframework: PathBuf,
    /// Dynamic XCFramework.
    pub dynamic_xcframework: PathBuf,
    /// Zipped bundles, static first.
    pub archives: Vec<ArchiveSummary>,
    /// Generated package description.
    pub package_swift: PathBuf,
    /// Every advisory raised during the run.
    pub advisories: Vec<Advisory>,
}

/// Runs the build-and-merge pipeline.
///
/// # Examples
///
/// ```no_run
/// use xcframework_bundler::bundler::{Pipeline, SettingsBuilder};
///
/// # async fn example() -> xcframework_bundler::bundler::Result<()> {
/// let settings = SettingsBuilder::new()
///     .dependency_url("https://example.com/COpenSSL.xcframework.zip")
///     .skip_existing_artifacts(true)
///     .build()?;
/// let report = Pipeline::new(settings).await?.run().await?;
/// println!("{} advisories", report.advisories.len());
/// # Ok(())
/// # }
/// ```
pub struct Pipeline {
    settings: Settings,
    layout: BuildLayout,
    toolchain: Toolchain,
    observer: Arc<dyn OutputObserver>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("settings", &self.settings)
            .field("layout", &self.layout)
            .field("toolchain", &self.toolchain)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Prepares a run: computes and creates the staged layout and detects the
    /// toolchain.
    pub async fn new(settings: Settings) -> Result<Self> {
        let layout = BuildLayout::from_settings(&settings)?;
        layout.ensure().await?;
        let toolchain = Toolchain::detect(&settings).await?;
        Ok(Self {
            settings,
            layout,
            toolchain,
            observer: Arc::new(LogObserver),
        })
    }

    /// Sends streamed tool output to `observer` instead of the log.
    pub fn with_observer(mut self, observer: Arc<dyn OutputObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Staged layout of the run.
    pub fn layout(&self) -> &BuildLayout {
        &self.layout
    }

    /// Runs every stage and writes the build report.
    pub async fn run(self) -> Result<BuildReport> {
        let started_at = Utc::now();
        let Self {
            settings,
            layout,
            toolchain,
            observer,
        } = self;

        log::info!(
            "Building {} {} for {} target(s)",
            settings.product_name(),
            settings.version_string(),
            settings.targets().len()
        );
        let (tarball, dependency_dir) = tokio::try_join!(
            crate::source::fetch_source(&settings, &layout),
            crate::source::fetch_dependency(&settings, &layout),
        )?;

        let dependency =
            tokio::task::spawn_blocking(move || DependencyMap::load(&dependency_dir)).await??;
        dependency.check_targets(settings.targets())?;
        log::info!(
            "✓ Resolved {} dependency targets of {}",
            dependency.len(),
            dependency.library_name()
        );

        let context = Arc::new(BuildContext {
            settings,
            layout,
            toolchain,
            dependency,
            tarball,
            observer,
        });
        let outcomes = build_targets(Arc::clone(&context)).await?;

        let mut advisories: Vec<Advisory> = Vec::new();
        let mut targets = Vec::with_capacity(outcomes.len());
        let mut groups: BTreeMap<PlatformGroup, (Vec<BuildArtifact>, bool)> = BTreeMap::new();
        for outcome in outcomes {
            let artifact = outcome.artifact;
            targets.push(TargetSummary {
                target: artifact.target().to_string(),
                rebuilt: outcome.rebuilt,
                headers: artifact.headers().len(),
                static_libraries: artifact.static_libraries().len(),
            });
            advisories.extend(outcome.advisories);
            let entry = groups.entry(artifact.target().group()).or_default();
            entry.0.push(artifact);
            entry.1 |= outcome.rebuilt;
        }

        let engine = MergeEngine::new(
            &context.settings,
            &context.layout,
            &context.toolchain,
            &context.dependency,
            context.observer.as_ref(),
        );
        let mut merged: Vec<MergedPlatformArtifact> = Vec::with_capacity(groups.len());
        for (group, (artifacts, rebuilt)) in groups {
            let artifact = engine.merge(&group, artifacts, rebuilt).await?;
            advisories.extend(artifact.advisories.iter().cloned());
            merged.push(artifact);
        }

        let assembled = Assembler::new(&context.settings, &context.layout)
            .assemble(&merged)
            .await?;

        let mut archives = Vec::with_capacity(assembled.archives.len());
        for archive in &assembled.archives {
            let size = tokio::fs::metadata(&archive.path)
                .await
                .fs_context("reading archive metadata", &archive.path)?
                .len();
            archives.push(ArchiveSummary {
                file_name: archive
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                path: archive.path.clone(),
                checksum: archive.checksum.clone(),
                size,
            });
        }

        let report = BuildReport {
            product: context.settings.product_name().to_string(),
            version: context.settings.version_string().to_string(),
            started_at,
            finished_at: Utc::now(),
            targets,
            groups: merged
                .iter()
                .map(|m| GroupSummary {
                    group: m.group.to_string(),
                    architectures: m.architectures.clone(),
                    fat_archives: m
                        .fat_archives
                        .iter()
                        .filter_map(|p| p.file_name())
                        .map(|n| n.to_string_lossy().into_owned())
                        .collect(),
                    headers: m.headers.len(),
                    recomputed: m.recomputed,
                })
                .collect(),
            static_xcframework: assembled.static_xcframework,
            dynamic_xcframework: assembled.dynamic_xcframework,
            archives,
            package_swift: assembled.package_swift,
            advisories,
        };

        let path = context.layout.report_path();
        let json = serde_json::to_vec_pretty(&report)?;
        tokio::fs::write(&path, json)
            .await
            .fs_context("writing build report", &path)?;
        log::info!("✓ Wrote {}", path.display());
        Ok(report)
    }
}

/// Builds every target concurrently, at most `jobs` at a time.
///
/// The first failure stops targets that have not started yet; the ones already
/// running are awaited before the failure is returned.
async fn build_targets(context: Arc<BuildContext>) -> Result<Vec<TargetOutcome>> {
    let semaphore = Arc::new(Semaphore::new(context.settings.jobs()));
    let mut set = JoinSet::new();
    for target in context.settings.targets().iter().cloned() {
        let context = Arc::clone(&context);
        let semaphore = Arc::clone(&semaphore);
        set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.map_err(|_| {
                Error::GenericError(format!("build of {target} not started"))
            })?;
            TargetBuild::new(target, &context).run().await
        });
    }

    let mut outcomes = Vec::with_capacity(context.settings.targets().len());
    let mut failure: Option<Error> = None;
    while let Some(joined) = set.join_next().await {
        let result = joined.map_err(Error::from).and_then(|r| r);
        match result {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) if failure.is_none() => {
                log::error!("{e}");
                semaphore.close();
                failure = Some(e);
            }
            Err(e) => log::debug!("{e}"),
        }
    }
    if let Some(e) = failure {
        return Err(e);
    }

    outcomes.sort_by(|a, b| a.artifact.target().cmp(b.artifact.target()));
    Ok(outcomes)
}
