//! Per-target build executor.
//!
//! Drives one target through
//! `Pending → SourceReady → Patched → Configured → Built → Installed → Collected → Done`.
//! With skip-existing enabled and an install root already present, the target goes
//! straight from `Pending` to `Done` and its artifacts are read from that install
//! root. Any failure is fatal for the target and aborts the run.

mod collect;
mod flags;
mod patch;

pub use collect::{collect_artifacts, include_relative};
pub use flags::BuildEnvironment;
pub use patch::{PATCH_MARKER, SourcePatch};

use crate::bundler::{
    Advisory, BuildLayout, Settings, TargetTriple, Toolchain,
    dependency::DependencyMap,
    error::Result,
    utils::{OutputObserver, ToolCommand, fs},
};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Read-only inputs shared by every target build of a run.
pub struct BuildContext {
    /// Run configuration.
    pub settings: Settings,
    /// Staged directory tree.
    pub layout: BuildLayout,
    /// Resolved tools.
    pub toolchain: Toolchain,
    /// Co-dependency lookup.
    pub dependency: DependencyMap,
    /// Local source tarball.
    pub tarball: PathBuf,
    /// Receives streamed tool output.
    pub observer: Arc<dyn OutputObserver>,
}

impl fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildContext")
            .field("settings", &self.settings)
            .field("layout", &self.layout)
            .field("toolchain", &self.toolchain)
            .field("dependency", &self.dependency)
            .field("tarball", &self.tarball)
            .finish_non_exhaustive()
    }
}

/// Progress of one target build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BuildState {
    /// Nothing done yet.
    Pending,
    /// Sources extracted.
    SourceReady,
    /// Sources patched for cross-compilation.
    Patched,
    /// `configure` succeeded.
    Configured,
    /// `make depend` and `make` succeeded.
    Built,
    /// `make install` succeeded.
    Installed,
    /// Install tree classified.
    Collected,
    /// Artifact available.
    Done,
}

/// Installed outputs of one target, input of its group's merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildArtifact {
    target: TargetTriple,
    install_root: PathBuf,
    headers: Vec<PathBuf>,
    static_libraries: Vec<PathBuf>,
}

impl BuildArtifact {
    /// Creates an artifact; paths are relative to `install_root`.
    pub fn new(
        target: TargetTriple,
        install_root: PathBuf,
        headers: Vec<PathBuf>,
        static_libraries: Vec<PathBuf>,
    ) -> Self {
        Self {
            target,
            install_root,
            headers,
            static_libraries,
        }
    }

    /// Target that produced the artifact.
    pub fn target(&self) -> &TargetTriple {
        &self.target
    }

    /// Install root the paths are relative to.
    pub fn install_root(&self) -> &Path {
        &self.install_root
    }

    /// Installed headers, in first-seen order.
    pub fn headers(&self) -> &[PathBuf] {
        &self.headers
    }

    /// Installed static libraries, in first-seen order.
    pub fn static_libraries(&self) -> &[PathBuf] {
        &self.static_libraries
    }
}

/// Result of running one target.
#[derive(Debug, Clone)]
pub struct TargetOutcome {
    /// Collected artifact.
    pub artifact: BuildArtifact,
    /// Whether the target was built during this run.
    pub rebuilt: bool,
    /// Advisories raised while collecting.
    pub advisories: Vec<Advisory>,
}

/// Executor of one target.
pub struct TargetBuild<'a> {
    target: TargetTriple,
    context: &'a BuildContext,
    state: BuildState,
}

impl<'a> TargetBuild<'a> {
    /// Prepares the build of `target`.
    pub fn new(target: TargetTriple, context: &'a BuildContext) -> Self {
        Self {
            target,
            context,
            state: BuildState::Pending,
        }
    }

    /// Current state.
    pub fn state(&self) -> BuildState {
        self.state
    }

    fn advance(&mut self, next: BuildState) {
        debug_assert!(next > self.state, "{:?} -> {:?}", self.state, next);
        log::debug!("{}: {:?} -> {:?}", self.target, self.state, next);
        self.state = next;
    }

    /// Runs the target to completion.
    pub async fn run(mut self) -> Result<TargetOutcome> {
        let layout = &self.context.layout;
        let install_dir = layout.install_dir(&self.target);

        if self.context.settings.skip_existing_artifacts() && fs::exists(&install_dir).await {
            log::info!(
                "Skipping build of {} because {} exists",
                self.target,
                install_dir.display()
            );
            self.advance(BuildState::Done);
            let (artifact, advisories) = self.collect(&install_dir).await?;
            return Ok(TargetOutcome {
                artifact,
                rebuilt: false,
                advisories,
            });
        }

        log::info!("Building {}", self.target);
        let source_dir = layout.source_dir(&self.target);
        self.prepare_sources(&source_dir).await?;

        let env = BuildEnvironment::for_target(
            &self.target,
            &self.context.settings,
            &self.context.toolchain,
            &self.context.dependency,
        )?;
        self.patch(&source_dir, &env).await?;

        fs::remove_dir_all(&install_dir).await?;
        self.configure(&source_dir, &install_dir, &env).await?;
        self.build(&source_dir, &env).await?;
        self.install(&source_dir, &install_dir, &env).await?;

        let (artifact, advisories) = self.collect(&install_dir).await?;
        self.advance(BuildState::Collected);
        self.advance(BuildState::Done);
        log::info!("✓ Built {}", self.target);
        Ok(TargetOutcome {
            artifact,
            rebuilt: true,
            advisories,
        })
    }

    async fn prepare_sources(&mut self, source_dir: &Path) -> Result<()> {
        let reuse = self.context.settings.skip_existing_artifacts();
        if !crate::source::prepare_source_tree(&self.context.tarball, source_dir, reuse).await? {
            log::debug!("Sources of {} already extracted", self.target);
        }
        self.advance(BuildState::SourceReady);
        Ok(())
    }

    async fn patch(&mut self, source_dir: &Path, env: &BuildEnvironment) -> Result<()> {
        let patch = SourcePatch::new(
            &self.target.group(),
            self.context.dependency.library_name(),
            &env.libs,
        );
        let dir = source_dir.to_path_buf();
        tokio::task::spawn_blocking(move || patch.apply(&dir)).await??;
        self.advance(BuildState::Patched);
        Ok(())
    }

    fn command(&self, command: ToolCommand, env: &BuildEnvironment) -> ToolCommand {
        env.vars()
            .into_iter()
            .fold(command, |command, (key, value)| command.env(key, value))
            .label(self.target.to_string())
    }

    async fn configure(
        &mut self,
        source_dir: &Path,
        install_dir: &Path,
        env: &BuildEnvironment,
    ) -> Result<()> {
        let configure = ToolCommand::new(source_dir.join("configure"), source_dir)
            .arg(format!("--host={}", self.target.host_triple()))
            .arg(format!("--prefix={}", install_dir.display()))
            .args(self.context.settings.configure_args());
        self.command(configure, env)
            .run(self.context.observer.as_ref())
            .await?;
        self.advance(BuildState::Configured);
        Ok(())
    }

    async fn build(&mut self, source_dir: &Path, env: &BuildEnvironment) -> Result<()> {
        let toolchain = &self.context.toolchain;
        let observer = self.context.observer.as_ref();
        self.command(toolchain.make(source_dir).arg("depend"), env)
            .run(observer)
            .await?;
        self.command(
            toolchain
                .make(source_dir)
                .arg(format!("-j{}", toolchain.jobs())),
            env,
        )
        .run(observer)
        .await?;
        self.advance(BuildState::Built);
        Ok(())
    }

    async fn install(
        &mut self,
        source_dir: &Path,
        install_dir: &Path,
        env: &BuildEnvironment,
    ) -> Result<()> {
        let result = self
            .command(self.context.toolchain.make(source_dir).arg("install"), env)
            .run(self.context.observer.as_ref())
            .await;
        if let Err(e) = result {
            log::debug!("Removing partial install root {}", install_dir.display());
            fs::remove_dir_all(install_dir).await?;
            return Err(e);
        }
        self.advance(BuildState::Installed);
        Ok(())
    }

    async fn collect(&self, install_dir: &Path) -> Result<(BuildArtifact, Vec<Advisory>)> {
        let target = self.target.clone();
        let install_dir = install_dir.to_path_buf();
        tokio::task::spawn_blocking(move || collect_artifacts(&target, &install_dir)).await?
    }
}
