//! Xcode toolchain context.
//!
//! Resolved once per run and passed by reference to every stage that runs a tool.

use crate::bundler::{
    PlatformGroup, Settings,
    error::{Error, Result},
    utils::ToolCommand,
};
use std::path::{Path, PathBuf};

/// Locations of the external tools and the build parallelism.
#[derive(Debug, Clone)]
pub struct Toolchain {
    developer_dir: PathBuf,
    xcrun: PathBuf,
    make: PathBuf,
    clang: PathBuf,
    jobs: usize,
    sdk_version: Option<String>,
}

impl Toolchain {
    /// Creates a toolchain from explicit locations.
    pub fn new(
        developer_dir: impl Into<PathBuf>,
        xcrun: impl Into<PathBuf>,
        make: impl Into<PathBuf>,
        clang: impl Into<PathBuf>,
        jobs: usize,
        sdk_version: Option<String>,
    ) -> Self {
        Self {
            developer_dir: developer_dir.into(),
            xcrun: xcrun.into(),
            make: make.into(),
            clang: clang.into(),
            jobs,
            sdk_version,
        }
    }

    /// Detects the toolchain for `settings`.
    ///
    /// The developer directory comes from the settings, then `DEVELOPER_DIR`, then
    /// `xcode-select -print-path`. `xcrun` and `make` are looked up on `PATH`.
    pub async fn detect(settings: &Settings) -> Result<Self> {
        let cwd = settings.work_directory();
        let xcrun = find_tool("xcrun")?;
        let make = find_tool("make")?;

        let developer_dir = match settings.developer_dir() {
            Some(dir) => dir.to_path_buf(),
            None => match std::env::var_os("DEVELOPER_DIR") {
                Some(dir) if !dir.is_empty() => PathBuf::from(dir),
                _ => PathBuf::from(
                    ToolCommand::new("xcode-select", cwd)
                        .arg("-print-path")
                        .capture()
                        .await?,
                ),
            },
        };
        if !developer_dir.is_dir() {
            return Err(Error::InvalidConfiguration(format!(
                "developer directory {} does not exist",
                developer_dir.display()
            )));
        }

        let clang = PathBuf::from(
            ToolCommand::new(&xcrun, cwd)
                .args(["-f", "clang"])
                .env("DEVELOPER_DIR", &developer_dir)
                .capture()
                .await?,
        );

        log::info!("✓ Using developer directory {}", developer_dir.display());
        log::debug!("clang: {}, make: {}", clang.display(), make.display());

        Ok(Self::new(
            developer_dir,
            xcrun,
            make,
            clang,
            settings.jobs(),
            settings.sdk_version().map(str::to_string),
        ))
    }

    /// Xcode developer directory.
    pub fn developer_dir(&self) -> &Path {
        &self.developer_dir
    }

    /// C compiler driver.
    pub fn clang(&self) -> &Path {
        &self.clang
    }

    /// Parallel job count.
    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// SDK root of a platform group.
    ///
    /// `<developer>/Platforms/<Legacy>.platform/Developer/SDKs/<Legacy><version>.sdk`
    pub fn sdk_path(&self, group: &PlatformGroup) -> PathBuf {
        let legacy = group.legacy_platform_name();
        self.developer_dir
            .join("Platforms")
            .join(format!("{legacy}.platform"))
            .join("Developer")
            .join("SDKs")
            .join(format!(
                "{legacy}{}.sdk",
                self.sdk_version.as_deref().unwrap_or_default()
            ))
    }

    /// `xcrun <tool>` running in `cwd`.
    pub fn xcrun(&self, tool: &str, cwd: &Path) -> ToolCommand {
        ToolCommand::new(&self.xcrun, cwd)
            .arg(tool)
            .env("DEVELOPER_DIR", &self.developer_dir)
            .label(tool)
    }

    /// `make` running in `cwd`.
    pub fn make(&self, cwd: &Path) -> ToolCommand {
        ToolCommand::new(&self.make, cwd).env("DEVELOPER_DIR", &self.developer_dir)
    }

    /// The compiler driver running in `cwd`.
    pub fn clang_command(&self, cwd: &Path) -> ToolCommand {
        ToolCommand::new(&self.clang, cwd).env("DEVELOPER_DIR", &self.developer_dir)
    }
}

fn find_tool(name: &str) -> Result<PathBuf> {
    match which::which(name) {
        Ok(path) => {
            log::debug!("Found {} at: {}", name, path.display());
            Ok(path)
        }
        Err(e) => Err(Error::InvalidConfiguration(format!(
            "{name} not found in PATH: {e}"
        ))),
    }
}
