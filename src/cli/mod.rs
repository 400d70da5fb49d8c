//! Command line interface.
//!
//! Parses the arguments, layers them over the configuration file, and runs the
//! pipeline (or cleans its outputs) with colored progress on stderr.

mod args;
mod output;

pub use args::Args;
pub use output::OutputManager;

use crate::bundler::{BuildLayout, Pipeline, Settings};
use crate::error::Result;
use crate::metadata::{self, BuildConfig};
use std::sync::Arc;

/// Main CLI entry point
pub async fn run() -> Result<i32> {
    let args = Args::parse_args();
    let output = OutputManager::new(args.verbose, args.quiet);
    match execute(&args, &output).await {
        Ok(code) => Ok(code),
        Err(e) => {
            output.error(&e.to_string())?;
            for suggestion in e.recovery_suggestions() {
                output.indent(&suggestion)?;
            }
            Ok(1)
        }
    }
}

/// Builds the settings of a run from `args` and the configuration file they name.
pub fn resolve_settings(args: &Args) -> Result<Settings> {
    let config = match &args.config {
        Some(path) => metadata::load_config(path)?,
        None => BuildConfig::default(),
    };
    Ok(args.settings_builder(&config)?.build()?)
}

async fn execute(args: &Args, output: &OutputManager) -> Result<i32> {
    let settings = resolve_settings(args)?;

    if args.clean {
        let layout = BuildLayout::from_settings(&settings)?;
        output.progress(&format!("Cleaning {}", layout.work_directory().display()))?;
        layout.clean().await?;
        output.success("Removed build tree and produced bundles")?;
        return Ok(0);
    }

    output.section(&format!(
        "{} {}",
        settings.product_name(),
        settings.version_string()
    ))?;
    for target in settings.targets() {
        output.verbose(&target.to_string())?;
    }

    output.progress("Preparing toolchain and work directory")?;
    let pipeline = Pipeline::new(settings)
        .await?
        .with_observer(Arc::new(output.clone()));
    output.progress("Building, merging and assembling")?;
    let report = pipeline.run().await?;

    let rebuilt = report.targets.iter().filter(|t| t.rebuilt).count();
    output.success(&format!(
        "{} target(s), {} rebuilt this run",
        report.targets.len(),
        rebuilt
    ))?;
    for archive in &report.archives {
        output.success(&archive.file_name)?;
        output.indent(&format!("sha256 {}", archive.checksum))?;
    }
    output.indent(&report.package_swift.display().to_string())?;
    for advisory in &report.advisories {
        output.warn(&advisory.to_string())?;
    }
    Ok(0)
}
