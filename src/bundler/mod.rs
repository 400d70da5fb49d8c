//! XCFramework build-and-merge pipeline.
//!
//! Cross-builds a C library for every member of a matrix of Apple target variants,
//! then fuses the per-variant outputs into a static and a dynamic XCFramework.
//!
//! # Overview
//!
//! The pipeline:
//! 1. Computes the staged [`BuildLayout`] from [`Settings`]
//! 2. Fetches the library sources and the co-dependency bundle
//! 3. Resolves the co-dependency manifest into a [`DependencyMap`]
//! 4. Builds every target concurrently ([`target`])
//! 5. Merges the targets of each platform group ([`merge`])
//! 6. Assembles the final bundles, archives and `Package.swift` ([`package`])
//!
//! # Example
//!
//! ```no_run
//! use xcframework_bundler::bundler::{Pipeline, SettingsBuilder};
//!
//! # async fn example() -> xcframework_bundler::bundler::Result<()> {
//! let settings = SettingsBuilder::new()
//!     .product_name("COpenLDAP")
//!     .version("2.5.5")
//!     .dependency_url("https://example.com/COpenSSL-static.xcframework.zip")
//!     .build()?;
//!
//! let report = Pipeline::new(settings).await?.run().await?;
//! for archive in &report.archives {
//!     println!("{} {}", archive.file_name, archive.checksum);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Module Organization
//!
//! - [`settings`] - Target matrix types and run configuration
//! - [`layout`] - Staged directory tree
//! - [`manifest`] - XCFramework `Info.plist` codec
//! - [`dependency`] - Per-target lookup into the co-dependency bundle
//! - [`target`] - Per-target build executor
//! - [`merge`] - Per-platform artifact fusion
//! - [`package`] - Final bundle assembly
//! - [`builder`] - Pipeline orchestration

mod advisory;
pub mod builder;
pub mod dependency;
pub mod error;
pub mod layout;
pub mod manifest;
pub mod merge;
pub mod package;
pub mod settings;
pub mod target;
pub mod utils;

pub use advisory::Advisory;
pub use builder::{ArchiveSummary, BuildReport, Pipeline, Toolchain};
pub use dependency::{DependencyEntry, DependencyMap};
pub use error::{Error, ErrorCategory, Result};
pub use layout::BuildLayout;
pub use manifest::{ExternalManifestEntry, XcFrameworkManifest};
pub use merge::{MergeEngine, MergedPlatformArtifact};
pub use package::{Assembler, AssembledPackage};
pub use settings::{
    DependencySettings, PackageSettings, PlatformGroup, Settings, SettingsBuilder, TargetTriple,
};
pub use target::{BuildArtifact, BuildState, TargetBuild, TargetOutcome};
