//! Configuration structures for a pipeline run.
//!
//! This module provides the target matrix types, the library/dependency source
//! settings, the main [`Settings`] struct and its builder.

mod builder;
mod core;
mod package;
mod target;

pub use builder::{DEFAULT_DEPLOYMENT_TARGETS, DEFAULT_WORK_DIRECTORY, SettingsBuilder};
pub use core::Settings;
pub use package::{
    DEFAULT_BINARY_URL_TEMPLATE, DEFAULT_CONFIGURE_ARGS, DEFAULT_LINK_LIBRARIES,
    DEFAULT_PRODUCT_NAME, DEFAULT_SOURCE_URL_TEMPLATE, DEFAULT_VERSION, DependencySettings,
    PackageSettings,
};
pub use target::{
    DEFAULT_TARGETS, PlatformGroup, TARGET_SEPARATOR, TargetTriple, is_safe_identifier,
    validate_identifier,
};
