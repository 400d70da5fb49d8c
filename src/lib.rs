//! XCFramework build-and-merge pipeline.
//!
//! Cross-builds OpenLDAP (or another autoconf C library) against an OpenSSL
//! XCFramework for every configured Apple sdk/platform/architecture, then fuses the
//! results into a static and a dynamic XCFramework ready for SwiftPM and Xcode.
//!
//! It can be used both as a CLI tool and as a library dependency.

pub mod bundler;
pub mod cli;
pub mod error;
pub mod metadata;
pub mod source;

// Re-export commonly used types
pub use error::{BundlerError, CliError, Result};
