//! Error types for the build-and-merge pipeline.
//!
//! Every failure the pipeline can produce is a variant of [`Error`]. Variants are
//! grouped into the categories returned by [`Error::category`]; advisory conditions
//! (unexpected artifact locations, header divergence) are not errors at all and are
//! reported through [`crate::bundler::Advisory`] instead.

use std::fmt::Display;
use std::path::{Path, PathBuf};

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Invalid identifiers, malformed URLs, incomplete settings. Detected pre-flight.
    Configuration,
    /// Checksum mismatch or failed download of an input artifact.
    Integrity,
    /// Non-zero exit of an external configure/build/link/archive invocation.
    Toolchain,
    /// Corrupt or unsupported upstream artifacts (manifests, merge sets).
    Consistency,
    /// Filesystem and other plumbing failures.
    Io,
}

/// Main error type for pipeline operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An identifier used to derive paths contains forbidden characters.
    #[error(
        "invalid {kind} {value:?}: only ASCII letters, digits and underscores are allowed"
    )]
    InvalidIdentifier {
        /// What the identifier names (product name, target component...)
        kind: &'static str,
        /// The rejected value
        value: String,
    },

    /// A target triple could not be parsed or is not part of the supported matrix.
    #[error("invalid target {value:?}: {reason}")]
    InvalidTarget {
        /// The rejected target
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// A URL (or URL template) is malformed or uses an unsupported scheme.
    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl {
        /// The rejected URL
        url: String,
        /// Why it was rejected
        reason: String,
    },

    /// Settings are incomplete or contradictory.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A downloaded or local artifact does not have the expected SHA-256.
    #[error("checksum mismatch for {}: expected {expected}, got {actual}", path.display())]
    ChecksumMismatch {
        /// File that was checked
        path: PathBuf,
        /// Expected hex digest
        expected: String,
        /// Actual hex digest
        actual: String,
    },

    /// The server answered a download with a non-success status.
    #[error("download of {url} failed with HTTP status {status}")]
    DownloadFailed {
        /// Requested URL
        url: String,
        /// HTTP status code
        status: u16,
    },

    /// An external tool exited unsuccessfully.
    #[error("`{command}` failed ({status})\n{output}")]
    Toolchain {
        /// Command line that was run
        command: String,
        /// Exit status description
        status: String,
        /// Combined stdout/stderr of the invocation
        output: String,
    },

    /// An external tool could not be spawned at all.
    #[error("failed to run `{command}`: {error}")]
    CommandFailed {
        /// Command line that was attempted
        command: String,
        /// Spawn error
        #[source]
        error: std::io::Error,
    },

    /// The manifest does not carry the expected package type / format version tags.
    #[error(
        "unsupported manifest: package type {package_type:?}, format version {format_version:?}"
    )]
    UnsupportedManifestVersion {
        /// `CFBundlePackageType` found in the document
        package_type: Option<String>,
        /// `XCFrameworkFormatVersion` found in the document
        format_version: Option<String>,
    },

    /// The manifest document itself cannot be decoded.
    #[error("invalid manifest {}: {reason}", path.display())]
    InvalidManifest {
        /// Manifest file
        path: PathBuf,
        /// Decoder message
        reason: String,
    },

    /// One manifest entry is missing a field or has a field of the wrong type.
    #[error("invalid manifest entry #{index}: {reason}")]
    InvalidManifestEntry {
        /// Position in `AvailableLibraries`
        index: usize,
        /// Decoder message
        reason: String,
    },

    /// A manifest entry names a (platform, variant) pair outside the known table.
    #[error(
        "unsupported manifest entry {identifier:?}: platform {platform:?}, variant {variant:?}"
    )]
    UnsupportedManifestEntry {
        /// `LibraryIdentifier` of the entry
        identifier: String,
        /// `SupportedPlatform`
        platform: String,
        /// `SupportedPlatformVariant`
        variant: Option<String>,
    },

    /// Two manifest entries resolve to the same target.
    #[error("target {target} is claimed by more than one manifest entry")]
    DuplicateTargetInManifest {
        /// The contested target
        target: String,
    },

    /// The manifest lists no library.
    #[error("manifest does not describe any library for any architecture")]
    EmptyManifest,

    /// Manifest entries disagree on the library name.
    #[error("inconsistent library name in manifest: expected {expected:?}, found {found:?}")]
    InconsistentLibraryName {
        /// Name of the first entry
        expected: String,
        /// Conflicting name
        found: String,
    },

    /// The dependency bundle has no sub-bundle for a configured target.
    #[error("dependency bundle has no library for target {target}")]
    MissingDependencyTarget {
        /// Target without a dependency entry
        target: String,
    },

    /// A static library is not built for every architecture of a platform group.
    #[error(
        "static library {library:?} of {group} exists for {present:?} but is missing for {missing:?}"
    )]
    MergeSetMismatch {
        /// Platform group being merged
        group: String,
        /// Library file name
        library: String,
        /// Architectures that have it
        present: Vec<String>,
        /// Architectures that lack it
        missing: Vec<String>,
    },

    /// One target installed two static libraries with the same file name.
    #[error("{target} installed {library:?} twice: {} and {}", first.display(), second.display())]
    DuplicateLibrary {
        /// Target that installed them
        target: String,
        /// Shared file name
        library: String,
        /// First path, relative to the install root
        first: PathBuf,
        /// Second path, relative to the install root
        second: PathBuf,
    },

    /// A binary holds code for another architecture than the one it was built for.
    #[error("{} contains {found} code where {expected} was expected", path.display())]
    ArchitectureMismatch {
        /// Offending file
        path: PathBuf,
        /// Architecture of the target
        expected: String,
        /// Architecture found in the file
        found: String,
    },

    /// A target finished without installing headers or static libraries.
    #[error("target {target} installed no {kind}")]
    MissingArtifacts {
        /// Target name
        target: String,
        /// "headers" or "static libraries"
        kind: &'static str,
    },

    /// I/O error with the operation and path attached.
    #[error("{context} {}: {error}", path.display())]
    Fs {
        /// What was being done
        context: &'static str,
        /// Path involved
        path: PathBuf,
        /// Underlying error
        #[source]
        error: std::io::Error,
    },

    /// Plain I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Property list codec error.
    #[error("plist error: {0}")]
    Plist(#[from] plist::Error),

    /// JSON codec error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Zip codec error.
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Template rendering error.
    #[error("template error: {0}")]
    Template(#[from] handlebars::RenderError),

    /// Mach-O / archive parsing error.
    #[error("binary parsing error: {0}")]
    Goblin(#[from] goblin::error::Error),

    /// Directory traversal error.
    #[error("directory traversal error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// Regular expression compilation error.
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    /// Path prefix error while computing relative paths.
    #[error("path error: {0}")]
    StripPrefix(#[from] std::path::StripPrefixError),

    /// A blocking or spawned task panicked or was cancelled.
    #[error("task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Anything else.
    #[error("{0}")]
    GenericError(String),
}

impl Error {
    /// Returns the category of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidIdentifier { .. }
            | Error::InvalidTarget { .. }
            | Error::InvalidUrl { .. }
            | Error::InvalidConfiguration(_) => ErrorCategory::Configuration,
            Error::ChecksumMismatch { .. } | Error::DownloadFailed { .. } | Error::Http(_) => {
                ErrorCategory::Integrity
            }
            Error::Toolchain { .. } | Error::CommandFailed { .. } => ErrorCategory::Toolchain,
            Error::UnsupportedManifestVersion { .. }
            | Error::InvalidManifest { .. }
            | Error::InvalidManifestEntry { .. }
            | Error::UnsupportedManifestEntry { .. }
            | Error::DuplicateTargetInManifest { .. }
            | Error::EmptyManifest
            | Error::InconsistentLibraryName { .. }
            | Error::MissingDependencyTarget { .. }
            | Error::MergeSetMismatch { .. }
            | Error::DuplicateLibrary { .. }
            | Error::ArchitectureMismatch { .. }
            | Error::MissingArtifacts { .. }
            | Error::Goblin(_) => ErrorCategory::Consistency,
            Error::Fs { .. }
            | Error::IoError(_)
            | Error::Plist(_)
            | Error::Json(_)
            | Error::Zip(_)
            | Error::Template(_)
            | Error::WalkDir(_)
            | Error::Regex(_)
            | Error::StripPrefix(_)
            | Error::Join(_)
            | Error::GenericError(_) => ErrorCategory::Io,
        }
    }
}

/// Attaches the failed operation and the path it touched to I/O errors.
pub trait ErrorExt<T> {
    /// Converts the error into [`Error::Fs`].
    fn fs_context(self, context: &'static str, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> ErrorExt<T> for std::result::Result<T, std::io::Error> {
    fn fs_context(self, context: &'static str, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|error| Error::Fs {
            context,
            path: path.as_ref().to_path_buf(),
            error,
        })
    }
}

/// Turns an absent value into a [`Error::GenericError`] with a message.
pub trait Context<T> {
    /// Returns the value or an error carrying `context`.
    fn context<C: Display>(self, context: C) -> Result<T>;
}

impl<T> Context<T> for Option<T> {
    fn context<C: Display>(self, context: C) -> Result<T> {
        self.ok_or_else(|| Error::GenericError(context.to_string()))
    }
}

/// Returns early with a [`Error::GenericError`] built from a format string.
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::bundler::Error::GenericError(format!($($arg)*)))
    };
}
