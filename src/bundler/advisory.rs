//! Non-fatal conditions reported during a run.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// A warning that does not abort the pipeline.
///
/// Advisories are logged when raised and collected into the build report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Advisory {
    /// A known artifact type was installed outside its expected directory.
    UnexpectedLocation {
        /// Target that installed it
        target: String,
        /// Path relative to the install root
        path: PathBuf,
        /// Directory the artifact type belongs in
        expected: &'static str,
    },

    /// An installed file of a type the collector does not know.
    UnknownArtifact {
        /// Target that installed it
        target: String,
        /// Path relative to the install root
        path: PathBuf,
    },

    /// A header differs between the architectures of a platform group.
    HeaderDivergence {
        /// Platform group
        group: String,
        /// Header path relative to `include/`
        header: PathBuf,
        /// Architecture whose copy was kept
        kept: String,
        /// Architectures whose copy differs
        divergent: Vec<String>,
    },
}

impl Advisory {
    /// Logs the advisory at warning level.
    pub fn emit(&self) {
        log::warn!("{self}");
    }
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Advisory::UnexpectedLocation {
                target,
                path,
                expected,
            } => write!(
                f,
                "{target}: {} installed outside of {expected}/",
                path.display()
            ),
            Advisory::UnknownArtifact { target, path } => {
                write!(f, "{target}: unknown artifact {}", path.display())
            }
            Advisory::HeaderDivergence {
                group,
                header,
                kept,
                divergent,
            } => write!(
                f,
                "{group}: header {} differs for {} (keeping the {kept} copy)",
                header.display(),
                divergent.join(", ")
            ),
        }
    }
}
