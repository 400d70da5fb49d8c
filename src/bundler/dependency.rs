//! Per-target lookup into the co-dependency bundle.
//!
//! The co-dependency (OpenSSL) is consumed as an XCFramework. Its manifest is
//! resolved once into a [`DependencyMap`] that answers, for every target, where the
//! matching sub-bundle lives and which compiler/linker search flags point at it.

use crate::bundler::{
    TargetTriple,
    error::{Error, Result},
    manifest::XcFrameworkManifest,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// One resolved sub-bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEntry {
    /// Absolute path of the sub-bundle directory.
    pub path: PathBuf,
    /// Library path relative to the sub-bundle.
    pub library_path: String,
    /// Headers path relative to the sub-bundle.
    pub headers_path: Option<String>,
    /// Whether the library is a framework bundle.
    pub is_framework: bool,
}

/// Compiler and linker flags pointing at one sub-bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFlags {
    /// Preprocessor flags (`CPPFLAGS`).
    pub cppflags: Vec<String>,
    /// Linker search flags (`LDFLAGS`).
    pub ldflags: Vec<String>,
    /// Library references replacing `-lssl -lcrypto`.
    pub libs: Vec<String>,
}

/// Target → sub-bundle lookup of the co-dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyMap {
    library_name: String,
    entries: HashMap<TargetTriple, DependencyEntry>,
}

impl DependencyMap {
    /// Resolves the XCFramework at `bundle_dir`.
    pub fn load(bundle_dir: &Path) -> Result<Self> {
        let manifest = XcFrameworkManifest::load(&bundle_dir.join("Info.plist"))?;
        Self::from_manifest(&manifest, bundle_dir)
    }

    /// Resolves a decoded manifest whose sub-bundles live under `bundle_dir`.
    ///
    /// # Errors
    ///
    /// - [`Error::EmptyManifest`] when no library or no architecture is listed
    /// - [`Error::UnsupportedManifestEntry`] for an unknown (platform, variant) pair
    /// - [`Error::DuplicateTargetInManifest`] when two entries claim one target
    /// - [`Error::InconsistentLibraryName`] when entries name different libraries
    pub fn from_manifest(manifest: &XcFrameworkManifest, bundle_dir: &Path) -> Result<Self> {
        let Some(first) = manifest.available_libraries.first() else {
            return Err(Error::EmptyManifest);
        };
        let library_name = first.library_name();

        let mut entries = HashMap::new();
        for entry in &manifest.available_libraries {
            let name = entry.library_name();
            if name != library_name {
                return Err(Error::InconsistentLibraryName {
                    expected: library_name,
                    found: name,
                });
            }
            let resolved = DependencyEntry {
                path: bundle_dir.join(&entry.library_identifier),
                library_path: entry.library_path.clone(),
                headers_path: entry.headers_path.clone(),
                is_framework: entry.is_framework(),
            };
            for target in entry.targets()? {
                if entries.contains_key(&target) {
                    return Err(Error::DuplicateTargetInManifest {
                        target: target.to_string(),
                    });
                }
                entries.insert(target, resolved.clone());
            }
        }

        if entries.is_empty() {
            return Err(Error::EmptyManifest);
        }

        log::debug!(
            "Resolved dependency {} for {} targets",
            library_name,
            entries.len()
        );
        Ok(Self {
            library_name,
            entries,
        })
    }

    /// Builds a map from already resolved entries.
    pub fn from_entries(
        library_name: impl Into<String>,
        entries: HashMap<TargetTriple, DependencyEntry>,
    ) -> Self {
        Self {
            library_name: library_name.into(),
            entries,
        }
    }

    /// Library name shared by every sub-bundle.
    pub fn library_name(&self) -> &str {
        &self.library_name
    }

    /// Number of resolved targets.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no target is resolved.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sub-bundle of `target`.
    pub fn resolve(&self, target: &TargetTriple) -> Result<&DependencyEntry> {
        self.entries
            .get(target)
            .ok_or_else(|| Error::MissingDependencyTarget {
                target: target.to_string(),
            })
    }

    /// Fails unless every one of `targets` resolves.
    pub fn check_targets(&self, targets: &[TargetTriple]) -> Result<()> {
        for target in targets {
            self.resolve(target)?;
        }
        Ok(())
    }

    /// Search flags for building `target` against the dependency.
    ///
    /// Frameworks give `-F<subbundle>` and `-framework <name>`; static libraries give
    /// `-I<subbundle>/<headers>`, `-L<subbundle>` and `-l<name>`.
    pub fn search_flags(&self, target: &TargetTriple) -> Result<SearchFlags> {
        let entry = self.resolve(target)?;
        let root = entry.path.display().to_string();
        let flags = if entry.is_framework {
            SearchFlags {
                cppflags: vec![format!("-F{root}")],
                ldflags: vec![format!("-F{root}")],
                libs: vec!["-framework".to_string(), self.library_name.clone()],
            }
        } else {
            let mut cppflags = Vec::new();
            if let Some(headers) = &entry.headers_path {
                cppflags.push(format!("-I{}", entry.path.join(headers).display()));
            }
            SearchFlags {
                cppflags,
                ldflags: vec![format!("-L{root}")],
                libs: vec![format!("-l{}", self.library_name)],
            }
        };
        Ok(flags)
    }
}
