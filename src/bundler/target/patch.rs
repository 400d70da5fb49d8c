//! Source patching before configuration.
//!
//! Patching is idempotent through a marker file written before the patches are
//! applied: when the marker exists the source tree is left alone.

use crate::bundler::{
    PlatformGroup,
    error::{ErrorExt, Result},
};
use regex::Regex;
use std::path::{Path, PathBuf};

/// Marker written into a source tree once patching started.
pub const PATCH_MARKER: &str = ".xcframework-patched";

/// Makefile listing the `fork`-based daemon helpers.
const LIBLUTIL_MAKEFILE: &str = "libraries/liblutil/Makefile.in";

/// The rewrites applied to one target's sources.
#[derive(Debug, Clone)]
pub struct SourcePatch {
    header_namespace: String,
    link_flags: String,
    strip_detach: bool,
}

impl SourcePatch {
    /// Patch for a target of `group` building against `library_name`, linked with
    /// `link_flags`.
    pub fn new(group: &PlatformGroup, library_name: &str, link_flags: &[String]) -> Self {
        Self {
            header_namespace: library_name.to_string(),
            link_flags: link_flags.join(" "),
            strip_detach: !group.is_macos_family(),
        }
    }

    /// Applies the patch to `source_dir` unless it was patched before.
    ///
    /// Returns `true` when the patch was applied now.
    pub fn apply(&self, source_dir: &Path) -> Result<bool> {
        let marker = source_dir.join(PATCH_MARKER);
        if marker.exists() {
            log::debug!("Sources in {} already patched", source_dir.display());
            return Ok(false);
        }
        std::fs::write(&marker, b"").fs_context("writing patch marker", &marker)?;

        let include = Regex::new(r"<openssl/")?;
        let link = Regex::new(r"-lssl\s+-lcrypto")?;
        let namespace = format!("<{}/", self.header_namespace);

        for path in patchable_files(source_dir)? {
            let Ok(original) = std::fs::read_to_string(&path) else {
                continue;
            };
            let patched = include.replace_all(&original, namespace.as_str());
            let patched = link.replace_all(&patched, regex::NoExpand(&self.link_flags));
            let patched = if path.file_name().is_some_and(|n| n == "configure") {
                patched.replace("cross_compiling=maybe", "cross_compiling=yes")
            } else {
                patched.into_owned()
            };
            if patched != original {
                log::debug!("Patched {}", path.display());
                std::fs::write(&path, patched).fs_context("writing patched source", &path)?;
            }
        }

        if self.strip_detach {
            strip_detach(&source_dir.join(LIBLUTIL_MAKEFILE))?;
        }
        Ok(true)
    }
}

/// Files that may reference the dependency: C sources and headers, make and
/// configure inputs, and `configure` itself.
fn patchable_files(source_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(source_dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let name = entry.file_name().to_string_lossy();
        let wanted = name == "configure"
            || matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("c" | "h" | "in" | "ac" | "m4")
            );
        if wanted {
            files.push(path.to_path_buf());
        }
    }
    Ok(files)
}

/// Removes `detach.c` and `detach.o` from the object and source lists.
fn strip_detach(makefile: &Path) -> Result<()> {
    if !makefile.exists() {
        log::debug!("{} not found, nothing to strip", makefile.display());
        return Ok(());
    }
    let detach = Regex::new(r"[ \t]*\bdetach\.[co]\b")?;
    let contents = std::fs::read_to_string(makefile).fs_context("reading makefile", makefile)?;
    let stripped = detach.replace_all(&contents, "");
    std::fs::write(makefile, stripped.as_bytes()).fs_context("writing makefile", makefile)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_tree() -> tempfile::TempDir {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        std::fs::create_dir_all(root.join("libraries/liblutil")).unwrap();
        std::fs::create_dir_all(root.join("libraries/libldap")).unwrap();
        std::fs::write(
            root.join("configure"),
            "cross_compiling=maybe\nLIBS=\"-lssl -lcrypto $LIBS\"\n#include <openssl/ssl.h>\n",
        )
        .unwrap();
        std::fs::write(
            root.join("libraries/libldap/tls_o.c"),
            "#include <openssl/ssl.h>\n#include <openssl/err.h>\n",
        )
        .unwrap();
        std::fs::write(
            root.join(LIBLUTIL_MAKEFILE),
            "SRCS = base64.c detach.c entropy.c\nOBJS = base64.o detach.o entropy.o\n",
        )
        .unwrap();
        temp
    }

    #[test]
    fn rewrites_namespace_links_and_cross_compiling() {
        let temp = source_tree();
        let group = PlatformGroup::new("iOS", "iOS").unwrap();
        let patch = SourcePatch::new(&group, "COpenSSL", &["-lCOpenSSL".to_string()]);
        assert!(patch.apply(temp.path()).unwrap());

        let configure = std::fs::read_to_string(temp.path().join("configure")).unwrap();
        assert!(configure.contains("cross_compiling=yes"));
        assert!(configure.contains("LIBS=\"-lCOpenSSL $LIBS\""));
        assert!(configure.contains("<COpenSSL/ssl.h>"));

        let tls = std::fs::read_to_string(temp.path().join("libraries/libldap/tls_o.c")).unwrap();
        assert_eq!(tls, "#include <COpenSSL/ssl.h>\n#include <COpenSSL/err.h>\n");

        let makefile = std::fs::read_to_string(temp.path().join(LIBLUTIL_MAKEFILE)).unwrap();
        assert_eq!(
            makefile,
            "SRCS = base64.c entropy.c\nOBJS = base64.o entropy.o\n"
        );
    }

    #[test]
    fn marker_makes_patching_idempotent() {
        let temp = source_tree();
        let group = PlatformGroup::new("iOS", "iOS").unwrap();
        let patch = SourcePatch::new(&group, "ssl", &["-lssl".to_string()]);
        assert!(patch.apply(temp.path()).unwrap());
        let once = std::fs::read_to_string(temp.path().join("configure")).unwrap();
        assert!(!patch.apply(temp.path()).unwrap());
        let twice = std::fs::read_to_string(temp.path().join("configure")).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn macos_keeps_detach() {
        let temp = source_tree();
        let group = PlatformGroup::new("iOS", "macOS").unwrap();
        SourcePatch::new(&group, "openssl", &["-lssl".to_string(), "-lcrypto".to_string()])
            .apply(temp.path())
            .unwrap();
        let makefile = std::fs::read_to_string(temp.path().join(LIBLUTIL_MAKEFILE)).unwrap();
        assert!(makefile.contains("detach.c"));
    }
}
