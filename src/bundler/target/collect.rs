//! Classification of a target's install tree.

use super::BuildArtifact;
use crate::bundler::{
    Advisory, TargetTriple,
    error::{Error, Result},
};
use std::path::{Path, PathBuf};

/// What an installed file is, judged from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArtifactKind {
    StaticLibrary,
    Header,
    Binary,
    PkgConfig,
    Libtool,
    ManPage,
    Config,
    Unknown,
}

impl ArtifactKind {
    fn of(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("a") => Self::StaticLibrary,
            Some("h") => Self::Header,
            Some("pc") => Self::PkgConfig,
            Some("la") => Self::Libtool,
            Some("conf") | Some("default") => Self::Config,
            Some(ext) if ext.chars().next().is_some_and(|c| c.is_ascii_digit()) => {
                Self::ManPage
            }
            None => Self::Binary,
            Some(_) => Self::Unknown,
        }
    }

    /// Directories (relative to the install root) this kind belongs in.
    fn expected_locations(self) -> &'static [&'static str] {
        match self {
            Self::StaticLibrary | Self::Libtool => &["lib"],
            Self::Header => &["include"],
            Self::Binary => &["bin", "sbin", "libexec"],
            Self::PkgConfig => &["lib/pkgconfig"],
            Self::ManPage => &["share/man"],
            Self::Config => &["etc"],
            Self::Unknown => &[],
        }
    }
}

/// Walks `install_root` once and classifies every installed file.
///
/// Headers and static libraries are kept (in walk order, relative to the install
/// root); everything else is only checked for location. `.DS_Store` files are
/// ignored.
///
/// # Errors
///
/// [`Error::MissingArtifacts`] when no header or no static library was installed.
pub fn collect_artifacts(
    target: &TargetTriple,
    install_root: &Path,
) -> Result<(BuildArtifact, Vec<Advisory>)> {
    let mut headers = Vec::new();
    let mut static_libraries = Vec::new();
    let mut advisories = Vec::new();

    for entry in walkdir::WalkDir::new(install_root).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_dir() || entry.file_name() == ".DS_Store" {
            continue;
        }
        let relative = entry.path().strip_prefix(install_root)?.to_path_buf();
        let kind = ArtifactKind::of(&relative);

        if kind == ArtifactKind::Unknown {
            advisories.push(Advisory::UnknownArtifact {
                target: target.to_string(),
                path: relative,
            });
            continue;
        }

        let locations = kind.expected_locations();
        if !locations.iter().any(|dir| relative.starts_with(dir)) {
            advisories.push(Advisory::UnexpectedLocation {
                target: target.to_string(),
                path: relative.clone(),
                expected: locations[0],
            });
        }

        match kind {
            ArtifactKind::StaticLibrary => static_libraries.push(relative),
            ArtifactKind::Header => headers.push(relative),
            _ => {}
        }
    }

    if headers.is_empty() {
        return Err(Error::MissingArtifacts {
            target: target.to_string(),
            kind: "headers",
        });
    }
    if static_libraries.is_empty() {
        return Err(Error::MissingArtifacts {
            target: target.to_string(),
            kind: "static libraries",
        });
    }

    for advisory in &advisories {
        advisory.emit();
    }
    let artifact = BuildArtifact::new(
        target.clone(),
        install_root.to_path_buf(),
        headers,
        static_libraries,
    );
    Ok((artifact, advisories))
}

/// Path of a header relative to the `include/` directory.
pub fn include_relative(header: &Path) -> PathBuf {
    header
        .strip_prefix("include")
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| header.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"x").unwrap();
    }

    #[test]
    fn classifies_install_tree() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        for file in [
            "include/ldap.h",
            "include/lber.h",
            "lib/libldap.a",
            "lib/liblber.a",
            "lib/libldap.la",
            "lib/pkgconfig/ldap.pc",
            "bin/ldapsearch",
            "share/man/man3/ldap.3",
            "etc/openldap/ldap.conf",
            "etc/openldap/ldap.conf.default",
            "include/.DS_Store",
            "share/doc/readme.txt",
            "misplaced.a",
        ] {
            touch(root, file);
        }

        let target: TargetTriple = "macOS-macOS-arm64".parse().unwrap();
        let (artifact, advisories) = collect_artifacts(&target, root).unwrap();
        assert_eq!(
            artifact.headers(),
            &[PathBuf::from("include/lber.h"), PathBuf::from("include/ldap.h")]
        );
        assert_eq!(
            artifact.static_libraries(),
            &[
                PathBuf::from("lib/liblber.a"),
                PathBuf::from("lib/libldap.a"),
                PathBuf::from("misplaced.a")
            ]
        );
        assert_eq!(advisories.len(), 2);
        assert!(advisories.contains(&Advisory::UnknownArtifact {
            target: target.to_string(),
            path: PathBuf::from("share/doc/readme.txt"),
        }));
        assert!(advisories.contains(&Advisory::UnexpectedLocation {
            target: target.to_string(),
            path: PathBuf::from("misplaced.a"),
            expected: "lib",
        }));
    }

    #[test]
    fn empty_lists_are_errors() {
        let temp = tempfile::tempdir().unwrap();
        touch(temp.path(), "lib/libldap.a");
        let target: TargetTriple = "iOS-iOS-arm64".parse().unwrap();
        let err = collect_artifacts(&target, temp.path()).unwrap_err();
        assert!(matches!(err, Error::MissingArtifacts { kind: "headers", .. }));

        touch(temp.path(), "include/ldap.h");
        std::fs::remove_file(temp.path().join("lib/libldap.a")).unwrap();
        let err = collect_artifacts(&target, temp.path()).unwrap_err();
        assert!(matches!(
            err,
            Error::MissingArtifacts {
                kind: "static libraries",
                ..
            }
        ));
    }

    #[test]
    fn include_relative_strips_prefix() {
        assert_eq!(
            include_relative(Path::new("include/ldap/ldap.h")),
            Path::new("ldap/ldap.h")
        );
        assert_eq!(include_relative(Path::new("x/y.h")), Path::new("x/y.h"));
    }
}
