//! Header reconciliation across the architectures of a group.

use crate::bundler::{
    Advisory, PlatformGroup,
    error::{ErrorExt, Result},
};
use regex::bytes::{Captures, Regex};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Installed headers of one architecture.
#[derive(Debug, Clone)]
pub struct HeaderSource {
    /// Architecture the headers were installed for.
    pub arch: String,
    /// Absolute path of each header, keyed by its path relative to `include/`.
    pub headers: Vec<(PathBuf, PathBuf)>,
}

/// Rewrites `#include`/`#import` directives naming a header of the merged set to
/// the `<Product/...>` namespace.
#[derive(Debug, Clone)]
pub struct IncludeRewriter {
    namespace: String,
    known: BTreeSet<String>,
    directive: Regex,
}

impl IncludeRewriter {
    /// Rewriter for `known` headers (paths relative to `include/`).
    pub fn new<'a>(namespace: &str, known: impl IntoIterator<Item = &'a Path>) -> Result<Self> {
        Ok(Self {
            namespace: namespace.to_string(),
            known: known
                .into_iter()
                .map(|p| p.to_string_lossy().replace('\\', "/"))
                .collect(),
            directive: Regex::new(r#"(?m)^([ \t]*#[ \t]*(?:include|import)[ \t]*)[<"]([^>"\n]+)[>"]"#)?,
        })
    }

    /// Rewrites the directives of one header.
    pub fn rewrite(&self, contents: &[u8]) -> Vec<u8> {
        self.directive
            .replace_all(contents, |caps: &Captures<'_>| {
                let name = String::from_utf8_lossy(&caps[2]);
                if self.known.contains(name.as_ref()) {
                    let mut out = caps[1].to_vec();
                    out.extend_from_slice(format!("<{}/{name}>", self.namespace).as_bytes());
                    out
                } else {
                    caps[0].to_vec()
                }
            })
            .into_owned()
    }
}

/// Outcome of [`reconcile_headers`].
#[derive(Debug, Clone, Default)]
pub struct ReconciledHeaders {
    /// Merged header paths, relative to the destination, sorted.
    pub headers: Vec<PathBuf>,
    /// One advisory per header whose contents differ between architectures.
    pub advisories: Vec<Advisory>,
}

/// Writes the union of every architecture's headers into `dest`.
///
/// `sources` must be ordered by architecture name: the content of each header is
/// taken from the first source that has it, which is the primary architecture
/// whenever that one installed the header.
pub fn reconcile_headers(
    group: &PlatformGroup,
    namespace: &str,
    sources: &[HeaderSource],
    dest: &Path,
) -> Result<ReconciledHeaders> {
    let mut variants: BTreeMap<PathBuf, Vec<(&str, Vec<u8>)>> = BTreeMap::new();
    for source in sources {
        for (relative, absolute) in &source.headers {
            let contents = std::fs::read(absolute).fs_context("reading header", absolute)?;
            variants
                .entry(relative.clone())
                .or_default()
                .push((source.arch.as_str(), contents));
        }
    }

    let rewriter = IncludeRewriter::new(namespace, variants.keys().map(PathBuf::as_path))?;
    let mut reconciled = ReconciledHeaders::default();
    for (relative, copies) in &variants {
        let Some(((kept_arch, kept), rest)) = copies.split_first() else {
            continue;
        };
        let divergent: Vec<String> = rest
            .iter()
            .filter(|(_, contents)| contents != kept)
            .map(|(arch, _)| arch.to_string())
            .collect();
        if !divergent.is_empty() {
            let advisory = Advisory::HeaderDivergence {
                group: group.to_string(),
                header: relative.clone(),
                kept: kept_arch.to_string(),
                divergent,
            };
            advisory.emit();
            reconciled.advisories.push(advisory);
        }

        let path = dest.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).fs_context("creating directory", parent)?;
        }
        std::fs::write(&path, rewriter.rewrite(kept)).fs_context("writing header", &path)?;
        reconciled.headers.push(relative.clone());
    }
    Ok(reconciled)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(root: &Path, arch: &str, files: &[(&str, &str)]) -> HeaderSource {
        let mut headers = Vec::new();
        for (name, contents) in files {
            let path = root.join(arch).join(name);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, contents).unwrap();
            headers.push((PathBuf::from(name), path));
        }
        HeaderSource {
            arch: arch.to_string(),
            headers,
        }
    }

    #[test]
    fn primary_copy_wins_and_divergence_is_reported() {
        let temp = tempfile::tempdir().unwrap();
        let group = PlatformGroup::new("iOS", "iOS_Simulator").unwrap();
        let sources = vec![
            source(
                temp.path(),
                "arm64",
                &[("lber_types.h", "#define LBER_LEN_T long\n"), ("ldap.h", "x\n")],
            ),
            source(
                temp.path(),
                "x86_64",
                &[
                    ("lber_types.h", "#define LBER_LEN_T int\n"),
                    ("ldap.h", "x\n"),
                    ("only_x86.h", "y\n"),
                ],
            ),
        ];
        let dest = temp.path().join("merged");
        let result = reconcile_headers(&group, "COpenLDAP", &sources, &dest).unwrap();

        assert_eq!(
            result.headers,
            vec![
                PathBuf::from("lber_types.h"),
                PathBuf::from("ldap.h"),
                PathBuf::from("only_x86.h")
            ]
        );
        assert_eq!(
            std::fs::read_to_string(dest.join("lber_types.h")).unwrap(),
            "#define LBER_LEN_T long\n"
        );
        assert_eq!(result.advisories.len(), 1);
        assert_eq!(
            result.advisories[0],
            Advisory::HeaderDivergence {
                group: "iOS-iOS_Simulator".to_string(),
                header: PathBuf::from("lber_types.h"),
                kept: "arm64".to_string(),
                divergent: vec!["x86_64".to_string()],
            }
        );
    }

    #[test]
    fn includes_of_merged_headers_are_namespaced() {
        let rewriter = IncludeRewriter::new(
            "COpenLDAP",
            [Path::new("lber.h"), Path::new("ldap_features.h")],
        )
        .unwrap();
        let header = b"#include <lber.h>\n# include \"ldap_features.h\"\n#include <stdio.h>\n#import <lber.h>\n";
        assert_eq!(
            String::from_utf8(rewriter.rewrite(header)).unwrap(),
            "#include <COpenLDAP/lber.h>\n# include <COpenLDAP/ldap_features.h>\n#include <stdio.h>\n#import <COpenLDAP/lber.h>\n"
        );
    }
}
