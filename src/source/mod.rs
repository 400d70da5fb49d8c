//! Source acquisition.
//!
//! Fetches the library source tarball and unpacks it into per-target source
//! directories. The co-dependency bundle is fetched by [`dependency`].

pub mod dependency;

use crate::bundler::{
    BuildLayout, Settings,
    error::{Error, ErrorExt, Result},
    utils::{fs, http},
};
use flate2::read::GzDecoder;
use std::path::{Component, Path, PathBuf};

pub use dependency::{fetch_dependency, xcframework_name};

/// Returns the local path of the source tarball, downloading it when needed.
///
/// `file` URLs are used in place. A cached download is reused when it matches the
/// configured checksum (or when none is configured); otherwise it is fetched again.
pub async fn fetch_source(settings: &Settings, layout: &BuildLayout) -> Result<PathBuf> {
    let url = settings.source_url()?;
    let expected = settings.package().source_sha256.as_deref();

    if url.scheme() == "file" {
        let path = url.to_file_path().map_err(|()| Error::InvalidUrl {
            url: url.to_string(),
            reason: "not a local path".to_string(),
        })?;
        if let Some(expected) = expected {
            http::verify(&path, expected).await?;
        }
        log::info!("✓ Using source tarball {}", path.display());
        return Ok(path);
    }

    let file_name = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| Error::InvalidUrl {
            url: url.to_string(),
            reason: "the URL does not name a file".to_string(),
        })?
        .to_string();
    let dest = layout.downloads_dir().join(file_name);

    if fs::exists(&dest).await {
        let reusable = match expected {
            Some(expected) => http::verify(&dest, expected).await.is_ok(),
            None => true,
        };
        if reusable {
            log::info!("✓ Reusing downloaded tarball {}", dest.display());
            return Ok(dest);
        }
        log::info!(
            "Cached tarball {} does not match the expected checksum, downloading again",
            dest.display()
        );
        fs::remove_file(&dest).await?;
    }

    http::download_to(url.as_str(), &dest, expected).await?;
    Ok(dest)
}

/// Makes `dest` hold the sources of `tarball`.
///
/// An existing tree is kept only when `reuse_existing` is set; otherwise it is
/// replaced, since it may come from another version. Returns whether the tarball
/// was extracted.
pub async fn prepare_source_tree(tarball: &Path, dest: &Path, reuse_existing: bool) -> Result<bool> {
    if reuse_existing && fs::exists(dest).await {
        log::debug!("Reusing extracted sources in {}", dest.display());
        return Ok(false);
    }
    extract_tarball(tarball, dest).await?;
    Ok(true)
}

/// Unpacks a gzipped tarball into `dest`, dropping the top-level directory.
///
/// The archive is unpacked next to `dest` and renamed into place, so `dest` only
/// ever exists fully extracted. A previous `dest` is replaced.
pub async fn extract_tarball(tarball: &Path, dest: &Path) -> Result<()> {
    let tarball = tarball.to_path_buf();
    let dest = dest.to_path_buf();
    let mut staging = dest.as_os_str().to_os_string();
    staging.push(".extracting");
    let staging = PathBuf::from(staging);

    fs::remove_dir_all(&staging).await?;
    log::debug!("Extracting {} to {}", tarball.display(), dest.display());

    let unpack_into = staging.clone();
    tokio::task::spawn_blocking(move || unpack(&tarball, &unpack_into)).await??;

    fs::remove_dir_all(&dest).await?;
    tokio::fs::rename(&staging, &dest)
        .await
        .fs_context("moving extracted sources into place", &dest)?;
    Ok(())
}

fn unpack(tarball: &Path, dest: &Path) -> Result<()> {
    let file = std::fs::File::open(tarball).fs_context("opening tarball", tarball)?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    archive.set_preserve_permissions(true);
    std::fs::create_dir_all(dest).fs_context("creating directory", dest)?;

    for entry in archive.entries().fs_context("reading tarball", tarball)? {
        let mut entry = entry.fs_context("reading tarball", tarball)?;
        let path = entry.path().fs_context("reading tarball", tarball)?;
        let Some(relative) = strip_top_level(&path) else {
            continue;
        };
        let target = dest.join(&relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).fs_context("creating directory", parent)?;
        }

        if entry.header().entry_type() == tar::EntryType::Link {
            // Hard link targets are archive paths, not filesystem paths.
            let link = entry
                .link_name()
                .fs_context("reading tarball", tarball)?
                .and_then(|link| strip_top_level(&link));
            if let Some(link) = link {
                std::fs::copy(dest.join(link), &target).fs_context("copying hard link", &target)?;
            }
            continue;
        }

        entry.unpack(&target).fs_context("unpacking", &target)?;
    }
    Ok(())
}

/// Drops the first component; rejects absolute and parent-relative paths.
fn strip_top_level(path: &Path) -> Option<PathBuf> {
    let mut components = path.components();
    match components.next() {
        Some(Component::Normal(_)) => {}
        Some(Component::CurDir) => return strip_top_level(components.as_path()),
        _ => return None,
    }
    let rest = components.as_path();
    if rest.as_os_str().is_empty()
        || rest
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return None;
    }
    Some(rest.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{Compression, write::GzEncoder};

    fn write_tarball(path: &Path) {
        write_versioned_tarball(path, "2.5.5");
    }

    fn write_versioned_tarball(path: &Path, version: &str) {
        let file = std::fs::File::create(path).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        let mut add = |name: &str, data: &[u8], mode: u32| {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(mode);
            header.set_cksum();
            builder.append_data(&mut header, name, data).unwrap();
        };
        let root = format!("openldap-{version}");
        add(&format!("{root}/configure"), b"#!/bin/sh\n", 0o755);
        add(
            &format!("{root}/libraries/liblutil/Makefile.in"),
            b"SRCS = detach.c\n",
            0o644,
        );
        add(&format!("{root}/VERSION"), version.as_bytes(), 0o644);
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[tokio::test]
    async fn extracts_without_top_level_directory() {
        let temp = tempfile::tempdir().unwrap();
        let tarball = temp.path().join("openldap-2.5.5.tgz");
        write_tarball(&tarball);

        let dest = temp.path().join("src/iOS-iOS-arm64");
        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
        extract_tarball(&tarball, &dest).await.unwrap();

        assert!(dest.join("configure").is_file());
        assert_eq!(
            std::fs::read_to_string(dest.join("libraries/liblutil/Makefile.in")).unwrap(),
            "SRCS = detach.c\n"
        );
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(dest.join("configure")).unwrap().permissions().mode();
            assert_ne!(mode & 0o111, 0);
        }
    }

    #[tokio::test]
    async fn existing_sources_are_replaced_unless_reused() {
        let temp = tempfile::tempdir().unwrap();
        let old = temp.path().join("openldap-2.5.4.tgz");
        let new = temp.path().join("openldap-2.5.5.tgz");
        write_versioned_tarball(&old, "2.5.4");
        write_versioned_tarball(&new, "2.5.5");
        let dest = temp.path().join("iOS-iOS-arm64");
        let version = || std::fs::read_to_string(dest.join("VERSION")).unwrap();

        assert!(prepare_source_tree(&old, &dest, false).await.unwrap());
        std::fs::write(dest.join("stale.o"), b"").unwrap();
        assert_eq!(version(), "2.5.4");

        assert!(!prepare_source_tree(&new, &dest, true).await.unwrap());
        assert_eq!(version(), "2.5.4");

        assert!(prepare_source_tree(&new, &dest, false).await.unwrap());
        assert_eq!(version(), "2.5.5");
        assert!(!dest.join("stale.o").exists());
    }

    #[test]
    fn strips_top_level_and_rejects_escapes() {
        assert_eq!(
            strip_top_level(Path::new("openldap-2.5.5/include/ldap.h")),
            Some(PathBuf::from("include/ldap.h"))
        );
        assert_eq!(strip_top_level(Path::new("openldap-2.5.5/")), None);
        assert_eq!(strip_top_level(Path::new("/etc/passwd")), None);
        assert_eq!(strip_top_level(Path::new("a/../../x")), None);
    }
}
