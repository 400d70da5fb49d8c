//! Co-dependency bundle acquisition.

use crate::bundler::{
    BuildLayout, Settings,
    error::{Error, ErrorExt, Result},
    utils::{fs, http},
};
use std::path::{Path, PathBuf};
use url::Url;

/// Name of the XCFramework directory a dependency URL provides.
///
/// Extensions are removed until `.xcframework` is reached
/// (`COpenSSL.xcframework.zip` → `COpenSSL.xcframework`); a name without one gets
/// `.xcframework` appended.
pub fn xcframework_name(url: &Url) -> Result<String> {
    let last = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
        .ok_or_else(|| Error::InvalidUrl {
            url: url.to_string(),
            reason: "the URL does not name a file".to_string(),
        })?;

    let mut component = PathBuf::from(last);
    while component.extension().is_some_and(|e| e != "xcframework") {
        match component.file_stem() {
            Some(stem) if stem != component.as_os_str() => component = PathBuf::from(stem),
            _ => break,
        }
    }
    if component.extension().is_some_and(|e| e == "xcframework") {
        Ok(component.to_string_lossy().into_owned())
    } else {
        Ok(format!("{}.xcframework", component.to_string_lossy()))
    }
}

/// Makes the dependency XCFramework available under the layout's dependency
/// directory and returns its path.
///
/// `http`/`https` URLs are downloaded; `file` URLs may point at a zip archive or at
/// an XCFramework directory. Archives are checksum-verified before extraction.
pub async fn fetch_dependency(settings: &Settings, layout: &BuildLayout) -> Result<PathBuf> {
    let dependency = settings.dependency();
    let url = &dependency.url;
    let name = xcframework_name(url)?;
    let dest_dir = layout.dependency_dir();
    let dest = dest_dir.join(&name);

    let local_source = if url.scheme() == "file" {
        Some(url.to_file_path().map_err(|()| Error::InvalidUrl {
            url: url.to_string(),
            reason: "not a local path".to_string(),
        })?)
    } else {
        None
    };

    if local_source.as_deref() == Some(dest.as_path()) {
        if !dest.is_dir() {
            return Err(Error::InvalidConfiguration(format!(
                "dependency {} is not a directory",
                dest.display()
            )));
        }
        return Ok(dest);
    }

    if settings.skip_existing_artifacts() && fs::exists(&dest).await {
        log::info!("Skipping dependency fetch because {} exists", dest.display());
        return Ok(dest);
    }
    fs::create_dir_all(&dest_dir, false).await?;
    fs::remove_dir_all(&dest).await?;

    let expected = dependency.sha256.as_deref();
    match local_source {
        Some(source) if source.is_dir() => {
            log::info!("Copying dependency from {}", source.display());
            fs::copy_dir(&source, &dest).await?;
        }
        Some(source) => {
            if let Some(expected) = expected {
                http::verify(&source, expected).await?;
            }
            log::info!("Extracting dependency from {}", source.display());
            extract_zip(&source, &dest_dir).await?;
        }
        None => {
            let archive = dest_dir.join(format!("{name}.download"));
            http::download_to(url.as_str(), &archive, expected).await?;
            let extracted = extract_zip(&archive, &dest_dir).await;
            fs::remove_file(&archive).await?;
            extracted?;
        }
    }

    if !dest.is_dir() {
        return Err(Error::InvalidConfiguration(format!(
            "dependency archive did not contain {name}"
        )));
    }
    log::info!("✓ Dependency ready at {}", dest.display());
    Ok(dest)
}

async fn extract_zip(archive: &Path, dest_dir: &Path) -> Result<()> {
    let archive = archive.to_path_buf();
    let dest_dir = dest_dir.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let file = std::fs::File::open(&archive).fs_context("opening archive", &archive)?;
        let mut zip = zip::ZipArchive::new(file)?;
        zip.extract(&dest_dir)?;
        Ok(())
    })
    .await?
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(url: &str) -> String {
        xcframework_name(&Url::parse(url).unwrap()).unwrap()
    }

    #[test]
    fn derives_xcframework_names() {
        assert_eq!(
            name("https://x.org/dl/COpenSSL-static.xcframework.zip"),
            "COpenSSL-static.xcframework"
        );
        assert_eq!(name("file:///deps/openssl.xcframework"), "openssl.xcframework");
        assert_eq!(name("file:///deps/openssl.xcframework/"), "openssl.xcframework");
        assert_eq!(name("https://x.org/openssl.tar.gz"), "openssl.xcframework");
        assert_eq!(name("https://x.org/openssl"), "openssl.xcframework");
    }
}
