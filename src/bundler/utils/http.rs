//! HTTP downloads of pipeline inputs.
//!
//! Downloads are attempted once. The body is streamed into a `.part` file next to
//! the destination, verified, and renamed into place; a failed or corrupt download
//! never leaves a file at the destination.

use crate::bundler::{
    builder::checksum::calculate_sha256,
    error::{Error, ErrorExt, Result},
};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Downloads `url` to `dest`, checking the SHA-256 when `expected_sha256` is given.
pub async fn download_to(url: &str, dest: &Path, expected_sha256: Option<&str>) -> Result<()> {
    log::info!("Downloading {}", url);

    let partial = partial_path(dest);
    let result = fetch(url, &partial).await;
    let result = match result {
        Ok(()) => match expected_sha256 {
            Some(expected) => verify(&partial, expected).await,
            None => Ok(()),
        },
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(e);
    }

    tokio::fs::rename(&partial, dest)
        .await
        .fs_context("moving download into place", dest)?;
    log::debug!("✓ Downloaded {}", dest.display());
    Ok(())
}

async fn fetch(url: &str, partial: &Path) -> Result<()> {
    let mut response = reqwest::get(url).await?;
    let status = response.status();
    if !status.is_success() {
        return Err(Error::DownloadFailed {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let mut file = tokio::fs::File::create(partial)
        .await
        .fs_context("creating download file", partial)?;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk)
            .await
            .fs_context("writing download file", partial)?;
    }
    file.flush()
        .await
        .fs_context("writing download file", partial)?;
    Ok(())
}

/// Fails with [`Error::ChecksumMismatch`] unless `path` hashes to `expected`.
///
/// The comparison is case-insensitive.
pub async fn verify(path: &Path, expected: &str) -> Result<()> {
    let actual = calculate_sha256(path).await?;
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(Error::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: expected.to_lowercase(),
            actual,
        })
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn verify_is_case_insensitive() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("a");
        std::fs::write(&file, b"abc").unwrap();
        let digest = "BA7816BF8F01CFEA414140DE5DAE2223B00361A396177A9CB410FF61F20015AD";
        verify(&file, digest).await.unwrap();
        let err = verify(&file, "00").await.unwrap_err();
        assert!(matches!(err, Error::ChecksumMismatch { .. }));
    }

    #[test]
    fn partial_path_appends_suffix() {
        assert_eq!(
            partial_path(Path::new("/d/openldap.tgz")),
            Path::new("/d/openldap.tgz.part")
        );
    }
}
