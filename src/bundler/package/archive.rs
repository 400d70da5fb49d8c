//! Deterministic zip archives of bundle directories.
//!
//! Entries are written in sorted path order with a fixed timestamp and fixed
//! permissions, so archiving the same tree twice gives byte-identical files.
//! Symbolic links are stored as links.

use crate::bundler::error::{Error, ErrorExt, Result};
use std::io::Write;
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

/// Archives `bundle` into `archive`, rooted at the bundle's directory name.
pub fn zip_bundle(bundle: &Path, archive: &Path) -> Result<()> {
    let root = bundle
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::GenericError(format!("{} has no name", bundle.display())))?;

    let file = std::fs::File::create(archive).fs_context("creating archive", archive)?;
    let mut zip = ZipWriter::new(file);
    let base = SimpleFileOptions::default()
        .last_modified_time(DateTime::default())
        .compression_method(CompressionMethod::Deflated);

    zip.add_directory(format!("{root}/"), base.unix_permissions(0o755))?;
    for entry in walkdir::WalkDir::new(bundle)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry?;
        let relative = entry.path().strip_prefix(bundle)?;
        let name = format!("{root}/{}", relative.to_string_lossy().replace('\\', "/"));
        let file_type = entry.file_type();

        if file_type.is_symlink() {
            let target = std::fs::read_link(entry.path()).fs_context("reading link", entry.path())?;
            zip.add_symlink(
                name,
                target.to_string_lossy().replace('\\', "/"),
                base.unix_permissions(0o755),
            )?;
        } else if file_type.is_dir() {
            zip.add_directory(format!("{name}/"), base.unix_permissions(0o755))?;
        } else {
            zip.start_file(name, base.unix_permissions(file_mode(entry.path())))?;
            let data = std::fs::read(entry.path()).fs_context("reading file", entry.path())?;
            zip.write_all(&data).fs_context("writing archive", archive)?;
        }
    }
    zip.finish()?;
    Ok(())
}

/// `0o755` for executables, `0o644` otherwise.
#[cfg(unix)]
fn file_mode(path: &Path) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    match std::fs::metadata(path) {
        Ok(meta) if meta.permissions().mode() & 0o111 != 0 => 0o755,
        _ => 0o644,
    }
}

#[cfg(not(unix))]
fn file_mode(_path: &Path) -> u32 {
    0o644
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(root: &Path) -> std::path::PathBuf {
        let bundle = root.join("P-dynamic.xcframework");
        std::fs::create_dir_all(bundle.join("ios-arm64/P.framework/Headers")).unwrap();
        std::fs::write(bundle.join("Info.plist"), "manifest").unwrap();
        std::fs::write(bundle.join("ios-arm64/P.framework/P"), "binary").unwrap();
        std::fs::write(bundle.join("ios-arm64/P.framework/Headers/a.h"), "a").unwrap();
        bundle
    }

    #[test]
    fn archives_are_byte_identical() {
        let temp = tempfile::tempdir().unwrap();
        let bundle = bundle(temp.path());
        let first = temp.path().join("first.zip");
        let second = temp.path().join("second.zip");
        zip_bundle(&bundle, &first).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(1100));
        std::fs::write(bundle.join("Info.plist"), "manifest").unwrap();
        zip_bundle(&bundle, &second).unwrap();
        assert_eq!(std::fs::read(first).unwrap(), std::fs::read(second).unwrap());
    }

    #[test]
    fn entries_are_sorted_and_rooted() {
        let temp = tempfile::tempdir().unwrap();
        let bundle = bundle(temp.path());
        let archive = temp.path().join("out.zip");
        zip_bundle(&bundle, &archive).unwrap();

        let zip = zip::ZipArchive::new(std::fs::File::open(archive).unwrap()).unwrap();
        let mut names: Vec<String> = (0..zip.len())
            .map(|i| zip.name_for_index(i).unwrap().to_string())
            .collect();
        assert_eq!(names[0], "P-dynamic.xcframework/");
        assert_eq!(names[1], "P-dynamic.xcframework/Info.plist");
        assert!(names.iter().all(|n| n.starts_with("P-dynamic.xcframework/")));
        names.dedup();
        assert_eq!(names.len(), zip.len());
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_preserved() {
        let temp = tempfile::tempdir().unwrap();
        let bundle = bundle(temp.path());
        std::os::unix::fs::symlink("Info.plist", bundle.join("link")).unwrap();
        let archive = temp.path().join("out.zip");
        zip_bundle(&bundle, &archive).unwrap();

        let out = temp.path().join("extracted");
        zip::ZipArchive::new(std::fs::File::open(archive).unwrap())
            .unwrap()
            .extract(&out)
            .unwrap();
        assert_eq!(
            std::fs::read_link(out.join("P-dynamic.xcframework/link")).unwrap(),
            Path::new("Info.plist")
        );
    }
}
