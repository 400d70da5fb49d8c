//! Object member extraction from fused archives.

use super::fat;
use crate::bundler::error::{Error, ErrorExt, Result};
use std::io::Read;
use std::path::{Path, PathBuf};

/// Extracts the `arch` members of every archive into `dest`.
///
/// Archives are visited in file-name order and members in archive order. When two
/// members share a name the last one wins, keeping the position of the first.
/// Returns the extracted object paths in that order.
pub fn extract_objects(archives: &[PathBuf], arch: &str, dest: &Path) -> Result<Vec<PathBuf>> {
    let mut archives = archives.to_vec();
    archives.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    std::fs::create_dir_all(dest).fs_context("creating directory", dest)?;

    let mut objects: Vec<PathBuf> = Vec::new();
    for path in &archives {
        let slice = fat::extract_slice(path, arch)?;
        let mut archive = ar::Archive::new(slice.data.as_slice());
        while let Some(entry) = archive.next_entry() {
            let mut entry = entry?;
            let identifier = String::from_utf8_lossy(entry.header().identifier()).into_owned();
            if identifier.starts_with("__.SYMDEF") {
                continue;
            }
            let name = Path::new(identifier.trim_end_matches('/'))
                .file_name()
                .map(PathBuf::from)
                .ok_or_else(|| {
                    Error::GenericError(format!(
                        "member {identifier:?} of {} has no file name",
                        path.display()
                    ))
                })?;

            let mut data = Vec::new();
            entry.read_to_end(&mut data)?;
            let object = dest.join(&name);
            std::fs::write(&object, data).fs_context("writing object", &object)?;
            if !objects.contains(&object) {
                objects.push(object);
            } else {
                log::debug!("{} replaces an earlier member", name.display());
            }
        }
    }
    Ok(objects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::merge::fat::tests::{archive, arm64, macho_object};
    use goblin::mach::cputype::CPU_TYPE_ARM64;

    #[test]
    fn last_member_wins_first_position_kept() {
        let temp = tempfile::tempdir().unwrap();
        let mut other = macho_object(CPU_TYPE_ARM64, 0);
        other.push(0x2a);

        let lber = temp.path().join("liblber.a");
        let ldap = temp.path().join("libldap.a");
        std::fs::write(&lber, archive(&[("common.o", arm64()), ("io.o", arm64())])).unwrap();
        std::fs::write(
            &ldap,
            archive(&[("__.SYMDEF SORTED", vec![0; 8]), ("common.o", other.clone()), ("bind.o", arm64())]),
        )
        .unwrap();

        let dest = temp.path().join("objects");
        let objects = extract_objects(&[ldap, lber], "arm64", &dest).unwrap();
        let names: Vec<_> = objects
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["common.o", "io.o", "bind.o"]);
        assert_eq!(std::fs::read(dest.join("common.o")).unwrap(), other);
    }

    #[test]
    fn missing_architecture_fails() {
        let temp = tempfile::tempdir().unwrap();
        let lib = temp.path().join("libldap.a");
        std::fs::write(&lib, archive(&[("a.o", arm64())])).unwrap();
        let err = extract_objects(&[lib], "x86_64", &temp.path().join("o")).unwrap_err();
        assert!(matches!(err, Error::ArchitectureMismatch { .. }));
    }
}
