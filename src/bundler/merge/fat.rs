//! Fat (universal) container reading and writing.
//!
//! Inputs may be thin Mach-O files, static archives of Mach-O objects, or fat
//! containers of either. The fused output always is a fat container whose slices
//! are ordered by CPU type and subtype, so the result does not depend on the order
//! the inputs were given in.

use crate::bundler::error::{Error, ErrorExt, Result};
use goblin::mach::{Mach, MachO, cputype};
use std::path::{Path, PathBuf};

/// Magic of a fat header, stored big-endian.
const FAT_MAGIC: u32 = goblin::mach::fat::FAT_MAGIC;

/// Size of the fat header.
const FAT_HEADER_SIZE: usize = goblin::mach::fat::SIZEOF_FAT_HEADER;

/// Size of one fat arch record.
const FAT_ARCH_SIZE: usize = goblin::mach::fat::SIZEOF_FAT_ARCH;

/// Capability bits of `cpusubtype` (pointer authentication ABI and the like).
const CPU_SUBTYPE_MASK: u32 = 0xff00_0000;

/// Global header of a static archive.
const AR_MAGIC: &[u8] = b"!<arch>\n";

/// One architecture slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slice {
    /// Architecture name (`arm64`, `x86_64`, `armv7k`...).
    pub arch: String,
    /// Mach-O CPU type.
    pub cputype: u32,
    /// Mach-O CPU subtype.
    pub cpusubtype: u32,
    /// Slice contents.
    pub data: Vec<u8>,
}

impl Slice {
    /// Power-of-two alignment of the slice inside a fat container.
    fn align(&self) -> u32 {
        match self.cputype {
            cputype::CPU_TYPE_ARM | cputype::CPU_TYPE_ARM64 | cputype::CPU_TYPE_ARM64_32 => 14,
            _ => 12,
        }
    }
}

/// Architecture name of a (cputype, cpusubtype) pair.
pub fn arch_name(cputype: u32, cpusubtype: u32) -> String {
    cputype::get_arch_name_from_types(cputype, cpusubtype & !CPU_SUBTYPE_MASK)
        .map(str::to_string)
        .unwrap_or_else(|| format!("cpu{cputype}-{}", cpusubtype & !CPU_SUBTYPE_MASK))
}

/// Reads every slice of a thin or fat file.
pub fn read_slices(bytes: &[u8]) -> Result<Vec<Slice>> {
    if bytes.len() >= 4 && u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) == FAT_MAGIC
    {
        let Mach::Fat(multi) = Mach::parse(bytes)? else {
            return Err(Error::GenericError("malformed fat header".to_string()));
        };
        let mut slices = Vec::new();
        for arch in multi.iter_arches() {
            let arch = arch?;
            slices.push(Slice {
                arch: arch_name(arch.cputype, arch.cpusubtype),
                cputype: arch.cputype,
                cpusubtype: arch.cpusubtype,
                data: arch.slice(bytes).to_vec(),
            });
        }
        Ok(slices)
    } else {
        Ok(vec![thin_slice(bytes)?])
    }
}

/// Identifies the architecture of a thin Mach-O file or static archive.
fn thin_slice(bytes: &[u8]) -> Result<Slice> {
    let (cputype, cpusubtype) = if bytes.starts_with(AR_MAGIC) {
        archive_cpu(bytes)?
    } else {
        let macho = MachO::parse(bytes, 0)?;
        (macho.header.cputype, macho.header.cpusubtype)
    };
    Ok(Slice {
        arch: arch_name(cputype, cpusubtype),
        cputype,
        cpusubtype,
        data: bytes.to_vec(),
    })
}

/// CPU type of the first Mach-O member of a static archive.
fn archive_cpu(bytes: &[u8]) -> Result<(u32, u32)> {
    use std::io::Read;

    let mut archive = ar::Archive::new(bytes);
    while let Some(entry) = archive.next_entry() {
        let mut entry = entry?;
        if entry.header().identifier().starts_with(b"__.SYMDEF") {
            continue;
        }
        let mut member = Vec::new();
        entry.read_to_end(&mut member)?;
        if let Ok(macho) = MachO::parse(&member, 0) {
            return Ok((macho.header.cputype, macho.header.cpusubtype));
        }
    }
    Err(Error::GenericError(
        "static archive has no Mach-O member".to_string(),
    ))
}

/// Serializes slices into a fat container, ordered by CPU type and subtype.
pub fn write_fat(mut slices: Vec<Slice>) -> Result<Vec<u8>> {
    slices.sort_by_key(|s| (s.cputype, s.cpusubtype));
    if let Some(pair) = slices
        .windows(2)
        .find(|w| (w[0].cputype, w[0].cpusubtype) == (w[1].cputype, w[1].cpusubtype))
    {
        return Err(Error::GenericError(format!(
            "two slices for architecture {}",
            pair[0].arch
        )));
    }

    let count = u32::try_from(slices.len())
        .map_err(|_| Error::GenericError("too many slices".to_string()))?;
    let mut offset = FAT_HEADER_SIZE + FAT_ARCH_SIZE * slices.len();
    let mut records = Vec::with_capacity(slices.len());
    for slice in &slices {
        let alignment = 1usize << slice.align();
        offset = offset.div_ceil(alignment) * alignment;
        records.push((offset, slice));
        offset += slice.data.len();
    }

    let too_large = || Error::GenericError("fat container exceeds 4 GiB".to_string());
    let mut out = Vec::with_capacity(offset);
    out.extend_from_slice(&FAT_MAGIC.to_be_bytes());
    out.extend_from_slice(&count.to_be_bytes());
    for (offset, slice) in &records {
        out.extend_from_slice(&slice.cputype.to_be_bytes());
        out.extend_from_slice(&slice.cpusubtype.to_be_bytes());
        out.extend_from_slice(&u32::try_from(*offset).map_err(|_| too_large())?.to_be_bytes());
        out.extend_from_slice(
            &u32::try_from(slice.data.len())
                .map_err(|_| too_large())?
                .to_be_bytes(),
        );
        out.extend_from_slice(&slice.align().to_be_bytes());
    }
    for (offset, slice) in records {
        out.resize(offset, 0);
        out.extend_from_slice(&slice.data);
    }
    Ok(out)
}

/// Fuses per-architecture files into one fat container at `output`.
///
/// Each input must hold exactly the architecture it is paired with.
pub fn fuse_files(inputs: &[(String, PathBuf)], output: &Path) -> Result<()> {
    let mut slices = Vec::with_capacity(inputs.len());
    for (arch, path) in inputs {
        let bytes = std::fs::read(path).fs_context("reading archive", path)?;
        let found = read_slices(&bytes)?;
        match found.as_slice() {
            [slice] if slice.arch == *arch => slices.extend(found),
            _ => {
                return Err(Error::ArchitectureMismatch {
                    path: path.clone(),
                    expected: arch.clone(),
                    found: found
                        .iter()
                        .map(|s| s.arch.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                });
            }
        }
    }
    let bytes = write_fat(slices)?;
    std::fs::write(output, bytes).fs_context("writing fat container", output)
}

/// The slice of `arch` in the (thin or fat) file at `path`.
pub fn extract_slice(path: &Path, arch: &str) -> Result<Slice> {
    let bytes = std::fs::read(path).fs_context("reading archive", path)?;
    let slices = read_slices(&bytes)?;
    let names: Vec<String> = slices.iter().map(|s| s.arch.clone()).collect();
    slices
        .into_iter()
        .find(|s| s.arch == arch)
        .ok_or_else(|| Error::ArchitectureMismatch {
            path: path.to_path_buf(),
            expected: arch.to_string(),
            found: names.join(", "),
        })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Minimal 64-bit Mach-O object header for `cputype`.
    pub(crate) fn macho_object(cputype: u32, cpusubtype: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0xfeed_facf_u32.to_le_bytes()); // MH_MAGIC_64
        bytes.extend_from_slice(&cputype.to_le_bytes());
        bytes.extend_from_slice(&cpusubtype.to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes()); // MH_OBJECT
        bytes.extend_from_slice(&0u32.to_le_bytes()); // ncmds
        bytes.extend_from_slice(&0u32.to_le_bytes()); // sizeofcmds
        bytes.extend_from_slice(&0u32.to_le_bytes()); // flags
        bytes.extend_from_slice(&0u32.to_le_bytes()); // reserved
        bytes
    }

    /// Static archive holding `members`.
    pub(crate) fn archive(members: &[(&str, Vec<u8>)]) -> Vec<u8> {
        let mut builder = ar::Builder::new(Vec::new());
        for (name, data) in members {
            let header = ar::Header::new(name.as_bytes().to_vec(), data.len() as u64);
            builder.append(&header, data.as_slice()).unwrap();
        }
        builder.into_inner().unwrap()
    }

    pub(crate) fn arm64() -> Vec<u8> {
        macho_object(cputype::CPU_TYPE_ARM64, 0)
    }

    pub(crate) fn x86_64() -> Vec<u8> {
        macho_object(cputype::CPU_TYPE_X86_64, 3)
    }

    #[test]
    fn identifies_thin_objects_and_archives() {
        assert_eq!(read_slices(&arm64()).unwrap()[0].arch, "arm64");
        let lib = archive(&[("a.o", x86_64())]);
        assert_eq!(read_slices(&lib).unwrap()[0].arch, "x86_64");
    }

    #[test]
    fn fused_output_is_order_independent() {
        let temp = tempfile::tempdir().unwrap();
        let a = temp.path().join("arm64.a");
        let x = temp.path().join("x86_64.a");
        std::fs::write(&a, archive(&[("a.o", arm64())])).unwrap();
        std::fs::write(&x, archive(&[("a.o", x86_64())])).unwrap();

        let first = temp.path().join("first.a");
        let second = temp.path().join("second.a");
        fuse_files(
            &[("arm64".into(), a.clone()), ("x86_64".into(), x.clone())],
            &first,
        )
        .unwrap();
        fuse_files(&[("x86_64".into(), x), ("arm64".into(), a)], &second).unwrap();

        let first = std::fs::read(first).unwrap();
        assert_eq!(first, std::fs::read(second).unwrap());

        let slices = read_slices(&first).unwrap();
        let archs: Vec<&str> = slices.iter().map(|s| s.arch.as_str()).collect();
        assert_eq!(archs, vec!["x86_64", "arm64"]);
        assert_eq!(slices[1].data, archive(&[("a.o", arm64())]));
    }

    #[test]
    fn single_architecture_still_fuses() {
        let temp = tempfile::tempdir().unwrap();
        let a = temp.path().join("a.a");
        std::fs::write(&a, archive(&[("a.o", arm64())])).unwrap();
        let out = temp.path().join("out.a");
        fuse_files(&[("arm64".into(), a)], &out).unwrap();
        assert_eq!(extract_slice(&out, "arm64").unwrap().arch, "arm64");
        assert!(extract_slice(&out, "x86_64").is_err());
    }

    #[test]
    fn wrong_architecture_is_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let a = temp.path().join("a.a");
        std::fs::write(&a, archive(&[("a.o", x86_64())])).unwrap();
        let err = fuse_files(&[("arm64".into(), a)], &temp.path().join("o")).unwrap_err();
        assert!(matches!(err, Error::ArchitectureMismatch { .. }));
    }
}
