//! Integration tests of the pipeline stages that do not need an Xcode toolchain.

use std::path::{Path, PathBuf};
use xcframework_bundler::bundler::{
    Advisory, BuildArtifact, DependencyMap, Error, ExternalManifestEntry, PlatformGroup,
    TargetTriple, XcFrameworkManifest,
    merge::{HeaderSource, extract_objects, fat, reconcile_headers, validate_merge_set},
    package::zip_bundle,
};

const CPU_TYPE_X86_64: u32 = 0x0100_0007;
const CPU_TYPE_ARM64: u32 = 0x0100_000c;

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

/// Header-only 64-bit Mach-O object.
fn object(cputype: u32, cpusubtype: u32, tag: u8) -> Vec<u8> {
    let mut bytes = Vec::new();
    for word in [0xfeed_facf, cputype, cpusubtype, 1, 0, 0, 0, 0] {
        bytes.extend_from_slice(&u32::to_le_bytes(word));
    }
    bytes.push(tag);
    bytes
}

fn archive(members: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut builder = ar::Builder::new(Vec::new());
    for (name, data) in members {
        let header = ar::Header::new(name.as_bytes().to_vec(), data.len() as u64);
        builder.append(&header, data.as_slice()).unwrap();
    }
    builder.into_inner().unwrap()
}

#[test]
fn dependency_manifest_resolves_every_target() {
    let temp = tempfile::tempdir().unwrap();
    std::fs::copy(fixture("Info.plist"), temp.path().join("Info.plist")).unwrap();

    let map = DependencyMap::load(temp.path()).unwrap();
    assert_eq!(map.library_name(), "COpenSSL");
    assert_eq!(map.len(), 7);

    let catalyst: TargetTriple = "iOS-macOS-x86_64".parse().unwrap();
    let entry = map.resolve(&catalyst).unwrap();
    assert_eq!(entry.path, temp.path().join("ios-arm64_x86_64-maccatalyst"));

    let missing: TargetTriple = "tvOS-tvOS-arm64".parse().unwrap();
    assert!(matches!(
        map.check_targets(&[catalyst, missing]),
        Err(Error::MissingDependencyTarget { .. })
    ));
}

#[test]
fn produced_manifest_round_trips_as_dependency() {
    let groups = [
        (PlatformGroup::new("iOS", "iOS").unwrap(), vec!["arm64"]),
        (
            PlatformGroup::new("watchOS", "watchOS_Simulator").unwrap(),
            vec!["x86_64", "arm64"],
        ),
        (PlatformGroup::new("macOS", "macOS").unwrap(), vec!["x86_64", "arm64"]),
    ];
    let entries: Vec<ExternalManifestEntry> = groups
        .iter()
        .map(|(group, archs)| {
            let archs: Vec<String> = archs.iter().map(|a| a.to_string()).collect();
            ExternalManifestEntry::for_group(group, &archs, "libCOpenLDAP.a", Some("Headers".into()))
                .unwrap()
        })
        .collect();
    assert_eq!(entries[1].library_identifier, "watchos-arm64_x86_64-simulator");

    let temp = tempfile::tempdir().unwrap();
    let manifest = XcFrameworkManifest::new(entries);
    let expected = DependencyMap::from_manifest(&manifest, temp.path()).unwrap();
    manifest.write(&temp.path().join("Info.plist")).unwrap();

    let reloaded = XcFrameworkManifest::load(&temp.path().join("Info.plist")).unwrap();
    assert_eq!(reloaded, manifest);
    let map = DependencyMap::load(temp.path()).unwrap();
    assert_eq!(map, expected);
    assert_eq!(map.library_name(), "COpenLDAP");
    assert_eq!(map.len(), 5);

    for (group, archs) in &groups {
        for arch in archs {
            let target = TargetTriple::new(group.sdk(), group.platform(), *arch).unwrap();
            assert_eq!(
                map.search_flags(&target).unwrap(),
                expected.search_flags(&target).unwrap(),
                "{target}"
            );
            assert!(map.resolve(&target).unwrap().path.starts_with(temp.path()));
        }
    }
}

#[test]
fn unknown_platform_pair_fails_resolution() {
    let text = std::fs::read_to_string(fixture("Info.plist"))
        .unwrap()
        .replacen("<string>macos</string>", "<string>xros</string>", 1);
    let manifest = XcFrameworkManifest::parse(text.as_bytes()).unwrap();
    let err = DependencyMap::from_manifest(&manifest, Path::new("/deps")).unwrap_err();
    assert!(matches!(err, Error::UnsupportedManifestEntry { .. }));
}

#[test]
fn fusion_ignores_input_order_and_keeps_members() {
    let temp = tempfile::tempdir().unwrap();
    let x86 = temp.path().join("x86_64.a");
    let arm = temp.path().join("arm64.a");
    std::fs::write(
        &x86,
        archive(&[
            ("bind.o", object(CPU_TYPE_X86_64, 3, 1)),
            ("search.o", object(CPU_TYPE_X86_64, 3, 2)),
        ]),
    )
    .unwrap();
    std::fs::write(
        &arm,
        archive(&[
            ("bind.o", object(CPU_TYPE_ARM64, 0, 1)),
            ("search.o", object(CPU_TYPE_ARM64, 0, 2)),
        ]),
    )
    .unwrap();

    let one = temp.path().join("one").join("libldap.a");
    let two = temp.path().join("two").join("libldap.a");
    std::fs::create_dir_all(one.parent().unwrap()).unwrap();
    std::fs::create_dir_all(two.parent().unwrap()).unwrap();
    fat::fuse_files(&[("x86_64".into(), x86.clone()), ("arm64".into(), arm.clone())], &one)
        .unwrap();
    fat::fuse_files(&[("arm64".into(), arm), ("x86_64".into(), x86)], &two).unwrap();
    assert_eq!(std::fs::read(&one).unwrap(), std::fs::read(&two).unwrap());

    for arch in ["arm64", "x86_64"] {
        let a = extract_objects(&[one.clone()], arch, &temp.path().join("a").join(arch)).unwrap();
        let b = extract_objects(&[two.clone()], arch, &temp.path().join("b").join(arch)).unwrap();
        let names = |paths: &[PathBuf]| -> Vec<String> {
            paths
                .iter()
                .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
                .collect()
        };
        assert_eq!(names(&a), vec!["bind.o", "search.o"]);
        assert_eq!(names(&a), names(&b));
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(std::fs::read(x).unwrap(), std::fs::read(y).unwrap());
        }
    }
}

#[test]
fn missing_library_for_one_architecture_is_a_mismatch() {
    let group = PlatformGroup::new("tvOS", "tvOS_Simulator").unwrap();
    let artifact = |arch: &str, libs: &[&str]| {
        BuildArtifact::new(
            TargetTriple::new("tvOS", "tvOS_Simulator", arch).unwrap(),
            PathBuf::from("/installs").join(arch),
            vec![PathBuf::from("include/ldap.h")],
            libs.iter().map(PathBuf::from).collect(),
        )
    };
    let err = validate_merge_set(
        &group,
        &[
            artifact("arm64", &["lib/liblber.a", "lib/libldap.a"]),
            artifact("x86_64", &["lib/liblber.a"]),
        ],
    )
    .unwrap_err();
    assert!(matches!(err, Error::MergeSetMismatch { ref library, .. } if library == "libldap.a"));
}

#[test]
fn divergent_header_keeps_primary_copy() {
    let temp = tempfile::tempdir().unwrap();
    let mut sources = Vec::new();
    for (arch, contents) in [("arm64", "#define SIZE 8\n"), ("x86_64", "#define SIZE 4\n")] {
        let path = temp.path().join(arch).join("lber_types.h");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, contents).unwrap();
        sources.push(HeaderSource {
            arch: arch.to_string(),
            headers: vec![(PathBuf::from("lber_types.h"), path)],
        });
    }

    let group = PlatformGroup::new("iOS", "iOS_Simulator").unwrap();
    let dest = temp.path().join("merged");
    let reconciled = reconcile_headers(&group, "COpenLDAP", &sources, &dest).unwrap();
    assert_eq!(reconciled.headers, vec![PathBuf::from("lber_types.h")]);
    assert_eq!(
        std::fs::read_to_string(dest.join("lber_types.h")).unwrap(),
        "#define SIZE 8\n"
    );
    assert!(matches!(
        reconciled.advisories.as_slice(),
        [Advisory::HeaderDivergence { kept, divergent, .. }] if kept == "arm64" && divergent == &["x86_64"]
    ));
}

#[test]
fn regenerated_archives_are_byte_identical() {
    let temp = tempfile::tempdir().unwrap();
    let bundle = temp.path().join("COpenLDAP-static.xcframework");
    std::fs::create_dir_all(bundle.join("ios-arm64/Headers/COpenLDAP")).unwrap();
    std::fs::copy(fixture("Info.plist"), bundle.join("Info.plist")).unwrap();
    std::fs::write(bundle.join("ios-arm64/libCOpenLDAP.a"), b"!<arch>\n").unwrap();
    std::fs::write(bundle.join("ios-arm64/Headers/COpenLDAP/ldap.h"), b"/* ldap */\n").unwrap();

    let first = temp.path().join("first.zip");
    zip_bundle(&bundle, &first).unwrap();

    let copy = temp.path().join("copy").join("COpenLDAP-static.xcframework");
    std::fs::create_dir_all(copy.parent().unwrap()).unwrap();
    for entry in walkdir::WalkDir::new(&bundle).sort_by_file_name() {
        let entry = entry.unwrap();
        let dest = copy.join(entry.path().strip_prefix(&bundle).unwrap());
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&dest).unwrap();
        } else {
            std::fs::copy(entry.path(), &dest).unwrap();
        }
    }
    let second = temp.path().join("second.zip");
    zip_bundle(&copy, &second).unwrap();

    assert_eq!(std::fs::read(first).unwrap(), std::fs::read(second).unwrap());
}
