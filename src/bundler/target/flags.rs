//! Compiler environment of one target.

use crate::bundler::{
    Settings, TargetTriple, Toolchain, dependency::DependencyMap, error::Result,
};
use std::path::PathBuf;

/// `CC`, `CFLAGS`, `CPPFLAGS` and `LDFLAGS` for building one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildEnvironment {
    /// Compiler driver.
    pub cc: PathBuf,
    /// Compiler flags.
    pub cflags: Vec<String>,
    /// Preprocessor flags.
    pub cppflags: Vec<String>,
    /// Linker flags.
    pub ldflags: Vec<String>,
    /// Library references to the dependency.
    pub libs: Vec<String>,
}

impl BuildEnvironment {
    /// Computes the environment of `target`.
    pub fn for_target(
        target: &TargetTriple,
        settings: &Settings,
        toolchain: &Toolchain,
        dependency: &DependencyMap,
    ) -> Result<Self> {
        let group = target.group();
        let sysroot = toolchain.sdk_path(&group).display().to_string();
        let min_version = settings.deployment_target(&group)?;
        let search = dependency.search_flags(target)?;

        let platform = vec![
            "-isysroot".to_string(),
            sysroot,
            "-target".to_string(),
            target.clang_target(min_version),
        ];

        let mut cflags = platform.clone();
        cflags.extend(["-O2".to_string(), "-fPIC".to_string()]);
        if settings.embeds_bitcode(target) {
            cflags.push("-fembed-bitcode".to_string());
        }

        let mut cppflags = platform.clone();
        cppflags.extend(search.cppflags);

        let mut ldflags = platform;
        ldflags.extend(search.ldflags);

        Ok(Self {
            cc: toolchain.clang().to_path_buf(),
            cflags,
            cppflags,
            ldflags,
            libs: search.libs,
        })
    }

    /// Variables to set on `configure` and `make` invocations.
    pub fn vars(&self) -> Vec<(&'static str, String)> {
        vec![
            ("CC", self.cc.display().to_string()),
            ("CFLAGS", self.cflags.join(" ")),
            ("CPPFLAGS", self.cppflags.join(" ")),
            ("LDFLAGS", self.ldflags.join(" ")),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::{DependencyEntry, SettingsBuilder};
    use std::collections::HashMap;

    fn fixture(target: &TargetTriple) -> (Settings, Toolchain, DependencyMap) {
        let settings = SettingsBuilder::new()
            .work_directory("/tmp/w")
            .dependency_url("/tmp/deps/COpenSSL.xcframework")
            .targets(vec![target.clone()])
            .build()
            .unwrap();
        let toolchain = Toolchain::new("/Dev", "/usr/bin/xcrun", "make", "/bin/clang", 2, None);
        let mut entries = HashMap::new();
        entries.insert(
            target.clone(),
            DependencyEntry {
                path: PathBuf::from("/deps/sub"),
                library_path: "libCOpenSSL.a".to_string(),
                headers_path: Some("Headers".to_string()),
                is_framework: false,
            },
        );
        (settings, toolchain, DependencyMap::from_entries("COpenSSL", entries))
    }

    #[test]
    fn device_builds_embed_bitcode() {
        let target: TargetTriple = "iOS-iOS-arm64".parse().unwrap();
        let (settings, toolchain, dependency) = fixture(&target);
        let env = BuildEnvironment::for_target(&target, &settings, &toolchain, &dependency).unwrap();
        assert!(env.cflags.contains(&"-fembed-bitcode".to_string()));
        assert!(env.cflags.contains(&"arm64-apple-ios12.0".to_string()));
        assert!(env.cppflags.contains(&"-I/deps/sub/Headers".to_string()));
        assert!(env.ldflags.contains(&"-L/deps/sub".to_string()));
        assert_eq!(env.libs, vec!["-lCOpenSSL"]);
        assert_eq!(
            env.cflags[1],
            "/Dev/Platforms/iPhoneOS.platform/Developer/SDKs/iPhoneOS.sdk"
        );
    }

    #[test]
    fn simulator_builds_do_not() {
        let target: TargetTriple = "tvOS-tvOS_Simulator-x86_64".parse().unwrap();
        let (settings, toolchain, dependency) = fixture(&target);
        let env = BuildEnvironment::for_target(&target, &settings, &toolchain, &dependency).unwrap();
        assert!(!env.cflags.contains(&"-fembed-bitcode".to_string()));
        assert!(env.cflags.contains(&"x86_64-apple-tvos12.0-simulator".to_string()));
    }
}
