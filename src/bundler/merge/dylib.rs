//! Dynamic library derivation.
//!
//! The objects of a group's fused archives are relinked per architecture into a
//! dynamic library whose install name is the framework's `@rpath` location. Load
//! commands are then made relocatable: absolute rpaths are dropped and absolute
//! non-system dependencies are rewritten to `@rpath/<file>`.

use crate::bundler::{
    PlatformGroup, Settings, TargetTriple, Toolchain,
    dependency::DependencyMap,
    error::{Error, ErrorExt, Result},
    utils::OutputObserver,
};
use std::path::{Path, PathBuf};

/// `@rpath` install name of the framework binary.
///
/// macOS-family frameworks use the versioned bundle layout.
pub fn install_name(product: &str, group: &PlatformGroup) -> String {
    if group.is_macos_family() {
        format!("@rpath/{product}.framework/Versions/A/{product}")
    } else {
        format!("@rpath/{product}.framework/{product}")
    }
}

/// Dynamic linking information of a thin Mach-O image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadCommands {
    /// `LC_ID_DYLIB` of the image.
    pub install_name: Option<String>,
    /// `LC_LOAD_DYLIB` and friends.
    pub libs: Vec<String>,
    /// `LC_RPATH` entries.
    pub rpaths: Vec<String>,
}

/// Reads the load commands of a thin Mach-O image.
pub fn read_load_commands(path: &Path) -> Result<LoadCommands> {
    let buffer = std::fs::read(path).fs_context("reading dynamic library", path)?;
    match goblin::Object::parse(&buffer)? {
        goblin::Object::Mach(goblin::mach::Mach::Binary(macho)) => Ok(LoadCommands {
            install_name: macho.name.map(str::to_string),
            libs: macho
                .libs
                .iter()
                .filter(|lib| **lib != "self")
                .map(|lib| lib.to_string())
                .collect(),
            rpaths: macho.rpaths.iter().map(|r| r.to_string()).collect(),
        }),
        _ => Err(Error::GenericError(format!(
            "{} is not a thin Mach-O image",
            path.display()
        ))),
    }
}

/// Whether a load path is resolved by the system or already relocatable.
fn is_system_dylib(path: &str) -> bool {
    path.starts_with("/System/")
        || path.starts_with("/usr/lib/")
        || path.starts_with("@rpath")
        || path.starts_with("@executable_path")
        || path.starts_with("@loader_path")
}

/// `install_name_tool` arguments making an image relocatable.
pub fn relocation_args(commands: &LoadCommands, install_name: &str) -> Vec<String> {
    let mut args = Vec::new();
    if commands.install_name.as_deref() != Some(install_name) {
        args.extend(["-id".to_string(), install_name.to_string()]);
    }
    for rpath in commands.rpaths.iter().filter(|r| r.starts_with('/')) {
        args.extend(["-delete_rpath".to_string(), rpath.clone()]);
    }
    for lib in &commands.libs {
        if !lib.starts_with('/') || is_system_dylib(lib) {
            continue;
        }
        let Some(relative) = rpath_relative(lib) else {
            continue;
        };
        args.extend(["-change".to_string(), lib.clone(), format!("@rpath/{relative}")]);
    }
    args
}

/// Part of an absolute load path that stays below `@rpath`.
///
/// Framework binaries keep everything from their `.framework` directory on
/// (`/x/A.framework/Versions/A/A` → `A.framework/Versions/A/A`); plain libraries
/// keep their file name.
fn rpath_relative(lib: &str) -> Option<String> {
    let path = Path::new(lib);
    let components: Vec<_> = path.components().collect();
    let framework = components.iter().rposition(|c| {
        Path::new(c.as_os_str())
            .extension()
            .is_some_and(|ext| ext == "framework")
    });
    match framework {
        Some(index) => Some(
            components[index..]
                .iter()
                .collect::<PathBuf>()
                .to_string_lossy()
                .into_owned(),
        ),
        None => path
            .file_name()
            .map(|file| file.to_string_lossy().into_owned()),
    }
}

/// Links and relocates per-architecture dynamic libraries.
pub struct DylibLinker<'a> {
    settings: &'a Settings,
    toolchain: &'a Toolchain,
    dependency: &'a DependencyMap,
    observer: &'a dyn OutputObserver,
}

impl<'a> DylibLinker<'a> {
    /// Creates a linker.
    pub fn new(
        settings: &'a Settings,
        toolchain: &'a Toolchain,
        dependency: &'a DependencyMap,
        observer: &'a dyn OutputObserver,
    ) -> Self {
        Self {
            settings,
            toolchain,
            dependency,
            observer,
        }
    }

    /// Links `objects` into the dynamic library `output` for `target`, then makes it
    /// relocatable.
    pub async fn link(
        &self,
        target: &TargetTriple,
        objects: &[PathBuf],
        output: &Path,
        install_name: &str,
    ) -> Result<()> {
        let cwd = output
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        tokio::fs::create_dir_all(&cwd)
            .await
            .fs_context("creating directory", &cwd)?;

        let filelist = output.with_extension("filelist");
        let listing: String = objects
            .iter()
            .map(|o| format!("{}\n", o.display()))
            .collect();
        tokio::fs::write(&filelist, listing)
            .await
            .fs_context("writing object list", &filelist)?;

        let group = target.group();
        let min_version = self.settings.deployment_target(&group)?;
        let search = self.dependency.search_flags(target)?;

        let mut command = self
            .toolchain
            .clang_command(&cwd)
            .arg("-dynamiclib")
            .arg("-target")
            .arg(target.clang_target(min_version))
            .arg("-isysroot")
            .arg(self.toolchain.sdk_path(&group))
            .arg("-install_name")
            .arg(install_name)
            .arg("-Wl,-headerpad_max_install_names")
            .arg("-filelist")
            .arg(&filelist)
            .arg("-o")
            .arg(output)
            .args(search.ldflags)
            .args(search.libs)
            .args(
                self.settings
                    .link_libraries()
                    .iter()
                    .map(|lib| format!("-l{lib}")),
            )
            .label(target.to_string());
        if self.settings.embeds_bitcode(target) {
            command = command.arg("-fembed-bitcode");
        }
        log::debug!("Linking {} for {}", output.display(), target);
        command.run(self.observer).await?;

        self.relocate(output, install_name, &cwd).await
    }

    async fn relocate(&self, dylib: &Path, install_name: &str, cwd: &Path) -> Result<()> {
        let path = dylib.to_path_buf();
        let commands = tokio::task::spawn_blocking(move || read_load_commands(&path)).await??;
        let args = relocation_args(&commands, install_name);
        if args.is_empty() {
            return Ok(());
        }
        log::debug!("Relocating {}: {}", dylib.display(), args.join(" "));
        self.toolchain
            .xcrun("install_name_tool", cwd)
            .args(args)
            .arg(dylib)
            .run(self.observer)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_names_follow_bundle_layout() {
        let macos = PlatformGroup::new("iOS", "macOS").unwrap();
        let ios = PlatformGroup::new("iOS", "iOS").unwrap();
        assert_eq!(
            install_name("COpenLDAP", &macos),
            "@rpath/COpenLDAP.framework/Versions/A/COpenLDAP"
        );
        assert_eq!(
            install_name("COpenLDAP", &ios),
            "@rpath/COpenLDAP.framework/COpenLDAP"
        );
    }

    #[test]
    fn absolute_paths_become_relocatable() {
        let commands = LoadCommands {
            install_name: Some("/tmp/build/libCOpenLDAP.dylib".to_string()),
            libs: vec![
                "/usr/lib/libSystem.B.dylib".to_string(),
                "/usr/lib/libresolv.9.dylib".to_string(),
                "/tmp/deps/COpenSSL.framework/COpenSSL".to_string(),
                "@rpath/Other.framework/Other".to_string(),
            ],
            rpaths: vec!["/tmp/deps".to_string(), "@loader_path/Frameworks".to_string()],
        };
        let args = relocation_args(&commands, "@rpath/COpenLDAP.framework/COpenLDAP");
        assert_eq!(
            args,
            vec![
                "-id",
                "@rpath/COpenLDAP.framework/COpenLDAP",
                "-delete_rpath",
                "/tmp/deps",
                "-change",
                "/tmp/deps/COpenSSL.framework/COpenSSL",
                "@rpath/COpenSSL.framework/COpenSSL",
            ]
        );
    }

    #[test]
    fn framework_segment_survives_relocation() {
        assert_eq!(
            rpath_relative("/deps/macos-arm64/COpenSSL.framework/Versions/A/COpenSSL").as_deref(),
            Some("COpenSSL.framework/Versions/A/COpenSSL")
        );
        assert_eq!(
            rpath_relative("/opt/lib/libcrypto.3.dylib").as_deref(),
            Some("libcrypto.3.dylib")
        );
    }

    #[test]
    fn relocatable_image_needs_nothing() {
        let commands = LoadCommands {
            install_name: Some("@rpath/P.framework/P".to_string()),
            libs: vec!["/usr/lib/libSystem.B.dylib".to_string()],
            rpaths: vec![],
        };
        assert!(relocation_args(&commands, "@rpath/P.framework/P").is_empty());
    }
}
