//! Generic CMake build step for pinned resources.
//!
//! Each resource is built out of tree in three phases, every one of them
//! fatal on failure:
//!
//! | Phase | Command |
//! |---|---|
//! | configure | `cmake -S <src>/<source_dir> -B <build> -G <generator> <std args> <defines>` |
//! | build | `cmake --build <build> --parallel <jobs>` |
//! | install | `cmake --install <build>` |
//!
//! Standard arguments mirror what a package manager passes to every CMake
//! project: a Release build, the resource's own install prefix, frameworks
//! searched last, verbose makefiles, and tests disabled.

use std::path::{Path, PathBuf};

use kiln_schema::CmakeBuild;

use crate::exec::{CommandRunner, Step, StepError};

/// A resolved CMake build of one resource.
#[derive(Debug, Clone)]
pub struct CmakeStep<'a> {
    pub name: &'a str,
    pub spec: &'a CmakeBuild,
    /// Root of the fetched resource.
    pub source_root: &'a Path,
    /// Out-of-tree build directory.
    pub build_dir: &'a Path,
    /// Install prefix (inside the package's `libexec`).
    pub install_prefix: &'a Path,
    pub jobs: usize,
    /// macOS SDK path, passed as `DEFAULT_SYSROOT` when the resource asks for it.
    pub sdk_path: Option<&'a Path>,
}

impl CmakeStep<'_> {
    /// Directory holding the top-level `CMakeLists.txt`.
    pub fn source_dir(&self) -> PathBuf {
        match &self.spec.source_dir {
            Some(sub) => self.source_root.join(sub),
            None => self.source_root.to_path_buf(),
        }
    }

    /// Arguments every CMake project receives.
    pub fn std_args(&self) -> Vec<String> {
        vec![
            format!("-DCMAKE_INSTALL_PREFIX={}", self.install_prefix.display()),
            "-DCMAKE_INSTALL_LIBDIR=lib".to_string(),
            "-DCMAKE_BUILD_TYPE=Release".to_string(),
            "-DCMAKE_FIND_FRAMEWORK=LAST".to_string(),
            "-DCMAKE_VERBOSE_MAKEFILE=ON".to_string(),
            "-DBUILD_TESTING=OFF".to_string(),
            "-Wno-dev".to_string(),
        ]
    }

    /// Recipe-specific cache variables, list values joined with `;`.
    pub fn define_args(&self) -> Vec<String> {
        let mut args: Vec<String> = self
            .spec
            .lists
            .iter()
            .map(|(key, values)| format!("-D{key}={}", values.join(";")))
            .collect();
        args.extend(
            self.spec
                .defines
                .iter()
                .map(|(key, value)| format!("-D{key}={value}")),
        );
        if self.spec.default_sysroot {
            if let Some(sdk) = self.sdk_path {
                args.push(format!("-DDEFAULT_SYSROOT={}", sdk.display()));
            }
        }
        args
    }

    /// The three phases, in order.
    pub fn steps(&self) -> [Step; 3] {
        let configure = Step::new("cmake")
            .arg("-S")
            .arg(self.source_dir())
            .arg("-B")
            .arg(self.build_dir)
            .args(["-G", self.spec.generator.as_str()])
            .args(self.std_args())
            .args(self.define_args());

        let build = Step::new("cmake")
            .arg("--build")
            .arg(self.build_dir)
            .arg("--parallel")
            .arg(self.jobs.max(1).to_string());

        let install = Step::new("cmake").arg("--install").arg(self.build_dir);

        [configure, build, install]
    }

    /// Configure, build, and install.
    ///
    /// # Errors
    ///
    /// Returns the first failing phase's error; later phases do not run.
    pub fn run(&self, runner: &dyn CommandRunner) -> Result<(), StepError> {
        std::fs::create_dir_all(self.build_dir)?;
        std::fs::create_dir_all(self.install_prefix)?;

        for step in self.steps() {
            runner.run(&step)?;
        }
        tracing::info!(resource = self.name, prefix = %self.install_prefix.display(), "installed");
        Ok(())
    }
}

/// Ask `xcrun` for the active macOS SDK.
///
/// Returns `None` when `xcrun` is unavailable or prints nothing; a missing
/// SDK only drops the `DEFAULT_SYSROOT` hint.
pub fn macos_sdk_path(runner: &dyn CommandRunner) -> Option<PathBuf> {
    match runner.output(&Step::new("xcrun").arg("--show-sdk-path")) {
        Ok(out) => {
            let trimmed = out.trim();
            (!trimmed.is_empty()).then(|| PathBuf::from(trimmed))
        }
        Err(e) => {
            tracing::warn!("could not determine macOS SDK path: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingRunner;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn llvm_spec() -> CmakeBuild {
        let mut lists = BTreeMap::new();
        lists.insert(
            "LLVM_ENABLE_PROJECTS".to_string(),
            vec!["clang".to_string(), "lld".to_string()],
        );
        lists.insert(
            "LLVM_TARGETS_TO_BUILD".to_string(),
            vec!["host".to_string(), "WebAssembly".to_string()],
        );
        let mut defines = BTreeMap::new();
        defines.insert("LLVM_LINK_LLVM_DYLIB".to_string(), "ON".to_string());
        CmakeBuild {
            source_dir: Some("llvm".to_string()),
            generator: "Unix Makefiles".to_string(),
            prefix: "llvm".to_string(),
            lists,
            defines,
            default_sysroot: true,
        }
    }

    #[test]
    fn define_args_join_lists_and_add_sysroot() {
        let spec = llvm_spec();
        let step = CmakeStep {
            name: "llvm",
            spec: &spec,
            source_root: Path::new("/src/llvm-project"),
            build_dir: Path::new("/tmp/build"),
            install_prefix: Path::new("/p/libexec/llvm"),
            jobs: 8,
            sdk_path: Some(Path::new("/SDKs/MacOSX.sdk")),
        };

        assert_eq!(step.source_dir(), PathBuf::from("/src/llvm-project/llvm"));
        assert_eq!(
            step.define_args(),
            vec![
                "-DLLVM_ENABLE_PROJECTS=clang;lld",
                "-DLLVM_TARGETS_TO_BUILD=host;WebAssembly",
                "-DLLVM_LINK_LLVM_DYLIB=ON",
                "-DDEFAULT_SYSROOT=/SDKs/MacOSX.sdk",
            ]
        );
        assert!(
            step.std_args()
                .contains(&"-DCMAKE_INSTALL_PREFIX=/p/libexec/llvm".to_string())
        );
    }

    #[test]
    fn sysroot_omitted_without_sdk() {
        let spec = llvm_spec();
        let step = CmakeStep {
            name: "llvm",
            spec: &spec,
            source_root: Path::new("/src"),
            build_dir: Path::new("/b"),
            install_prefix: Path::new("/p"),
            jobs: 1,
            sdk_path: None,
        };
        assert!(
            !step
                .define_args()
                .iter()
                .any(|a| a.starts_with("-DDEFAULT_SYSROOT"))
        );
    }

    #[test]
    fn runs_three_phases_in_order() {
        let dir = tempdir().unwrap();
        let spec = CmakeBuild {
            source_dir: None,
            generator: "Ninja".to_string(),
            prefix: "binaryen".to_string(),
            lists: BTreeMap::new(),
            defines: BTreeMap::new(),
            default_sysroot: false,
        };
        let build_dir = dir.path().join("build");
        let prefix = dir.path().join("prefix");
        let step = CmakeStep {
            name: "binaryen",
            spec: &spec,
            source_root: dir.path(),
            build_dir: &build_dir,
            install_prefix: &prefix,
            jobs: 4,
            sdk_path: None,
        };
        let runner = RecordingRunner::new();

        step.run(&runner).unwrap();

        let steps = runner.steps();
        assert_eq!(steps.len(), 3);
        assert!(steps[0].starts_with("cmake -S"));
        assert!(steps[0].contains("-G Ninja"));
        assert!(steps[1].ends_with("--parallel 4"));
        assert!(steps[2].starts_with("cmake --install"));
        assert!(prefix.is_dir());
    }

    #[test]
    fn failed_configure_stops_build() {
        let dir = tempdir().unwrap();
        let spec = llvm_spec();
        let build_dir = dir.path().join("build");
        let step = CmakeStep {
            name: "llvm",
            spec: &spec,
            source_root: dir.path(),
            build_dir: &build_dir,
            install_prefix: &dir.path().join("prefix"),
            jobs: 2,
            sdk_path: None,
        };
        let runner = RecordingRunner::new().failing_on("cmake -S");

        assert!(step.run(&runner).is_err());
        assert_eq!(runner.steps().len(), 1);
    }

    #[test]
    fn sdk_path_from_xcrun() {
        let runner = RecordingRunner::new().with_output("xcrun", "/SDKs/MacOSX12.sdk\n");
        assert_eq!(
            macos_sdk_path(&runner),
            Some(PathBuf::from("/SDKs/MacOSX12.sdk"))
        );
        let failing = RecordingRunner::new().failing_on("xcrun");
        assert_eq!(macos_sdk_path(&failing), None);
    }
}
