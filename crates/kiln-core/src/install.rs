//! Primary install step: copy the source tree, install node modules, prune.

use std::path::{Path, PathBuf};

use kiln_schema::{NpmStep, PlatformProfile, Removal};

use crate::exec::{CommandRunner, Step, StepError};

/// Copy the whole extracted tree into `libexec`.
///
/// Existing files are overwritten so that resource prefixes created earlier
/// in `libexec` survive the copy.
///
/// # Errors
///
/// Returns an I/O error if the copy fails.
pub fn copy_tree(src: &Path, libexec: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(libexec)?;
    let options = fs_extra::dir::CopyOptions::new()
        .content_only(true)
        .overwrite(true);
    fs_extra::dir::copy(src, libexec, &options).map_err(std::io::Error::other)?;
    Ok(())
}

/// The `npm` invocation run inside `libexec`.
pub fn npm_step(spec: &NpmStep, libexec: &Path, npm_cache: &Path) -> Step {
    Step::new("npm")
        .args(&spec.args)
        .arg(format!("--cache={}", npm_cache.display()))
        .current_dir(libexec)
}

/// Run `npm` in `libexec`.
///
/// # Errors
///
/// A non-zero exit is fatal.
pub fn npm_install(
    runner: &dyn CommandRunner,
    spec: &NpmStep,
    libexec: &Path,
    npm_cache: &Path,
) -> Result<(), StepError> {
    std::fs::create_dir_all(npm_cache)?;
    runner.run(&npm_step(spec, libexec, npm_cache))
}

/// Delete the removals that apply to `profile`.
///
/// Paths that do not exist are skipped. Returns the paths actually removed.
///
/// # Errors
///
/// Returns an I/O error if an existing path cannot be removed.
pub fn prune(
    libexec: &Path,
    removals: &[Removal],
    profile: PlatformProfile,
) -> std::io::Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for removal in removals.iter().filter(|r| r.when.matches(profile)) {
        let path = libexec.join(&removal.path);
        let Ok(meta) = std::fs::symlink_metadata(&path) else {
            tracing::debug!(path = %path.display(), "nothing to remove");
            continue;
        };
        if meta.is_dir() {
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
        tracing::debug!(path = %path.display(), "removed");
        removed.push(path);
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingRunner;
    use kiln_schema::{Arch, Condition, Os};
    use std::fs;
    use tempfile::tempdir;

    fn removals() -> Vec<Removal> {
        vec![
            Removal {
                path: "node_modules/ws/builderror.log".to_string(),
                when: Condition::default(),
            },
            Removal {
                path: "node_modules/google-closure-compiler-linux".to_string(),
                when: Condition {
                    os: Some(Os::Linux),
                    arch: None,
                },
            },
            Removal {
                path: "node_modules/google-closure-compiler-osx".to_string(),
                when: Condition {
                    os: Some(Os::Macos),
                    arch: Some(Arch::Arm64),
                },
            },
        ]
    }

    fn populate(libexec: &Path) {
        fs::create_dir_all(libexec.join("node_modules/ws")).unwrap();
        fs::write(libexec.join("node_modules/ws/builderror.log"), "x").unwrap();
        for sub in ["google-closure-compiler-linux", "google-closure-compiler-osx"] {
            let dir = libexec.join("node_modules").join(sub);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("compiler"), "bin").unwrap();
        }
    }

    #[test]
    fn pruning_follows_profile() {
        let cases = [
            (PlatformProfile::LinuxX86_64, false, true),
            (PlatformProfile::LinuxArm64, false, true),
            (PlatformProfile::MacosArm64, true, false),
            (PlatformProfile::MacosX86_64, true, true),
        ];
        for (profile, linux_kept, osx_kept) in cases {
            let dir = tempdir().unwrap();
            populate(dir.path());

            prune(dir.path(), &removals(), profile).unwrap();

            let modules = dir.path().join("node_modules");
            assert!(!modules.join("ws/builderror.log").exists(), "{profile}");
            assert_eq!(
                modules.join("google-closure-compiler-linux").exists(),
                linux_kept,
                "{profile}"
            );
            assert_eq!(
                modules.join("google-closure-compiler-osx").exists(),
                osx_kept,
                "{profile}"
            );
        }
    }

    #[test]
    fn missing_paths_are_not_errors() {
        let dir = tempdir().unwrap();
        let removed = prune(dir.path(), &removals(), PlatformProfile::LinuxX86_64).unwrap();
        assert!(removed.is_empty());
    }

    #[test]
    fn copy_keeps_existing_prefixes() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let libexec = dir.path().join("libexec");
        fs::create_dir_all(src.join("tools")).unwrap();
        fs::write(src.join("emcc.py"), "print()").unwrap();
        fs::write(src.join("tools/shared.py"), "").unwrap();
        fs::create_dir_all(libexec.join("llvm/bin")).unwrap();

        copy_tree(&src, &libexec).unwrap();

        assert!(libexec.join("emcc.py").is_file());
        assert!(libexec.join("tools/shared.py").is_file());
        assert!(libexec.join("llvm/bin").is_dir());
    }

    #[test]
    fn npm_runs_in_libexec_with_cache() {
        let dir = tempdir().unwrap();
        let spec = NpmStep {
            args: vec![
                "install".to_string(),
                "-ddd".to_string(),
                "--build-from-source".to_string(),
            ],
            remove: Vec::new(),
        };
        let cache = dir.path().join("npm_cache");
        let step = npm_step(&spec, dir.path(), &cache);
        assert_eq!(step.cwd(), Some(dir.path()));

        let runner = RecordingRunner::new();
        npm_install(&runner, &spec, dir.path(), &cache).unwrap();
        assert_eq!(
            runner.steps(),
            vec![format!(
                "npm install -ddd --build-from-source --cache={}",
                cache.display()
            )]
        );
        assert!(cache.is_dir());
    }
}
