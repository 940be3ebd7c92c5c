//! Launcher scripts in `bin/`.
//!
//! Each top-level executable of the source tree gets a tiny bash wrapper that
//! pins the interpreter (`PYTHON`) and, on profiles that need a JVM, a
//! default `JAVA_HOME` the caller may still override.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use kiln_schema::{PlatformProfile, WrapperRules};

/// Environment baked into every launcher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WrapperEnv {
    pub python: Option<PathBuf>,
    pub java_home: Option<PathBuf>,
}

impl WrapperEnv {
    /// Apply the recipe's rules to the discovered toolchain.
    ///
    /// `JAVA_HOME` is kept only when the recipe asks for it and the profile
    /// actually needs a Java runtime.
    pub fn resolve(
        rules: &WrapperRules,
        profile: PlatformProfile,
        python: Option<&Path>,
        java_home: Option<&Path>,
    ) -> Self {
        Self {
            python: python.filter(|_| rules.python).map(Path::to_path_buf),
            java_home: java_home
                .filter(|_| rules.java_home && profile.needs_java_home())
                .map(Path::to_path_buf),
        }
    }
}

/// Top-level regular executable files of `dir`, sorted and unique.
///
/// A file `<base>.<ext>` is dropped when `<ext>` is listed in
/// `dedupe_extensions` and `<base>` also exists in `dir`, executable or not.
///
/// # Errors
///
/// Returns an I/O error if `dir` cannot be read.
pub fn discover_entry_points(
    dir: &Path,
    dedupe_extensions: &[String],
) -> std::io::Result<Vec<String>> {
    let mut names = BTreeSet::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        if meta.is_file() && is_executable(&meta) {
            names.insert(entry.file_name().to_string_lossy().into_owned());
        }
    }

    let duplicates: Vec<String> = names
        .iter()
        .filter(|name| {
            Path::new(name.as_str())
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| dedupe_extensions.iter().any(|d| d == ext))
        })
        .filter(|name| {
            Path::new(name.as_str())
                .file_stem()
                .and_then(|stem| stem.to_str())
                .is_some_and(|stem| dir.join(stem).exists())
        })
        .cloned()
        .collect();
    for name in &duplicates {
        names.remove(name);
    }

    Ok(names.into_iter().collect())
}

#[cfg(unix)]
fn is_executable(meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &fs::Metadata) -> bool {
    true
}

/// Text of the launcher for `name`.
pub fn render_launcher(name: &str, libexec: &Path, env: &WrapperEnv) -> String {
    let mut line = String::new();
    if let Some(python) = &env.python {
        line.push_str(&format!("PYTHON=\"{}\" ", python.display()));
    }
    if let Some(java_home) = &env.java_home {
        line.push_str(&format!(
            "JAVA_HOME=\"${{JAVA_HOME:-{}}}\" ",
            java_home.display()
        ));
    }
    line.push_str(&format!(
        "exec \"{}\" \"$@\"",
        libexec.join(name).display()
    ));
    format!("#!/bin/bash\n{line}\n")
}

/// Write one launcher per entry point into `bin`, mode 0755.
///
/// # Errors
///
/// Any filesystem error is fatal.
pub fn write_launchers(
    bin: &Path,
    libexec: &Path,
    names: &[String],
    env: &WrapperEnv,
) -> std::io::Result<Vec<PathBuf>> {
    fs::create_dir_all(bin)?;
    let mut written = Vec::with_capacity(names.len());
    for name in names {
        let path = bin.join(name);
        fs::write(&path, render_launcher(name, libexec, env))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
        }
        written.push(path);
    }
    Ok(written)
}

/// Symlink launchers into the public `bin` directory, replacing stale links.
///
/// # Errors
///
/// Returns an I/O error if a link cannot be created.
pub fn link_launchers(public_bin: &Path, launchers: &[PathBuf]) -> std::io::Result<Vec<PathBuf>> {
    fs::create_dir_all(public_bin)?;
    let mut linked = Vec::with_capacity(launchers.len());
    for launcher in launchers {
        let Some(name) = launcher.file_name() else {
            continue;
        };
        let target = public_bin.join(name);
        if target.exists() || target.is_symlink() {
            fs::remove_file(&target)?;
        }

        #[cfg(unix)]
        std::os::unix::fs::symlink(launcher, &target)?;
        #[cfg(not(unix))]
        fs::copy(launcher, &target)?;

        linked.push(target);
    }
    Ok(linked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[cfg(unix)]
    fn touch(dir: &Path, name: &str, mode: u32) {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        fs::write(&path, "#!/usr/bin/env python3\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn entry_points_drop_py_duplicates() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "emcc", 0o755);
        touch(dir.path(), "emcc.py", 0o755);
        touch(dir.path(), "em++", 0o755);
        touch(dir.path(), "emrun.py", 0o755);
        touch(dir.path(), "README.md", 0o644);
        fs::create_dir(dir.path().join("tools")).unwrap();

        let names = discover_entry_points(dir.path(), &["py".to_string()]).unwrap();
        assert_eq!(names, vec!["em++", "emcc", "emrun.py"]);
    }

    #[cfg(unix)]
    #[test]
    fn entry_points_are_deterministic() {
        let dir = tempdir().unwrap();
        for name in ["b", "a", "c.py", "c"] {
            touch(dir.path(), name, 0o755);
        }
        let first = discover_entry_points(dir.path(), &["py".to_string()]).unwrap();
        let second = discover_entry_points(dir.path(), &["py".to_string()]).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, vec!["a", "b", "c"]);
    }

    #[cfg(unix)]
    #[test]
    fn py_duplicate_dropped_when_base_is_not_executable() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "emsize", 0o644);
        touch(dir.path(), "emsize.py", 0o755);
        touch(dir.path(), "emstrip.py", 0o755);

        let names = discover_entry_points(dir.path(), &["py".to_string()]).unwrap();
        assert_eq!(names, vec!["emstrip.py"]);
    }

    #[cfg(unix)]
    #[test]
    fn no_dedupe_without_rule() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "emcc", 0o755);
        touch(dir.path(), "emcc.py", 0o755);
        let names = discover_entry_points(dir.path(), &[]).unwrap();
        assert_eq!(names, vec!["emcc", "emcc.py"]);
    }

    #[test]
    fn launcher_with_java_home() {
        let env = WrapperEnv {
            python: Some(PathBuf::from("/usr/bin/python3")),
            java_home: Some(PathBuf::from("/opt/jdk")),
        };
        assert_eq!(
            render_launcher("emcc", Path::new("/p/libexec"), &env),
            "#!/bin/bash\nPYTHON=\"/usr/bin/python3\" JAVA_HOME=\"${JAVA_HOME:-/opt/jdk}\" exec \"/p/libexec/emcc\" \"$@\"\n"
        );
    }

    #[test]
    fn launcher_without_java_home() {
        let env = WrapperEnv {
            python: Some(PathBuf::from("/usr/bin/python3")),
            java_home: None,
        };
        assert_eq!(
            render_launcher("emcc", Path::new("/p/libexec"), &env),
            "#!/bin/bash\nPYTHON=\"/usr/bin/python3\" exec \"/p/libexec/emcc\" \"$@\"\n"
        );
    }

    #[test]
    fn java_home_follows_profile() {
        let rules = WrapperRules {
            dedupe_extensions: vec!["py".to_string()],
            python: true,
            java_home: true,
        };
        let py = Path::new("/usr/bin/python3");
        let jdk = Path::new("/opt/jdk");

        let intel = WrapperEnv::resolve(&rules, PlatformProfile::MacosX86_64, Some(py), Some(jdk));
        assert_eq!(intel.java_home, None);
        assert_eq!(intel.python.as_deref(), Some(py));

        for profile in [
            PlatformProfile::MacosArm64,
            PlatformProfile::LinuxX86_64,
            PlatformProfile::LinuxArm64,
        ] {
            let env = WrapperEnv::resolve(&rules, profile, Some(py), Some(jdk));
            assert_eq!(env.java_home.as_deref(), Some(jdk), "{profile}");
        }
    }

    #[cfg(unix)]
    #[test]
    fn writes_executable_launchers_and_links() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let bin = dir.path().join("prefix/bin");
        let public = dir.path().join("home/bin");
        let names = vec!["emcc".to_string(), "emar".to_string()];

        let written = write_launchers(
            &bin,
            &dir.path().join("prefix/libexec"),
            &names,
            &WrapperEnv::default(),
        )
        .unwrap();
        assert_eq!(written.len(), 2);
        let mode = fs::metadata(bin.join("emcc")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);

        // Linking twice replaces the old links.
        link_launchers(&public, &written).unwrap();
        let linked = link_launchers(&public, &written).unwrap();
        assert_eq!(linked.len(), 2);
        assert_eq!(fs::read_link(public.join("emcc")).unwrap(), bin.join("emcc"));
    }
}
