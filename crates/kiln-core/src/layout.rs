//! Destination paths of an installed package.

use std::path::{Path, PathBuf};

use crate::paths::KilnHome;

/// Where one package version lives on disk.
///
/// ```text
/// <home>/cellar/<name>/<version>/
/// ├── bin/       # generated launchers
/// └── libexec/   # verbatim source tree + per-resource prefixes
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledLayout {
    pub prefix: PathBuf,
    pub libexec: PathBuf,
    pub bin: PathBuf,
}

impl InstalledLayout {
    pub fn new(home: &KilnHome, name: &str, version: &str) -> Self {
        Self::at(home.cellar().join(name).join(version))
    }

    /// Layout rooted at an explicit prefix.
    pub fn at(prefix: impl Into<PathBuf>) -> Self {
        let prefix = prefix.into();
        Self {
            libexec: prefix.join("libexec"),
            bin: prefix.join("bin"),
            prefix,
        }
    }

    /// Install prefix for a resource (relative to `libexec`).
    pub fn resource_prefix(&self, relative: &str) -> PathBuf {
        self.libexec.join(relative.trim_matches('/'))
    }

    /// Path of an installed launcher.
    pub fn launcher(&self, name: &str) -> PathBuf {
        self.bin.join(name)
    }

    pub fn is_installed(&self) -> bool {
        self.prefix.exists()
    }

    /// Total size of regular files under the prefix, in bytes.
    pub fn disk_usage(&self) -> u64 {
        walkdir::WalkDir::new(&self.prefix)
            .into_iter()
            .flatten()
            .filter_map(|e| e.metadata().ok())
            .filter(std::fs::Metadata::is_file)
            .map(|m| m.len())
            .sum()
    }

    /// Expand `{prefix}`, `{libexec}` and `{bin}` in a recipe value.
    pub fn expand(&self, template: &str) -> String {
        template
            .replace("{prefix}", &display(&self.prefix))
            .replace("{libexec}", &display(&self.libexec))
            .replace("{bin}", &display(&self.bin))
    }
}

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cellar_layout() {
        let home = KilnHome::new("/k");
        let layout = InstalledLayout::new(&home, "emscripten", "3.1.10");
        assert_eq!(layout.prefix, PathBuf::from("/k/cellar/emscripten/3.1.10"));
        assert_eq!(
            layout.resource_prefix("llvm/"),
            PathBuf::from("/k/cellar/emscripten/3.1.10/libexec/llvm")
        );
        assert_eq!(
            layout.launcher("emcc"),
            PathBuf::from("/k/cellar/emscripten/3.1.10/bin/emcc")
        );
    }

    #[test]
    fn disk_usage_counts_files() {
        let dir = tempfile::tempdir().unwrap();
        let layout = InstalledLayout::at(dir.path().join("p"));
        assert_eq!(layout.disk_usage(), 0);

        std::fs::create_dir_all(layout.libexec.join("llvm")).unwrap();
        std::fs::write(layout.libexec.join("llvm/clang"), "12345").unwrap();
        std::fs::write(layout.libexec.join("emcc"), "123").unwrap();
        assert_eq!(layout.disk_usage(), 8);
    }

    #[test]
    fn expands_placeholders() {
        let layout = InstalledLayout::at("/p");
        assert_eq!(layout.expand("{libexec}/llvm/bin"), "/p/libexec/llvm/bin");
        assert_eq!(layout.expand("{bin}:{prefix}"), "/p/bin:/p");
        assert_eq!(layout.expand("plain"), "plain");
    }
}
