use dirs::home_dir;
use std::path::{Path, PathBuf};

/// Returns the kiln home directory, or None if the user's home cannot be resolved.
pub fn try_kiln_home() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("KILN_HOME") {
        return Some(PathBuf::from(val));
    }
    home_dir().map(|h| h.join(".kiln"))
}

/// Root of all kiln state.
///
/// ```text
/// ~/.kiln/
/// ├── bin/          # Symlinks to installed launchers
/// ├── cellar/       # <name>/<version> install prefixes
/// ├── cache/        # Downloaded archives and the npm cache
/// ├── logs/         # Build logs
/// ├── tmp/          # Staging directories
/// └── config.toml   # Optional settings
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KilnHome {
    root: PathBuf,
}

impl KilnHome {
    /// Use an explicit root directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve from `KILN_HOME`, falling back to `~/.kiln`.
    pub fn from_env() -> Option<Self> {
        try_kiln_home().map(Self::new)
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Install prefixes: `<home>/cellar`
    pub fn cellar(&self) -> PathBuf {
        self.root.join("cellar")
    }

    /// Public launcher links: `<home>/bin`
    pub fn bin(&self) -> PathBuf {
        self.root.join("bin")
    }

    /// Download cache: `<home>/cache`
    pub fn cache(&self) -> PathBuf {
        self.root.join("cache")
    }

    /// Shared npm cache: `<home>/cache/npm_cache`
    pub fn npm_cache(&self) -> PathBuf {
        self.cache().join("npm_cache")
    }

    /// Logs directory: `<home>/logs`
    pub fn logs(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Temp path: `<home>/tmp` (same volume as the cellar, so renames are cheap)
    pub fn tmp(&self) -> PathBuf {
        self.root.join("tmp")
    }

    /// Settings file: `<home>/config.toml`
    pub fn settings_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    /// Generate a build log path for a package
    pub fn build_log_path(&self, package: &str, version: &str) -> PathBuf {
        let timestamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
        self.logs()
            .join(format!("build-{package}-{version}-{timestamp}.log"))
    }

    /// Cache location for a downloaded archive, keyed by its expected hash
    /// so that two versions with the same file name never collide.
    pub fn cached_download(&self, url: &str, sha256: &str) -> PathBuf {
        let short = &sha256[..sha256.len().min(16)];
        self.cache()
            .join(format!("{short}--{}", filename_from_url(url)))
    }
}

/// Extract the filename from a URL.
pub fn filename_from_url(url: &str) -> &str {
    url.split('/').next_back().unwrap_or("")
}
