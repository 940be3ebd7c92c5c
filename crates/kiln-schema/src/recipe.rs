//! TOML recipe definition parsing
//!
//! A recipe describes one installable package: where its source comes from,
//! which pinned auxiliary projects are built alongside it, how the primary
//! tree is installed, and what happens after installation.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::arch::{Condition, PlatformProfile};
use crate::hash::{GitRevision, Sha256Digest};
use crate::license::LicenseExpr;

/// Errors that can occur when loading or validating a recipe.
#[derive(Error, Debug)]
pub enum RecipeError {
    /// An I/O error occurred while reading a recipe file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML content could not be deserialized into a recipe.
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// The recipe parsed but is internally inconsistent.
    #[error("Invalid recipe: {0}")]
    Invalid(String),
}

/// Identity and provenance of the package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageInfo {
    /// Package name; also the cellar directory name.
    pub name: String,
    /// Version string of the archive source.
    pub version: String,
    /// Short human-readable summary.
    #[serde(default)]
    pub description: String,
    /// Project homepage.
    #[serde(default)]
    pub homepage: String,
    /// License expression.
    pub license: LicenseExpr,
}

/// The primary source archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    /// Download URL of the archive (`.tar.gz`).
    pub url: String,
    /// Expected SHA-256 of the archive.
    pub sha256: Sha256Digest,
}

/// Development branch used for `--head` installs and livecheck.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Head {
    /// Git URL.
    pub git: String,
    /// Branch to track.
    #[serde(default = "default_branch")]
    pub branch: String,
}

fn default_branch() -> String {
    "main".to_string()
}

/// Upstream version detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Livecheck {
    /// Regex applied to upstream tag names; capture group 1 is the version.
    pub regex: String,
}

/// How a bottle's files may be relocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellarKind {
    /// Bottle can be poured into any cellar after relocation.
    Any,
    /// Bottle contains no hard-coded paths at all.
    AnySkipRelocation,
}

/// A prebuilt binary for one platform tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bottle {
    /// SHA-256 of the bottle archive.
    pub sha256: Sha256Digest,
    /// Relocation requirements.
    pub cellar: CellarKind,
}

/// When a dependency is needed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    /// Only while building.
    Build,
    /// At run time (default).
    #[default]
    Runtime,
}

/// A declared dependency on another package or host tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dependency {
    /// Package name.
    pub name: String,
    /// Build-only or runtime.
    #[serde(default)]
    pub kind: DependencyKind,
    /// Executable that proves the dependency is present (defaults to `name`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provides: Option<String>,
    /// Platform guard.
    #[serde(default)]
    pub when: Condition,
}

impl Dependency {
    /// Executable name used to probe for this dependency.
    pub fn executable(&self) -> &str {
        self.provides.as_deref().unwrap_or(&self.name)
    }
}

/// A compiler the package is known not to build with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailsWith {
    /// Compiler family (`gcc`, `clang`).
    pub compiler: String,
    /// Major version that fails.
    pub version: String,
}

/// Where an auxiliary resource comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Locator {
    /// A git repository pinned to one commit.
    Git {
        /// Repository URL.
        git: String,
        /// Pinned commit.
        revision: GitRevision,
    },
    /// An archive verified by checksum.
    Archive {
        /// Download URL.
        url: String,
        /// Expected SHA-256.
        sha256: Sha256Digest,
    },
}

/// CMake invocation for one resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CmakeBuild {
    /// Directory containing the top-level `CMakeLists.txt`, relative to the
    /// resource root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_dir: Option<String>,
    /// CMake generator.
    #[serde(default = "default_generator")]
    pub generator: String,
    /// Install prefix, relative to the package's `libexec`.
    pub prefix: String,
    /// List-valued cache variables, joined with `;`
    /// (`LLVM_ENABLE_PROJECTS = ["clang", "lld"]`).
    #[serde(default)]
    pub lists: BTreeMap<String, Vec<String>>,
    /// Scalar cache variables (`LLVM_LINK_LLVM_DYLIB = "ON"`).
    #[serde(default)]
    pub defines: BTreeMap<String, String>,
    /// Pass `-DDEFAULT_SYSROOT=<sdk>` when a macOS SDK is found.
    #[serde(default)]
    pub default_sysroot: bool,
}

fn default_generator() -> String {
    "Unix Makefiles".to_string()
}

/// A pinned auxiliary project built next to the package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    /// Resource name (`llvm`, `binaryen`).
    pub name: String,
    /// Source locator.
    pub source: Locator,
    /// Build instructions; resources without one are only staged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmake: Option<CmakeBuild>,
}

/// A path removed from `libexec` after `npm install`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Removal {
    /// Path relative to `libexec`.
    pub path: String,
    /// Platform guard.
    #[serde(default)]
    pub when: Condition,
}

/// Node dependency installation in the primary tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NpmStep {
    /// Arguments passed to `npm`; the cache flag is appended by kiln.
    #[serde(default = "default_npm_args")]
    pub args: Vec<String>,
    /// Files and sub-packages to delete afterwards.
    #[serde(default)]
    pub remove: Vec<Removal>,
}

fn default_npm_args() -> Vec<String> {
    ["install", "-ddd", "--build-from-source"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// How launchers in `bin/` are generated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WrapperRules {
    /// Extensions whose files are dropped when an extension-less file with
    /// the same stem exists (`["py"]`).
    #[serde(default)]
    pub dedupe_extensions: Vec<String>,
    /// Export `PYTHON` pointing at the host interpreter.
    #[serde(default)]
    pub python: bool,
    /// Export an overridable `JAVA_HOME` on profiles that need a JVM.
    #[serde(default)]
    pub java_home: bool,
}

/// One config line rewritten after installation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigPatch {
    /// Config key at the start of the line (`LLVM_ROOT`).
    pub key: String,
    /// New value; `{libexec}`, `{prefix}` and `{bin}` are expanded.
    pub value: String,
}

/// First-run configuration of the installed tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostInstall {
    /// Config file relative to `libexec`; its presence marks the package as
    /// configured.
    pub config: String,
    /// Command that emits the default config; the first element names an
    /// installed launcher.
    pub generate: Vec<String>,
    /// Lines to rewrite.
    #[serde(default)]
    pub patch: Vec<ConfigPatch>,
}

/// End-to-end check of an installed package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmokeTest {
    /// Name of the input file written into the scratch directory.
    pub file: String,
    /// Contents of the input file.
    pub content: String,
    /// Compile command; the first element names an installed launcher.
    pub compile: Vec<String>,
    /// Run command; the first element is a host program.
    pub run: Vec<String>,
    /// Exact expected standard output (trailing newline ignored).
    pub expect_stdout: String,
    /// Variables set for both commands.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Variables removed for both commands.
    #[serde(default)]
    pub unset_env: Vec<String>,
}

/// Complete recipe definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    /// Package metadata.
    pub package: PackageInfo,
    /// Primary archive.
    pub source: Source,
    /// Development branch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head: Option<Head>,
    /// Upstream version detection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub livecheck: Option<Livecheck>,
    /// Prebuilt binaries keyed by platform tag.
    #[serde(default)]
    pub bottles: BTreeMap<String, Bottle>,
    /// Declared dependencies.
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    /// Known-bad compilers.
    #[serde(default)]
    pub fails_with: Vec<FailsWith>,
    /// Pinned auxiliary projects, built in declaration order.
    #[serde(default, rename = "resource")]
    pub resources: Vec<Resource>,
    /// Node dependency installation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub npm: Option<NpmStep>,
    /// Launcher generation.
    #[serde(default)]
    pub wrappers: WrapperRules,
    /// First-run configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_install: Option<PostInstall>,
    /// Smoke test.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<SmokeTest>,
}

impl Recipe {
    /// Parse and validate a recipe from a TOML file on disk.
    ///
    /// # Errors
    ///
    /// Returns `RecipeError::Io` if the file cannot be read, or a parse or
    /// validation error for bad content.
    pub fn from_file(path: &Path) -> Result<Self, RecipeError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate a recipe from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `RecipeError::Parse` for malformed TOML and
    /// `RecipeError::Invalid` if [`Recipe::validate`] rejects it.
    pub fn parse(content: &str) -> Result<Self, RecipeError> {
        let recipe: Self = toml::from_str(content)?;
        recipe.validate()?;
        Ok(recipe)
    }

    /// Check cross-field invariants that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns `RecipeError::Invalid` describing the first violation.
    pub fn validate(&self) -> Result<(), RecipeError> {
        let invalid = |msg: String| Err(RecipeError::Invalid(msg));

        if self.package.name.trim().is_empty() {
            return invalid("package.name is empty".to_string());
        }
        if self.package.name.contains(['/', '\\']) || self.package.name.starts_with('.') {
            return invalid(format!("package.name '{}' is not a plain name", self.package.name));
        }
        if self.package.version.trim().is_empty() {
            return invalid("package.version is empty".to_string());
        }
        if !self.source.url.starts_with("http") {
            return invalid(format!("source.url must be http(s): {}", self.source.url));
        }

        let mut names = HashSet::new();
        let mut prefixes: Vec<&str> = Vec::new();
        for resource in &self.resources {
            if !names.insert(resource.name.as_str()) {
                return invalid(format!("duplicate resource '{}'", resource.name));
            }
            let Some(cmake) = &resource.cmake else {
                continue;
            };
            let prefix = cmake.prefix.trim_matches('/');
            if prefix.is_empty() || prefix.split('/').any(|c| c == "..") {
                return invalid(format!(
                    "resource '{}' has an invalid prefix '{}'",
                    resource.name, cmake.prefix
                ));
            }
            // Prefixes must be disjoint: neither may contain the other.
            if let Some(other) = prefixes.iter().find(|other| {
                prefix == **other
                    || prefix.starts_with(&format!("{other}/"))
                    || other.starts_with(&format!("{prefix}/"))
            }) {
                return invalid(format!(
                    "resource '{}' prefix '{prefix}' overlaps '{other}'",
                    resource.name
                ));
            }
            prefixes.push(prefix);
        }

        if let Some(livecheck) = &self.livecheck {
            if let Err(e) = regex::Regex::new(&livecheck.regex) {
                return invalid(format!("livecheck.regex does not compile: {e}"));
            }
        }

        if let Some(post) = &self.post_install {
            if post.generate.is_empty() {
                return invalid("post_install.generate is empty".to_string());
            }
            if post.patch.iter().any(|p| p.key.trim().is_empty()) {
                return invalid("post_install.patch has an empty key".to_string());
            }
        }

        if let Some(test) = &self.test {
            if test.compile.is_empty() || test.run.is_empty() {
                return invalid("test.compile and test.run must not be empty".to_string());
            }
        }

        Ok(())
    }

    /// Dependencies that apply on `profile`.
    pub fn dependencies_for(&self, profile: PlatformProfile) -> Vec<&Dependency> {
        self.dependencies
            .iter()
            .filter(|d| d.when.matches(profile))
            .collect()
    }

    /// Bottles built for `profile`, keyed by tag.
    pub fn bottles_for(&self, profile: PlatformProfile) -> Vec<(&str, &Bottle)> {
        self.bottles
            .iter()
            .filter(|(tag, _)| profile.matches_bottle_tag(tag))
            .map(|(tag, bottle)| (tag.as_str(), bottle))
            .collect()
    }

    /// Look up a resource by name.
    pub fn resource(&self, name: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::{Arch, Os};

    const MINIMAL: &str = r#"
[package]
name = "hello"
version = "1.0.0"
license = "MIT"

[source]
url = "https://example.com/hello-1.0.0.tar.gz"
sha256 = "b14a19965ef7cd0324e07001ad8699276e42c1a2d2ee42c3a08b09df70f1683e"
"#;

    fn with(extra: &str) -> String {
        format!("{MINIMAL}\n{extra}")
    }

    #[test]
    fn test_parse_minimal() {
        let recipe = Recipe::parse(MINIMAL).unwrap();
        assert_eq!(recipe.package.name, "hello");
        assert!(recipe.resources.is_empty());
        assert!(recipe.npm.is_none());
        assert!(!recipe.wrappers.python);
    }

    #[test]
    fn test_parse_malformed_toml() {
        assert!(matches!(
            Recipe::parse("this is not valid toml {{{"),
            Err(RecipeError::Parse(_))
        ));
    }

    #[test]
    fn test_bad_checksum_rejected_at_load() {
        let bad = MINIMAL.replace(
            "b14a19965ef7cd0324e07001ad8699276e42c1a2d2ee42c3a08b09df70f1683e",
            "abc123",
        );
        assert!(matches!(Recipe::parse(&bad), Err(RecipeError::Parse(_))));
    }

    #[test]
    fn test_resources_and_conditions() {
        let recipe = Recipe::parse(&with(
            r#"
[[dependencies]]
name = "cmake"
kind = "build"

[[dependencies]]
name = "openjdk"
provides = "java"
when = { os = "linux" }

[[resource]]
name = "binaryen"
source = { git = "https://github.com/WebAssembly/binaryen.git", revision = "f124a11ca3a40c87ab6aa4498037449584689be9" }
cmake = { prefix = "binaryen" }

[[resource]]
name = "extra"
source = { url = "https://example.com/extra.tar.gz", sha256 = "b14a19965ef7cd0324e07001ad8699276e42c1a2d2ee42c3a08b09df70f1683e" }
"#,
        ))
        .unwrap();

        assert_eq!(recipe.resources.len(), 2);
        assert!(matches!(
            recipe.resource("binaryen").unwrap().source,
            Locator::Git { .. }
        ));
        assert!(matches!(
            recipe.resource("extra").unwrap().source,
            Locator::Archive { .. }
        ));
        let cmake = recipe.resource("binaryen").unwrap().cmake.as_ref().unwrap();
        assert_eq!(cmake.generator, "Unix Makefiles");

        let linux: Vec<_> = recipe
            .dependencies_for(PlatformProfile::new(Os::Linux, Arch::X86_64))
            .iter()
            .map(|d| d.executable())
            .collect();
        assert_eq!(linux, vec!["cmake", "java"]);
        assert_eq!(recipe.dependencies_for(PlatformProfile::MacosArm64).len(), 1);
    }

    #[test]
    fn test_duplicate_resource_rejected() {
        let err = Recipe::parse(&with(
            r#"
[[resource]]
name = "a"
source = { url = "https://example.com/a.tar.gz", sha256 = "b14a19965ef7cd0324e07001ad8699276e42c1a2d2ee42c3a08b09df70f1683e" }

[[resource]]
name = "a"
source = { url = "https://example.com/a.tar.gz", sha256 = "b14a19965ef7cd0324e07001ad8699276e42c1a2d2ee42c3a08b09df70f1683e" }
"#,
        ))
        .unwrap_err();
        assert!(err.to_string().contains("duplicate resource"));
    }

    #[test]
    fn test_overlapping_prefixes_rejected() {
        let err = Recipe::parse(&with(
            r#"
[[resource]]
name = "a"
source = { url = "https://example.com/a.tar.gz", sha256 = "b14a19965ef7cd0324e07001ad8699276e42c1a2d2ee42c3a08b09df70f1683e" }
cmake = { prefix = "llvm" }

[[resource]]
name = "b"
source = { url = "https://example.com/b.tar.gz", sha256 = "b14a19965ef7cd0324e07001ad8699276e42c1a2d2ee42c3a08b09df70f1683e" }
cmake = { prefix = "llvm/tools" }
"#,
        ))
        .unwrap_err();
        assert!(err.to_string().contains("overlaps"));
    }

    #[test]
    fn test_escaping_prefix_rejected() {
        let err = Recipe::parse(&with(
            r#"
[[resource]]
name = "a"
source = { url = "https://example.com/a.tar.gz", sha256 = "b14a19965ef7cd0324e07001ad8699276e42c1a2d2ee42c3a08b09df70f1683e" }
cmake = { prefix = "../outside" }
"#,
        ))
        .unwrap_err();
        assert!(err.to_string().contains("invalid prefix"));
    }

    #[test]
    fn test_bad_livecheck_regex_rejected() {
        let err = Recipe::parse(&with("[livecheck]\nregex = '^v?(\\d+'\n")).unwrap_err();
        assert!(matches!(err, RecipeError::Invalid(_)));
    }

    #[test]
    fn test_shipped_emscripten_recipe() {
        let recipe =
            Recipe::parse(include_str!("../../../recipes/emscripten.toml")).unwrap();

        assert_eq!(recipe.package.name, "emscripten");
        assert_eq!(
            recipe.package.license.to_string(),
            "Apache-2.0 AND Apache-2.0 WITH LLVM-exception AND (MIT OR NCSA)"
        );
        let names: Vec<_> = recipe.resources.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["llvm", "binaryen"]);

        let llvm = recipe.resource("llvm").unwrap().cmake.as_ref().unwrap();
        assert_eq!(llvm.source_dir.as_deref(), Some("llvm"));
        assert_eq!(llvm.lists["LLVM_ENABLE_PROJECTS"], vec!["clang", "lld"]);
        assert_eq!(llvm.defines["LLVM_LINK_LLVM_DYLIB"], "ON");

        let tags: Vec<_> = recipe
            .bottles_for(PlatformProfile::MacosArm64)
            .into_iter()
            .map(|(tag, _)| tag)
            .collect();
        assert_eq!(tags, vec!["arm64_big_sur", "arm64_monterey"]);
        assert_eq!(
            recipe.bottles_for(PlatformProfile::LinuxX86_64)[0].1.cellar,
            CellarKind::AnySkipRelocation
        );

        let livecheck = regex::Regex::new(&recipe.livecheck.as_ref().unwrap().regex).unwrap();
        assert!(livecheck.is_match("V3.1.11"));
        assert!(livecheck.is_match("3.1.11"));

        let test = recipe.test.as_ref().unwrap();
        assert_eq!(test.expect_stdout, "Hello World!");
        assert_eq!(test.env["NODE_OPTIONS"], "--no-experimental-fetch");
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.toml");
        std::fs::write(&path, MINIMAL).unwrap();
        assert_eq!(Recipe::from_file(&path).unwrap().package.version, "1.0.0");
        assert!(matches!(
            Recipe::from_file(&dir.path().join("missing.toml")),
            Err(RecipeError::Io(_))
        ));
    }
}
