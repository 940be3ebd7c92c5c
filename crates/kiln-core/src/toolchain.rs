//! Host toolchain discovery and preflight checks.
//!
//! Dependencies are never installed; they are looked up on `PATH`. A missing
//! build dependency or driver tool stops the install before anything is
//! fetched, a missing runtime dependency only warns.

use std::path::{Path, PathBuf};

use kiln_schema::{DependencyKind, Locator, PlatformProfile, Recipe};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolchainError {
    #[error("'{tool}' is required ({needed_by}) but was not found on PATH")]
    MissingTool { tool: String, needed_by: String },

    #[error("A Java runtime is required on {profile}; set JAVA_HOME or KILN_JAVA_HOME")]
    MissingJava { profile: PlatformProfile },
}

/// Interpreter and runtime paths baked into launchers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub python: PathBuf,
    pub java_home: Option<PathBuf>,
}

/// Resolve `python3`: an explicit path wins, else `PATH`.
///
/// # Errors
///
/// Returns [`ToolchainError::MissingTool`] when nothing is found.
pub fn find_python(configured: Option<&Path>) -> Result<PathBuf, ToolchainError> {
    if let Some(path) = configured {
        return Ok(path.to_path_buf());
    }
    which::which("python3").map_err(|_| ToolchainError::MissingTool {
        tool: "python3".to_string(),
        needed_by: "launchers".to_string(),
    })
}

/// Resolve a Java home: explicit path, then `$JAVA_HOME`, then the
/// directory two levels above the `java` binary on `PATH`.
pub fn find_java_home(configured: Option<&Path>, env_java_home: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = configured.or(env_java_home) {
        return Some(path.to_path_buf());
    }
    let java = which::which("java").ok()?;
    let java = std::fs::canonicalize(&java).unwrap_or(java);
    java_home_from_binary(&java)
}

/// `<home>/bin/java` -> `<home>`
fn java_home_from_binary(java: &Path) -> Option<PathBuf> {
    java.parent()?.parent().map(Path::to_path_buf)
}

impl Toolchain {
    /// Discover the toolchain for `profile`.
    ///
    /// # Errors
    ///
    /// Fails when python is missing, or when the profile needs a Java runtime
    /// and none can be found.
    pub fn discover(
        profile: PlatformProfile,
        needs_java: bool,
        python: Option<&Path>,
        java_home: Option<&Path>,
    ) -> Result<Self, ToolchainError> {
        let python = find_python(python)?;
        let env_java_home = std::env::var_os("JAVA_HOME").map(PathBuf::from);
        let java_home = if needs_java && profile.needs_java_home() {
            let found = find_java_home(java_home, env_java_home.as_deref())
                .ok_or(ToolchainError::MissingJava { profile })?;
            Some(found)
        } else {
            None
        };
        tracing::debug!(python = %python.display(), java_home = ?java_home, "toolchain");
        Ok(Self { python, java_home })
    }
}

/// Result of a successful preflight.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preflight {
    /// Runtime dependencies not found on `PATH`.
    pub missing_runtime: Vec<String>,
}

/// Check that every tool the install will drive is available.
///
/// # Errors
///
/// Returns the first missing driver tool or build dependency.
pub fn preflight(
    recipe: &Recipe,
    profile: PlatformProfile,
    head: bool,
) -> Result<Preflight, ToolchainError> {
    preflight_with(recipe, profile, head, |tool| which::which(tool).is_ok())
}

/// [`preflight`] with an injectable `PATH` lookup.
///
/// # Errors
///
/// See [`preflight`].
pub fn preflight_with(
    recipe: &Recipe,
    profile: PlatformProfile,
    head: bool,
    available: impl Fn(&str) -> bool,
) -> Result<Preflight, ToolchainError> {
    let mut required: Vec<(&str, &str)> = Vec::new();
    let uses_git = head
        || recipe
            .resources
            .iter()
            .any(|r| matches!(r.source, Locator::Git { .. }));
    if uses_git {
        required.push(("git", "resource acquisition"));
    }
    if recipe.resources.iter().any(|r| r.cmake.is_some()) {
        required.push(("cmake", "resource builds"));
    }
    if recipe.npm.is_some() {
        required.push(("npm", "node dependencies"));
    }

    for (tool, needed_by) in required {
        if !available(tool) {
            return Err(ToolchainError::MissingTool {
                tool: tool.to_string(),
                needed_by: needed_by.to_string(),
            });
        }
    }

    let mut report = Preflight::default();
    for dep in recipe.dependencies_for(profile) {
        let exe = dep.executable();
        if available(exe) {
            continue;
        }
        match dep.kind {
            DependencyKind::Build => {
                return Err(ToolchainError::MissingTool {
                    tool: exe.to_string(),
                    needed_by: format!("build dependency {}", dep.name),
                });
            }
            DependencyKind::Runtime => {
                tracing::warn!(dependency = %dep.name, executable = exe, "runtime dependency not found");
                report.missing_runtime.push(dep.name.clone());
            }
        }
    }
    Ok(report)
}
