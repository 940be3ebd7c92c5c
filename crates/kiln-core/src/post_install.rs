//! First-run configuration of an installed package.
//!
//! The config file doubles as the state marker: when it exists the package
//! is configured and nothing happens. Otherwise the installed tool writes its
//! default config and selected lines are rewritten to point into the prefix.

use std::path::{Path, PathBuf};

use kiln_schema::{ConfigPatch, PostInstall};
use regex::Regex;

use crate::exec::{CommandRunner, Step, StepError};
use crate::layout::InstalledLayout;

/// What [`configure`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostInstallOutcome {
    /// The marker file already existed.
    AlreadyConfigured,
    /// A config was generated and patched.
    Configured {
        /// Keys whose line was rewritten.
        patched: Vec<String>,
        /// Keys with no matching line.
        missed: Vec<String>,
    },
}

/// Path of the marker/config file.
pub fn config_path(spec: &PostInstall, layout: &InstalledLayout) -> PathBuf {
    layout.libexec.join(&spec.config)
}

/// Run the post-install step for an installed layout.
///
/// # Errors
///
/// Fails if the generate command fails or the config cannot be read or
/// written. A patch key without a matching line is not an error.
pub fn configure(
    runner: &dyn CommandRunner,
    spec: &PostInstall,
    layout: &InstalledLayout,
) -> Result<PostInstallOutcome, StepError> {
    let config = config_path(spec, layout);
    if config.exists() {
        tracing::debug!(config = %config.display(), "already configured");
        return Ok(PostInstallOutcome::AlreadyConfigured);
    }

    runner.run(&generate_step(spec, layout))?;

    let rules = expand_rules(&spec.patch, layout);
    let (patched, missed) = patch_file(&config, &rules)?;
    Ok(PostInstallOutcome::Configured { patched, missed })
}

/// The generate command, resolved against the installed launchers.
fn generate_step(spec: &PostInstall, layout: &InstalledLayout) -> Step {
    let (program, args) = spec
        .generate
        .split_first()
        .map_or(("", &[][..]), |(p, a)| (p.as_str(), a));
    Step::new(layout.launcher(program))
        .args(args)
        .current_dir(&layout.libexec)
}

/// Rewrite `path` in place. Returns the patched and missed keys.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be read or written.
pub fn patch_file(
    path: &Path,
    rules: &[(String, String)],
) -> std::io::Result<(Vec<String>, Vec<String>)> {
    let mut text = std::fs::read_to_string(path)?;
    let mut patched = Vec::new();
    let mut missed = Vec::new();

    for (key, value) in rules {
        match patch_line(&text, key, value) {
            Some(updated) => {
                text = updated;
                patched.push(key.clone());
            }
            None => {
                tracing::warn!(
                    key = %key,
                    config = %path.display(),
                    "no line to patch, leaving config unchanged for this key"
                );
                missed.push(key.clone());
            }
        }
    }

    std::fs::write(path, text)?;
    Ok((patched, missed))
}

/// Comment out every line starting with `key` and insert `key = "value"`
/// after it. `None` when no line starts with `key`.
pub fn patch_line(text: &str, key: &str, value: &str) -> Option<String> {
    let re = Regex::new(&format!("(?m)^({}.*)$", regex::escape(key))).ok()?;
    if !re.is_match(text) {
        return None;
    }
    let replaced = re.replace_all(text, |caps: &regex::Captures<'_>| {
        format!("#{}\n{key} = \"{value}\"", &caps[1])
    });
    Some(replaced.into_owned())
}

/// Patch rules for a recipe, values expanded against `layout`.
pub fn expand_rules(patches: &[ConfigPatch], layout: &InstalledLayout) -> Vec<(String, String)> {
    patches
        .iter()
        .map(|p| (p.key.clone(), layout.expand(&p.value)))
        .collect()
}
