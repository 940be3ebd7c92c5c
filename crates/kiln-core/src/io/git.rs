//! Git acquisition pinned to an exact revision.

use std::path::Path;

use kiln_schema::GitRevision;
use thiserror::Error;

use super::IntegrityError;
use crate::exec::{CommandRunner, Step, StepError};

#[derive(Error, Debug)]
pub enum GitError {
    #[error(transparent)]
    Step(#[from] StepError),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn git(dest: &Path) -> Step {
    Step::new("git").arg("-C").arg(dest)
}

/// Fetch exactly `revision` of `url` into `dest` and verify the checkout.
///
/// Only the pinned commit is transferred (`--depth 1`), which keeps a full
/// `llvm-project` acquisition to a single commit's worth of objects.
///
/// # Errors
///
/// Fails if any git command fails or if `HEAD` after checkout is not the
/// pinned revision.
pub fn fetch_revision(
    runner: &dyn CommandRunner,
    url: &str,
    revision: &GitRevision,
    dest: &Path,
) -> Result<(), GitError> {
    std::fs::create_dir_all(dest)?;

    runner.run(&Step::new("git").args(["init", "-q"]).arg(dest))?;
    runner.run(&git(dest).args(["remote", "add", "origin", url]))?;
    runner.run(&git(dest).args(["fetch", "-q", "--depth", "1", "origin", revision.as_str()]))?;
    runner.run(&git(dest).args(["checkout", "-q", "--detach", "FETCH_HEAD"]))?;

    verify_head(runner, url, revision, dest)
}

/// Compare `HEAD` of `dest` with the pinned revision.
///
/// # Errors
///
/// Returns [`IntegrityError::Revision`] when they differ.
pub fn verify_head(
    runner: &dyn CommandRunner,
    url: &str,
    revision: &GitRevision,
    dest: &Path,
) -> Result<(), GitError> {
    let head = runner.output(&git(dest).args(["rev-parse", "HEAD"]))?;
    let head = head.trim();
    if !head.eq_ignore_ascii_case(revision.as_str()) {
        return Err(IntegrityError::Revision {
            url: url.to_string(),
            expected: revision.to_string(),
            actual: head.to_string(),
        }
        .into());
    }
    Ok(())
}

/// Shallow-clone the tip of `branch` (used for head installs).
///
/// # Errors
///
/// Fails if the clone fails.
pub fn clone_branch(
    runner: &dyn CommandRunner,
    url: &str,
    branch: &str,
    dest: &Path,
) -> Result<(), GitError> {
    runner.run(
        &Step::new("git")
            .args(["clone", "-q", "--depth", "1", "--branch", branch, url])
            .arg(dest),
    )?;
    Ok(())
}

/// List tag names of a remote repository.
///
/// # Errors
///
/// Fails if `git ls-remote` fails.
pub fn ls_remote_tags(runner: &dyn CommandRunner, url: &str) -> Result<Vec<String>, GitError> {
    let out = runner.output(&Step::new("git").args(["ls-remote", "--tags", url]))?;
    Ok(parse_ls_remote_tags(&out))
}

/// Parse `git ls-remote --tags` output into unique tag names.
///
/// Peeled entries (`refs/tags/v1.0^{}`) are folded into their tag.
pub fn parse_ls_remote_tags(output: &str) -> Vec<String> {
    let mut tags: Vec<String> = output
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .filter_map(|r| r.strip_prefix("refs/tags/"))
        .map(|t| t.trim_end_matches("^{}").to_string())
        .collect();
    tags.dedup();
    tags
}
