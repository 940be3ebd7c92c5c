//! Upstream version detection from git tags.

use regex::Regex;
use semver::Version;

use crate::exec::CommandRunner;
use crate::io::git::{GitError, ls_remote_tags};

/// Newest upstream version compared with the recipe's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LivecheckReport {
    pub current: String,
    pub latest: Option<String>,
    pub outdated: bool,
}

/// Parse a version leniently: `3.1` becomes `3.1.0`, extra components beyond
/// the third are dropped.
pub fn parse_version(raw: &str) -> Option<Version> {
    let mut parts: Vec<u64> = raw
        .split('.')
        .map(str::parse::<u64>)
        .collect::<Result<_, _>>()
        .ok()?;
    if parts.is_empty() {
        return None;
    }
    parts.resize(3, 0);
    Some(Version::new(parts[0], parts[1], parts[2]))
}

/// Versions extracted from tags by the first capture group of `regex`
/// (the whole match when the regex has no group), newest first.
pub fn versions_from_tags(tags: &[String], regex: &Regex) -> Vec<String> {
    let mut versions: Vec<(Version, String)> = tags
        .iter()
        .filter_map(|tag| {
            let caps = regex.captures(tag)?;
            let raw = caps.get(1).or_else(|| caps.get(0))?.as_str();
            parse_version(raw).map(|v| (v, raw.to_string()))
        })
        .collect();
    versions.sort_by(|a, b| b.0.cmp(&a.0));
    versions.dedup_by(|a, b| a.0 == b.0);
    versions.into_iter().map(|(_, raw)| raw).collect()
}

/// Compare `current` against the newest version among `tags`.
pub fn check_tags(current: &str, tags: &[String], regex: &Regex) -> LivecheckReport {
    let latest = versions_from_tags(tags, regex).into_iter().next();
    let outdated = match (&latest, parse_version(current)) {
        (Some(latest), Some(current)) => {
            parse_version(latest).is_some_and(|latest| latest > current)
        }
        _ => false,
    };
    LivecheckReport {
        current: current.to_string(),
        latest,
        outdated,
    }
}

/// List the tags of `repo` and compare with `current`.
///
/// # Errors
///
/// Fails if `git ls-remote` fails.
pub fn livecheck(
    runner: &dyn CommandRunner,
    repo: &str,
    current: &str,
    regex: &Regex,
) -> Result<LivecheckReport, GitError> {
    let tags = ls_remote_tags(runner, repo)?;
    tracing::debug!(count = tags.len(), repo, "listed tags");
    Ok(check_tags(current, &tags, regex))
}
