//! Livecheck command

use std::path::Path;

use anyhow::{Context, Result, bail};
use crossterm::style::Stylize;
use kiln_core::exec::SystemRunner;
use regex::Regex;

use super::load_recipe;

/// Tag pattern used when the recipe has no `[livecheck]` section.
const DEFAULT_TAG_REGEX: &str = r"(?i)^v?(\d+(?:\.\d+)+)$";

/// Report whether upstream has tagged a newer version.
pub fn livecheck(path: &Path) -> Result<()> {
    let recipe = load_recipe(path)?;
    let Some(head) = &recipe.head else {
        bail!("{} has no head repository to check", recipe.package.name);
    };
    let pattern = recipe
        .livecheck
        .as_ref()
        .map_or(DEFAULT_TAG_REGEX, |l| l.regex.as_str());
    let regex = Regex::new(pattern).context("Invalid livecheck regex")?;

    let report = kiln_core::livecheck::livecheck(
        &SystemRunner::verbose(),
        &head.git,
        &recipe.package.version,
        &regex,
    )
    .with_context(|| format!("Failed to list tags of {}", head.git))?;

    let latest = report.latest.as_deref().unwrap_or("unknown");
    if report.outdated {
        println!(
            "{} {} {} {}",
            recipe.package.name.as_str().cyan(),
            report.current.as_str().red(),
            "->".dark_grey(),
            latest.green()
        );
    } else {
        println!(
            "{} {} {}",
            recipe.package.name.as_str().cyan(),
            report.current.as_str().green(),
            format!("(latest: {latest})").dark_grey()
        );
    }
    Ok(())
}
