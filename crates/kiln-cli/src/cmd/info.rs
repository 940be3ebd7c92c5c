//! Info command

use std::path::Path;

use anyhow::Result;
use crossterm::style::Stylize;
use kiln_core::layout::InstalledLayout;
use kiln_schema::{DependencyKind, Locator, Recipe};

use super::{Session, load_recipe};
use crate::ui::format_size;

const LW: usize = 12;

/// Show recipe metadata, filtered for the session's platform profile.
pub fn info(session: &Session, path: &Path, json: bool) -> Result<()> {
    let recipe = load_recipe(path)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&recipe)?);
        return Ok(());
    }

    let pkg = &recipe.package;
    println!();
    println!("  {} {}", pkg.name.as_str().white().bold(), pkg.version.as_str().dark_grey());
    if !pkg.description.is_empty() {
        println!("  {}", pkg.description);
    }
    println!();
    if !pkg.homepage.is_empty() {
        println!("  {:<LW$}{}", "homepage", pkg.homepage);
    }
    println!("  {:<LW$}{}", "license", pkg.license);
    println!("  {:<LW$}{}", "profile", session.profile);

    print_dependencies(&recipe, session);
    for fails in &recipe.fails_with {
        println!("  {:<LW$}{} {}", "fails with", fails.compiler, fails.version);
    }
    for resource in &recipe.resources {
        let origin = match &resource.source {
            Locator::Git { git, revision } => format!("{git} @ {}", revision.short()),
            Locator::Archive { url, .. } => url.clone(),
        };
        println!("  {:<LW$}{} {}", "resource", resource.name.as_str().cyan(), origin.dark_grey());
    }
    if let Some(head) = &recipe.head {
        println!("  {:<LW$}{} ({})", "head", head.git, head.branch);
    }

    let bottles = recipe.bottles_for(session.profile);
    if bottles.is_empty() {
        println!("  {:<LW$}{}", "bottles", "none for this profile".dark_grey());
    } else {
        let tags: Vec<&str> = bottles.iter().map(|(tag, _)| *tag).collect();
        println!("  {:<LW$}{}", "bottles", tags.join(", "));
    }

    let layout = InstalledLayout::new(&session.home, &pkg.name, &pkg.version);
    if layout.is_installed() {
        println!(
            "  {:<LW$}{}, {}",
            "installed",
            layout.prefix.display(),
            format_size(layout.disk_usage())
        );
    }
    Ok(())
}

fn print_dependencies(recipe: &Recipe, session: &Session) {
    let deps = recipe.dependencies_for(session.profile);
    let names = |kind: DependencyKind| {
        deps.iter()
            .filter(|d| d.kind == kind)
            .map(|d| d.name.as_str())
            .collect::<Vec<_>>()
    };
    let build = names(DependencyKind::Build);
    let runtime = names(DependencyKind::Runtime);
    if !build.is_empty() {
        println!("  {:<LW$}{}", "build deps", build.join(", "));
    }
    if !runtime.is_empty() {
        println!("  {:<LW$}{}", "requires", runtime.join(", "));
    }
}
