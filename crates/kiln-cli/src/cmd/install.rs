//! Install command

use anyhow::{Context as _, Result};
use crossterm::style::Stylize;
use kiln_core::layout::InstalledLayout;
use kiln_core::pipeline::{InstallOptions, Installer, PipelineError};
use kiln_core::post_install::PostInstallOutcome;
use kiln_core::toolchain;

use super::{Session, load_recipe, target_version};
use crate::RecipeArgs;
use crate::ui::format_size;

/// Flags specific to `kiln install`.
#[derive(Debug, Clone)]
pub struct InstallArgs {
    pub force: bool,
    pub jobs: Option<usize>,
    pub link: bool,
    pub post_install: bool,
}

/// Run the full pipeline for one recipe.
pub async fn install(session: &Session, target: &RecipeArgs, args: &InstallArgs) -> Result<()> {
    let recipe = load_recipe(&target.recipe)?;
    let version = target_version(&recipe, target);

    // Refuse early, before probing the host for build tools.
    let layout = InstalledLayout::new(&session.home, &recipe.package.name, version);
    if layout.is_installed() && !args.force {
        return Err(PipelineError::AlreadyInstalled {
            prefix: layout.prefix,
        }
        .into());
    }

    let preflight = toolchain::preflight(&recipe, session.profile, target.head)?;
    let toolchain = session.toolchain(&recipe)?;
    let ctx = session.context(&recipe, version)?;
    for missing in &preflight.missing_runtime {
        ctx.reporter
            .warning(&format!("runtime dependency '{missing}' not found on PATH"));
    }

    let options = InstallOptions {
        profile: session.profile,
        force: args.force,
        head: target.head,
        jobs: args.jobs.filter(|&j| j > 0).unwrap_or_else(|| session.settings.jobs()),
        link: args.link,
        post_install: args.post_install,
        toolchain,
    };
    tracing::info!(
        package = %recipe.package.name,
        version,
        profile = %session.profile,
        jobs = options.jobs,
        "install"
    );

    let report = Installer::new(&ctx, &recipe, options)
        .install()
        .await
        .with_context(|| format!("Failed to install {} {version}", recipe.package.name))?;

    if let Some(PostInstallOutcome::Configured { missed, .. }) = &report.post_install {
        for key in missed {
            ctx.reporter
                .warning(&format!("config has no {key} line; left unchanged"));
        }
    }

    println!(
        "{} {} {}",
        recipe.package.name.as_str().cyan().bold(),
        version.dark_grey(),
        format!("({})", format_size(report.size)).dark_grey()
    );
    println!("  {:<10}{}", "prefix", report.layout.prefix.display());
    println!("  {:<10}{}", "launchers", report.launchers.join(" "));
    if !report.linked.is_empty() {
        println!("  {:<10}{}", "linked", session.home.bin().display());
    }
    Ok(())
}
