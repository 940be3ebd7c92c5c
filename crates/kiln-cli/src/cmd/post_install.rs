//! Post-install command

use anyhow::Result;
use kiln_core::pipeline::run_post_install;
use kiln_core::post_install::PostInstallOutcome;

use super::{Session, load_recipe, target_version};
use crate::RecipeArgs;

/// Generate and patch the config of an installed version.
pub fn post_install(session: &Session, target: &RecipeArgs) -> Result<()> {
    let recipe = load_recipe(&target.recipe)?;
    let version = target_version(&recipe, target);
    let ctx = session.context(&recipe, version)?;

    match run_post_install(&ctx, &recipe, version)? {
        PostInstallOutcome::AlreadyConfigured => {
            ctx.reporter.info(&format!(
                "{} {version} is already configured",
                recipe.package.name
            ));
        }
        PostInstallOutcome::Configured { patched, missed } => {
            for key in &missed {
                ctx.reporter
                    .warning(&format!("config has no {key} line; left unchanged"));
            }
            ctx.reporter
                .success(&format!("configured ({} lines patched)", patched.len()));
        }
    }
    Ok(())
}
