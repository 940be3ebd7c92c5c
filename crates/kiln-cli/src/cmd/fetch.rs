//! Fetch command

use anyhow::Result;
use kiln_core::pipeline::fetch_inputs;

use super::{Session, load_recipe, target_version};
use crate::RecipeArgs;

/// Download and verify every input, then discard the staging tree.
pub async fn fetch(session: &Session, target: &RecipeArgs) -> Result<()> {
    let recipe = load_recipe(&target.recipe)?;
    let version = target_version(&recipe, target);
    let ctx = session.context(&recipe, version)?;

    let staging = fetch_inputs(&ctx, &recipe, target.head).await?;
    ctx.reporter.success(&format!(
        "{} {version}: {} inputs verified",
        recipe.package.name,
        staging.resources.len() + 1
    ));
    Ok(())
}
