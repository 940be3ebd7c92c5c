//! Command implementations

pub mod completions;
pub mod fetch;
pub mod hash;
pub mod info;
pub mod install;
pub mod livecheck;
pub mod post_install;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use kiln_core::exec::{CommandRunner, SystemRunner};
use kiln_core::pipeline::{Context, HEAD_VERSION};
use kiln_core::settings::Settings;
use kiln_core::toolchain::Toolchain;
use kiln_core::KilnHome;
use kiln_schema::{PlatformProfile, Recipe};

use crate::{GlobalArgs, RecipeArgs};
use crate::ui::ConsoleReporter;

/// Resolved global state for one invocation.
#[derive(Debug, Clone)]
pub struct Session {
    pub home: KilnHome,
    pub settings: Settings,
    pub profile: PlatformProfile,
    pub verbose: bool,
    pub python: Option<std::path::PathBuf>,
    pub java_home: Option<std::path::PathBuf>,
}

impl Session {
    /// Merge flags, environment, and `<home>/config.toml`.
    pub fn new(global: &GlobalArgs) -> Result<Self> {
        let home = match &global.home {
            Some(root) => KilnHome::new(root),
            None => KilnHome::from_env().context("Could not determine home directory")?,
        };
        let settings = Settings::load(&home.settings_file())?;
        let profile = match global.profile {
            Some(profile) => profile,
            None => PlatformProfile::detect().context("Unsupported host platform")?,
        };
        tracing::debug!(home = %home.root().display(), %profile, "session");

        Ok(Self {
            verbose: global.verbose || settings.verbose,
            python: global.python.clone().or_else(|| settings.python.clone()),
            java_home: global.java_home.clone().or_else(|| settings.java_home.clone()),
            home,
            settings,
            profile,
        })
    }

    /// Runner for build steps: streaming when verbose, else logging to
    /// `<home>/logs`.
    pub fn runner(&self, recipe: &Recipe, version: &str) -> Arc<dyn CommandRunner> {
        if self.verbose {
            Arc::new(SystemRunner::verbose())
        } else {
            let log = self
                .home
                .build_log_path(&recipe.package.name, version);
            Arc::new(SystemRunner::logging_to(log))
        }
    }

    /// Pipeline context for `recipe`.
    pub fn context(&self, recipe: &Recipe, version: &str) -> Result<Context> {
        let client = reqwest::Client::builder()
            .user_agent(kiln_core::USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Context::new(
            self.home.clone(),
            client,
            self.runner(recipe, version),
            Arc::new(ConsoleReporter::new()),
        ))
    }

    /// Interpreter and Java runtime for launchers.
    pub fn toolchain(&self, recipe: &Recipe) -> Result<Toolchain> {
        Ok(Toolchain::discover(
            self.profile,
            recipe.wrappers.java_home,
            self.python.as_deref(),
            self.java_home.as_deref(),
        )?)
    }
}

/// Load and validate a recipe file.
pub fn load_recipe(path: &Path) -> Result<Recipe> {
    Recipe::from_file(path).with_context(|| format!("Failed to load recipe {}", path.display()))
}

/// Version directory a command acts on.
pub fn target_version<'a>(recipe: &'a Recipe, target: &RecipeArgs) -> &'a str {
    if target.head {
        HEAD_VERSION
    } else {
        &recipe.package.version
    }
}
