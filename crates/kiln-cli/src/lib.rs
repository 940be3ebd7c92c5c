//! kiln - build and install toolchains from source recipes
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! A recipe (TOML) pins a release archive and auxiliary git projects by
//! checksum and revision. `kiln install` verifies every input, builds the
//! auxiliary projects with CMake, installs the primary tree with its node
//! modules, and writes launchers that pin the interpreter and Java runtime.
//!
//! # Directory Layout
//!
//! ```text
//! ~/.kiln/
//! ├── bin/       # Symlinks to installed launchers
//! ├── cellar/    # <name>/<version>/{bin,libexec}
//! ├── cache/     # Verified archives, npm cache
//! ├── logs/      # Build logs
//! └── tmp/       # Staging
//! ```

pub mod cmd;
pub mod ui;

pub use kiln_core::USER_AGENT;
pub use kiln_core::paths::*;

use clap::{Args, Parser, Subcommand};
use kiln_schema::PlatformProfile;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "kiln")]
#[command(author, version, about = "kiln - build and install toolchains from source recipes")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command.
#[derive(Debug, Clone, Default, Args)]
pub struct GlobalArgs {
    /// Root of kiln state (default: ~/.kiln)
    #[arg(long, global = true, env = "KILN_HOME")]
    pub home: Option<PathBuf>,

    /// Stream build output instead of writing a log
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Target platform profile (default: this host), e.g. macos-arm64
    #[arg(long, global = true)]
    pub profile: Option<PlatformProfile>,

    /// Python interpreter baked into launchers
    #[arg(long, global = true, env = "KILN_PYTHON")]
    pub python: Option<PathBuf>,

    /// Java home baked into launchers on profiles that need one
    #[arg(long, global = true, env = "KILN_JAVA_HOME")]
    pub java_home: Option<PathBuf>,
}

/// A recipe and which build of it to act on.
#[derive(Debug, Clone, Args)]
pub struct RecipeArgs {
    /// Path to the recipe TOML
    pub recipe: PathBuf,

    /// Act on the head (development branch) build
    #[arg(long)]
    pub head: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Fetch, verify, build, and install a recipe
    Install {
        #[command(flatten)]
        target: RecipeArgs,
        /// Remove an existing install of the same version first
        #[arg(long, short = 'f')]
        force: bool,
        /// Parallel build jobs (default: settings, then CPU count)
        #[arg(long, short = 'j')]
        jobs: Option<usize>,
        /// Do not link launchers into ~/.kiln/bin
        #[arg(long)]
        no_link: bool,
        /// Skip generating and patching the tool's config
        #[arg(long)]
        skip_post_install: bool,
    },
    /// Generate and patch the config of an installed recipe
    #[command(name = "post-install")]
    PostInstall {
        #[command(flatten)]
        target: RecipeArgs,
    },
    /// Run the recipe's smoke test against the installed version
    Test {
        #[command(flatten)]
        target: RecipeArgs,
    },
    /// Download and verify all inputs without building
    Fetch {
        #[command(flatten)]
        target: RecipeArgs,
    },
    /// Show recipe metadata
    Info {
        /// Path to the recipe TOML
        recipe: PathBuf,
        /// Print the parsed recipe as JSON
        #[arg(long)]
        json: bool,
    },
    /// Compare the recipe version with upstream tags
    Livecheck {
        /// Path to the recipe TOML
        recipe: PathBuf,
    },
    /// Compute SHA256 hash of a file (for recipe authoring)
    Hash {
        /// Files to hash
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}
