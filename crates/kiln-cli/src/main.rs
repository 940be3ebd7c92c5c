//! kiln - build and install toolchains from source recipes

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use kiln_cli::cmd::{self, Session};
use kiln_cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Install {
            target,
            force,
            jobs,
            no_link,
            skip_post_install,
        } => {
            let session = Session::new(&cli.global)?;
            let opts = cmd::install::InstallArgs {
                force,
                jobs,
                link: !no_link,
                post_install: !skip_post_install,
            };
            cmd::install::install(&session, &target, &opts).await
        }
        Commands::PostInstall { target } => {
            cmd::post_install::post_install(&Session::new(&cli.global)?, &target)
        }
        Commands::Test { target } => cmd::test::test(&Session::new(&cli.global)?, &target),
        Commands::Fetch { target } => {
            cmd::fetch::fetch(&Session::new(&cli.global)?, &target).await
        }
        Commands::Info { recipe, json } => {
            cmd::info::info(&Session::new(&cli.global)?, &recipe, json)
        }
        Commands::Livecheck { recipe } => cmd::livecheck::livecheck(&recipe),
        Commands::Hash { files } => cmd::hash::hash(&files),
        Commands::Completions { shell } => {
            cmd::completions::completions(shell);
            Ok(())
        }
    }
}
