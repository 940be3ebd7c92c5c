//! The install pipeline.
//!
//! One sequential run per recipe:
//!
//! 1. Acquire and verify every input (archives by SHA-256, git resources by
//!    revision) into a staging directory under `<home>/tmp`.
//! 2. Build each resource with CMake into its prefix under `libexec`.
//! 3. Copy the primary tree into `libexec`, install node modules, prune.
//! 4. Write launchers into `bin/` and link them into `<home>/bin`.
//! 5. Generate and patch the tool's config.
//!
//! Nothing is built, and a previous install is not removed, before every
//! input has been verified. A failing step aborts the run and leaves
//! whatever was written in place.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use kiln_schema::{Locator, Os, PlatformProfile, Recipe, Sha256Digest};
use tempfile::TempDir;
use thiserror::Error;

use crate::build::{CmakeStep, macos_sdk_path};
use crate::exec::{CommandRunner, StepError};
use crate::install::{copy_tree, npm_install, prune};
use crate::io::IntegrityError;
use crate::io::download::{DownloadError, DownloadRequest, Fetched, fetch_verified};
use crate::io::extract::{ExtractError, extract_tar_gz, strip_components};
use crate::io::git::{self, GitError};
use crate::layout::InstalledLayout;
use crate::post_install::{self, PostInstallOutcome};
use crate::smoke::{SmokeError, run_smoke_test};
use crate::toolchain::{Toolchain, ToolchainError};
use crate::wrappers::{WrapperEnv, discover_entry_points, link_launchers, write_launchers};
use crate::{KilnHome, Reporter};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{} already exists (use --force to reinstall)", .prefix.display())]
    AlreadyInstalled { prefix: PathBuf },

    #[error("failed to remove previous install at {}", .prefix.display())]
    RemovePrevious {
        prefix: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{name} {version} is not installed")]
    NotInstalled { name: String, version: String },

    #[error("{name} has no head repository")]
    NoHead { name: String },

    #[error("{name} has no {section} section")]
    MissingSection { name: String, section: &'static str },

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Step(#[from] StepError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Toolchain(#[from] ToolchainError),

    #[error(transparent)]
    Smoke(#[from] SmokeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// The integrity failure behind this error, if any.
    pub fn integrity(&self) -> Option<&IntegrityError> {
        match self {
            Self::Download(DownloadError::Integrity(e)) | Self::Git(GitError::Integrity(e)) => {
                Some(e)
            }
            _ => None,
        }
    }

    pub fn is_integrity(&self) -> bool {
        self.integrity().is_some()
    }
}

/// Shared state for pipeline operations.
#[derive(Clone)]
pub struct Context {
    pub home: KilnHome,
    pub client: reqwest::Client,
    pub runner: Arc<dyn CommandRunner>,
    pub reporter: Arc<dyn Reporter>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("home", &self.home)
            .finish_non_exhaustive()
    }
}

impl Context {
    pub fn new(
        home: KilnHome,
        client: reqwest::Client,
        runner: Arc<dyn CommandRunner>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            home,
            client,
            runner,
            reporter,
        }
    }
}

/// Knobs for one install.
#[derive(Debug, Clone)]
pub struct InstallOptions {
    pub profile: PlatformProfile,
    /// Remove an existing prefix instead of refusing.
    pub force: bool,
    /// Build the head branch instead of the release archive.
    pub head: bool,
    pub jobs: usize,
    /// Symlink launchers into `<home>/bin`.
    pub link: bool,
    /// Run post-install right after installing.
    pub post_install: bool,
    pub toolchain: Toolchain,
}

/// Verified inputs, ready to build.
#[derive(Debug)]
pub struct Staging {
    dir: TempDir,
    /// Primary source tree (top-level directory stripped).
    pub source: PathBuf,
    /// Resource name -> resource root.
    pub resources: BTreeMap<String, PathBuf>,
}

impl Staging {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// What an install produced.
#[derive(Debug, Clone)]
pub struct InstallReport {
    pub layout: InstalledLayout,
    pub launchers: Vec<String>,
    pub linked: Vec<PathBuf>,
    pub pruned: Vec<PathBuf>,
    pub post_install: Option<PostInstallOutcome>,
    /// Bytes on disk under the prefix.
    pub size: u64,
}

/// Version string used for the cellar directory of a head build.
pub const HEAD_VERSION: &str = "HEAD";

/// Runs the pipeline for one recipe.
#[derive(Debug)]
pub struct Installer<'a> {
    ctx: &'a Context,
    recipe: &'a Recipe,
    options: InstallOptions,
}

impl<'a> Installer<'a> {
    pub fn new(ctx: &'a Context, recipe: &'a Recipe, options: InstallOptions) -> Self {
        Self {
            ctx,
            recipe,
            options,
        }
    }

    pub fn version(&self) -> &str {
        if self.options.head {
            HEAD_VERSION
        } else {
            &self.recipe.package.version
        }
    }

    pub fn layout(&self) -> InstalledLayout {
        InstalledLayout::new(&self.ctx.home, &self.recipe.package.name, self.version())
    }

    /// Refuse an existing prefix unless `force` is set.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::AlreadyInstalled`] without `force`.
    pub fn check_destination(&self) -> Result<InstalledLayout, PipelineError> {
        let layout = self.layout();
        if layout.is_installed() && !self.options.force {
            return Err(PipelineError::AlreadyInstalled {
                prefix: layout.prefix,
            });
        }
        Ok(layout)
    }

    /// Remove a previous install. Only called once every input is verified.
    fn clear_previous(&self, layout: &InstalledLayout) -> Result<(), PipelineError> {
        if !layout.is_installed() {
            return Ok(());
        }
        tracing::info!(prefix = %layout.prefix.display(), "removing previous install");
        self.ctx
            .reporter
            .warning(&format!("Removing {}", layout.prefix.display()));
        std::fs::remove_dir_all(&layout.prefix).map_err(|source| PipelineError::RemovePrevious {
            prefix: layout.prefix.clone(),
            source,
        })
    }

    /// Acquire and verify every input. See [`fetch_inputs`].
    ///
    /// # Errors
    ///
    /// Any integrity or transfer failure.
    pub async fn fetch(&self) -> Result<Staging, PipelineError> {
        fetch_inputs(self.ctx, self.recipe, self.options.head).await
    }

    /// Run the whole pipeline.
    ///
    /// # Errors
    ///
    /// The first failing phase's error. Nothing is rolled back.
    pub async fn install(&self) -> Result<InstallReport, PipelineError> {
        let start = Instant::now();
        let reporter = self.ctx.reporter.as_ref();
        let runner = self.ctx.runner.as_ref();
        let profile = self.options.profile;

        let layout = self.check_destination()?;
        let staging = self.fetch().await?;
        self.clear_previous(&layout)?;

        reporter.section("Building");
        let sdk = self.sdk_path();
        for resource in &self.recipe.resources {
            let Some(root) = staging.resources.get(&resource.name) else {
                continue;
            };
            match &resource.cmake {
                Some(spec) => {
                    reporter.step(&resource.name, "cmake");
                    let build_dir = staging.path().join("build").join(&resource.name);
                    let prefix = layout.resource_prefix(&spec.prefix);
                    CmakeStep {
                        name: &resource.name,
                        spec,
                        source_root: root,
                        build_dir: &build_dir,
                        install_prefix: &prefix,
                        jobs: self.options.jobs,
                        sdk_path: sdk.as_deref(),
                    }
                    .run(runner)?;
                    reporter.done(&resource.name, &prefix.display().to_string());
                }
                None => {
                    let prefix = layout.resource_prefix(&resource.name);
                    copy_tree(root, &prefix)?;
                    tracing::debug!(resource = %resource.name, "staged without build");
                }
            }
        }

        reporter.section("Installing");
        let rules = &self.recipe.wrappers;
        let entry_points = discover_entry_points(&staging.source, &rules.dedupe_extensions)?;
        copy_tree(&staging.source, &layout.libexec)?;

        let mut pruned = Vec::new();
        if let Some(npm) = &self.recipe.npm {
            reporter.step("npm", "install");
            npm_install(runner, npm, &layout.libexec, &self.ctx.home.npm_cache())?;
            pruned = prune(&layout.libexec, &npm.remove, profile)?;
            reporter.done("npm", &format!("{} paths pruned", pruned.len()));
        }

        let toolchain = &self.options.toolchain;
        let env = WrapperEnv::resolve(
            rules,
            profile,
            Some(toolchain.python.as_path()),
            toolchain.java_home.as_deref(),
        );
        let launchers = write_launchers(&layout.bin, &layout.libexec, &entry_points, &env)?;
        reporter.done("launchers", &entry_points.join(" "));

        let linked = if self.options.link {
            link_launchers(&self.ctx.home.bin(), &launchers)?
        } else {
            Vec::new()
        };

        let post_install = match (&self.recipe.post_install, self.options.post_install) {
            (Some(spec), true) => {
                reporter.section("Configuring");
                Some(post_install::configure(runner, spec, &layout)?)
            }
            _ => None,
        };

        drop(staging);
        let size = layout.disk_usage();
        reporter.summary("installed", start.elapsed().as_secs_f64());
        tracing::info!(prefix = %layout.prefix.display(), "install complete");

        Ok(InstallReport {
            layout,
            launchers: entry_points,
            linked,
            pruned,
            post_install,
            size,
        })
    }

    fn sdk_path(&self) -> Option<PathBuf> {
        let wants_sysroot = self
            .recipe
            .resources
            .iter()
            .filter_map(|r| r.cmake.as_ref())
            .any(|c| c.default_sysroot);
        if wants_sysroot && self.options.profile.os() == Os::Macos {
            macos_sdk_path(self.ctx.runner.as_ref())
        } else {
            None
        }
    }
}

/// Acquire and verify every input.
///
/// Archives are downloaded first, then git resources are fetched; the
/// primary archive is only extracted once everything has been verified.
///
/// # Errors
///
/// Any integrity or transfer failure.
pub async fn fetch_inputs(
    ctx: &Context,
    recipe: &Recipe,
    head: bool,
) -> Result<Staging, PipelineError> {
    let reporter = ctx.reporter.as_ref();
    let runner = ctx.runner.as_ref();
    let name = &recipe.package.name;

    std::fs::create_dir_all(ctx.home.tmp())?;
    let dir = tempfile::Builder::new()
        .prefix(&format!("kiln-{name}-"))
        .tempdir_in(ctx.home.tmp())?;
    let source = dir.path().join("source");
    let resources_root = dir.path().join("resources");

    reporter.section("Fetching");
    tracing::info!(package = %name, head, "fetching");

    let primary_archive = if head {
        None
    } else {
        let src = &recipe.source;
        Some(download(ctx, name, &src.url, &src.sha256).await?)
    };

    let mut archives = Vec::new();
    for resource in &recipe.resources {
        if let Locator::Archive { url, sha256 } = &resource.source {
            let cached = download(ctx, &resource.name, url, sha256).await?;
            archives.push((resource.name.clone(), cached));
        }
    }

    let mut resources = BTreeMap::new();
    for resource in &recipe.resources {
        if let Locator::Git { git: url, revision } = &resource.source {
            reporter.step(&resource.name, revision.short());
            let dest = resources_root.join(&resource.name);
            git::fetch_revision(runner, url, revision, &dest)?;
            reporter.done(&resource.name, "revision verified");
            resources.insert(resource.name.clone(), dest);
        }
    }

    match primary_archive {
        Some(archive) => unpack(&archive, &source).await?,
        None => {
            let head = recipe
                .head
                .as_ref()
                .ok_or_else(|| PipelineError::NoHead { name: name.clone() })?;
            reporter.step(name, &head.branch);
            tracing::warn!(branch = %head.branch, "head builds are not checksum-verified");
            git::clone_branch(runner, &head.git, &head.branch, &source)?;
            reporter.done(name, "cloned");
        }
    }
    for (resource, archive) in archives {
        let dest = resources_root.join(&resource);
        unpack(&archive, &dest).await?;
        resources.insert(resource, dest);
    }

    Ok(Staging {
        dir,
        source,
        resources,
    })
}

async fn download(
    ctx: &Context,
    name: &str,
    url: &str,
    sha256: &Sha256Digest,
) -> Result<PathBuf, PipelineError> {
    let dest = ctx.home.cached_download(url, sha256.as_str());
    let fetched = fetch_verified(DownloadRequest {
        client: &ctx.client,
        name,
        url,
        dest: &dest,
        expected: sha256,
        reporter: ctx.reporter.as_ref(),
    })
    .await?;
    let detail = match fetched {
        Fetched::Cached => "cached".to_string(),
        Fetched::Downloaded { bytes } => format!("{bytes} bytes, verified"),
    };
    ctx.reporter.done(name, &detail);
    Ok(dest)
}

async fn unpack(archive: &Path, dest: &Path) -> Result<(), PipelineError> {
    let archive = archive.to_path_buf();
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<(), PipelineError> {
        extract_tar_gz(&archive, &dest)?;
        strip_components(&dest)?;
        Ok(())
    })
    .await
    .map_err(std::io::Error::other)?
}

/// Layout of an already installed version, or an error.
fn installed_layout(
    home: &KilnHome,
    recipe: &Recipe,
    version: &str,
) -> Result<InstalledLayout, PipelineError> {
    let layout = InstalledLayout::new(home, &recipe.package.name, version);
    if !layout.is_installed() {
        return Err(PipelineError::NotInstalled {
            name: recipe.package.name.clone(),
            version: version.to_string(),
        });
    }
    Ok(layout)
}

/// Run the post-install step for an installed version.
///
/// # Errors
///
/// Fails when the version is not installed or the step fails.
pub fn run_post_install(
    ctx: &Context,
    recipe: &Recipe,
    version: &str,
) -> Result<PostInstallOutcome, PipelineError> {
    let spec = recipe
        .post_install
        .as_ref()
        .ok_or_else(|| PipelineError::MissingSection {
            name: recipe.package.name.clone(),
            section: "post_install",
        })?;
    let layout = installed_layout(&ctx.home, recipe, version)?;
    Ok(post_install::configure(ctx.runner.as_ref(), spec, &layout)?)
}

/// Run the recipe's smoke test against an installed version.
///
/// # Errors
///
/// Fails when the version is not installed or the test fails.
pub fn run_test(ctx: &Context, recipe: &Recipe, version: &str) -> Result<String, PipelineError> {
    let test = recipe
        .test
        .as_ref()
        .ok_or_else(|| PipelineError::MissingSection {
            name: recipe.package.name.clone(),
            section: "test",
        })?;
    let layout = installed_layout(&ctx.home, recipe, version)?;
    Ok(run_smoke_test(
        ctx.runner.as_ref(),
        test,
        &layout,
        &ctx.home.tmp(),
    )?)
}
