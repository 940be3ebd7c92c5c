//! Core library for kiln
//!
//! Everything between a parsed recipe and an installed toolchain:
//! verified acquisition, CMake builds of pinned resources, the primary
//! install, launcher generation, and first-run configuration.

pub mod build;
pub mod exec;
pub mod install;
pub mod io;
pub mod layout;
pub mod livecheck;
pub mod paths;
pub mod pipeline;
pub mod post_install;
pub mod reporter;
pub mod settings;
pub mod smoke;
pub mod toolchain;
pub mod wrappers;

#[cfg(test)]
mod testing;

pub use paths::*;
pub use reporter::{NullReporter, Reporter};

/// User agent sent with every download.
pub const USER_AGENT: &str = concat!("kiln/", env!("CARGO_PKG_VERSION"));
