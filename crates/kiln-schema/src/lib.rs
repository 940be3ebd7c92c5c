//! Shared recipe types for kiln.
//!
//! Everything here is plain data: parsing, validation, and the
//! [`PlatformProfile`] that answers platform-conditional questions. Side
//! effects live in `kiln-core`.

mod arch;
mod hash;
mod license;
mod recipe;

// Re-exports
pub use arch::*;
pub use hash::*;
pub use license::*;
pub use recipe::*;
