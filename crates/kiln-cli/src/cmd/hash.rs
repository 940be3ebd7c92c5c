//! Hash command

use anyhow::{Context, Result};
use std::path::PathBuf;

use kiln_core::io::download::sha256_file;

/// Print the SHA256 of each file, `sha256sum` style.
pub fn hash(files: &[PathBuf]) -> Result<()> {
    for file in files {
        let hash =
            sha256_file(file).with_context(|| format!("Failed to hash {}", file.display()))?;
        println!("{} {}", hash, file.display());
    }
    Ok(())
}
