//! Archive extraction module
//!
//! Source archives are gzip-compressed tarballs with a single top-level
//! directory (`emscripten-3.1.10/...`), which [`strip_components`] removes.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Archive error: {0}")]
    Archive(String),
}

/// Extract a tar.gz archive to a destination directory.
///
/// Returns the extracted paths relative to `dest_dir`.
pub fn extract_tar_gz(archive_path: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
    let file = File::open(archive_path)?;
    let reader = BufReader::new(file);
    let gz_decoder = flate2::read::GzDecoder::new(reader);

    extract_tar(gz_decoder, dest_dir)
}

/// Extract a tar archive from a reader
fn extract_tar<R: Read>(reader: R, dest_dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
    fs::create_dir_all(dest_dir)?;

    let mut archive = tar::Archive::new(reader);
    let mut extracted = Vec::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let kind = entry.header().entry_type();

        // GitHub archives carry a pax global header with the commit id.
        if kind.is_pax_global_extensions() || kind.is_pax_local_extensions() {
            continue;
        }

        let relative_path: PathBuf = entry.path()?.components().collect();
        let absolute_path = dest_dir.join(&relative_path);

        // Sanitize path to prevent Zip Slip
        if relative_path.is_absolute()
            || relative_path
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(ExtractError::Archive(format!(
                "Invalid path in archive: {}",
                relative_path.display()
            )));
        }

        if kind.is_dir() {
            fs::create_dir_all(&absolute_path)?;
            continue;
        }

        if let Some(parent) = absolute_path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Mode bits are applied, so executables stay executable.
        entry.unpack(&absolute_path)?;
        extracted.push(relative_path);
    }

    Ok(extracted)
}

/// Detect if a directory has a single top-level directory and strip it by moving contents up.
pub fn strip_components(dir: &Path) -> io::Result<()> {
    let mut entries: Vec<_> = fs::read_dir(dir)?.filter_map(Result::ok).collect();

    // Filter out hidden files (like .DS_Store)
    entries.retain(|e| !e.file_name().to_string_lossy().starts_with('.'));

    // If there is exactly one entry and it's a directory, move its contents up
    if entries.len() == 1 && entries[0].file_type()?.is_dir() {
        let top_level = entries[0].path();
        let sub_entries: Vec<_> = fs::read_dir(&top_level)?.filter_map(Result::ok).collect();

        for entry in sub_entries {
            let target = dir.join(entry.file_name());
            fs::rename(entry.path(), target)?;
        }

        fs::remove_dir(top_level)?;
    }

    Ok(())
}

#[cfg(test)]
pub(crate) fn write_test_tarball(path: &Path, top: &str, files: &[(&str, &str, u32)]) {
    let file = File::create(path).unwrap();
    let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, content, mode) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(*mode);
        header.set_cksum();
        builder
            .append_data(&mut header, format!("{top}/{name}"), content.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
}
