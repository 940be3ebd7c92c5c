//! Async download with streaming SHA256 verification.
//!
//! Archives are written to the cache while being hashed. A mismatch deletes
//! the partial file and aborts; an already-cached file whose hash matches is
//! reused without touching the network.

use std::io::Read;
use std::path::Path;

use futures::StreamExt;
use kiln_schema::Sha256Digest;
use reqwest::Client;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use super::IntegrityError;
use crate::Reporter;

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),
}

/// Request for a verified download
pub struct DownloadRequest<'a> {
    pub client: &'a Client,
    pub name: &'a str,
    pub url: &'a str,
    pub dest: &'a Path,
    pub expected: &'a Sha256Digest,
    pub reporter: &'a dyn Reporter,
}

impl std::fmt::Debug for DownloadRequest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadRequest")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("dest", &self.dest)
            .finish_non_exhaustive()
    }
}

/// Outcome of [`fetch_verified`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    /// The cached copy already matched.
    Cached,
    /// The file was downloaded and verified.
    Downloaded { bytes: u64 },
}

/// Download `req.url` to `req.dest` unless a verified copy is already there.
///
/// # Errors
///
/// Returns [`IntegrityError::Checksum`] when the content does not hash to
/// the expected digest, or an HTTP/IO error from the transfer.
pub async fn fetch_verified(req: DownloadRequest<'_>) -> Result<Fetched, DownloadError> {
    if req.dest.exists() {
        let dest = req.dest.to_path_buf();
        let actual = tokio::task::spawn_blocking(move || sha256_file(&dest))
            .await
            .map_err(std::io::Error::other)??;
        if req.expected.matches(&actual) {
            tracing::debug!(url = req.url, "using cached download");
            return Ok(Fetched::Cached);
        }
        tracing::warn!(
            path = %req.dest.display(),
            "cached file has wrong checksum, downloading again"
        );
        tokio::fs::remove_file(req.dest).await?;
    }

    if let Some(parent) = req.dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let bytes = download_and_verify(req).await?;
    Ok(Fetched::Downloaded { bytes })
}

/// Perform a sequential download with streaming verification.
///
/// # Errors
///
/// See [`fetch_verified`].
pub async fn download_and_verify(req: DownloadRequest<'_>) -> Result<u64, DownloadError> {
    let response = req
        .client
        .get(req.url)
        .header(reqwest::header::USER_AGENT, crate::USER_AGENT)
        .send()
        .await?
        .error_for_status()?;

    let total_size = response.content_length();
    req.reporter.downloading(req.name, 0, total_size);

    // Write to a sibling temp name so an interrupted transfer never looks
    // like a complete cache entry.
    let partial = req.dest.with_extension("part");
    let mut file = File::create(&partial).await?;
    let mut stream = response.bytes_stream();
    let mut hasher = Sha256::new();
    let mut downloaded: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        hasher.update(&chunk);
        downloaded += chunk.len() as u64;
        req.reporter.downloading(req.name, downloaded, total_size);
    }

    file.flush().await?;
    drop(file);
    let actual = hex::encode(hasher.finalize());

    if !req.expected.matches(&actual) {
        req.reporter.failed(req.name, "hash mismatch");
        tokio::fs::remove_file(&partial).await.ok();
        return Err(IntegrityError::Checksum {
            url: req.url.to_string(),
            expected: req.expected.to_string(),
            actual,
        }
        .into());
    }

    tokio::fs::rename(&partial, req.dest).await?;
    Ok(downloaded)
}

/// Compute the SHA-256 of a file as lowercase hex.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be read.
pub fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NullReporter;
    use mockito::Server;
    use tempfile::tempdir;

    // sha256("hello world")
    const HELLO_SHA: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[tokio::test]
    async fn downloads_and_verifies() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/hello.tar.gz")
            .with_status(200)
            .with_body("hello world")
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("cache/hello.tar.gz");
        let url = format!("{}/hello.tar.gz", server.url());
        let expected = Sha256Digest::new(HELLO_SHA).unwrap();
        let client = Client::new();

        let fetched = fetch_verified(DownloadRequest {
            client: &client,
            name: "hello",
            url: &url,
            dest: &dest,
            expected: &expected,
            reporter: &NullReporter,
        })
        .await
        .unwrap();

        mock.assert_async().await;
        assert_eq!(fetched, Fetched::Downloaded { bytes: 11 });
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "hello world");
    }

    #[tokio::test]
    async fn mismatch_removes_partial_file() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/evil.tar.gz")
            .with_status(200)
            .with_body("tampered")
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("evil.tar.gz");
        let url = format!("{}/evil.tar.gz", server.url());
        let expected = Sha256Digest::new(HELLO_SHA).unwrap();
        let client = Client::new();

        let err = fetch_verified(DownloadRequest {
            client: &client,
            name: "evil",
            url: &url,
            dest: &dest,
            expected: &expected,
            reporter: &NullReporter,
        })
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            DownloadError::Integrity(IntegrityError::Checksum { .. })
        ));
        assert!(!dest.exists());
        assert!(!dest.with_extension("part").exists());
    }

    #[tokio::test]
    async fn verified_cache_skips_network() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/hello.tar.gz")
            .expect(0)
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("hello.tar.gz");
        std::fs::write(&dest, "hello world").unwrap();
        let url = format!("{}/hello.tar.gz", server.url());
        let expected = Sha256Digest::new(HELLO_SHA).unwrap();
        let client = Client::new();

        let fetched = fetch_verified(DownloadRequest {
            client: &client,
            name: "hello",
            url: &url,
            dest: &dest,
            expected: &expected,
            reporter: &NullReporter,
        })
        .await
        .unwrap();

        mock.assert_async().await;
        assert_eq!(fetched, Fetched::Cached);
    }

    #[tokio::test]
    async fn http_error_status_is_fatal() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/missing.tar.gz")
            .with_status(404)
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("missing.tar.gz");
        let url = format!("{}/missing.tar.gz", server.url());
        let expected = Sha256Digest::new(HELLO_SHA).unwrap();
        let client = Client::new();

        let err = fetch_verified(DownloadRequest {
            client: &client,
            name: "missing",
            url: &url,
            dest: &dest,
            expected: &expected,
            reporter: &NullReporter,
        })
        .await
        .unwrap_err();
        assert!(matches!(err, DownloadError::Http(_)));
    }

    #[test]
    fn sha256_file_matches_known_digest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, "hello world").unwrap();
        assert_eq!(sha256_file(&path).unwrap(), HELLO_SHA);
    }
}
