//! Asset download
//!
//! Dual-strategy fetch: a TLS-fingerprint-capable client impersonating a
//! Chrome identity first, a generic client second. Success is HTTP 200 with a
//! non-HTML content type; pages served instead of binary assets (login walls)
//! are rejected, not saved. Bodies are committed through a temporary sibling
//! path so no failed fetch leaves a visible file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use wreq_util::{Emulation, EmulationOS, EmulationOption};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::browser::fingerprint;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of one asset fetch. Rejections are logged by the caller and never
/// abort the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Saved,
    Rejected(String),
}

impl DownloadOutcome {
    pub fn saved(&self) -> bool {
        matches!(self, Self::Saved)
    }
}

/// Fetches classified asset URLs to disk.
pub struct AssetDownloader {
    impersonate: Option<wreq::Client>,
    fallback: reqwest::Client,
}

impl AssetDownloader {
    pub fn new() -> Self {
        // Impersonated path is optional: when the client cannot be built the
        // fallback carries every fetch.
        let impersonate = wreq::Client::builder()
            .emulation(
                EmulationOption::builder()
                    .emulation(Emulation::Chrome136)
                    .emulation_os(EmulationOS::Windows)
                    .build(),
            )
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .map_err(|e| warn!("Impersonated client unavailable: {e}"))
            .ok();

        let fallback = reqwest::Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .user_agent(fingerprint::USER_AGENT)
            .build()
            .unwrap_or_default();

        Self {
            impersonate,
            fallback,
        }
    }

    /// Fetch `url` into `dest`.
    pub async fn fetch(&self, url: &str, dest: &Path) -> DownloadOutcome {
        if let Some(client) = &self.impersonate {
            match fetch_impersonated(client, url, dest).await {
                Ok(()) => return DownloadOutcome::Saved,
                Err(reason) => {
                    debug!(url, %reason, "Impersonated fetch failed, falling back");
                }
            }
        }

        match self.fetch_fallback(url, dest).await {
            Ok(()) => DownloadOutcome::Saved,
            Err(reason) => DownloadOutcome::Rejected(reason),
        }
    }

    /// Generic-client path: streamed to disk in chunks.
    async fn fetch_fallback(&self, url: &str, dest: &Path) -> Result<(), String> {
        let response = self
            .fallback
            .get(url)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if response.status().as_u16() != 200 {
            return Err(format!("status {}", response.status()));
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        if content_type.contains("text/html") {
            return Err("html page served instead of asset".to_string());
        }

        let tmp = part_path(dest);
        let written = async {
            let mut file = fs::File::create(&tmp).await.map_err(|e| e.to_string())?;
            let mut stream = response.bytes_stream();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| e.to_string())?;
                file.write_all(&chunk).await.map_err(|e| e.to_string())?;
            }
            file.flush().await.map_err(|e| e.to_string())
        }
        .await;

        match written {
            Ok(()) => fs::rename(&tmp, dest).await.map_err(|e| e.to_string()),
            Err(reason) => {
                let _ = fs::remove_file(&tmp).await;
                Err(reason)
            }
        }
    }
}

impl Default for AssetDownloader {
    fn default() -> Self {
        Self::new()
    }
}

/// Impersonated-client path: full-body read, then committed.
async fn fetch_impersonated(
    client: &wreq::Client,
    url: &str,
    dest: &Path,
) -> Result<(), String> {
    let response = client.get(url).send().await.map_err(|e| e.to_string())?;

    if response.status().as_u16() != 200 {
        return Err(format!("status {}", response.status()));
    }

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();
    if content_type.contains("text/html") {
        return Err("html page served instead of asset".to_string());
    }

    let bytes = response.bytes().await.map_err(|e| e.to_string())?;

    let tmp = part_path(dest);
    match fs::write(&tmp, &bytes).await {
        Ok(()) => fs::rename(&tmp, dest).await.map_err(|e| e.to_string()),
        Err(e) => {
            let _ = fs::remove_file(&tmp).await;
            Err(e.to_string())
        }
    }
}

/// Temporary sibling used until the body has been fully read.
fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn html_response_never_produces_a_file() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/wall")
            .with_status(200)
            .with_header("content-type", "text/html; charset=utf-8")
            .with_body("<html><body>login</body></html>")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("asset.jpg");

        let downloader = AssetDownloader::new();
        let outcome = downloader
            .fetch(&format!("{}/wall", server.url()), &dest)
            .await;

        assert!(!outcome.saved());
        assert!(!dest.exists());
        assert!(!part_path(&dest).exists());
    }

    #[tokio::test]
    async fn error_status_is_rejected_without_a_file() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/missing.png")
            .with_status(404)
            .with_header("content-type", "image/png")
            .with_body("nope")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("missing.png");

        let downloader = AssetDownloader::new();
        let outcome = downloader
            .fetch(&format!("{}/missing.png", server.url()), &dest)
            .await;

        assert!(matches!(outcome, DownloadOutcome::Rejected(_)));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn binary_asset_is_saved_in_full() {
        let body: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();

        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/pic.png")
            .with_status(200)
            .with_header("content-type", "image/png")
            .with_body(body.clone())
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("pic.png");

        let downloader = AssetDownloader::new();
        let outcome = downloader
            .fetch(&format!("{}/pic.png", server.url()), &dest)
            .await;

        assert!(outcome.saved());
        assert_eq!(std::fs::read(&dest).unwrap(), body);
        assert!(!part_path(&dest).exists());
    }

    #[test]
    fn part_path_is_a_sibling() {
        let dest = Path::new("/tmp/out/images/pic.png");
        let tmp = part_path(dest);
        assert_eq!(tmp.parent(), dest.parent());
        assert_eq!(tmp.file_name().unwrap().to_str().unwrap(), "pic.png.part");
    }
}
