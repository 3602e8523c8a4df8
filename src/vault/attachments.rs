use crate::chat::client::ChatMessage;
use crate::vault::paths::ATTACHMENTS_DIR;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Per-message outcome of attachment acquisition. `success` holds the
/// relative paths saved under the archive directory, `failed` the original
/// filenames whose primary and fallback URLs both failed. Attachment
/// failures are data, never pipeline errors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub success: Vec<String>,
    pub failed: Vec<String>,
}

/// Seam for fetching one URL to one destination file. Shared by reference
/// with the writer thread, hence the bounds.
pub trait Downloader: Send + Sync {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()>;
}

/// Production downloader over a shared blocking HTTP client.
pub struct HttpDownloader {
    client: reqwest::blocking::Client,
}

impl HttpDownloader {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("failed to build attachment HTTP client")?;
        Ok(Self { client })
    }
}

impl Downloader for HttpDownloader {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        let mut response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("request failed for {url}"))?
            .error_for_status()
            .with_context(|| format!("bad status for {url}"))?;

        let mut file = fs::File::create(dest)
            .with_context(|| format!("failed to create {}", dest.display()))?;
        response
            .copy_to(&mut file)
            .with_context(|| format!("failed to stream {url} to {}", dest.display()))?;
        Ok(())
    }
}

/// Pick a destination that does not collide with an already saved file.
/// Duplicate filenames within one message should not happen, but the
/// original CDN does not promise it; the suffix goes on the full name
/// (`photo.png` -> `photo.png_1`).
fn unique_destination(dir: &Path, filename: &str) -> (PathBuf, String) {
    let mut candidate = dir.join(filename);
    let mut saved_name = filename.to_string();
    let mut count = 0u32;
    while candidate.exists() {
        count += 1;
        saved_name = format!("{filename}_{count}");
        candidate = dir.join(&saved_name);
    }
    (candidate, saved_name)
}

/// Download every attachment of `message` into
/// `<attachments_root>/<message-id>/`. No side effect when the message has
/// no attachments. Errors only when the per-message directory cannot be
/// created; individual download failures land in `failed`.
pub fn download_attachments(
    downloader: &dyn Downloader,
    attachments_root: &Path,
    message: &ChatMessage,
) -> Result<DownloadOutcome> {
    let mut outcome = DownloadOutcome::default();
    if message.attachments.is_empty() {
        return Ok(outcome);
    }

    let dir = attachments_root.join(message.id.to_string());
    fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

    for attachment in &message.attachments {
        let (dest, saved_name) = unique_destination(&dir, &attachment.filename);
        // Recorded relative to the channel directory so archive rows can be
        // followed on disk.
        let relative = format!("{ATTACHMENTS_DIR}/{}/{saved_name}", message.id);

        // CDN copy first, origin as fallback; the CDN does occasionally 404.
        match downloader.fetch(&attachment.proxy_url, &dest) {
            Ok(()) => {
                outcome.success.push(relative);
                continue;
            }
            Err(err) => {
                eprintln!(
                    "attachment {} failed via {}, trying origin: {err:#}",
                    attachment.filename, attachment.proxy_url
                );
            }
        }

        match downloader.fetch(&attachment.url, &dest) {
            Ok(()) => outcome.success.push(relative),
            Err(err) => {
                eprintln!(
                    "attachment {} failed via {}, skipping: {err:#}",
                    attachment.filename, attachment.url
                );
                let _ = fs::remove_file(&dest);
                outcome.failed.push(attachment.filename.clone());
            }
        }
    }

    Ok(outcome)
}
