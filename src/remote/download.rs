use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use indicatif::ProgressBar;
use reqwest::StatusCode;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use super::DumpLocation;

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 2000;

/// Download `location` to `dest`, retrying transient failures with exponential
/// backoff. Data goes to `<dest>.part` first and is renamed once complete, so
/// `dest` only ever holds a whole file. Returns the number of bytes written.
pub async fn download(
    client: &reqwest::Client,
    location: &DumpLocation,
    dest: &Path,
    progress: &ProgressBar,
) -> Result<u64> {
    let mut attempt = 0;
    loop {
        match download_once(client, location, dest, progress).await {
            Ok(bytes) => return Ok(bytes),
            Err(e) if attempt < MAX_RETRIES && is_transient(&e) => {
                let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
                warn!(
                    "Download of {} failed (attempt {}/{}): {}, retrying in {:.1}s",
                    location.file_name(),
                    attempt + 1,
                    MAX_RETRIES,
                    e,
                    backoff.as_secs_f64()
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn download_once(
    client: &reqwest::Client,
    location: &DumpLocation,
    dest: &Path,
    progress: &ProgressBar,
) -> Result<u64> {
    let mut response = client
        .get(&location.url)
        .send()
        .await?
        .error_for_status()?;

    let total = response.content_length().unwrap_or(location.size_bytes);
    progress.set_length(total);
    progress.set_position(0);

    let partial = partial_path(dest);
    let mut file = tokio::fs::File::create(&partial)
        .await
        .with_context(|| format!("Failed to create {}", partial.display()))?;

    let mut written = 0u64;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
        progress.inc(chunk.len() as u64);
    }
    file.flush().await?;
    drop(file);

    if total > 0 && written != total {
        bail!("Incomplete download of {}: {} of {} bytes", location.url, written, total);
    }

    tokio::fs::rename(&partial, dest)
        .await
        .with_context(|| format!("Failed to move download to {}", dest.display()))?;
    info!("Downloaded {} ({} bytes) to {}", location.file_name(), written, dest.display());
    Ok(written)
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Connection problems, timeouts, rate limiting and server errors are worth retrying.
fn is_transient(err: &anyhow::Error) -> bool {
    let Some(e) = err.downcast_ref::<reqwest::Error>() else {
        return false;
    };
    if e.is_timeout() || e.is_connect() || e.is_body() {
        return true;
    }
    e.status()
        .is_some_and(|s| s == StatusCode::TOO_MANY_REQUESTS || s.is_server_error())
}
