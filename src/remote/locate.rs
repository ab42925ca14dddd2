use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use reqwest::header::CONTENT_LENGTH;
use reqwest::Url;
use tracing::info;

use super::DumpLocation;

static ARTICLES_HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"href="([^"]*pages-articles\.xml\.bz2)""#).unwrap());

/// Find the `pages-articles` dump in a mirror directory listing and look up its size.
pub async fn locate_latest(client: &reqwest::Client, directory_url: &str) -> Result<DumpLocation> {
    info!("Fetching dump listing: {}", directory_url);
    let html = client
        .get(directory_url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await
        .context("Failed to fetch dump directory listing")?;

    let href = find_articles_dump(&html)
        .with_context(|| format!("No pages-articles dump listed at {}", directory_url))?;
    let url = Url::parse(directory_url)?.join(&href)?.to_string();
    let size_bytes = fetch_size(client, &url).await?;

    info!("Latest dump: {} ({} bytes)", url, size_bytes);
    Ok(DumpLocation { url, size_bytes })
}

/// First link in the listing that points at a `pages-articles.xml.bz2` file.
pub fn find_articles_dump(html: &str) -> Option<String> {
    ARTICLES_HREF_RE
        .captures(html)
        .map(|caps| caps[1].to_string())
}

/// Size from a HEAD request's `content-length`, 0 when the server omits it.
async fn fetch_size(client: &reqwest::Client, url: &str) -> Result<u64> {
    let response = client
        .head(url)
        .send()
        .await?
        .error_for_status()
        .context("Failed to fetch dump size")?;

    let size = response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    Ok(size)
}
