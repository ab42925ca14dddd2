//! Locating and fetching dumps from a Wikimedia dump mirror.

pub mod download;
pub mod locate;

pub use download::download;
pub use locate::locate_latest;

use anyhow::Result;

/// A dump file on the mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpLocation {
    pub url: String,
    /// Size reported by the server, 0 when unknown
    pub size_bytes: u64,
}

impl DumpLocation {
    /// Last path segment of the URL.
    pub fn file_name(&self) -> &str {
        self.url
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or("pages-articles.xml.bz2")
    }
}

/// HTTP client with an identifying user agent, which the Wikimedia mirrors require.
pub fn http_client() -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}
