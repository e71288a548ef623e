//! Retrieval of CSV text from a published sheet or a local file.

use std::path::PathBuf;
use std::time::Duration;

use tracing::debug;

use crate::error::FetchError;

/// Where CSV text comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Published CSV export URL.
    Url(String),
    /// Local CSV file (offline runs and tests).
    File(PathBuf),
}

/// Fetches CSV text from a [`Source`].
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    source: Source,
    cache_bust: bool,
}

impl Fetcher {
    /// Creates a fetcher with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns a `FetchError` if the HTTP client cannot be built.
    pub fn new(source: Source, cache_bust: bool, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, source, cache_bust))
    }

    /// Creates a fetcher sharing an existing HTTP client.
    pub fn with_client(client: reqwest::Client, source: Source, cache_bust: bool) -> Self {
        Self {
            client,
            source,
            cache_bust,
        }
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    /// Returns the raw CSV text.
    ///
    /// # Errors
    ///
    /// Returns a `FetchError` on transport failure, a non-2xx status, or an
    /// unreadable file.
    pub async fn fetch(&self) -> Result<String, FetchError> {
        match &self.source {
            Source::Url(url) => {
                let url = if self.cache_bust {
                    cache_busted(url, rand::random::<u32>())
                } else {
                    url.clone()
                };
                debug!(%url, "fetching sheet");
                let response = self.client.get(&url).send().await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(FetchError::Status(status.as_u16()));
                }
                Ok(response.text().await?)
            }
            Source::File(path) => {
                tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| FetchError::Io {
                        path: path.clone(),
                        source,
                    })
            }
        }
    }
}

/// Appends a `v=<buster>` query parameter to `url`.
pub fn cache_busted(url: &str, buster: u32) -> String {
    let sep = if url.contains('?') { '&' } else { '?' };
    format!("{url}{sep}v={buster}")
}
