//! Binary fetch capability and its default implementation.

use anyhow::{Result, anyhow, bail};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use bytes::Bytes;
use log::trace;
use reqwest::Client;
use tokio::fs::read as tokio_fs_read;
use url::Url;

/// Asynchronously loads the raw bytes behind a URL.
pub trait Fetcher: Send + Sync {
    /// Fetch the complete body of `url`.
    ///
    /// # Errors
    ///
    /// Returns `Err` on network, HTTP status or I/O failure.
    fn fetch(&self, url: &Url) -> impl Future<Output = Result<Bytes>> + Send;
}

/// Fetches `http`/`https` through reqwest, `file` from disk and decodes `data`
/// URLs in place.
#[derive(Clone, Debug, Default)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn fetch_http(&self, url: &Url) -> Result<Bytes> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|err| anyhow!("Network error for {url}: {err}"))?;
        if !response.status().is_success() {
            bail!("Failed to fetch URL: {} (Status: {})", url, response.status());
        }
        response
            .bytes()
            .await
            .map_err(|err| anyhow!("Read body error for {url}: {err}"))
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<Bytes> {
        trace!(target: "webp_machine", "fetching {url}");
        match url.scheme() {
            "http" | "https" => self.fetch_http(url).await,
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|()| anyhow!("Invalid file path for file url: {url}"))?;
                let data = tokio_fs_read(&path)
                    .await
                    .map_err(|err| anyhow!("File read error for {}: {err}", path.display()))?;
                Ok(Bytes::from(data))
            }
            "data" => decode_data_url(url),
            other => Err(anyhow!("Unsupported url scheme {other}")),
        }
    }
}

/// Decode the payload of a `data:` URL.
///
/// # Errors
///
/// Returns `Err` if the URL has no `,` separator or its base64 payload is malformed.
pub fn decode_data_url(url: &Url) -> Result<Bytes> {
    let (header, payload) = url
        .path()
        .split_once(',')
        .ok_or_else(|| anyhow!("Malformed data url: missing ','"))?;
    let raw = urlencoding::decode_binary(payload.as_bytes());
    if header.to_ascii_lowercase().ends_with(";base64") {
        let compact: Vec<u8> = raw
            .iter()
            .copied()
            .filter(|byte| !byte.is_ascii_whitespace())
            .collect();
        let decoded = BASE64_STANDARD
            .decode(compact)
            .map_err(|err| anyhow!("Malformed base64 in data url: {err}"))?;
        Ok(Bytes::from(decoded))
    } else {
        Ok(Bytes::from(raw.into_owned()))
    }
}
