use std::time::Duration;

use log::debug;
use reqwest::{Client, Proxy, StatusCode};
use url::Url;

use crate::error::{CuratorError, Result};

/// Default timeout for HTTP requests in seconds
const DEFAULT_TIMEOUT: u64 = 15;

#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Upstream proxy, e.g. "http://127.0.0.1:8080"
    pub proxy: Option<String>,
    pub timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            proxy: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT),
        }
    }
}

/// Fetches the body of `url`.
///
/// Anything other than `200 OK` is an error.
pub async fn web_get_async(url: &str, config: &HttpConfig) -> Result<String> {
    let mut client_builder = Client::builder()
        .timeout(config.timeout)
        .user_agent(concat!("subcurator/", env!("CARGO_PKG_VERSION")));

    if let Some(proxy) = config.proxy.as_deref().filter(|p| !p.is_empty()) {
        let proxy = Proxy::all(proxy)
            .map_err(|e| CuratorError::Network(format!("Failed to set proxy: {}", e)))?;
        client_builder = client_builder.proxy(proxy);
    }

    let client = client_builder
        .build()
        .map_err(|e| CuratorError::Network(format!("Failed to build HTTP client: {}", e)))?;

    debug!("GET {}", url);
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| CuratorError::Network(format!("Failed to send request to {}: {}", url, e)))?;

    if response.status() != StatusCode::OK {
        return Err(CuratorError::Network(format!(
            "Failed to fetch {}. Status code: {}",
            url,
            response.status()
        )));
    }

    response
        .text()
        .await
        .map_err(|e| CuratorError::Network(format!("Failed to read response body: {}", e)))
}

/// Blocking wrapper around [`web_get_async`] on a throwaway runtime.
pub fn web_get(url: &str, config: &HttpConfig) -> Result<String> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| CuratorError::io("http runtime", e))?;

    rt.block_on(web_get_async(url, config))
}

/// Derive a file stem from a subscription URL: the first two path segments
/// joined by `_`, e.g. `https://host/owner/repo/main/vmess.txt` -> `owner_repo`.
pub fn subscription_file_stem(url: &str) -> Result<String> {
    let parsed = Url::parse(url).map_err(|e| CuratorError::InvalidUrl(format!("{}: {}", url, e)))?;

    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();

    match segments.as_slice() {
        [first, second, ..] => Ok(format!("{}_{}", first, second)),
        _ => Err(CuratorError::InvalidUrl(format!(
            "{} does not contain enough path segments to name its output",
            url
        ))),
    }
}
