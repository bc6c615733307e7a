use anyhow::{bail, Context, Result};
use reqwest::Url;
use std::time::Duration;

/// Base address used when the operator does not configure one.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3000";

/// Connection settings for the external scanning service.
///
/// Built once at startup and handed to the API client; nothing reads the base
/// address from a global.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    base_url: Url,
    request_timeout: Option<Duration>,
}

impl ApiConfig {
    /// Parse and validate a base address. Only `http` and `https` with a host are accepted.
    pub fn new(base_url: &str) -> Result<Self> {
        let trimmed = base_url.trim().trim_end_matches('/');
        let url = Url::parse(trimmed)
            .with_context(|| format!("invalid API base URL: {base_url}"))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("unsupported API base URL scheme: {}", url.scheme());
        }
        if url.host_str().is_none() {
            bail!("API base URL has no host: {base_url}");
        }
        Ok(Self {
            base_url: url,
            request_timeout: None,
        })
    }

    /// Bound every request to `timeout`. Unset by default: requests wait as long as the service does.
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }

    /// Absolute URL for a fixed API path such as `/network/info`.
    ///
    /// The path is appended, so a prefix on the base address (`http://host/scanner`) survives.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let joined = format!("{}/{}", base, path.trim_start_matches('/'));
        Url::parse(&joined).with_context(|| format!("invalid endpoint URL: {joined}"))
    }
}
