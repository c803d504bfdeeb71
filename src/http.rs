use anyhow::{Context, Result};
use reqwest::header::{ACCEPT, REFERER};
use reqwest::{Client, Proxy, RequestBuilder};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::claim::{ClaimForm, FormMethod};

/// Limits applied to every outbound fetch
#[derive(Debug, Clone)]
pub struct HttpFetchConfig {
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Maximum response size in bytes
    pub max_response_size: usize,
    pub user_agent: String,
}

impl Default for HttpFetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_response_size: 2 * 1024 * 1024, // 2MB max
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/124.0 Safari/537.36"
                .to_string(),
        }
    }
}

/// HTTP client wrapper that can route a request through a proxy
#[derive(Clone)]
pub struct HttpFetcher {
    direct: Client,
    config: HttpFetchConfig,
}

impl HttpFetcher {
    pub fn new(config: HttpFetchConfig) -> Result<Self> {
        let direct = Self::builder(&config)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { direct, config })
    }

    fn builder(config: &HttpFetchConfig) -> reqwest::ClientBuilder {
        // No ambient proxies: requests go direct unless a pool proxy is given
        Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .no_proxy()
    }

    /// Only absolute http/https URLs are fetched
    fn validate_url(url: &str) -> Result<Url> {
        let parsed = Url::parse(url).context("Invalid URL format")?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(anyhow::anyhow!(
                "Unsupported URL scheme {}: {}",
                parsed.scheme(),
                url
            ));
        }
        if parsed.host_str().is_none() {
            return Err(anyhow::anyhow!("URL must have a valid host: {}", url));
        }
        Ok(parsed)
    }

    fn client_for(&self, proxy: Option<&str>) -> Result<Client> {
        match proxy {
            None => Ok(self.direct.clone()),
            Some(address) => {
                let proxy = Proxy::all(address)
                    .with_context(|| format!("Invalid proxy address: {}", address))?;
                Self::builder(&self.config)
                    .proxy(proxy)
                    .build()
                    .context("Failed to create proxied HTTP client")
            }
        }
    }

    /// GET a URL as text, optionally through a proxy
    pub async fn fetch_text(&self, url: &str, proxy: Option<&str>) -> Result<String> {
        let validated_url = Self::validate_url(url)?;
        let client = self.client_for(proxy)?;

        debug!(url = %validated_url, proxied = proxy.is_some(), "Fetching");

        let request = client
            .get(validated_url.as_str())
            .header(ACCEPT, "text/html, text/plain, */*");
        self.read_text(request).await
    }

    /// Submit `form` as the page at `page_url` would, returning the reply text
    pub async fn submit_form(
        &self,
        page_url: &str,
        form: &ClaimForm,
        proxy: Option<&str>,
    ) -> Result<String> {
        let page = Self::validate_url(page_url)?;
        let target = match form.action.as_deref() {
            Some(action) => page
                .join(action)
                .with_context(|| format!("Invalid form action: {}", action))?,
            None => page.clone(),
        };
        let target = Self::validate_url(target.as_str())?;
        let client = self.client_for(proxy)?;

        debug!(
            url = %target,
            method = ?form.method,
            fields = form.fields.len(),
            proxied = proxy.is_some(),
            "Submitting form"
        );

        let request = match form.method {
            FormMethod::Get => client.get(target.as_str()).query(&form.fields),
            FormMethod::Post => client.post(target.as_str()).form(&form.fields),
        };
        let request = request
            .header(ACCEPT, "text/html, text/plain, */*")
            .header(REFERER, page.as_str());
        self.read_text(request).await
    }

    async fn read_text(&self, request: RequestBuilder) -> Result<String> {
        let mut response = request
            .send()
            .await
            .context("Failed to send HTTP request")?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow::anyhow!(
                "HTTP request failed with status {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            ));
        }

        let limit = self.config.max_response_size;
        let content_length = response.content_length().unwrap_or(0);
        if content_length > limit as u64 {
            return Err(anyhow::anyhow!(
                "Response too large: {} bytes (max: {})",
                content_length,
                limit
            ));
        }

        // Bodies without a length are cut off as soon as they pass the limit
        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .context("Failed to read response body")?
        {
            if body.len() + chunk.len() > limit {
                return Err(anyhow::anyhow!(
                    "Response body too large: more than {} bytes",
                    limit
                ));
            }
            body.extend_from_slice(&chunk);
        }

        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}
