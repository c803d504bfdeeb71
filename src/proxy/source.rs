//! Proxy sources
//!
//! A source supplies candidate proxy addresses. The HTTP source pulls
//! plain-text `host:port` listings from several upstream services; a failing
//! upstream is skipped, and the fetch only fails when every upstream did.

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};
use url::Url;

use crate::http::HttpFetcher;

#[async_trait]
pub trait ProxySource: Send + Sync {
    /// Fetch candidate proxy addresses. May contain duplicates.
    async fn fetch(&self) -> Result<Vec<String>>;
}

/// Default upstream listing services
pub fn default_proxy_sources() -> Vec<String> {
    vec![
        "https://api.proxyscrape.com/v2/?request=get&protocol=http&timeout=10000&country=all&ssl=all&anonymity=all".to_string(),
        "https://www.proxy-list.download/api/v1/get?type=http".to_string(),
    ]
}

/// Normalize one listing line into a proxy URL.
///
/// Lines without a scheme are treated as HTTP proxies. Lines that do not
/// carry both a host and a port are dropped.
pub fn parse_proxy_line(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    };

    let parsed = Url::parse(&candidate).ok()?;
    if !matches!(parsed.scheme(), "http" | "https" | "socks5" | "socks5h") {
        return None;
    }
    parsed.host_str()?;

    // Url::port() hides an explicit default port such as :80
    let has_port = parsed.port().is_some()
        || candidate
            .rsplit_once(':')
            .is_some_and(|(_, port)| port.trim_end_matches('/').parse::<u16>().is_ok());
    if !has_port {
        return None;
    }

    Some(candidate)
}

pub struct HttpProxySource {
    fetcher: HttpFetcher,
    upstreams: Vec<String>,
    per_source_limit: usize,
}

impl HttpProxySource {
    pub fn new(fetcher: HttpFetcher, upstreams: Vec<String>, per_source_limit: usize) -> Self {
        Self {
            fetcher,
            upstreams,
            per_source_limit,
        }
    }

    pub fn upstreams(&self) -> &[String] {
        &self.upstreams
    }
}

#[async_trait]
impl ProxySource for HttpProxySource {
    async fn fetch(&self) -> Result<Vec<String>> {
        let mut proxies = Vec::new();
        let mut failures = 0usize;

        for upstream in &self.upstreams {
            match self.fetcher.fetch_text(upstream, None).await {
                Ok(body) => {
                    let parsed: Vec<String> = body
                        .lines()
                        .filter_map(parse_proxy_line)
                        .take(self.per_source_limit)
                        .collect();
                    info!(upstream = %upstream, count = parsed.len(), "Fetched proxies");
                    proxies.extend(parsed);
                }
                Err(e) => {
                    failures += 1;
                    warn!(upstream = %upstream, error = %e, "Proxy upstream failed");
                }
            }
        }

        if failures == self.upstreams.len() {
            return Err(anyhow::anyhow!(
                "All {} proxy upstreams failed",
                self.upstreams.len()
            ));
        }

        Ok(proxies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpFetchConfig;

    #[test]
    fn test_parse_proxy_line() {
        assert_eq!(
            parse_proxy_line(" 10.1.2.3:8080 \r"),
            Some("http://10.1.2.3:8080".to_string())
        );
        assert_eq!(
            parse_proxy_line("socks5://proxy.example.net:1080"),
            Some("socks5://proxy.example.net:1080".to_string())
        );
        assert_eq!(
            parse_proxy_line("10.1.2.3:80"),
            Some("http://10.1.2.3:80".to_string())
        );
        assert_eq!(parse_proxy_line(""), None);
        assert_eq!(parse_proxy_line("# comment"), None);
        assert_eq!(parse_proxy_line("10.1.2.3"), None);
        assert_eq!(parse_proxy_line("ftp://10.1.2.3:21"), None);
    }

    #[tokio::test]
    async fn test_no_upstreams_is_a_failure() {
        let fetcher = HttpFetcher::new(HttpFetchConfig::default()).unwrap();
        let source = HttpProxySource::new(fetcher, Vec::new(), 10);
        assert!(source.fetch().await.is_err());
    }

    #[tokio::test]
    async fn test_unreachable_upstreams_fail() {
        let fetcher = HttpFetcher::new(HttpFetchConfig {
            timeout_secs: 1,
            ..HttpFetchConfig::default()
        })
        .unwrap();
        let source = HttpProxySource::new(fetcher, vec!["not-a-url".to_string()], 10);
        assert!(source.fetch().await.is_err());
    }
}
