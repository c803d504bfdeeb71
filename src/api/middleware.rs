//! Request middleware for the orchestrator API
//!
//! Provides:
//! - Rate limiting per IP
//! - Request body size limits
//! - Security headers
//! - Request logging with sanitization

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::config::OrchestratorConfig;

/// Settings shared by the middleware layers
#[derive(Debug, Clone)]
pub struct SecurityMiddlewareConfig {
    pub rate_limit_per_minute: u32,
    pub max_request_size: usize,
    pub log_requests: bool,
    /// Mask client addresses in logs
    pub sanitize_logs: bool,
    /// Take the client address from `X-Forwarded-For` (reverse proxy setups)
    pub trust_forwarded_for: bool,
}

impl Default for SecurityMiddlewareConfig {
    fn default() -> Self {
        Self {
            rate_limit_per_minute: 120,
            max_request_size: 64 * 1024, // 64KB
            log_requests: false,
            sanitize_logs: true,
            trust_forwarded_for: false,
        }
    }
}

impl From<&OrchestratorConfig> for SecurityMiddlewareConfig {
    fn from(config: &OrchestratorConfig) -> Self {
        Self {
            rate_limit_per_minute: config.security.rate_limit_per_minute,
            max_request_size: config.security.max_request_size,
            log_requests: config.logging.log_requests,
            sanitize_logs: config.logging.sanitize_logs,
            trust_forwarded_for: config.security.trust_forwarded_for,
        }
    }
}

/// Verdict for one request against its client's window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: u32,
    /// Seconds until the client's window resets
    pub reset_after: u64,
}

/// Fixed-window request counter per client address
#[derive(Debug)]
pub struct RateLimiter {
    windows: DashMap<IpAddr, (u32, Instant)>,
    limit: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            limit,
            window,
        }
    }

    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    /// Count one request from `client`
    pub fn check(&self, client: IpAddr) -> RateDecision {
        let now = Instant::now();
        let mut entry = self.windows.entry(client).or_insert((0, now));
        let (count, opened) = entry.value_mut();

        if now.duration_since(*opened) >= self.window {
            *count = 0;
            *opened = now;
        }
        let reset_after = self
            .window
            .saturating_sub(now.duration_since(*opened))
            .as_secs();

        if *count >= self.limit {
            return RateDecision {
                allowed: false,
                remaining: 0,
                reset_after,
            };
        }
        *count += 1;
        RateDecision {
            allowed: true,
            remaining: self.limit - *count,
            reset_after,
        }
    }

    /// Forget clients whose window closed a full window ago
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.windows
            .retain(|_, (_, opened)| now.duration_since(*opened) < self.window * 2);
    }

    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}

/// Shared state for the middleware layers
#[derive(Clone)]
pub struct SecurityState {
    pub config: SecurityMiddlewareConfig,
    pub rate_limiter: Arc<RateLimiter>,
}

impl SecurityState {
    pub fn new(config: SecurityMiddlewareConfig) -> Self {
        let rate_limiter = Arc::new(RateLimiter::per_minute(config.rate_limit_per_minute));
        Self {
            config,
            rate_limiter,
        }
    }

    /// Address the request is attributed to
    fn client_of(&self, headers: &HeaderMap, peer: SocketAddr) -> IpAddr {
        if self.config.trust_forwarded_for {
            let forwarded = headers
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .and_then(|first| first.trim().parse().ok());
            if let Some(ip) = forwarded {
                return ip;
            }
        }
        peer.ip()
    }

    fn loggable(&self, client: IpAddr) -> String {
        if self.config.sanitize_logs {
            mask_ip(client)
        } else {
            client.to_string()
        }
    }
}

/// Keep the network prefix of an address for logs
pub fn mask_ip(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, _, _] = v4.octets();
            format!("{}.{}.*.*", a, b)
        }
        IpAddr::V6(v6) => {
            let segments = v6.segments();
            format!("{:x}:{:x}:*", segments[0], segments[1])
        }
    }
}

fn rate_headers(headers: &mut HeaderMap, limit: u32, decision: RateDecision) {
    headers.insert("X-RateLimit-Limit", HeaderValue::from(limit));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(decision.remaining));
    headers.insert("X-RateLimit-Reset", HeaderValue::from(decision.reset_after));
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(state): State<SecurityState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    let client = state.client_of(&headers, peer);
    let decision = state.rate_limiter.check(client);
    let limit = state.config.rate_limit_per_minute;

    if !decision.allowed {
        warn!(
            client_ip = %state.loggable(client),
            path = %request.uri().path(),
            "Rate limit exceeded"
        );

        let mut response = StatusCode::TOO_MANY_REQUESTS.into_response();
        rate_headers(response.headers_mut(), limit, decision);
        response
            .headers_mut()
            .insert("Retry-After", HeaderValue::from(decision.reset_after));
        return Err(response);
    }

    let mut response = next.run(request).await;
    rate_headers(response.headers_mut(), limit, decision);
    Ok(response)
}

/// Security headers middleware
pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert(
        "X-Content-Type-Options",
        HeaderValue::from_static("nosniff"),
    );
    // JSON only, nothing to load
    headers.insert(
        "Content-Security-Policy",
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
    );
    headers.insert("Referrer-Policy", HeaderValue::from_static("no-referrer"));
    // Session counters change constantly
    headers.insert(
        "Cache-Control",
        HeaderValue::from_static("no-store, no-cache, must-revalidate"),
    );
    headers.remove("Server");

    response
}

/// Request logging middleware
pub async fn logging_middleware(
    State(state): State<SecurityState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    if !state.config.log_requests {
        return next.run(request).await;
    }

    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let client_ip = state.loggable(state.client_of(&headers, peer));

    let response = next.run(request).await;
    let duration_ms = start.elapsed().as_millis() as u64;
    let status = response.status().as_u16();

    if response.status().is_server_error() {
        error!(%method, %path, status, duration_ms, %client_ip, "Request failed");
    } else if response.status().is_client_error() {
        warn!(%method, %path, status, duration_ms, %client_ip, "Client error");
    } else {
        info!(%method, %path, status, duration_ms, %client_ip, "Request completed");
    }

    response
}

/// Request body size validation middleware
pub async fn body_size_middleware(
    State(state): State<SecurityState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let declared = headers
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());

    if let Some(length) = declared {
        if length > state.config.max_request_size {
            warn!(
                "Request body too large: {} bytes (max: {})",
                length, state.config.max_request_size
            );
            return Err(StatusCode::PAYLOAD_TOO_LARGE);
        }
    }

    Ok(next.run(request).await)
}
