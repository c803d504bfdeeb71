//! Proxy pool
//!
//! The pool holds an immutable snapshot of proxy addresses that is swapped
//! wholesale on refresh, so selection never observes a half-updated list.
//! Selection never blocks on an empty pool: it yields `None`, meaning a
//! direct connection.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::proxy::source::ProxySource;

/// How a session picks its proxy for the next claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxySelection {
    #[default]
    Random,
    RoundRobin,
}

impl std::str::FromStr for ProxySelection {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "random" => Ok(ProxySelection::Random),
            "round_robin" | "roundrobin" | "rotate" => Ok(ProxySelection::RoundRobin),
            other => Err(anyhow::anyhow!("Unknown proxy selection policy: {}", other)),
        }
    }
}

struct PoolState {
    proxies: Arc<Vec<String>>,
    last_refresh: Option<DateTime<Utc>>,
}

pub struct ProxyPool {
    state: RwLock<PoolState>,
    /// Round-robin cursor, kept in [0, len) while the pool is non-empty
    cursor: AtomicUsize,
}

impl ProxyPool {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(PoolState {
                proxies: Arc::new(Vec::new()),
                last_refresh: None,
            }),
            cursor: AtomicUsize::new(0),
        }
    }

    pub async fn from_proxies(proxies: Vec<String>) -> Self {
        let pool = Self::new();
        pool.replace(proxies).await;
        pool
    }

    /// Deduplicate keeping first occurrence order
    fn dedup(proxies: Vec<String>) -> Vec<String> {
        let mut seen = HashSet::new();
        proxies
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty() && seen.insert(p.clone()))
            .collect()
    }

    /// Swap in a new set of proxies, returning the new pool size
    pub async fn replace(&self, proxies: Vec<String>) -> usize {
        let proxies = Self::dedup(proxies);
        let count = proxies.len();

        let mut state = self.state.write().await;
        state.proxies = Arc::new(proxies);
        state.last_refresh = Some(Utc::now());
        self.cursor.store(0, Ordering::SeqCst);

        count
    }

    /// Refresh from an external source.
    ///
    /// Best effort: on failure, or when the source comes back empty, the
    /// existing pool is left exactly as it was and the error is returned.
    pub async fn refresh(&self, source: &dyn ProxySource) -> Result<usize> {
        let fetched = match source.fetch().await {
            Ok(fetched) => fetched,
            Err(e) => {
                error!(error = %e, "Error refreshing proxies, keeping existing pool");
                return Err(e);
            }
        };

        if fetched.is_empty() {
            warn!("Proxy source returned no proxies, keeping existing pool");
            return Err(anyhow::anyhow!("Proxy source returned no proxies"));
        }

        let count = self.replace(fetched).await;
        info!("Total proxies available: {}", count);
        Ok(count)
    }

    pub async fn random_pick(&self) -> Option<String> {
        let state = self.state.read().await;
        if state.proxies.is_empty() {
            return None;
        }
        let index = rand::thread_rng().gen_range(0..state.proxies.len());
        state.proxies.get(index).cloned()
    }

    pub async fn next_pick(&self) -> Option<String> {
        let state = self.state.read().await;
        let len = state.proxies.len();
        if len == 0 {
            return None;
        }
        // The read guard pins `len`; refresh resets the cursor under the write lock
        let index = self
            .cursor
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| Some((c + 1) % len))
            .unwrap_or(0);
        state.proxies.get(index % len).cloned()
    }

    pub async fn pick(&self, policy: ProxySelection) -> Option<String> {
        match policy {
            ProxySelection::Random => self.random_pick().await,
            ProxySelection::RoundRobin => self.next_pick().await,
        }
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.proxies.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn last_refresh(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.last_refresh
    }

    /// Current contents as a shared immutable snapshot
    pub async fn snapshot(&self) -> Arc<Vec<String>> {
        self.state.read().await.proxies.clone()
    }
}

impl Default for ProxyPool {
    fn default() -> Self {
        Self::new()
    }
}
