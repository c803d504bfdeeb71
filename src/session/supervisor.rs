//! Session Supervisor - Main Orchestrator
//!
//! Creates and stops claim sessions, owns their scheduling loops, and rolls
//! their counters up into aggregate statistics. Sessions are kept for the
//! life of the process, in the order they were started.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::claim::ClaimExecutor;
use crate::faucet::FaucetRegistry;
use crate::proxy::{ProxyPool, ProxySource};
use crate::session::error::SupervisorError;
use crate::session::scheduler::{SchedulerConfig, SchedulingLoop};
use crate::session::state::{ClaimSession, SessionSnapshot, SessionStatus};

/// How long `shutdown` waits for loops to wind down
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub max_concurrent_sessions: usize,
    pub scheduler: SchedulerConfig,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sessions: 10,
            scheduler: SchedulerConfig::default(),
        }
    }
}

/// Totals across every tracked session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub active_sessions: usize,
    pub tracked_sessions: usize,
    pub total_claims: u64,
    pub total_errors: u64,
    pub total_earnings: f64,
    pub proxy_count: usize,
    pub faucet_count: usize,
    pub last_proxy_refresh: Option<DateTime<Utc>>,
    /// Share of CAPTCHA challenges solved, once any were attempted
    pub captcha_success_rate: Option<f64>,
}

struct SessionEntry {
    session: Arc<RwLock<ClaimSession>>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<SessionStatus>>,
}

#[derive(Default)]
struct SessionTable {
    order: Vec<String>,
    entries: HashMap<String, SessionEntry>,
}

impl SessionTable {
    fn ordered(&self) -> impl Iterator<Item = &SessionEntry> {
        self.order.iter().filter_map(|id| self.entries.get(id))
    }
}

pub struct SessionSupervisor {
    registry: Arc<FaucetRegistry>,
    proxies: Arc<ProxyPool>,
    proxy_source: Arc<dyn ProxySource>,
    executor: Arc<dyn ClaimExecutor>,
    config: SupervisorConfig,

    sessions: RwLock<SessionTable>,

    /// Parent of every session token
    shutdown: CancellationToken,
}

impl SessionSupervisor {
    pub fn new(
        registry: Arc<FaucetRegistry>,
        proxies: Arc<ProxyPool>,
        proxy_source: Arc<dyn ProxySource>,
        executor: Arc<dyn ClaimExecutor>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            registry,
            proxies,
            proxy_source,
            executor,
            config,
            sessions: RwLock::new(SessionTable::default()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn faucets(&self) -> &Arc<FaucetRegistry> {
        &self.registry
    }

    pub fn proxies(&self) -> &Arc<ProxyPool> {
        &self.proxies
    }

    /// Token cancelled once `shutdown` runs. Background tasks watch it.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Start a new session over `faucet_ids`, or over every enabled faucet
    /// when none are given.
    pub async fn start(
        &self,
        faucet_ids: Option<Vec<String>>,
    ) -> Result<SessionSnapshot, SupervisorError> {
        let faucet_ids = match faucet_ids {
            Some(ids) if !ids.is_empty() => dedup_in_order(ids),
            _ => self.registry.enabled_ids().await,
        };
        // Explicit ids may name faucets registered later
        if faucet_ids.is_empty() && self.registry.is_empty().await {
            return Err(SupervisorError::NoFaucets);
        }

        // Capacity check and insert happen under the same write lock
        let mut table = self.sessions.write().await;

        let mut live = 0;
        for entry in table.entries.values() {
            if !entry.session.read().await.status.is_terminal() {
                live += 1;
            }
        }
        if live >= self.config.max_concurrent_sessions {
            warn!(
                limit = self.config.max_concurrent_sessions,
                "Rejecting session start, concurrent limit reached"
            );
            return Err(SupervisorError::CapacityReached {
                limit: self.config.max_concurrent_sessions,
            });
        }

        let session_id = Uuid::new_v4().to_string();
        let session = ClaimSession::new(session_id.clone(), faucet_ids);
        let snapshot = session.snapshot();
        let session = Arc::new(RwLock::new(session));
        let cancel = self.shutdown.child_token();

        let scheduler = SchedulingLoop::new(
            session_id.clone(),
            session.clone(),
            self.registry.clone(),
            self.proxies.clone(),
            self.executor.clone(),
            self.config.scheduler.clone(),
            cancel.clone(),
        );
        let handle = tokio::spawn(scheduler.run());

        table.order.push(session_id.clone());
        table.entries.insert(
            session_id.clone(),
            SessionEntry {
                session,
                cancel,
                handle: Some(handle),
            },
        );

        info!(
            session_id = %session_id,
            faucets = snapshot.faucet_ids.len(),
            "Started claiming session"
        );
        Ok(snapshot)
    }

    /// Request a stop. Terminal sessions are returned unchanged.
    pub async fn stop(&self, session_id: &str) -> Result<SessionSnapshot, SupervisorError> {
        let table = self.sessions.read().await;
        let entry = table
            .entries
            .get(session_id)
            .ok_or_else(|| SupervisorError::NotFound(session_id.to_string()))?;

        let mut session = entry.session.write().await;
        if session.request_stop() {
            entry.cancel.cancel();
            info!(session_id = %session_id, "Stopped claiming session");
        }
        Ok(session.snapshot())
    }

    pub async fn snapshot(&self, session_id: &str) -> Result<SessionSnapshot, SupervisorError> {
        let table = self.sessions.read().await;
        let entry = table
            .entries
            .get(session_id)
            .ok_or_else(|| SupervisorError::NotFound(session_id.to_string()))?;
        let snapshot = entry.session.read().await.snapshot();
        Ok(snapshot)
    }

    /// Every tracked session, oldest first
    pub async fn list_all(&self) -> Vec<SessionSnapshot> {
        let table = self.sessions.read().await;
        let mut snapshots = Vec::with_capacity(table.order.len());
        for entry in table.ordered() {
            snapshots.push(entry.session.read().await.snapshot());
        }
        snapshots
    }

    pub async fn aggregate_stats(&self) -> AggregateStats {
        let sessions = self.list_all().await;

        AggregateStats {
            active_sessions: sessions.iter().filter(|s| s.status.is_active()).count(),
            tracked_sessions: sessions.len(),
            total_claims: sessions.iter().map(|s| s.total_claims).sum(),
            total_errors: sessions.iter().map(|s| s.error_count).sum(),
            total_earnings: sessions.iter().map(|s| s.total_earnings).sum(),
            proxy_count: self.proxies.len().await,
            faucet_count: self.registry.len().await,
            last_proxy_refresh: self.proxies.last_refresh().await,
            captcha_success_rate: self.executor.captcha_success_rate(),
        }
    }

    /// Number of sessions in `starting` or `running`
    pub async fn active_count(&self) -> usize {
        let table = self.sessions.read().await;
        let mut count = 0;
        for entry in table.ordered() {
            if entry.session.read().await.status.is_active() {
                count += 1;
            }
        }
        count
    }

    /// Pull a fresh proxy list. A failed refresh leaves the pool as it was.
    pub async fn refresh_proxies(&self) -> Result<usize> {
        self.proxies.refresh(self.proxy_source.as_ref()).await
    }

    /// Stop every live session and wait for the loops to finish
    pub async fn shutdown(&self) {
        let handles = {
            let mut table = self.sessions.write().await;
            let mut handles = Vec::new();
            for entry in table.entries.values_mut() {
                entry.session.write().await.request_stop();
                if let Some(handle) = entry.handle.take() {
                    handles.push(handle);
                }
            }
            handles
        };

        self.shutdown.cancel();
        info!(sessions = handles.len(), "Shutting down claiming sessions");

        let drained = tokio::time::timeout(SHUTDOWN_GRACE, futures::future::join_all(handles)).await;
        if drained.is_err() {
            warn!("Some claiming sessions did not stop within the grace period");
        }
    }
}

fn dedup_in_order(ids: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}
