//! Per-session scheduling loop
//!
//! One loop drives one [`ClaimSession`]. Each round walks the session's
//! faucets in a fixed order, skipping disabled or unknown faucets and any
//! faucet still inside its cooldown, and makes one claim attempt per eligible
//! faucet with a randomized pause between attempts. Rounds are separated by a
//! fixed pause.
//!
//! Cooldowns are checked against the configured [`Clock`] when a faucet comes
//! up in the round, so a cooldown expiring mid-round is picked up on the next
//! one.
//!
//! Cancellation is cooperative. The executor call and both pauses race the
//! session's cancellation token, so a stop takes effect at the next of those
//! suspension points. An attempt abandoned by a stop is not counted.
//!
//! Single claim failures never end the loop. Only a broken invariant (or a
//! panic inside the loop) moves the session to `error`.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use rand::Rng;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::claim::{ClaimExecutor, ClaimOutcome};
use crate::faucet::{FaucetDefinition, FaucetRegistry};
use crate::proxy::{ProxyPool, ProxySelection};
use crate::session::error::SchedulerError;
use crate::session::state::{ClaimSession, SessionStatus};

/// Wall-clock source for cooldown checks and anchors
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Timing and reward parameters shared by every loop
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub min_claim_delay: Duration,
    pub max_claim_delay: Duration,
    pub round_delay: Duration,
    /// Upper bound on a single executor call
    pub claim_timeout: Duration,
    pub reward_min: f64,
    pub reward_max: f64,
    pub proxy_selection: ProxySelection,
    pub clock: Arc<dyn Clock>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_claim_delay: Duration::from_secs(10),
            max_claim_delay: Duration::from_secs(30),
            round_delay: Duration::from_secs(300), // 5 minutes between rounds
            claim_timeout: Duration::from_secs(60),
            reward_min: 0.00001,
            reward_max: 0.0001,
            proxy_selection: ProxySelection::Random,
            clock: Arc::new(SystemClock),
        }
    }
}

pub struct SchedulingLoop {
    session_id: String,
    session: Arc<RwLock<ClaimSession>>,
    registry: Arc<FaucetRegistry>,
    proxies: Arc<ProxyPool>,
    executor: Arc<dyn ClaimExecutor>,
    config: SchedulerConfig,
    cancel: CancellationToken,
}

impl SchedulingLoop {
    pub fn new(
        session_id: String,
        session: Arc<RwLock<ClaimSession>>,
        registry: Arc<FaucetRegistry>,
        proxies: Arc<ProxyPool>,
        executor: Arc<dyn ClaimExecutor>,
        config: SchedulerConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            session_id,
            session,
            registry,
            proxies,
            executor,
            config,
            cancel,
        }
    }

    /// Drive the session until it is stopped or fails, then record the
    /// terminal status. Returns that status.
    pub async fn run(self) -> SessionStatus {
        let span = info_span!("session", session_id = %self.session_id);
        async {
            let result = AssertUnwindSafe(self.drive()).catch_unwind().await;

            let mut session = self.session.write().await;
            match result {
                Ok(Ok(())) => {
                    session.finish();
                    info!(
                        claims = session.total_claims,
                        errors = session.error_count,
                        rounds = session.rounds_completed,
                        "Session completed"
                    );
                }
                Ok(Err(e)) => {
                    error!(error = %e, "Error in claiming session");
                    session.fail(&e);
                }
                Err(payload) => {
                    let e = SchedulerError::Panicked(panic_message(payload.as_ref()));
                    error!(error = %e, "Claiming session aborted");
                    session.fail(&e);
                }
            }
            session.status
        }
        .instrument(span)
        .await
    }

    async fn drive(&self) -> Result<(), SchedulerError> {
        let faucet_ids = {
            let mut session = self.session.write().await;
            if !session.begin()? {
                info!("Session stopped before it started");
                return Ok(());
            }
            session.faucet_ids.clone()
        };

        info!(faucets = faucet_ids.len(), "Session running");

        loop {
            for faucet_id in &faucet_ids {
                if !self.still_running().await? {
                    return Ok(());
                }

                let Some(faucet) = self.registry.get(faucet_id).await else {
                    debug!(faucet = %faucet_id, "Unknown faucet, skipping");
                    continue;
                };
                if !faucet.enabled {
                    debug!(faucet = %faucet_id, "Faucet disabled, skipping");
                    continue;
                }

                let remaining = self.session.read().await.cooldown_remaining(
                    &faucet.id,
                    faucet.cooldown(),
                    self.config.clock.now(),
                );
                if let Some(remaining) = remaining {
                    debug!(
                        faucet = %faucet.name,
                        remaining_secs = remaining.num_seconds(),
                        "Faucet cooling down"
                    );
                    continue;
                }

                let proxy = self.proxies.pick(self.config.proxy_selection).await;
                self.session.write().await.assign_proxy(proxy.clone());

                let outcome = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => {
                        info!(faucet = %faucet.name, "Stop requested, abandoning in-flight claim");
                        return Ok(());
                    }
                    outcome = self.attempt(&faucet, proxy.as_deref()) => outcome,
                };

                self.apply_outcome(&faucet, outcome).await?;

                if !self.pause(self.claim_delay()).await {
                    return Ok(());
                }
            }

            self.session.write().await.complete_round();

            if !self.pause(self.config.round_delay).await {
                return Ok(());
            }
        }
    }

    async fn attempt(&self, faucet: &FaucetDefinition, proxy: Option<&str>) -> ClaimOutcome {
        match tokio::time::timeout(
            self.config.claim_timeout,
            self.executor.attempt_claim(faucet, proxy),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => ClaimOutcome::failed(
                format!(
                    "Claim timed out after {}s",
                    self.config.claim_timeout.as_secs()
                ),
                proxy,
            ),
        }
    }

    async fn apply_outcome(
        &self,
        faucet: &FaucetDefinition,
        outcome: ClaimOutcome,
    ) -> Result<(), SchedulerError> {
        let reward = self.draw_reward();
        let mut session = self.session.write().await;
        if outcome.success {
            session.record_success(&faucet.id, reward, self.config.clock.now())?;
            info!(faucet = %faucet.name, reward, "Successful claim");
        } else {
            session.record_failure(&outcome.detail);
            warn!(faucet = %faucet.name, detail = %outcome.detail, "Failed claim");
        }
        Ok(())
    }

    /// Status check at the top of every faucet step
    async fn still_running(&self) -> Result<bool, SchedulerError> {
        match self.session.read().await.status {
            SessionStatus::Running => Ok(true),
            SessionStatus::Stopped => Ok(false),
            SessionStatus::Completed | SessionStatus::Error => {
                Err(SchedulerError::SessionDetached {
                    session_id: self.session_id.clone(),
                })
            }
            SessionStatus::Starting => Err(SchedulerError::InvariantViolation(
                "session returned to starting after the loop began".to_string(),
            )),
        }
    }

    /// Sleep unless cancelled first. Returns false on cancellation.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    fn claim_delay(&self) -> Duration {
        let min = self.config.min_claim_delay;
        let max = self.config.max_claim_delay;
        if max <= min {
            return min;
        }
        rand::thread_rng().gen_range(min..=max)
    }

    fn draw_reward(&self) -> f64 {
        let (min, max) = (self.config.reward_min, self.config.reward_max);
        if max <= min {
            return min;
        }
        rand::thread_rng().gen_range(min..=max)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingExecutor {
        calls: AtomicUsize,
        success: bool,
    }

    impl CountingExecutor {
        fn new(success: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                success,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ClaimExecutor for CountingExecutor {
        async fn attempt_claim(
            &self,
            _faucet: &FaucetDefinition,
            proxy: Option<&str>,
        ) -> ClaimOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.success {
                ClaimOutcome::succeeded("ok", proxy)
            } else {
                ClaimOutcome::failed("no success indicator", proxy)
            }
        }
    }

    struct HangingExecutor;

    #[async_trait]
    impl ClaimExecutor for HangingExecutor {
        async fn attempt_claim(
            &self,
            _faucet: &FaucetDefinition,
            _proxy: Option<&str>,
        ) -> ClaimOutcome {
            std::future::pending::<ClaimOutcome>().await
        }
    }

    struct PanickingExecutor;

    #[async_trait]
    impl ClaimExecutor for PanickingExecutor {
        async fn attempt_claim(
            &self,
            _faucet: &FaucetDefinition,
            _proxy: Option<&str>,
        ) -> ClaimOutcome {
            panic!("executor exploded");
        }
    }

    fn faucet(id: &str, cooldown_minutes: u32, enabled: bool) -> FaucetDefinition {
        FaucetDefinition {
            id: id.to_string(),
            name: id.to_uppercase(),
            url: format!("https://{}.example.com/", id),
            claim_selector: "#claim".to_string(),
            captcha_selector: None,
            cooldown_minutes,
            enabled,
        }
    }

    fn fast_config() -> SchedulerConfig {
        SchedulerConfig {
            min_claim_delay: Duration::from_secs(1),
            max_claim_delay: Duration::from_secs(1),
            round_delay: Duration::from_secs(10),
            claim_timeout: Duration::from_secs(5),
            ..SchedulerConfig::default()
        }
    }

    struct Harness {
        session: Arc<RwLock<ClaimSession>>,
        cancel: CancellationToken,
        handle: tokio::task::JoinHandle<SessionStatus>,
    }

    async fn spawn_loop(
        faucets: Vec<FaucetDefinition>,
        executor: Arc<dyn ClaimExecutor>,
        proxies: Vec<String>,
    ) -> Harness {
        spawn_loop_with(fast_config(), faucets, executor, proxies).await
    }

    async fn spawn_loop_with(
        config: SchedulerConfig,
        faucets: Vec<FaucetDefinition>,
        executor: Arc<dyn ClaimExecutor>,
        proxies: Vec<String>,
    ) -> Harness {
        let registry = Arc::new(FaucetRegistry::new());
        let ids: Vec<String> = faucets.iter().map(|f| f.id.clone()).collect();
        for f in faucets {
            registry.add(f).await.unwrap();
        }
        let pool = Arc::new(ProxyPool::from_proxies(proxies).await);
        let session = Arc::new(RwLock::new(ClaimSession::new("test".to_string(), ids)));
        let cancel = CancellationToken::new();

        let scheduler = SchedulingLoop::new(
            "test".to_string(),
            session.clone(),
            registry,
            pool,
            executor,
            config,
            cancel.clone(),
        );
        let handle = tokio::spawn(scheduler.run());

        Harness {
            session,
            cancel,
            handle,
        }
    }

    /// Wall clock that follows tokio's paused test time
    #[derive(Debug)]
    struct PausedClock {
        origin: tokio::time::Instant,
        start: DateTime<Utc>,
    }

    impl PausedClock {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                origin: tokio::time::Instant::now(),
                start: Utc::now(),
            })
        }
    }

    impl Clock for PausedClock {
        fn now(&self) -> DateTime<Utc> {
            let elapsed = tokio::time::Instant::now().duration_since(self.origin);
            self.start + chrono::Duration::from_std(elapsed).unwrap()
        }
    }

    async fn stop(harness: &Harness) {
        harness.session.write().await.request_stop();
        harness.cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_faucet_is_claimed_again_once_cooldown_expires() {
        let executor = CountingExecutor::new(true);
        let config = SchedulerConfig {
            clock: PausedClock::new(),
            ..fast_config()
        };
        let harness =
            spawn_loop_with(config, vec![faucet("a", 1, true)], executor.clone(), Vec::new())
                .await;

        // Claim at t=0, then gated rounds at t=11, 21 .. 51
        tokio::time::sleep(Duration::from_secs(58)).await;
        assert_eq!(executor.calls(), 1);
        let first = harness.session.read().await.last_claims["a"];

        // Round at t=61 is past the 60s cooldown
        tokio::time::sleep(Duration::from_secs(7)).await;
        assert_eq!(executor.calls(), 2);
        let second = harness.session.read().await.last_claims["a"];
        assert!(second - first >= chrono::Duration::seconds(60));

        stop(&harness).await;
        assert_eq!(harness.handle.await.unwrap(), SessionStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_claims_once_per_round_without_cooldown() {
        let executor = CountingExecutor::new(true);
        let harness = spawn_loop(vec![faucet("a", 0, true)], executor.clone(), Vec::new()).await;

        // Each round: claim, 1s claim delay, 10s round delay
        tokio::time::sleep(Duration::from_millis(3 * 11_000 - 500)).await;
        stop(&harness).await;
        let status = harness.handle.await.unwrap();

        assert_eq!(status, SessionStatus::Completed);
        let session = harness.session.read().await;
        assert_eq!(executor.calls(), 3);
        assert_eq!(session.total_claims, 3);
        assert_eq!(session.error_count, 0);
        assert!(session.total_earnings > 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_blocks_repeat_claims() {
        let executor = CountingExecutor::new(true);
        let harness = spawn_loop(vec![faucet("a", 60, true)], executor.clone(), Vec::new()).await;

        tokio::time::sleep(Duration::from_secs(120)).await;
        stop(&harness).await;
        harness.handle.await.unwrap();

        let session = harness.session.read().await;
        assert_eq!(executor.calls(), 1);
        assert_eq!(session.total_claims, 1);
        assert!(session.rounds_completed > 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_count_errors_and_keep_retrying() {
        let executor = CountingExecutor::new(false);
        let harness = spawn_loop(vec![faucet("a", 60, true)], executor.clone(), Vec::new()).await;

        tokio::time::sleep(Duration::from_secs(25)).await;
        stop(&harness).await;
        harness.handle.await.unwrap();

        let session = harness.session.read().await;
        // A failure does not anchor the cooldown, so every round retries
        assert_eq!(session.error_count, 3);
        assert_eq!(session.total_claims, 0);
        assert!(session.last_claims.is_empty());
        assert_eq!(session.last_error.as_deref(), Some("no success indicator"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_faucet_never_invoked() {
        let executor = CountingExecutor::new(true);
        let harness = spawn_loop(vec![faucet("b", 0, false)], executor.clone(), Vec::new()).await;

        tokio::time::sleep(Duration::from_secs(60)).await;
        stop(&harness).await;
        harness.handle.await.unwrap();

        let session = harness.session.read().await;
        assert_eq!(executor.calls(), 0);
        assert_eq!(session.total_claims, 0);
        assert_eq!(session.error_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_interrupts_round_delay() {
        let executor = CountingExecutor::new(true);
        let harness = spawn_loop(vec![faucet("a", 0, true)], executor.clone(), Vec::new()).await;

        // Inside the first round delay
        tokio::time::sleep(Duration::from_secs(3)).await;
        let started = tokio::time::Instant::now();
        stop(&harness).await;
        let status = harness.handle.await.unwrap();

        assert_eq!(status, SessionStatus::Completed);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(executor.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_abandons_hanging_claim() {
        let harness = spawn_loop(
            vec![faucet("a", 0, true)],
            Arc::new(HangingExecutor),
            Vec::new(),
        )
        .await;

        tokio::time::sleep(Duration::from_secs(2)).await;
        stop(&harness).await;
        let status = harness.handle.await.unwrap();

        assert_eq!(status, SessionStatus::Completed);
        let session = harness.session.read().await;
        assert_eq!(session.total_claims, 0);
        assert_eq!(session.error_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_claim_timeout_counts_as_failure() {
        let harness = spawn_loop(
            vec![faucet("a", 0, true)],
            Arc::new(HangingExecutor),
            Vec::new(),
        )
        .await;

        // 5s timeout, then 1s delay
        tokio::time::sleep(Duration::from_millis(5_500)).await;
        stop(&harness).await;
        harness.handle.await.unwrap();

        let session = harness.session.read().await;
        assert_eq!(session.error_count, 1);
        assert!(session.last_error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_executor_moves_session_to_error() {
        let harness = spawn_loop(
            vec![faucet("a", 0, true)],
            Arc::new(PanickingExecutor),
            Vec::new(),
        )
        .await;

        let status = harness.handle.await.unwrap();
        assert_eq!(status, SessionStatus::Error);
        let session = harness.session.read().await;
        assert!(session.last_error.as_deref().unwrap().contains("executor exploded"));
        assert!(session.ended_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_detached_session_is_loop_fatal() {
        let executor = CountingExecutor::new(true);
        let harness = spawn_loop(vec![faucet("a", 0, true)], executor, Vec::new()).await;

        tokio::time::sleep(Duration::from_secs(3)).await;
        // Someone else finalizes the record behind the loop's back
        harness.session.write().await.finish();
        let status = harness.handle.await.unwrap();

        assert_eq!(status, SessionStatus::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_records_assigned_proxy() {
        let executor = CountingExecutor::new(true);
        let harness = spawn_loop(
            vec![faucet("a", 0, true)],
            executor,
            vec!["http://10.0.0.1:3128".to_string()],
        )
        .await;

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(
            harness.session.read().await.proxy_ip.as_deref(),
            Some("http://10.0.0.1:3128")
        );
        stop(&harness).await;
        harness.handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_before_start_completes_immediately() {
        let session = Arc::new(RwLock::new(ClaimSession::new(
            "early".to_string(),
            vec!["a".to_string()],
        )));
        session.write().await.request_stop();

        let scheduler = SchedulingLoop::new(
            "early".to_string(),
            session.clone(),
            Arc::new(FaucetRegistry::new()),
            Arc::new(ProxyPool::new()),
            CountingExecutor::new(true),
            fast_config(),
            CancellationToken::new(),
        );

        assert_eq!(scheduler.run().await, SessionStatus::Completed);
    }

    #[test]
    fn test_delay_and_reward_bounds() {
        let scheduler = SchedulingLoop::new(
            "bounds".to_string(),
            Arc::new(RwLock::new(ClaimSession::new("bounds".to_string(), Vec::new()))),
            Arc::new(FaucetRegistry::new()),
            Arc::new(ProxyPool::new()),
            CountingExecutor::new(true),
            SchedulerConfig::default(),
            CancellationToken::new(),
        );

        for _ in 0..50 {
            let delay = scheduler.claim_delay();
            assert!(delay >= Duration::from_secs(10) && delay <= Duration::from_secs(30));
            let reward = scheduler.draw_reward();
            assert!((0.00001..=0.0001).contains(&reward));
        }
    }
}
