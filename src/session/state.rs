//! Claim session record and its lifecycle
//!
//! ```text
//! starting ──► running ──► stopped ──► completed
//!     │           │                        ▲
//!     │           └────────────────────────┤
//!     └──► stopped ────────────────────────┘
//!                 any ──► error (loop-fatal only)
//! ```
//!
//! A session is mutated only by its own scheduling loop, except for the stop
//! request which the supervisor applies. Readers take whole-record snapshots.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::session::error::SchedulerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Starting,
    Running,
    Stopped,
    Completed,
    Error,
}

impl SessionStatus {
    /// The loop has finished and nothing will change this session again
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Error)
    }

    /// Counts against the concurrent session limit
    pub fn is_active(&self) -> bool {
        matches!(self, SessionStatus::Starting | SessionStatus::Running)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionStatus::Starting => "starting",
            SessionStatus::Running => "running",
            SessionStatus::Stopped => "stopped",
            SessionStatus::Completed => "completed",
            SessionStatus::Error => "error",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimSession {
    pub id: String,
    /// First assigned faucet, or "all" when the session has none
    pub faucet_id: String,
    pub faucet_ids: Vec<String>,
    pub status: SessionStatus,
    pub proxy_ip: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Most recent successful claim across all faucets
    pub last_claim_at: Option<DateTime<Utc>>,
    /// Cooldown anchors, one per faucet
    pub last_claims: BTreeMap<String, DateTime<Utc>>,
    pub total_claims: u64,
    pub total_earnings: f64,
    pub error_count: u64,
    pub rounds_completed: u64,
    pub last_error: Option<String>,
}

/// Read-only copy handed to the supervisor and API layer
pub type SessionSnapshot = ClaimSession;

impl ClaimSession {
    pub fn new(id: String, faucet_ids: Vec<String>) -> Self {
        let faucet_id = faucet_ids
            .first()
            .cloned()
            .unwrap_or_else(|| "all".to_string());
        Self {
            id,
            faucet_id,
            faucet_ids,
            status: SessionStatus::Starting,
            proxy_ip: None,
            started_at: Utc::now(),
            ended_at: None,
            last_claim_at: None,
            last_claims: BTreeMap::new(),
            total_claims: 0,
            total_earnings: 0.0,
            error_count: 0,
            rounds_completed: 0,
            last_error: None,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.clone()
    }

    pub fn is_running(&self) -> bool {
        self.status == SessionStatus::Running
    }

    /// Move `starting` to `running`.
    ///
    /// Returns `Ok(false)` when a stop arrived before the loop got going.
    pub fn begin(&mut self) -> Result<bool, SchedulerError> {
        match self.status {
            SessionStatus::Starting => {
                self.status = SessionStatus::Running;
                Ok(true)
            }
            SessionStatus::Stopped => Ok(false),
            other => Err(SchedulerError::InvalidTransition {
                from: other.to_string(),
                to: SessionStatus::Running.to_string(),
            }),
        }
    }

    /// Apply an external stop request. Returns whether the status changed.
    pub fn request_stop(&mut self) -> bool {
        if self.status.is_active() {
            self.status = SessionStatus::Stopped;
            true
        } else {
            false
        }
    }

    /// Time left before `faucet_id` may be claimed again, if any
    pub fn cooldown_remaining(
        &self,
        faucet_id: &str,
        cooldown: Duration,
        now: DateTime<Utc>,
    ) -> Option<Duration> {
        let last = self.last_claims.get(faucet_id)?;
        let elapsed = now.signed_duration_since(*last);
        (elapsed < cooldown).then(|| cooldown - elapsed)
    }

    pub fn is_cooling_down(&self, faucet_id: &str, cooldown: Duration, now: DateTime<Utc>) -> bool {
        self.cooldown_remaining(faucet_id, cooldown, now).is_some()
    }

    pub fn assign_proxy(&mut self, proxy: Option<String>) {
        self.proxy_ip = proxy;
    }

    /// Fold a successful claim into the counters.
    ///
    /// Earnings never decrease: a negative or non-finite reward is refused.
    pub fn record_success(
        &mut self,
        faucet_id: &str,
        reward: f64,
        now: DateTime<Utc>,
    ) -> Result<(), SchedulerError> {
        if !reward.is_finite() || reward < 0.0 {
            return Err(SchedulerError::InvariantViolation(format!(
                "reward must be a non-negative finite amount, got {}",
                reward
            )));
        }
        self.total_claims += 1;
        self.total_earnings += reward;
        self.last_claim_at = Some(now);
        self.last_claims.insert(faucet_id.to_string(), now);
        Ok(())
    }

    /// Fold a failed claim into the counters. The cooldown anchor is untouched.
    pub fn record_failure(&mut self, detail: &str) {
        self.error_count += 1;
        self.last_error = Some(detail.to_string());
    }

    pub fn complete_round(&mut self) {
        self.rounds_completed += 1;
    }

    /// Final transition after the loop exits normally
    pub fn finish(&mut self) {
        if self.status != SessionStatus::Error {
            self.status = SessionStatus::Completed;
        }
        self.ended_at.get_or_insert_with(Utc::now);
    }

    /// Final transition after a loop-fatal error
    pub fn fail(&mut self, err: &SchedulerError) {
        self.status = SessionStatus::Error;
        self.last_error = Some(err.to_string());
        self.ended_at.get_or_insert_with(Utc::now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> ClaimSession {
        ClaimSession::new("s1".to_string(), vec!["a".to_string(), "b".to_string()])
    }

    #[test]
    fn test_new_session_defaults() {
        let s = session();
        assert_eq!(s.status, SessionStatus::Starting);
        assert_eq!(s.faucet_id, "a");
        assert_eq!(s.total_claims, 0);

        let empty = ClaimSession::new("s2".to_string(), Vec::new());
        assert_eq!(empty.faucet_id, "all");
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut s = session();
        assert_eq!(s.begin(), Ok(true));
        assert!(s.is_running());
        assert!(s.request_stop());
        assert_eq!(s.status, SessionStatus::Stopped);
        s.finish();
        assert_eq!(s.status, SessionStatus::Completed);
        assert!(s.ended_at.is_some());

        // Terminal sessions ignore stop requests and cannot restart
        assert!(!s.request_stop());
        assert!(s.begin().is_err());
    }

    #[test]
    fn test_stop_before_begin() {
        let mut s = session();
        assert!(s.request_stop());
        assert_eq!(s.begin(), Ok(false));
    }

    #[test]
    fn test_error_survives_finish() {
        let mut s = session();
        s.begin().unwrap();
        s.fail(&SchedulerError::InvariantViolation("boom".to_string()));
        s.finish();
        assert_eq!(s.status, SessionStatus::Error);
        assert!(s.last_error.as_deref().unwrap().contains("boom"));
    }

    #[test]
    fn test_cooldown_is_per_faucet() {
        let mut s = session();
        let now = Utc::now();
        s.record_success("a", 0.00005, now).unwrap();

        let cooldown = Duration::minutes(30);
        assert!(s.is_cooling_down("a", cooldown, now + Duration::minutes(10)));
        assert!(!s.is_cooling_down("a", cooldown, now + Duration::minutes(30)));
        assert!(!s.is_cooling_down("b", cooldown, now));
        assert_eq!(
            s.cooldown_remaining("a", cooldown, now + Duration::minutes(20)),
            Some(Duration::minutes(10))
        );
        assert!(!s.is_cooling_down("a", Duration::zero(), now));
    }

    #[test]
    fn test_failure_does_not_anchor_cooldown() {
        let mut s = session();
        s.record_failure("CAPTCHA solving failed");
        assert_eq!(s.error_count, 1);
        assert!(s.last_claims.is_empty());
        assert!(s.last_claim_at.is_none());
    }

    #[test]
    fn test_earnings_never_decrease() {
        let mut s = session();
        let now = Utc::now();
        s.record_success("a", 0.0001, now).unwrap();
        let before = s.total_earnings;

        assert!(s.record_success("a", -1.0, now).is_err());
        assert!(s.record_success("a", f64::NAN, now).is_err());
        assert!(s.record_success("a", f64::INFINITY, now).is_err());
        assert_eq!(s.total_earnings, before);
        assert_eq!(s.total_claims, 1);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&SessionStatus::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
    }
}
