//! Claim executors
//!
//! An executor performs one claim attempt against a faucet and reports the
//! outcome. Executors never fail the caller: every problem (unreachable page,
//! missing claim trigger, unsolved challenge) is folded into an unsuccessful
//! [`ClaimOutcome`] with a readable detail.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::captcha::{CaptchaSolution, CaptchaSolver};
use crate::claim::locator::{ClaimForm, Locator, claim_submission, find_element};
use crate::faucet::FaucetDefinition;
use crate::http::HttpFetcher;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimOutcome {
    pub success: bool,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
    pub proxy: Option<String>,
}

impl ClaimOutcome {
    pub fn succeeded(detail: impl Into<String>, proxy: Option<&str>) -> Self {
        Self {
            success: true,
            detail: detail.into(),
            timestamp: Utc::now(),
            proxy: proxy.map(str::to_string),
        }
    }

    pub fn failed(detail: impl Into<String>, proxy: Option<&str>) -> Self {
        Self {
            success: false,
            detail: detail.into(),
            timestamp: Utc::now(),
            proxy: proxy.map(str::to_string),
        }
    }
}

#[async_trait]
pub trait ClaimExecutor: Send + Sync {
    async fn attempt_claim(&self, faucet: &FaucetDefinition, proxy: Option<&str>) -> ClaimOutcome;

    /// Solver success rate, when claims go through a CAPTCHA solver
    fn captcha_success_rate(&self) -> Option<f64> {
        None
    }
}

pub fn default_success_indicators() -> Vec<String> {
    ["success", "claimed", "reward", "satoshi", "bitcoin", "earned"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Executor that claims over plain HTTP.
///
/// Loads the faucet page, answers a present challenge through the CAPTCHA
/// solver, submits what the claim trigger would submit, and looks for a
/// success indicator that the reply shows but the landing page did not.
pub struct HttpClaimExecutor {
    fetcher: HttpFetcher,
    solver: Arc<dyn CaptchaSolver>,
    captcha_solving_enabled: bool,
    success_indicators: Vec<String>,
}

impl HttpClaimExecutor {
    pub fn new(
        fetcher: HttpFetcher,
        solver: Arc<dyn CaptchaSolver>,
        captcha_solving_enabled: bool,
        success_indicators: Vec<String>,
    ) -> Self {
        Self {
            fetcher,
            solver,
            captcha_solving_enabled,
            success_indicators: success_indicators
                .into_iter()
                .map(|s| s.to_lowercase())
                .collect(),
        }
    }

    /// Build the claim submission for a fetched landing page, with the
    /// challenge answer filled in. An `Err` is the outcome to report instead.
    pub async fn prepare_claim(
        &self,
        faucet: &FaucetDefinition,
        page: &str,
        proxy: Option<&str>,
    ) -> Result<ClaimForm, ClaimOutcome> {
        let Some(trigger) = Locator::parse(&faucet.claim_selector) else {
            return Err(ClaimOutcome::failed("Invalid claim selector", proxy));
        };
        if trigger.find(page).is_none() {
            warn!(faucet = %faucet.name, "Claim button not found");
            return Err(ClaimOutcome::failed("Claim button not found", proxy));
        }
        let Some(mut form) = claim_submission(page, &trigger) else {
            warn!(faucet = %faucet.name, "Claim button submits nothing");
            return Err(ClaimOutcome::failed("Claim button submits nothing", proxy));
        };

        let challenge = faucet
            .captcha_selector
            .as_deref()
            .and_then(|selector| find_element(page, selector));

        if let Some(challenge) = challenge {
            if !self.captcha_solving_enabled {
                return Err(ClaimOutcome::failed(
                    "CAPTCHA present but solving disabled",
                    proxy,
                ));
            }
            let token = match self.solver.solve(challenge.raw.as_bytes()).await {
                CaptchaSolution::Solved(token) => token,
                CaptchaSolution::Unsolved => {
                    return Err(ClaimOutcome::failed("CAPTCHA solving failed", proxy));
                }
            };
            let Some(answer_field) = form.answer_field.clone() else {
                return Err(ClaimOutcome::failed("CAPTCHA answer field not found", proxy));
            };
            debug!(faucet = %faucet.name, field = %answer_field, "CAPTCHA solved");
            form.set_field(&answer_field, &token);
        }

        Ok(form)
    }

    /// Judge the reply to a claim submission against the landing page it
    /// came from
    pub fn judge_response(
        &self,
        faucet: &FaucetDefinition,
        landing: &str,
        reply: &str,
        proxy: Option<&str>,
    ) -> ClaimOutcome {
        let before = landing.to_lowercase();
        let after = reply.to_lowercase();
        match self.success_indicators.iter().find(|indicator| {
            after.contains(indicator.as_str()) && !before.contains(indicator.as_str())
        }) {
            Some(indicator) => ClaimOutcome::succeeded(
                format!("Claimed from {} ({})", faucet.name, indicator),
                proxy,
            ),
            None => ClaimOutcome::failed("No success indicator detected", proxy),
        }
    }
}

#[async_trait]
impl ClaimExecutor for HttpClaimExecutor {
    async fn attempt_claim(&self, faucet: &FaucetDefinition, proxy: Option<&str>) -> ClaimOutcome {
        let landing = match self.fetcher.fetch_text(&faucet.url, proxy).await {
            Ok(page) => page,
            Err(e) => {
                warn!(faucet = %faucet.name, error = %e, "Error loading faucet page");
                return ClaimOutcome::failed(format!("{:#}", e), proxy);
            }
        };

        let form = match self.prepare_claim(faucet, &landing, proxy).await {
            Ok(form) => form,
            Err(outcome) => return outcome,
        };

        match self.fetcher.submit_form(&faucet.url, &form, proxy).await {
            Ok(reply) => self.judge_response(faucet, &landing, &reply, proxy),
            Err(e) => {
                warn!(faucet = %faucet.name, error = %e, "Error submitting claim");
                ClaimOutcome::failed(format!("{:#}", e), proxy)
            }
        }
    }

    fn captcha_success_rate(&self) -> Option<f64> {
        self.solver.success_rate()
    }
}

/// Executor that succeeds with a fixed probability without touching the network
pub struct SimulatedClaimExecutor {
    success_probability: f64,
}

impl SimulatedClaimExecutor {
    pub fn new(success_probability: f64) -> Self {
        Self {
            success_probability: if success_probability.is_nan() {
                0.0
            } else {
                success_probability.clamp(0.0, 1.0)
            },
        }
    }
}

#[async_trait]
impl ClaimExecutor for SimulatedClaimExecutor {
    async fn attempt_claim(&self, faucet: &FaucetDefinition, proxy: Option<&str>) -> ClaimOutcome {
        let success = rand::thread_rng().gen_bool(self.success_probability);
        if success {
            ClaimOutcome::succeeded(format!("Simulated claim from {}", faucet.name), proxy)
        } else {
            ClaimOutcome::failed("Simulated claim rejected", proxy)
        }
    }
}
