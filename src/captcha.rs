//! CAPTCHA solving
//!
//! The solver is an oracle: given the bytes of a challenge it either hands
//! back a token or gives up. `Unsolved` is an ordinary outcome, not an error.
//! The simulated solver stands in for a real recognition backend and succeeds
//! with a declared probability.

use async_trait::async_trait;
use rand::Rng;
use rand::seq::SliceRandom;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptchaSolution {
    Solved(String),
    Unsolved,
}

impl CaptchaSolution {
    pub fn is_solved(&self) -> bool {
        matches!(self, CaptchaSolution::Solved(_))
    }
}

#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    async fn solve(&self, challenge: &[u8]) -> CaptchaSolution;

    /// Share of attempts solved so far, for solvers that keep count
    fn success_rate(&self) -> Option<f64> {
        None
    }
}

const MOCK_TOKENS: &[&str] = &["ABCD", "1234", "XYZ9", "AB12", "9876"];

pub struct SimulatedCaptchaSolver {
    success_probability: f64,
    attempts: AtomicU64,
    successes: AtomicU64,
}

impl SimulatedCaptchaSolver {
    pub fn new(success_probability: f64) -> Self {
        Self {
            success_probability: if success_probability.is_nan() {
                0.0
            } else {
                success_probability.clamp(0.0, 1.0)
            },
            attempts: AtomicU64::new(0),
            successes: AtomicU64::new(0),
        }
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    pub fn successes(&self) -> u64 {
        self.successes.load(Ordering::Relaxed)
    }
}

impl Default for SimulatedCaptchaSolver {
    fn default() -> Self {
        Self::new(0.85)
    }
}

#[async_trait]
impl CaptchaSolver for SimulatedCaptchaSolver {
    async fn solve(&self, challenge: &[u8]) -> CaptchaSolution {
        if challenge.is_empty() {
            return CaptchaSolution::Unsolved;
        }

        self.attempts.fetch_add(1, Ordering::Relaxed);

        let solution = {
            let mut rng = rand::thread_rng();
            if rng.gen_bool(self.success_probability) {
                MOCK_TOKENS.choose(&mut rng).map(|t| t.to_string())
            } else {
                None
            }
        };

        match solution {
            Some(token) => {
                self.successes.fetch_add(1, Ordering::Relaxed);
                debug!(bytes = challenge.len(), "Challenge solved");
                CaptchaSolution::Solved(token)
            }
            None => CaptchaSolution::Unsolved,
        }
    }

    /// `None` before the first attempt
    fn success_rate(&self) -> Option<f64> {
        let attempts = self.attempts();
        (attempts > 0).then(|| self.successes() as f64 / attempts as f64)
    }
}
