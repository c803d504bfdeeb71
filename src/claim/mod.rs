//! Claim execution against a single faucet

pub mod executor;
pub mod locator;

pub use executor::{
    ClaimExecutor, ClaimOutcome, HttpClaimExecutor, SimulatedClaimExecutor,
    default_success_indicators,
};
pub use locator::{ClaimForm, Element, FormMethod, Locator, claim_submission, find_element};
