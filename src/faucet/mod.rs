//! Faucet definitions and the shared registry

pub mod catalog;
pub mod registry;

pub use catalog::default_faucets;
pub use registry::{FaucetDefinition, FaucetRegistry, RegistryError};
