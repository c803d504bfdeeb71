//! Faucet registry
//!
//! Holds the faucet definitions known to the orchestrator. Definitions are
//! kept in insertion order with a hash index for lookup by identifier.
//! Identifiers are unique: adding a definition whose id is already taken is
//! rejected, never overwritten.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{info, warn};
use url::Url;

use crate::faucet::catalog::default_faucets;

fn default_cooldown_minutes() -> u32 {
    60
}

fn default_enabled() -> bool {
    true
}

/// A claimable reward endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaucetDefinition {
    pub id: String,
    pub name: String,
    pub url: String,
    /// Locator of the element that triggers a claim (`#id`, `.class` or tag)
    pub claim_selector: String,
    /// Locator of the challenge element, if the faucet shows one
    #[serde(default)]
    pub captcha_selector: Option<String>,
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl FaucetDefinition {
    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.cooldown_minutes))
    }

    /// Check the definition is well formed before it enters the registry
    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.id.trim().is_empty() {
            return Err(RegistryError::Invalid("faucet id cannot be empty".to_string()));
        }
        if self.claim_selector.trim().is_empty() {
            return Err(RegistryError::Invalid(format!(
                "faucet {} has an empty claim selector",
                self.id
            )));
        }
        let parsed = Url::parse(&self.url).map_err(|e| {
            RegistryError::Invalid(format!("faucet {} has an invalid url: {}", self.id, e))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(RegistryError::Invalid(format!(
                "faucet {} url must be http or https, got {}",
                self.id,
                parsed.scheme()
            )));
        }
        Ok(())
    }
}

/// Errors raised by registry mutations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A faucet with this identifier is already registered
    AlreadyExists(String),
    /// The definition failed validation
    Invalid(String),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::AlreadyExists(id) => write!(f, "Faucet already exists: {}", id),
            RegistryError::Invalid(reason) => write!(f, "Invalid faucet definition: {}", reason),
        }
    }
}

impl std::error::Error for RegistryError {}

#[derive(Default)]
struct RegistryInner {
    faucets: Vec<FaucetDefinition>,
    index: HashMap<String, usize>,
}

pub struct FaucetRegistry {
    inner: RwLock<RegistryInner>,
}

impl FaucetRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    /// Registry preloaded with the built-in catalogue
    pub async fn with_defaults() -> Self {
        let registry = Self::new();
        let mut loaded = 0usize;
        for faucet in default_faucets() {
            let id = faucet.id.clone();
            match registry.add(faucet).await {
                Ok(()) => loaded += 1,
                Err(e) => warn!(faucet = %id, error = %e, "Skipping catalogue entry"),
            }
        }
        info!("Loaded {} faucets from the built-in catalogue", loaded);
        registry
    }

    pub async fn list(&self) -> Vec<FaucetDefinition> {
        self.inner.read().await.faucets.clone()
    }

    pub async fn get(&self, id: &str) -> Option<FaucetDefinition> {
        let inner = self.inner.read().await;
        inner.index.get(id).map(|&i| inner.faucets[i].clone())
    }

    pub async fn add(&self, faucet: FaucetDefinition) -> Result<(), RegistryError> {
        faucet.validate()?;

        let mut inner = self.inner.write().await;
        if inner.index.contains_key(&faucet.id) {
            return Err(RegistryError::AlreadyExists(faucet.id));
        }

        let position = inner.faucets.len();
        inner.index.insert(faucet.id.clone(), position);
        inner.faucets.push(faucet);
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.faucets.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Identifiers of enabled faucets, in registry order
    pub async fn enabled_ids(&self) -> Vec<String> {
        self.inner
            .read()
            .await
            .faucets
            .iter()
            .filter(|f| f.enabled)
            .map(|f| f.id.clone())
            .collect()
    }
}

impl Default for FaucetRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn faucet(id: &str, enabled: bool) -> FaucetDefinition {
        FaucetDefinition {
            id: id.to_string(),
            name: format!("Faucet {}", id),
            url: format!("https://{}.example.com/", id),
            claim_selector: "#claim".to_string(),
            captcha_selector: None,
            cooldown_minutes: 30,
            enabled,
        }
    }

    #[tokio::test]
    async fn test_add_and_get() {
        let registry = FaucetRegistry::new();
        registry.add(faucet("alpha", true)).await.unwrap();

        let found = registry.get("alpha").await.unwrap();
        assert_eq!(found.name, "Faucet alpha");
        assert!(registry.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_rejected_and_size_unchanged() {
        let registry = FaucetRegistry::new();
        registry.add(faucet("alpha", true)).await.unwrap();

        let mut replacement = faucet("alpha", false);
        replacement.name = "Impostor".to_string();
        let result = registry.add(replacement).await;

        assert_eq!(result, Err(RegistryError::AlreadyExists("alpha".to_string())));
        assert_eq!(registry.len().await, 1);
        assert_eq!(registry.get("alpha").await.unwrap().name, "Faucet alpha");
    }

    #[tokio::test]
    async fn test_list_preserves_insertion_order() {
        let registry = FaucetRegistry::new();
        for id in ["charlie", "alpha", "bravo"] {
            registry.add(faucet(id, true)).await.unwrap();
        }

        let ids: Vec<_> = registry.list().await.into_iter().map(|f| f.id).collect();
        assert_eq!(ids, vec!["charlie", "alpha", "bravo"]);
    }

    #[tokio::test]
    async fn test_enabled_ids_skips_disabled() {
        let registry = FaucetRegistry::new();
        registry.add(faucet("on", true)).await.unwrap();
        registry.add(faucet("off", false)).await.unwrap();

        assert_eq!(registry.enabled_ids().await, vec!["on".to_string()]);
    }

    #[test]
    fn test_validation() {
        assert!(faucet("ok", true).validate().is_ok());

        let mut bad = faucet("", true);
        assert!(matches!(bad.validate(), Err(RegistryError::Invalid(_))));

        bad = faucet("ftp", true);
        bad.url = "ftp://files.example.com".to_string();
        assert!(matches!(bad.validate(), Err(RegistryError::Invalid(_))));

        bad = faucet("noselector", true);
        bad.claim_selector = "  ".to_string();
        assert!(matches!(bad.validate(), Err(RegistryError::Invalid(_))));
    }

    #[test]
    fn test_deserialize_applies_defaults() {
        let json = r##"{"id":"x","name":"X","url":"https://x.example.com","claim_selector":"#go"}"##;
        let parsed: FaucetDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.cooldown_minutes, 60);
        assert!(parsed.enabled);
        assert!(parsed.captcha_selector.is_none());
    }

    #[tokio::test]
    async fn test_with_defaults_loads_unique_catalogue() {
        let registry = FaucetRegistry::with_defaults().await;
        assert_eq!(registry.len().await, default_faucets().len());
    }
}
