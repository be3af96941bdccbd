use crate::engine::aggregator::DEFAULT_FORMULA_VERSION;
use crate::error::{SettlementError, SettlementResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Tunables for [`crate::service::SettlementService`].
///
/// Every field has a default, so a config file only needs the values it
/// changes:
///
/// ```
/// use league_settlement::config::EngineConfig;
///
/// let config: EngineConfig = serde_json::from_str(r#"{ "batch_chunk_size": 4 }"#).unwrap();
/// assert_eq!(config.batch_chunk_size, 4);
/// assert_eq!(config.store_timeout_ms, 5000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound for any single store call.
    pub store_timeout_ms: u64,
    /// Rows updated concurrently during rate propagation.
    pub batch_chunk_size: usize,
    /// How long a FINAL settlement's breakdown stays cached. 0 disables caching.
    pub breakdown_cache_ttl_secs: u64,
    pub formula_version: String,
    pub attribute_agent_to_first_player: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store_timeout_ms: 5000,
            batch_chunk_size: 16,
            breakdown_cache_ttl_secs: 60,
            formula_version: DEFAULT_FORMULA_VERSION.to_string(),
            attribute_agent_to_first_player: true,
        }
    }
}

impl EngineConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> SettlementResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            SettlementError::validation(format!("cannot read config {}: {e}", path.display()))
        })?;
        let config: EngineConfig = serde_json::from_str(&text).map_err(|e| {
            SettlementError::validation(format!("invalid config {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SettlementResult<()> {
        if self.store_timeout_ms == 0 {
            return Err(SettlementError::validation("store_timeout_ms must be positive"));
        }
        if self.batch_chunk_size == 0 {
            return Err(SettlementError::validation("batch_chunk_size must be positive"));
        }
        if self.formula_version.trim().is_empty() {
            return Err(SettlementError::validation("formula_version must not be empty"));
        }
        Ok(())
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.breakdown_cache_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.store_timeout(), Duration::from_secs(5));
        assert!(config.attribute_agent_to_first_player);
    }

    #[test]
    fn test_zero_chunk_rejected() {
        let config = EngineConfig {
            batch_chunk_size: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(SettlementError::Validation(_))));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = EngineConfig {
            store_timeout_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = EngineConfig::from_json_file("/definitely/not/here.json").unwrap_err();
        assert!(err.to_string().contains("cannot read config"));
    }
}
