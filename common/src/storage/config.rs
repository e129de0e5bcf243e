//! Storage backend configuration.

use serde::{Deserialize, Serialize};

/// Selects and configures the key-value store backing a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StorageConfig {
    /// Process-local store, useful for tests and single-node tooling.
    InMemory {
        /// Expiration applied to puts that carry no expiration of their own.
        #[serde(default)]
        default_ttl_secs: Option<u64>,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::InMemory {
            default_ttl_secs: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_deserialize_in_memory_config() {
        // given
        let json = r#"{"type": "InMemory", "default_ttl_secs": 60}"#;

        // when
        let config: StorageConfig = serde_json::from_str(json).unwrap();

        // then
        assert_eq!(
            config,
            StorageConfig::InMemory {
                default_ttl_secs: Some(60)
            }
        );
    }

    #[test]
    fn should_default_ttl_to_none_when_omitted() {
        // when
        let config: StorageConfig = serde_json::from_str(r#"{"type": "InMemory"}"#).unwrap();

        // then
        assert_eq!(config, StorageConfig::default());
    }
}
