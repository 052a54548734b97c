use std::time::Duration;

use serde::Deserialize;

use crate::{ConfigError, PROVIDER_ADDR_TTL, PeerId};

const DEFAULT_RECORD_TTL_SECS: u64 = 24 * 60 * 60;
const DEFAULT_QUERY_PAGE_LIMIT: u32 = 100;

/// Construction parameters for a `ProviderDirectory`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryConfig {
    /// This node's own peer id. Announcements from it are stored but never
    /// fed to the address cache.
    pub self_id: PeerId,
    /// Lifetime of a provider record, from the moment it is written.
    pub record_ttl: Duration,
    /// Page size requested from the store; does not cap the result size.
    pub query_page_limit: u32,
    /// Lifetime given to addresses learned from announcements.
    pub provider_addr_ttl: Duration,
    /// Drop records whose expiry has already passed while reading.
    pub filter_expired: bool,
}

impl DirectoryConfig {
    pub fn new(self_id: PeerId) -> Self {
        Self {
            self_id,
            record_ttl: Duration::from_secs(DEFAULT_RECORD_TTL_SECS),
            query_page_limit: DEFAULT_QUERY_PAGE_LIMIT,
            provider_addr_ttl: PROVIDER_ADDR_TTL,
            filter_expired: false,
        }
    }

    pub fn record_ttl(mut self, ttl: Duration) -> Self {
        self.record_ttl = ttl;
        self
    }

    pub fn query_page_limit(mut self, limit: u32) -> Self {
        self.query_page_limit = limit;
        self
    }

    pub fn provider_addr_ttl(mut self, ttl: Duration) -> Self {
        self.provider_addr_ttl = ttl;
        self
    }

    pub fn filter_expired(mut self, enabled: bool) -> Self {
        self.filter_expired = enabled;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.record_ttl.as_secs() == 0 {
            return Err(ConfigError::ZeroRecordTtl);
        }
        if self.query_page_limit == 0 {
            return Err(ConfigError::ZeroPageLimit);
        }
        Ok(())
    }

    /// Parse a JSON settings document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let settings: DirectorySettings =
            serde_json::from_str(json).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        settings.try_into()
    }
}

/// Serialized form of `DirectoryConfig`, with the peer id hex-encoded and
/// durations in seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DirectorySettings {
    pub self_id: String,
    pub record_ttl_secs: u64,
    pub query_page_limit: u32,
    pub provider_addr_ttl_secs: u64,
    pub filter_expired: bool,
}

impl Default for DirectorySettings {
    fn default() -> Self {
        Self {
            self_id: String::new(),
            record_ttl_secs: DEFAULT_RECORD_TTL_SECS,
            query_page_limit: DEFAULT_QUERY_PAGE_LIMIT,
            provider_addr_ttl_secs: PROVIDER_ADDR_TTL.as_secs(),
            filter_expired: false,
        }
    }
}

impl TryFrom<DirectorySettings> for DirectoryConfig {
    type Error = ConfigError;

    fn try_from(settings: DirectorySettings) -> Result<Self, Self::Error> {
        let self_id = PeerId::from_hex(&settings.self_id).map_err(ConfigError::InvalidSelfId)?;
        let config = DirectoryConfig {
            self_id,
            record_ttl: Duration::from_secs(settings.record_ttl_secs),
            query_page_limit: settings.query_page_limit,
            provider_addr_ttl: Duration::from_secs(settings.provider_addr_ttl_secs),
            filter_expired: settings.filter_expired,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DirectoryConfig::new(PeerId::from("self"));
        assert_eq!(config.provider_addr_ttl, Duration::from_secs(1800));
        assert_eq!(config.query_page_limit, 100);
        assert!(!config.filter_expired);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let base = DirectoryConfig::new(PeerId::from("self"));

        let sub_second = base.clone().record_ttl(Duration::from_millis(500));
        assert_eq!(sub_second.validate(), Err(ConfigError::ZeroRecordTtl));

        let no_pages = base.query_page_limit(0);
        assert_eq!(no_pages.validate(), Err(ConfigError::ZeroPageLimit));
    }

    #[test]
    fn test_from_json() {
        let config = DirectoryConfig::from_json(
            r#"{"self_id": "73656c66", "record_ttl_secs": 10, "filter_expired": true}"#,
        )
        .unwrap();

        assert_eq!(config.self_id, PeerId::from("self"));
        assert_eq!(config.record_ttl, Duration::from_secs(10));
        assert_eq!(config.query_page_limit, 100);
        assert!(config.filter_expired);
    }

    #[test]
    fn test_from_json_requires_self_id() {
        assert!(matches!(
            DirectoryConfig::from_json(r#"{"record_ttl_secs": 10}"#),
            Err(ConfigError::InvalidSelfId(_))
        ));
    }

    #[test]
    fn test_from_json_rejects_unknown_fields() {
        assert!(matches!(
            DirectoryConfig::from_json(r#"{"self_id": "00", "table": "x"}"#),
            Err(ConfigError::Invalid(_))
        ));
    }
}
