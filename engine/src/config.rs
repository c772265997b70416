//! Engine configuration.

use crate::{error::Result, transport::is_success, Error, ResponsePolicy, NO_CONNECTION};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Engine-wide options. Every field has a default, so `{}` is a valid
/// configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Period of the background sync loop in milliseconds; 0 disables it
    pub auto_sync_ms: u64,
    /// Start a sync cycle after every applied mutation
    pub push_sync: bool,
    /// Use the local store at all
    pub allow_persistence: bool,
    /// Talk to the remote at all
    pub allow_remote: bool,
    /// Tell observers about restored data before pulling
    pub early_data_return: bool,
    /// Drop and re-pull a collection whose remote shape changed
    pub reset_on_schema_drift: bool,
    /// Snapshots written under another version are discarded
    pub store_version: u32,
    pub responses: ResponsePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            auto_sync_ms: 0,
            push_sync: true,
            allow_persistence: true,
            allow_remote: true,
            early_data_return: false,
            reset_on_schema_drift: true,
            store_version: 1,
            responses: ResponsePolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject response code sets that contradict each other or the fixed
    /// meanings of success and no-connection.
    pub fn validate(&self) -> Result<()> {
        let responses = &self.responses;
        if let Some(code) = responses.retry_codes.intersection(&responses.replace_codes).next() {
            return Err(Error::InvalidConfig(format!(
                "status {code} is both a retry and a replace code"
            )));
        }
        let reserved = responses
            .retry_codes
            .iter()
            .chain(responses.replace_codes.iter())
            .find(|&&code| code == NO_CONNECTION || is_success(code));
        if let Some(code) = reserved {
            return Err(Error::InvalidConfig(format!(
                "status {code} cannot be configured as a failure"
            )));
        }
        Ok(())
    }

    pub fn auto_sync_interval(&self) -> Option<Duration> {
        (self.auto_sync_ms > 0).then(|| Duration::from_millis(self.auto_sync_ms))
    }

    pub fn with_auto_sync(mut self, period: Duration) -> Self {
        self.auto_sync_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_push_sync(mut self, enabled: bool) -> Self {
        self.push_sync = enabled;
        self
    }

    pub fn with_persistence(mut self, enabled: bool) -> Self {
        self.allow_persistence = enabled;
        self
    }

    pub fn with_remote(mut self, enabled: bool) -> Self {
        self.allow_remote = enabled;
        self
    }

    pub fn with_early_data_return(mut self, enabled: bool) -> Self {
        self.early_data_return = enabled;
        self
    }

    pub fn with_schema_drift_reset(mut self, enabled: bool) -> Self {
        self.reset_on_schema_drift = enabled;
        self
    }

    pub fn with_store_version(mut self, version: u32) -> Self {
        self.store_version = version;
        self
    }

    pub fn with_max_retry(mut self, max_retry: u32) -> Self {
        self.responses.max_retry = max_retry;
        self
    }

    pub fn with_responses(mut self, responses: ResponsePolicy) -> Self {
        self.responses = responses;
        self
    }
}
