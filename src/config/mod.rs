pub use crate::error::ConfigError;
use dashmap::DashMap;
use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

const PREFIX: &str = "HOOKLINE_";

/// Configuration service
#[derive(Clone, Default)]
pub struct ConfigService {
    config: Arc<DashMap<String, String>>,
}

impl ConfigService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every process environment variable
    pub fn from_env() -> Self {
        Self::from_pairs(env::vars())
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let service = Self::default();
        for (key, value) in pairs {
            service.config.insert(key.into(), value.into());
        }
        service
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.config.get(key).map(|v| v.clone())
    }

    pub fn set(&self, key: &str, value: &str) {
        self.config.insert(key.to_string(), value.to_string());
    }

    /// Parse a value, returning `Ok(None)` when the key is absent
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .map(Some)
                .map_err(|_| ConfigError::Invalid {
                    key: key.to_string(),
                    value: raw,
                }),
        }
    }
}

/// Typed engine settings
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on how long a dispatched unit may stay suspended
    pub request_timeout: Option<Duration>,
    /// Longest single blocking wait inside `EventLoop::run`
    pub max_poll_wait: Duration,
    pub log_phases: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            request_timeout: None,
            max_poll_wait: Duration::from_millis(50),
            log_phases: true,
        }
    }
}

impl EngineConfig {
    /// Read `HOOKLINE_*` keys, falling back to defaults for absent ones
    pub fn from_service(config: &ConfigService) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let request_timeout = config
            .get_parsed::<u64>(&format!("{PREFIX}REQUEST_TIMEOUT_MS"))?
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);

        let max_poll_wait = config
            .get_parsed::<u64>(&format!("{PREFIX}MAX_POLL_WAIT_MS"))?
            .map(Duration::from_millis)
            .unwrap_or(defaults.max_poll_wait);

        let log_phases = config
            .get_parsed::<bool>(&format!("{PREFIX}LOG_PHASES"))?
            .unwrap_or(defaults.log_phases);

        Ok(Self {
            request_timeout,
            max_poll_wait,
            log_phases,
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_service(&ConfigService::from_env())
    }
}
