use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/**
 * How long (milliseconds) after dispatching a submission further scans are rejected.
 */
pub const DEFAULT_COOLDOWN_MS: u64 = 5000;

/**
 * How long (milliseconds) a single order submission may take before it counts as failed.
 */
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 15000;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3000/api";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CooldownScope {
    /// While the cooldown runs, every code is rejected.
    #[default]
    Global,
    /// While the cooldown runs, only a repeat of the last accepted code is rejected.
    PerCode,
}

impl std::fmt::Display for CooldownScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let result = match self {
            CooldownScope::Global => "global",
            CooldownScope::PerCode => "perCode",
        };

        write!(f, "{}", result)
    }
}

impl std::str::FromStr for CooldownScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "global" => Ok(CooldownScope::Global),
            "percode" => Ok(CooldownScope::PerCode),
            _ => Err(format!("unknown cooldown scope {:?}, expected \"global\" or \"per-code\"", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub api_base_url: String,
    pub owner_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    pub cooldown_ms: u64,
    pub request_timeout_ms: u64,
    pub cooldown_scope: CooldownScope,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cooldown_ms == 0 {
            return Err(ConfigError::ZeroDuration { field: "cooldownMs" });
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::ZeroDuration { field: "requestTimeoutMs" });
        }
        Ok(())
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            owner_name: String::new(),
            auth_token: None,
            cooldown_ms: DEFAULT_COOLDOWN_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            cooldown_scope: CooldownScope::Global,
        }
    }
}
