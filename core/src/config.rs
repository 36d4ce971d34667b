use crate::override_engine::OverrideMode;
use serde::{Deserialize, Serialize};

/// Default simulation token lifetime: one working day.
pub const DEFAULT_SIMULATION_TTL_SECS: i64 = 8 * 60 * 60;

/// Process-level settings for the margin engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminConfig {
    /// HMAC key for simulation tokens. Must be kept out of client reach.
    pub signing_secret: String,
    #[serde(default = "default_ttl")]
    pub simulation_ttl_secs: i64,
    /// Redistribution mode used when a request does not name one.
    #[serde(default)]
    pub default_mode: OverrideMode,
}

fn default_ttl() -> i64 {
    DEFAULT_SIMULATION_TTL_SECS
}

impl AdminConfig {
    /// Load from a JSON file.
    /// In tests, use AdminConfig::default_test().
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: AdminConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        if config.signing_secret.len() < 16 {
            anyhow::bail!("{path}: signingSecret must be at least 16 bytes");
        }
        if config.simulation_ttl_secs <= 0 {
            anyhow::bail!("{path}: simulationTtlSecs must be positive");
        }
        Ok(config)
    }

    /// Config with hardcoded defaults for use in unit tests.
    pub fn default_test() -> Self {
        Self {
            signing_secret:      "test-signing-secret-0123456789".into(),
            simulation_ttl_secs: DEFAULT_SIMULATION_TTL_SECS,
            default_mode:        OverrideMode::Proportional,
        }
    }
}

/// Per-edit redistribution settings.
///
/// `core_edit` is always filled in by the engine from the resolved role;
/// a caller-supplied value is never honoured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideOptions {
    #[serde(default)]
    pub mode:      OverrideMode,
    #[serde(default, skip_deserializing)]
    pub core_edit: bool,
}

impl OverrideOptions {
    pub fn with_mode(mode: OverrideMode) -> Self {
        Self { mode, core_edit: false }
    }
}
