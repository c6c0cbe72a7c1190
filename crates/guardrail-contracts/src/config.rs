//! Toolkit configuration.
//!
//! All settings live in one explicit `GuardrailConfig` that callers pass into
//! component constructors. Nothing reads process-wide environment state.
//! Every field has a documented default so a config file only needs to name
//! what it changes:
//!
//! ```toml
//! region = "eu-west-1"
//! kms_key_id = "alias/bedrock-guardrail-key"
//!
//! [poll]
//! max_attempts = 20
//! interval_secs = 3
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    error::{GuardrailError, GuardrailResult},
    remote::EncryptionContext,
};

/// Service name bound into every encryption context.
pub const ENCRYPTION_CONTEXT_SERVICE: &str = "bedrock-guardrails";

/// Upper bound the remote service accepts for `list` page sizes.
pub const MAX_LIST_RESULTS: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardrailConfig {
    /// Region of the remote services. Default `us-east-1`.
    pub region: String,

    /// Name used when the caller does not supply one.
    /// Default `BankingVoiceBotGuardrail`.
    pub base_name: String,

    /// Key the remote service encrypts the resource with. Default none.
    pub kms_key_id: Option<String>,

    /// Whether deployments must name an encryption key. Default `true`.
    pub require_encryption_key: bool,

    /// Key used to seal locally persisted sensitive state.
    /// Default `alias/bedrock-guardrail-key`.
    pub envelope_key_alias: String,

    /// Deployment environment, bound into the encryption context.
    /// Default `development`.
    pub environment: String,

    pub poll: PollSettings,

    pub read_retry: RetrySettings,

    /// Page size for `list`, capped at [`MAX_LIST_RESULTS`]. Default 50.
    pub list_max_results: u32,

    /// Where the local deployment record is written.
    /// Default `guardrail_details.json`.
    pub record_path: PathBuf,
}

/// Bounds for status polling. Defaults: 10 attempts, 5 seconds apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    pub max_attempts: u32,
    pub interval_secs: u64,
}

/// Transparent retry of idempotent reads. Defaults: 5 attempts, 200 ms apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            base_name: "BankingVoiceBotGuardrail".to_string(),
            kms_key_id: None,
            require_encryption_key: true,
            envelope_key_alias: "alias/bedrock-guardrail-key".to_string(),
            environment: "development".to_string(),
            poll: PollSettings::default(),
            read_retry: RetrySettings::default(),
            list_max_results: 50,
            record_path: PathBuf::from("guardrail_details.json"),
        }
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self { max_attempts: 10, interval_secs: 5 }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self { max_attempts: 5, backoff_ms: 200 }
    }
}

impl PollSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl RetrySettings {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

impl GuardrailConfig {
    /// Parse `s` as TOML. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> GuardrailResult<Self> {
        let config: GuardrailConfig = toml::from_str(s).map_err(|e| GuardrailError::Config {
            reason: format!("failed to parse configuration TOML: {}", e),
        })?;
        config.check()?;
        Ok(config)
    }

    /// Read and parse the TOML file at `path`.
    pub fn from_file(path: &Path) -> GuardrailResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| GuardrailError::Config {
            reason: format!("failed to read configuration file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    /// The context every locally sealed payload is bound to.
    pub fn encryption_context(&self) -> EncryptionContext {
        EncryptionContext::from([
            ("service".to_string(), ENCRYPTION_CONTEXT_SERVICE.to_string()),
            ("environment".to_string(), self.environment.clone()),
        ])
    }

    /// `list_max_results` clamped to what the service accepts.
    pub fn list_page_size(&self) -> u32 {
        self.list_max_results.clamp(1, MAX_LIST_RESULTS)
    }

    fn check(&self) -> GuardrailResult<()> {
        if self.poll.max_attempts == 0 {
            return Err(GuardrailError::Config {
                reason: "poll.max_attempts must be at least 1".to_string(),
            });
        }
        if self.read_retry.max_attempts == 0 {
            return Err(GuardrailError::Config {
                reason: "read_retry.max_attempts must be at least 1".to_string(),
            });
        }
        if self.base_name.trim().is_empty() {
            return Err(GuardrailError::Config {
                reason: "base_name must not be empty".to_string(),
            });
        }
        Ok(())
    }
}
