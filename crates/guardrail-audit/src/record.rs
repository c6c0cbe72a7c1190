//! Local deployment record.
//!
//! After a resource is created its id, name, region, ARN, and creation time
//! are written to a small JSON file. A later run reads it back to find the
//! resource again instead of creating a duplicate. Writing is best effort:
//! the deployment has already happened, so a failed write only warns.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use guardrail_contracts::{
    config::GuardrailConfig,
    error::{GuardrailError, GuardrailResult},
    lifecycle::ResourceHandle,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub resource_id: String,
    pub name: String,
    pub region: String,
    pub created_at: DateTime<Utc>,
    pub arn: String,
}

impl DeploymentRecord {
    pub fn from_handle(handle: &ResourceHandle, region: &str) -> Self {
        Self {
            resource_id: handle.id.clone(),
            name: handle.name.clone(),
            region: region.to_string(),
            created_at: Utc::now(),
            arn: handle.arn.clone(),
        }
    }
}

/// Reads and writes the deployment record at one path.
#[derive(Debug, Clone)]
pub struct RecordStore {
    path: PathBuf,
}

impl RecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_config(config: &GuardrailConfig) -> Self {
        Self::new(config.record_path.clone())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, record: &DeploymentRecord) -> GuardrailResult<()> {
        let json = serde_json::to_string_pretty(record).map_err(|e| GuardrailError::Config {
            reason: format!("failed to serialize deployment record: {}", e),
        })?;
        std::fs::write(&self.path, json).map_err(|e| GuardrailError::Config {
            reason: format!(
                "failed to write deployment record '{}': {}",
                self.path.display(),
                e
            ),
        })?;
        debug!(path = %self.path.display(), resource_id = %record.resource_id, "deployment record saved");
        Ok(())
    }

    /// Save, logging instead of failing. Returns whether the write succeeded.
    pub fn save_best_effort(&self, record: &DeploymentRecord) -> bool {
        match self.save(record) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "deployment record not saved");
                false
            }
        }
    }

    /// The stored record, or `None` when no file exists yet.
    pub fn load(&self) -> GuardrailResult<Option<DeploymentRecord>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(GuardrailError::Config {
                    reason: format!(
                        "failed to read deployment record '{}': {}",
                        self.path.display(),
                        e
                    ),
                })
            }
        };
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| GuardrailError::Config {
                reason: format!("failed to parse deployment record JSON: {}", e),
            })
    }
}
