//! Provisioning state hand-off between the identity stage and the grant stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::catalog::is_guid;
use crate::error::{ProvisioningError, Result};

pub const STATE_SCHEMA_VERSION: u32 = 1;
pub const DEFAULT_STATE_FILE: &str = "provisioning-state.json";

/// Record written by the identity stage. Re-running the identity stage
/// replaces it wholesale; nothing else writes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProvisioningState {
    pub schema_version: u32,
    pub application_id: String,
    pub object_id: String,
    pub tenant_id: String,
    pub display_name: String,
    pub certificate_name: String,
    pub certificate_thumbprint: String,
    pub execution_environment_name: String,
    pub execution_environment_resource_group: String,
    pub created_at: DateTime<Utc>,
}

/// File-backed store for [`ProvisioningState`].
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Write through a sibling temp file and rename it into place.
    pub fn save(&self, state: &ProvisioningState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let json = serde_json::to_string_pretty(state).map_err(|e| {
            ProvisioningError::StateMalformed {
                path: self.path.clone(),
                reason: e.to_string(),
            }
        })?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        info!(
            path = %self.path.display(),
            app_id = %state.application_id,
            "Provisioning state saved"
        );
        Ok(())
    }

    pub fn load(&self) -> Result<ProvisioningState> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ProvisioningError::StateMissing(self.path.clone()))
            }
            Err(e) => return Err(e.into()),
        };

        let value: Value = serde_json::from_str(&raw).map_err(|e| self.malformed(e))?;
        match value.get("SchemaVersion") {
            Some(Value::Number(n)) if n.as_u64() == Some(u64::from(STATE_SCHEMA_VERSION)) => {}
            found => {
                return Err(ProvisioningError::StateIncompatible {
                    path: self.path.clone(),
                    found: found.map_or_else(|| "none".to_string(), Value::to_string),
                    expected: STATE_SCHEMA_VERSION,
                })
            }
        }

        let state: ProvisioningState =
            serde_json::from_value(value).map_err(|e| self.malformed(e))?;
        if !is_guid(&state.application_id) {
            return Err(ProvisioningError::StateMalformed {
                path: self.path.clone(),
                reason: format!("ApplicationId '{}' is not a GUID", state.application_id),
            });
        }
        debug!(
            path = %self.path.display(),
            app_id = %state.application_id,
            "Provisioning state loaded"
        );
        Ok(state)
    }

    fn malformed(&self, err: serde_json::Error) -> ProvisioningError {
        ProvisioningError::StateMalformed {
            path: self.path.clone(),
            reason: err.to_string(),
        }
    }
}

/// Application the grant stages act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub application_id: String,
    /// Known when the state file was read; otherwise asked of the directory.
    pub tenant_id: Option<String>,
    pub display_name: Option<String>,
}

/// Pick the target application.
///
/// An explicit id always wins over the stored one. The state file is still
/// read for tenant and display name when it exists, and is required only
/// when no explicit id is given.
pub fn resolve_target(explicit_app_id: Option<&str>, store: &StateStore) -> Result<ResolvedTarget> {
    let explicit = match explicit_app_id.map(str::trim) {
        Some(id) if !is_guid(id) => {
            return Err(ProvisioningError::InvalidInput(format!(
                "application id '{}' is not a GUID",
                id
            )))
        }
        other => other.map(str::to_string),
    };

    let state = match store.load() {
        Ok(state) => Some(state),
        Err(ProvisioningError::StateMissing(_)) if explicit.is_some() => None,
        Err(e) if explicit.is_some() => {
            warn!(
                error = %e,
                "Ignoring unreadable provisioning state; using the explicit application id"
            );
            None
        }
        Err(e) => return Err(e),
    };

    match (explicit, state) {
        (Some(application_id), Some(state)) => {
            let same_app = state.application_id.eq_ignore_ascii_case(&application_id);
            Ok(ResolvedTarget {
                application_id,
                tenant_id: Some(state.tenant_id),
                display_name: same_app.then_some(state.display_name),
            })
        }
        (Some(application_id), None) => Ok(ResolvedTarget {
            application_id,
            tenant_id: None,
            display_name: None,
        }),
        (None, Some(state)) => Ok(ResolvedTarget {
            application_id: state.application_id,
            tenant_id: Some(state.tenant_id),
            display_name: Some(state.display_name),
        }),
        (None, None) => Err(ProvisioningError::StateMissing(store.path().to_path_buf())),
    }
}
