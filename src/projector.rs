use tracing::debug;

use crate::errors::{Result, SyncError};
use crate::types::AlertManagerConfig;

/// YAML document in the exact shape Mimir's Alertmanager accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectedDocument(String);

impl ProjectedDocument {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

/// Keeps only the configuration block of an `AlertManagerConfig`
///
/// Tenant ID, endpoint and object metadata are irrelevant to Mimir and are
/// dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigProjector;

impl ConfigProjector {
    pub fn new() -> Self {
        Self
    }

    /// Serialize `spec.config` of the resource
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Serialization`] if the configuration cannot be
    /// encoded as YAML.
    pub fn project(&self, resource: &AlertManagerConfig) -> Result<ProjectedDocument> {
        let document =
            serde_yaml::to_string(&resource.spec.config).map_err(SyncError::Serialization)?;

        debug!(bytes = document.len(), "Projected alertmanager configuration");
        Ok(ProjectedDocument(document))
    }
}
