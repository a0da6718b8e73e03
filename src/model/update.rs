use serde::{Deserialize, Serialize};

use crate::error::UpgradeError;
use crate::plugin::manifest::PluginId;

/// A plugin with a newer version available, as reported by an update source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingUpdate {
    pub plugin_id: PluginId,
    pub current_version: String,
    pub new_version: String,
    /// `file://` URI or filesystem path of the package directory.
    pub package: String,
}

/// Result of one upgrade attempt. Only used for the immediate report.
#[derive(Debug)]
pub struct UpgradeOutcome {
    pub plugin_id: PluginId,
    pub error: Option<UpgradeError>,
}

impl UpgradeOutcome {
    pub fn succeeded(plugin_id: PluginId) -> Self {
        Self {
            plugin_id,
            error: None,
        }
    }

    pub fn failed(plugin_id: PluginId, error: UpgradeError) -> Self {
        Self {
            plugin_id,
            error: Some(error),
        }
    }

    pub fn success(&self) -> bool {
        self.error.is_none()
    }

    pub fn error_detail(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }
}
