use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::HostError;

pub const MANIFEST_FILE: &str = "plugin.toml";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginId(pub String);

impl PluginId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PluginManifest {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
}

impl PluginManifest {
    /// Read `plugin.toml` from a plugin's root directory.
    pub fn read(root_dir: &Path) -> Result<Self, HostError> {
        let manifest_path = root_dir.join(MANIFEST_FILE);
        if !manifest_path.is_file() {
            return Err(HostError::MissingManifest(manifest_path));
        }

        let raw = fs::read_to_string(&manifest_path)
            .map_err(|source| HostError::io(&manifest_path, source))?;

        toml::from_str::<PluginManifest>(&raw).map_err(|source| HostError::Parse {
            path: manifest_path,
            source,
        })
    }
}

/// Compares dotted version labels numerically, falling back to plain
/// inequality when either side has a non-numeric segment.
pub fn is_newer_version(installed: &str, candidate: &str) -> bool {
    let parse = |label: &str| -> Option<Vec<u64>> {
        label
            .trim()
            .trim_start_matches('v')
            .split('.')
            .map(|part| part.parse::<u64>().ok())
            .collect()
    };

    match (parse(installed), parse(candidate)) {
        (Some(mut current), Some(mut next)) => {
            let width = current.len().max(next.len());
            current.resize(width, 0);
            next.resize(width, 0);
            next > current
        }
        _ => installed.trim() != candidate.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_manifest() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(MANIFEST_FILE),
            "name = \"Akismet\"\nversion = \"3.9\"\nauthor = \"Automattic\"\nhomepage = \"x\"\n",
        )
        .unwrap();

        // Unknown keys are ignored.
        let manifest = PluginManifest::read(dir.path()).unwrap();
        assert_eq!(manifest.name, "Akismet");
        assert_eq!(manifest.version, "3.9");
        assert_eq!(manifest.author.as_deref(), Some("Automattic"));
        assert_eq!(manifest.description, None);
    }

    #[test]
    fn test_missing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        match PluginManifest::read(dir.path()) {
            Err(HostError::MissingManifest(path)) => assert!(path.ends_with(MANIFEST_FILE)),
            other => panic!("Expected MissingManifest, got {other:?}"),
        }
    }

    #[test]
    fn test_version_ordering() {
        assert!(is_newer_version("3.9", "4.0"));
        assert!(is_newer_version("1.2", "1.10"));
        assert!(is_newer_version("1.2", "1.2.1"));
        assert!(!is_newer_version("1.2.0", "1.2"));
        assert!(!is_newer_version("4.0", "3.9"));
        assert!(is_newer_version("1.0-beta", "1.0"));
        assert!(!is_newer_version("nightly", "nightly"));
    }
}
