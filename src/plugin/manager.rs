use std::collections::BTreeMap;
use std::path::Path;

use ignore::WalkBuilder;

use crate::plugin::manifest::{PluginId, PluginManifest};

#[derive(Debug, Clone)]
pub struct InstalledPlugin {
    pub id: PluginId,
    pub manifest: PluginManifest,
}

impl InstalledPlugin {
    pub fn display_name(&self) -> &str {
        &self.manifest.name
    }

    pub fn version(&self) -> &str {
        &self.manifest.version
    }
}

/// Installed plugins keyed by id, discovered from `plugins/<id>/plugin.toml`.
#[derive(Debug, Default)]
pub struct PluginManager {
    installed: BTreeMap<PluginId, InstalledPlugin>,
    errors: Vec<String>,
}

impl PluginManager {
    pub fn discover(plugins_dir: &Path) -> Self {
        let mut manager = Self::default();
        if !plugins_dir.is_dir() {
            tracing::debug!("plugins directory {} does not exist", plugins_dir.display());
            return manager;
        }

        let dirs = WalkBuilder::new(plugins_dir)
            .max_depth(Some(1))
            .standard_filters(false)
            .build()
            .flatten()
            .filter(|entry| entry.path() != plugins_dir)
            .filter(|entry| entry.file_type().is_some_and(|t| t.is_dir()));

        for entry in dirs {
            let Some(slug) = entry.file_name().to_str() else {
                continue;
            };
            if slug.starts_with('.') {
                continue;
            }

            match PluginManifest::read(entry.path()) {
                Ok(manifest) => {
                    let id = PluginId::new(slug);
                    manager
                        .installed
                        .insert(id.clone(), InstalledPlugin { id, manifest });
                }
                Err(err) => {
                    tracing::warn!("skipping plugin {slug}: {err}");
                    manager.errors.push(format!("plugin {slug}: {err}"));
                }
            }
        }

        manager
    }

    pub fn plugin_count(&self) -> usize {
        self.installed.len()
    }

    pub fn get(&self, id: &PluginId) -> Option<&InstalledPlugin> {
        self.installed.get(id)
    }

    /// Installed plugins in id order.
    pub fn iter(&self) -> impl Iterator<Item = &InstalledPlugin> {
        self.installed.values()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }
}
