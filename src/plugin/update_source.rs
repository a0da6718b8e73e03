use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::HostError;
use crate::model::update::PendingUpdate;
use crate::plugin::manager::PluginManager;
use crate::plugin::manifest::{PluginId, is_newer_version};

pub trait UpdateSource {
    /// Pending updates in listing order.
    fn list_pending(&mut self) -> Result<Vec<PendingUpdate>, HostError>;
    /// Drops cached knowledge so the next listing re-derives it.
    fn invalidate(&mut self) -> Result<(), HostError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    #[serde(default)]
    pending: Vec<PendingUpdate>,
}

/// The derived pending-update list on disk. An absent or empty file means
/// "not checked yet", so an up-to-date host is re-checked on every listing.
#[derive(Debug, Clone)]
pub struct UpdateCache {
    path: PathBuf,
}

impl UpdateCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<Vec<PendingUpdate>>, HostError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let raw =
            fs::read_to_string(&self.path).map_err(|source| HostError::io(&self.path, source))?;
        let file: CacheFile = toml::from_str(&raw).map_err(|source| HostError::Parse {
            path: self.path.clone(),
            source,
        })?;
        Ok(Some(file.pending).filter(|pending| !pending.is_empty()))
    }

    pub fn store(&self, pending: &[PendingUpdate]) -> Result<(), HostError> {
        let body = toml::to_string(&CacheFile {
            pending: pending.to_vec(),
        })
        .map_err(|source| HostError::Serialize {
            path: self.path.clone(),
            source,
        })?;
        fs::write(&self.path, body).map_err(|source| HostError::io(&self.path, source))
    }

    pub fn find(&self, id: &PluginId) -> Result<Option<PendingUpdate>, HostError> {
        Ok(self
            .load()?
            .and_then(|pending| pending.into_iter().find(|update| &update.plugin_id == id)))
    }

    /// Drops one entry, leaving the rest of the cache valid.
    pub fn remove(&self, id: &PluginId) -> Result<(), HostError> {
        let Some(mut pending) = self.load()? else {
            return Ok(());
        };
        pending.retain(|update| &update.plugin_id != id);
        if pending.is_empty() {
            self.clear()?;
            return Ok(());
        }
        self.store(&pending)
    }

    /// Returns whether a cache existed.
    pub fn clear(&self) -> Result<bool, HostError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(HostError::io(&self.path, source)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryEntry {
    pub id: PluginId,
    pub version: String,
    pub package: String,
}

#[derive(Debug, Default, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    plugin: Vec<RegistryEntry>,
}

/// Authoritative latest versions, `[[plugin]]` tables in a TOML file.
#[derive(Debug, Clone)]
pub struct Registry {
    path: PathBuf,
}

impl Registry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn entries(&self) -> Result<Vec<RegistryEntry>, HostError> {
        let raw =
            fs::read_to_string(&self.path).map_err(|source| HostError::io(&self.path, source))?;
        let file: RegistryFile = toml::from_str(&raw).map_err(|source| HostError::Parse {
            path: self.path.clone(),
            source,
        })?;
        Ok(file.plugin)
    }
}

/// Serves the cached list, re-checking the registry when the cache is gone.
#[derive(Debug, Clone)]
pub struct CachedUpdateSource {
    cache: UpdateCache,
    registry: Registry,
    plugins_dir: PathBuf,
}

impl CachedUpdateSource {
    pub fn new(cache: UpdateCache, registry: Registry, plugins_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache,
            registry,
            plugins_dir: plugins_dir.into(),
        }
    }

    /// Compares the registry against installed versions and rewrites the cache.
    pub fn refresh(&mut self) -> Result<Vec<PendingUpdate>, HostError> {
        let installed = PluginManager::discover(&self.plugins_dir);
        let mut pending = Vec::new();

        for entry in self.registry.entries()? {
            let Some(plugin) = installed.get(&entry.id) else {
                tracing::debug!(plugin = %entry.id, "registry entry is not installed");
                continue;
            };

            if is_newer_version(plugin.version(), &entry.version) {
                pending.push(PendingUpdate {
                    plugin_id: entry.id,
                    current_version: plugin.version().to_string(),
                    new_version: entry.version,
                    package: entry.package,
                });
            }
        }

        if pending.is_empty() {
            self.cache.clear()?;
        } else {
            self.cache.store(&pending)?;
        }
        tracing::info!(
            "update check found {} pending of {} installed",
            pending.len(),
            installed.plugin_count()
        );
        Ok(pending)
    }
}

impl UpdateSource for CachedUpdateSource {
    fn list_pending(&mut self) -> Result<Vec<PendingUpdate>, HostError> {
        match self.cache.load()? {
            Some(pending) => Ok(pending),
            None => self.refresh(),
        }
    }

    fn invalidate(&mut self) -> Result<(), HostError> {
        if self.cache.clear()? {
            tracing::info!("update cache {} invalidated", self.cache.path().display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn install(plugins: &Path, slug: &str, version: &str) {
        let dir = plugins.join(slug);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("plugin.toml"),
            format!("name = \"{slug}\"\nversion = \"{version}\"\n"),
        )
        .unwrap();
    }

    fn source_in(root: &Path) -> CachedUpdateSource {
        CachedUpdateSource::new(
            UpdateCache::new(root.join("update_plugins.toml")),
            Registry::new(root.join("registry.toml")),
            root.join("plugins"),
        )
    }

    fn write_registry(root: &Path) {
        std::fs::write(
            root.join("registry.toml"),
            r#"
[[plugin]]
id = "zeta"
version = "2.0"
package = "packages/zeta-2.0"

[[plugin]]
id = "akismet"
version = "4.0"
package = "file:///srv/packages/akismet-4.0"

[[plugin]]
id = "current"
version = "1.0"
package = "packages/current"

[[plugin]]
id = "not-installed"
version = "9.9"
package = "packages/nope"
"#,
        )
        .unwrap();
    }

    #[test]
    fn test_refresh_keeps_registry_order_and_skips_current() {
        let dir = tempfile::tempdir().unwrap();
        let plugins = dir.path().join("plugins");
        install(&plugins, "akismet", "3.9");
        install(&plugins, "zeta", "1.5");
        install(&plugins, "current", "1.0");
        write_registry(dir.path());

        let mut source = source_in(dir.path());
        let pending = source.list_pending().unwrap();
        let ids: Vec<&str> = pending.iter().map(|p| p.plugin_id.as_str()).collect();
        assert_eq!(ids, vec!["zeta", "akismet"]);
        assert_eq!(pending[1].current_version, "3.9");
        assert_eq!(pending[1].new_version, "4.0");
        assert!(dir.path().join("update_plugins.toml").exists());
    }

    #[test]
    fn test_cached_list_is_served_until_invalidated() {
        let dir = tempfile::tempdir().unwrap();
        let plugins = dir.path().join("plugins");
        install(&plugins, "akismet", "3.9");
        write_registry(dir.path());

        let mut source = source_in(dir.path());
        assert_eq!(source.list_pending().unwrap().len(), 1);

        // Registry moves on; cache still answers.
        std::fs::remove_file(dir.path().join("registry.toml")).unwrap();
        assert_eq!(source.list_pending().unwrap().len(), 1);

        source.invalidate().unwrap();
        assert!(!dir.path().join("update_plugins.toml").exists());
        assert!(source.list_pending().is_err());

        // A second invalidate has nothing to drop.
        source.invalidate().unwrap();
    }

    #[test]
    fn test_cache_remove_and_find() {
        let dir = tempfile::tempdir().unwrap();
        let cache = UpdateCache::new(dir.path().join("cache.toml"));
        let entry = |id: &str| PendingUpdate {
            plugin_id: PluginId::new(id),
            current_version: "1".into(),
            new_version: "2".into(),
            package: format!("packages/{id}"),
        };

        assert!(cache.find(&PluginId::new("a")).unwrap().is_none());
        cache.store(&[entry("a"), entry("b")]).unwrap();
        assert_eq!(cache.find(&PluginId::new("b")).unwrap(), Some(entry("b")));

        cache.remove(&PluginId::new("a")).unwrap();
        assert_eq!(cache.load().unwrap(), Some(vec![entry("b")]));
        cache.remove(&PluginId::new("b")).unwrap();
        assert!(!cache.path().exists());
        assert!(!cache.clear().unwrap());
    }

    #[test]
    fn test_empty_cache_counts_as_unchecked() {
        let dir = tempfile::tempdir().unwrap();
        let cache = UpdateCache::new(dir.path().join("cache.toml"));
        std::fs::write(cache.path(), "pending = []\n").unwrap();
        assert_eq!(cache.load().unwrap(), None);
    }

    #[test]
    fn test_up_to_date_check_leaves_no_cache_behind() {
        let dir = tempfile::tempdir().unwrap();
        let plugins = dir.path().join("plugins");
        install(&plugins, "current", "1.0");
        write_registry(dir.path());

        let mut source = source_in(dir.path());
        assert!(source.list_pending().unwrap().is_empty());
        assert!(!dir.path().join("update_plugins.toml").exists());

        install(&plugins, "akismet", "3.9");
        let pending = source.list_pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].plugin_id, PluginId::new("akismet"));
    }
}
