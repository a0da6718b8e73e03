use std::path::PathBuf;

use crate::error::UpgradeError;
use crate::model::update::{PendingUpdate, UpgradeOutcome};
use crate::plugin::installer::PackageInstaller;
use crate::plugin::manifest::{PluginId, PluginManifest};
use crate::plugin::update_source::UpdateCache;

#[derive(Debug, Clone, Copy, Default)]
pub struct UpgradeOptions {
    /// Drop the whole update cache after a successful upgrade instead of
    /// just this plugin's entry. Sequential batches leave this off.
    pub invalidate_after: bool,
}

pub trait UpgradeExecutor {
    fn upgrade(&mut self, id: &PluginId, options: UpgradeOptions) -> UpgradeOutcome;
}

/// Installs pending packages from directories into `plugins/<id>`.
#[derive(Debug, Clone)]
pub struct FsUpgrader {
    cache: UpdateCache,
    installer: PackageInstaller,
    plugins_dir: PathBuf,
}

impl FsUpgrader {
    pub fn new(
        cache: UpdateCache,
        installer: PackageInstaller,
        plugins_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            cache,
            installer,
            plugins_dir: plugins_dir.into(),
        }
    }

    fn run(&self, id: &PluginId, options: UpgradeOptions) -> Result<PendingUpdate, UpgradeError> {
        // Re-read at call time: the listing may be stale by now.
        let pending = self
            .cache
            .find(id)?
            .ok_or_else(|| UpgradeError::NoPendingUpdate(id.clone()))?;

        let package_dir = self.installer.resolve(&pending.package)?;
        let result = self
            .installer
            .stage(id, &package_dir)
            .map_err(UpgradeError::from)
            .and_then(|staged| self.verify_and_install(&pending, &staged));
        if let Err(err) = self.installer.clear_working(id) {
            tracing::warn!(plugin = %id, "could not clear working directory: {err}");
        }
        result?;

        if options.invalidate_after {
            self.cache.clear()?;
        } else {
            self.cache.remove(id)?;
        }
        Ok(pending)
    }

    fn verify_and_install(
        &self,
        pending: &PendingUpdate,
        staged: &std::path::Path,
    ) -> Result<(), UpgradeError> {
        let manifest = PluginManifest::read(staged)?;
        if manifest.version.trim() != pending.new_version.trim() {
            return Err(UpgradeError::VersionMismatch {
                expected: pending.new_version.clone(),
                found: manifest.version,
            });
        }

        let destination = self.plugins_dir.join(pending.plugin_id.as_str());
        self.installer.install(staged, &destination)?;
        Ok(())
    }
}

impl UpgradeExecutor for FsUpgrader {
    fn upgrade(&mut self, id: &PluginId, options: UpgradeOptions) -> UpgradeOutcome {
        match self.run(id, options) {
            Ok(pending) => {
                tracing::info!(
                    plugin = %id,
                    "upgraded {} -> {}",
                    pending.current_version,
                    pending.new_version
                );
                UpgradeOutcome::succeeded(id.clone())
            }
            Err(err) => {
                tracing::warn!(plugin = %id, "upgrade failed: {err}");
                UpgradeOutcome::failed(id.clone(), err)
            }
        }
    }
}
