use std::fs;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;

use crate::error::{HostError, UpgradeError};
use crate::plugin::manifest::PluginId;

/// Moves package directories into place through a working directory.
#[derive(Debug, Clone)]
pub struct PackageInstaller {
    base_dir: PathBuf,
    working_dir: PathBuf,
}

impl PackageInstaller {
    /// Relative package paths resolve against `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            working_dir: working_dir.into(),
        }
    }

    pub fn resolve(&self, location: &str) -> Result<PathBuf, UpgradeError> {
        let raw = match location.strip_prefix("file://") {
            Some(path) => PathBuf::from(path),
            None if location.contains("://") => {
                return Err(UpgradeError::UnsupportedPackage(location.to_string()));
            }
            None => PathBuf::from(location),
        };

        let path = if raw.is_absolute() {
            raw
        } else {
            self.base_dir.join(raw)
        };

        if !path.is_dir() {
            return Err(UpgradeError::UnsupportedPackage(format!(
                "{location} (not a package directory)"
            )));
        }
        Ok(path)
    }

    /// Copies the package tree into `<working>/<id>` and returns that path.
    pub fn stage(&self, id: &PluginId, package_dir: &Path) -> Result<PathBuf, HostError> {
        let staged = self.working_dir.join(id.as_str());
        remove_dir_if_exists(&staged)?;
        copy_tree(package_dir, &staged)?;
        tracing::debug!(plugin = %id, "staged {} at {}", package_dir.display(), staged.display());
        Ok(staged)
    }

    /// Clears `destination` and moves the staged tree into it.
    pub fn install(&self, staged: &Path, destination: &Path) -> Result<(), HostError> {
        remove_dir_if_exists(destination)?;
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|source| HostError::io(parent, source))?;
        }

        if let Err(err) = fs::rename(staged, destination) {
            tracing::debug!("rename into place failed ({err}), copying instead");
            copy_tree(staged, destination)?;
            remove_dir_if_exists(staged)?;
        }
        Ok(())
    }

    pub fn clear_working(&self, id: &PluginId) -> Result<(), HostError> {
        remove_dir_if_exists(&self.working_dir.join(id.as_str()))
    }
}

fn remove_dir_if_exists(path: &Path) -> Result<(), HostError> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(HostError::io(path, source)),
    }
}

fn copy_tree(from: &Path, to: &Path) -> Result<(), HostError> {
    fs::create_dir_all(to).map_err(|source| HostError::io(to, source))?;

    for entry in WalkBuilder::new(from).standard_filters(false).build() {
        let entry = entry.map_err(|err| HostError::io(from, std::io::Error::other(err.to_string())))?;
        let Ok(relative) = entry.path().strip_prefix(from) else {
            continue;
        };
        if relative.as_os_str().is_empty() {
            continue;
        }

        let target = to.join(relative);
        let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
        if is_dir {
            fs::create_dir_all(&target).map_err(|source| HostError::io(&target, source))?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|source| HostError::io(parent, source))?;
            }
            fs::copy(entry.path(), &target).map_err(|source| HostError::io(&target, source))?;
        }
    }

    Ok(())
}
