use std::path::PathBuf;

use crate::plugin::manifest::PluginId;

/// Failures reading or writing the host's on-disk state.
#[derive(thiserror::Error, Debug)]
pub enum HostError {
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{}: {source}", .path.display())]
    Serialize {
        path: PathBuf,
        #[source]
        source: toml::ser::Error,
    },
    #[error("missing plugin manifest: {}", .0.display())]
    MissingManifest(PathBuf),
}

impl HostError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum UpgradeError {
    #[error("plugin {0} is already current")]
    NoPendingUpdate(PluginId),
    #[error("unsupported package location: {0}")]
    UnsupportedPackage(String),
    #[error("package version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: String, found: String },
    #[error(transparent)]
    Host(#[from] HostError),
}
