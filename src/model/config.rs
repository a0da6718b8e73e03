use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: HostConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostConfig {
    pub root: String,
    pub plugins_dir: String,
    pub state_file: String,
    pub registry_file: String,
    pub update_cache: String,
    pub working_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub reactivate: ReactivatePolicy,
    pub prompt_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub filter: String,
    pub directory: String,
}

/// What happens to a plugin's activation after its upgrade ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ReactivatePolicy {
    /// Reactivate regardless of the upgrade outcome.
    Always,
    /// Reactivate only after a successful upgrade.
    #[default]
    OnSuccess,
    /// Leave the plugin inactive; the operator reactivates by hand.
    Never,
}

impl ReactivatePolicy {
    pub fn should_reactivate(self, upgraded: bool) -> bool {
        match self {
            ReactivatePolicy::Always => true,
            ReactivatePolicy::OnSuccess => upgraded,
            ReactivatePolicy::Never => false,
        }
    }
}

impl AppConfig {
    /// Load configuration with layering: defaults → user config (or explicit path).
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let defaults = include_str!("../../config/default.toml");
        let mut config: AppConfig = toml::from_str(defaults)?;

        let user_path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => directories::ProjectDirs::from("", "", "plugin-updater")
                .map(|d| d.config_dir().join("config.toml"))
                .filter(|p| p.exists()),
        };

        if let Some(config_path) = user_path {
            let user_str = fs::read_to_string(&config_path)
                .with_context(|| format!("reading {}", config_path.display()))?;
            config = toml::from_str(&user_str)
                .with_context(|| format!("parsing {}", config_path.display()))?;
        }

        if config.host.root.starts_with('~') {
            let home = dirs_home().ok_or_else(|| anyhow!("cannot determine home directory"))?;
            config.host.root = config.host.root.replacen('~', &home.to_string_lossy(), 1);
        }

        Ok(config)
    }

    pub fn root(&self) -> PathBuf {
        PathBuf::from(&self.host.root)
    }

    pub fn plugins_path(&self) -> PathBuf {
        self.root().join(&self.host.plugins_dir)
    }

    pub fn state_path(&self) -> PathBuf {
        self.root().join(&self.host.state_file)
    }

    pub fn registry_path(&self) -> PathBuf {
        self.root().join(&self.host.registry_file)
    }

    pub fn update_cache_path(&self) -> PathBuf {
        self.root().join(&self.host.update_cache)
    }

    pub fn working_path(&self) -> PathBuf {
        self.root().join(&self.host.working_dir)
    }

    pub fn prompt_timeout(&self) -> Option<Duration> {
        match self.session.prompt_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn log_dir(&self) -> PathBuf {
        if !self.logging.directory.is_empty() {
            return PathBuf::from(&self.logging.directory);
        }

        directories::ProjectDirs::from("", "", "plugin-updater")
            .map(|d| d.data_dir().to_path_buf())
            .unwrap_or_else(|| std::env::temp_dir().join("plugin-updater"))
    }
}

fn dirs_home() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}
