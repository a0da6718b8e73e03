use std::io::{self, Write};

use anyhow::Result;

use crate::cancel::CancelFlag;
use crate::model::config::{AppConfig, ReactivatePolicy};
use crate::plugin::activation::LifecycleEvent;
use crate::plugin::installer::PackageInstaller;
use crate::plugin::update_source::{Registry, UpdateCache};
use crate::plugin::{
    Activation, ActivationManager, CachedUpdateSource, FsUpgrader, PluginManager,
    TomlActivationStore, UpdateSource,
};
use crate::prompt::{BlockingLines, ChannelLines, LineSource};
use crate::session::{Session, SessionReport};

/// The filesystem host, assembled from config.
pub struct App {
    pub config: AppConfig,
    source: CachedUpdateSource,
    upgrader: FsUpgrader,
    activation: ActivationManager<TomlActivationStore>,
}

impl App {
    pub fn new(config: AppConfig) -> Self {
        let cache = UpdateCache::new(config.update_cache_path());
        let source = CachedUpdateSource::new(
            cache.clone(),
            Registry::new(config.registry_path()),
            config.plugins_path(),
        );
        let upgrader = FsUpgrader::new(
            cache,
            PackageInstaller::new(config.root(), config.working_path()),
            config.plugins_path(),
        );

        let mut activation = ActivationManager::new(TomlActivationStore::new(config.state_path()));
        activation.add_listener(|event: &LifecycleEvent| match event {
            LifecycleEvent::PreActivate(id) => tracing::debug!(plugin = %id, "activate_plugin"),
            LifecycleEvent::Activate(id) => tracing::debug!(plugin = %id, "activate_{id}"),
            LifecycleEvent::PostActivate(id) => tracing::debug!(plugin = %id, "activated_plugin"),
        });

        Self {
            config,
            source,
            upgrader,
            activation,
        }
    }

    /// The deactivate → upgrade → reactivate pass over stdin/stdout.
    ///
    /// Piped input is read synchronously; a terminal gets a reader thread so
    /// prompts can time out or be cancelled.
    pub fn upgrade(
        &mut self,
        policy: ReactivatePolicy,
        cancel: CancelFlag,
        interactive: bool,
    ) -> Result<SessionReport> {
        let mut input: Box<dyn LineSource> = if interactive {
            Box::new(ChannelLines::spawn(
                io::BufReader::new(io::stdin()),
                self.config.prompt_timeout(),
                cancel.clone(),
            ))
        } else {
            Box::new(BlockingLines::new(io::stdin().lock()))
        };
        let mut stdout = io::stdout().lock();

        Session::new(
            &mut self.source,
            &mut self.upgrader,
            &mut self.activation,
            input.as_mut(),
            &mut stdout,
        )
        .with_policy(policy)
        .with_cancel(cancel)
        .run()
    }

    pub fn list(&mut self, out: &mut dyn Write) -> Result<()> {
        let pending = self.source.list_pending()?;
        if pending.is_empty() {
            writeln!(out, "{}", crate::session::NO_UPDATES)?;
            return Ok(());
        }

        for update in pending {
            writeln!(
                out,
                "{} {} -> {}",
                update.plugin_id, update.current_version, update.new_version
            )?;
        }
        Ok(())
    }

    pub fn check(&mut self, out: &mut dyn Write) -> Result<()> {
        self.source.invalidate()?;
        let pending = self.source.refresh()?;
        writeln!(out, "{} plugins have updates available.", pending.len())?;
        Ok(())
    }

    pub fn activate_all(&mut self, out: &mut dyn Write) -> Result<()> {
        let installed = PluginManager::discover(&self.config.plugins_path());
        for error in installed.errors() {
            writeln!(out, "Skipping {error}")?;
        }

        for plugin in installed.iter() {
            writeln!(out, "Activating: {} v{}", plugin.display_name(), plugin.version())?;
            tracing::debug!(
                plugin = %plugin.id,
                author = plugin.manifest.author.as_deref().unwrap_or("unknown"),
                description = plugin.manifest.description.as_deref().unwrap_or(""),
                "activating installed plugin"
            );
            self.activation.activate(&plugin.id)?;
        }
        Ok(())
    }

    pub fn deactivate_all(&mut self, out: &mut dyn Write) -> Result<()> {
        let previous = self.activation.deactivate_all()?;
        writeln!(out, "Deactivated {} plugins.", previous.len())?;
        Ok(())
    }
}
