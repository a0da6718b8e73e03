use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::error::HostError;
use crate::plugin::manifest::PluginId;

/// Notifications fired around a plugin activation, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    PreActivate(PluginId),
    Activate(PluginId),
    PostActivate(PluginId),
}

impl LifecycleEvent {
    pub fn plugin_id(&self) -> &PluginId {
        match self {
            LifecycleEvent::PreActivate(id)
            | LifecycleEvent::Activate(id)
            | LifecycleEvent::PostActivate(id) => id,
        }
    }
}

pub trait ActivationListener {
    fn on_event(&mut self, event: &LifecycleEvent);
}

impl<F> ActivationListener for F
where
    F: FnMut(&LifecycleEvent),
{
    fn on_event(&mut self, event: &LifecycleEvent) {
        self(event)
    }
}

/// Persistent record of which plugins are active.
pub trait ActivationStore {
    fn get_active(&self) -> Result<Vec<PluginId>, HostError>;
    fn set_active(&mut self, active: &[PluginId]) -> Result<(), HostError>;
}

/// The activation half of the host, as seen by an upgrade session.
pub trait Activation {
    fn deactivate(&mut self, id: &PluginId) -> Result<(), HostError>;
    /// Returns `false` when the plugin was already active.
    fn activate(&mut self, id: &PluginId) -> Result<bool, HostError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ActiveFile {
    #[serde(default)]
    active: Vec<PluginId>,
}

/// `active = ["a", "b"]` in a TOML file. A missing file means nothing is active.
#[derive(Debug, Clone)]
pub struct TomlActivationStore {
    path: PathBuf,
}

impl TomlActivationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ActivationStore for TomlActivationStore {
    fn get_active(&self) -> Result<Vec<PluginId>, HostError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let raw =
            fs::read_to_string(&self.path).map_err(|source| HostError::io(&self.path, source))?;
        let file: ActiveFile = toml::from_str(&raw).map_err(|source| HostError::Parse {
            path: self.path.clone(),
            source,
        })?;
        Ok(file.active)
    }

    fn set_active(&mut self, active: &[PluginId]) -> Result<(), HostError> {
        let body = toml::to_string(&ActiveFile {
            active: active.to_vec(),
        })
        .map_err(|source| HostError::Serialize {
            path: self.path.clone(),
            source,
        })?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| HostError::io(parent, source))?;
        }
        fs::write(&self.path, body).map_err(|source| HostError::io(&self.path, source))
    }
}

pub struct ActivationManager<S> {
    store: S,
    listeners: Vec<Box<dyn ActivationListener>>,
}

impl<S: ActivationStore> ActivationManager<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            listeners: Vec::new(),
        }
    }

    pub fn add_listener(&mut self, listener: impl ActivationListener + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn active(&self) -> Result<Vec<PluginId>, HostError> {
        self.store.get_active()
    }

    /// Deactivates every active plugin without firing notifications.
    pub fn deactivate_all(&mut self) -> Result<Vec<PluginId>, HostError> {
        let previous = self.store.get_active()?;
        if !previous.is_empty() {
            self.store.set_active(&[])?;
        }
        tracing::info!("deactivated {} plugins", previous.len());
        Ok(previous)
    }

    fn emit(&mut self, event: LifecycleEvent) {
        tracing::debug!(plugin = %event.plugin_id(), "lifecycle {event:?}");
        for listener in &mut self.listeners {
            listener.on_event(&event);
        }
    }
}

impl<S: ActivationStore> Activation for ActivationManager<S> {
    fn deactivate(&mut self, id: &PluginId) -> Result<(), HostError> {
        let mut active = self.store.get_active()?;
        let before = active.len();
        active.retain(|current| current != id);

        if active.len() != before {
            self.store.set_active(&active)?;
            tracing::info!(plugin = %id, "deactivated");
        }
        Ok(())
    }

    fn activate(&mut self, id: &PluginId) -> Result<bool, HostError> {
        let mut active = self.store.get_active()?;
        if active.contains(id) {
            return Ok(false);
        }

        active.push(id.clone());
        active.sort();

        self.emit(LifecycleEvent::PreActivate(id.clone()));
        self.store.set_active(&active)?;
        self.emit(LifecycleEvent::Activate(id.clone()));
        self.emit(LifecycleEvent::PostActivate(id.clone()));

        tracing::info!(plugin = %id, "activated");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::path::Path;
    use std::rc::Rc;

    fn ids(values: &[&str]) -> Vec<PluginId> {
        values.iter().map(|v| PluginId::new(*v)).collect()
    }

    fn manager_in(dir: &Path) -> ActivationManager<TomlActivationStore> {
        ActivationManager::new(TomlActivationStore::new(dir.join("active_plugins.toml")))
    }

    #[test]
    fn test_activate_sorts_and_fires_events_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = manager_in(dir.path());
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        manager.add_listener(move |event: &LifecycleEvent| sink.borrow_mut().push(event.clone()));

        assert!(manager.activate(&PluginId::new("zeta")).unwrap());
        assert!(manager.activate(&PluginId::new("akismet")).unwrap());

        assert_eq!(manager.active().unwrap(), ids(&["akismet", "zeta"]));
        let akismet = PluginId::new("akismet");
        assert_eq!(
            events.borrow()[3..],
            [
                LifecycleEvent::PreActivate(akismet.clone()),
                LifecycleEvent::Activate(akismet.clone()),
                LifecycleEvent::PostActivate(akismet),
            ]
        );
    }

    #[test]
    fn test_activate_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = manager_in(dir.path());
        let fired = Rc::new(RefCell::new(0usize));
        let counter = Rc::clone(&fired);
        manager.add_listener(move |_: &LifecycleEvent| *counter.borrow_mut() += 1);

        let id = PluginId::new("akismet");
        assert!(manager.activate(&id).unwrap());
        assert!(!manager.activate(&id).unwrap());

        assert_eq!(*fired.borrow(), 3);
        assert_eq!(manager.active().unwrap(), ids(&["akismet"]));
    }

    #[test]
    fn test_deactivate_is_idempotent_and_silent() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = manager_in(dir.path());
        manager.activate(&PluginId::new("a")).unwrap();
        manager.activate(&PluginId::new("b")).unwrap();

        let fired = Rc::new(RefCell::new(0usize));
        let counter = Rc::clone(&fired);
        manager.add_listener(move |_: &LifecycleEvent| *counter.borrow_mut() += 1);

        manager.deactivate(&PluginId::new("a")).unwrap();
        manager.deactivate(&PluginId::new("a")).unwrap();
        manager.deactivate(&PluginId::new("missing")).unwrap();

        assert_eq!(manager.active().unwrap(), ids(&["b"]));
        assert_eq!(*fired.borrow(), 0);
    }

    #[test]
    fn test_deactivate_all() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = manager_in(dir.path());
        manager.activate(&PluginId::new("a")).unwrap();
        manager.activate(&PluginId::new("b")).unwrap();

        assert_eq!(manager.deactivate_all().unwrap(), ids(&["a", "b"]));
        assert!(manager.active().unwrap().is_empty());
    }

    #[test]
    fn test_store_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("active.toml");
        let mut store = TomlActivationStore::new(&path);
        assert!(store.get_active().unwrap().is_empty());

        store.set_active(&ids(&["akismet", "jetpack"])).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("akismet"));
        assert_eq!(
            TomlActivationStore::new(&path).get_active().unwrap(),
            ids(&["akismet", "jetpack"])
        );
    }
}
