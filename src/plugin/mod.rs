pub mod activation;
pub mod installer;
pub mod manager;
pub mod manifest;
pub mod update_source;
pub mod upgrader;

pub use activation::{Activation, ActivationManager, TomlActivationStore};
pub use manager::PluginManager;
pub use update_source::{CachedUpdateSource, UpdateSource};
pub use upgrader::{FsUpgrader, UpgradeExecutor, UpgradeOptions};
