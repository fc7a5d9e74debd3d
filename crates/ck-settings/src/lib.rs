pub mod config;
mod manager;

pub use config::{LogSettings, ProviderSettings, RefreshSettings, Settings, StorageSettings};
pub use manager::{SettingsError, SettingsManager};
