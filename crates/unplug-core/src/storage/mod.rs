mod config;
pub mod kv;
pub mod sqlite;

pub use config::{BatteryConfig, Config, NotificationsConfig, TimerConfig};
pub use kv::{KeyValueStore, MemoryStore};
pub use sqlite::SqliteStore;

use std::path::PathBuf;

/// Returns `~/.config/unplug[-dev]/` based on UNPLUG_ENV.
///
/// Set UNPLUG_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> std::io::Result<PathBuf> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("UNPLUG_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("unplug-dev")
    } else {
        base_dir.join("unplug")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
