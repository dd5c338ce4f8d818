mod config;
pub mod database;
pub mod migrations;
mod profile_store;

pub use config::{Config, StorageBackend, StorageConfig};
pub use database::CardDb;
pub use profile_store::{
    import_legacy_profiles, JsonProfileStore, MemoryProfileStore, ProfileStore, SqliteProfileStore,
};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns the data directory, creating it if needed.
///
/// `RECALLROOM_DATA_DIR` wins when set. Otherwise the directory is
/// `~/.config/recallroom/`, or `~/.config/recallroom-dev/` with
/// `RECALLROOM_ENV=dev`.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("RECALLROOM_DATA_DIR") {
        Some(custom) if !custom.is_empty() => PathBuf::from(custom),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("RECALLROOM_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("recallroom-dev")
            } else {
                base_dir.join("recallroom")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
