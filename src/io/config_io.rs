use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::model::config::StoreConfig;

/// Name of the store directory inside a project
pub const STORE_DIR: &str = ".adapt";
/// Name of the config file inside the store directory
pub const CONFIG_FILE: &str = "adapt.toml";

const DEFAULT_CONFIG: &str = "\
# adapt store configuration

[autosave]
# seconds between background saves
interval_secs = 10

[user]
# recorded as completedBy when a stage is completed
# name = \"you@example.com\"

[store]
lock_timeout_ms = 5000
";

/// Error type for config discovery and loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no adapt store found: run `adapt init` or pass --store-dir")]
    NotAStore,
    #[error("could not read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Walk up from `start` looking for a directory containing `.adapt/`.
/// Returns the path of the `.adapt` directory itself.
pub fn discover_store(start: &Path) -> Result<PathBuf, ConfigError> {
    let mut current = start.to_path_buf();
    loop {
        let store = current.join(STORE_DIR);
        if store.is_dir() {
            return Ok(store);
        }
        if !current.pop() {
            return Err(ConfigError::NotAStore);
        }
    }
}

/// Read `adapt.toml` from the store directory. A missing file means defaults.
pub fn read_config(store_dir: &Path) -> Result<StoreConfig, ConfigError> {
    let path = store_dir.join(CONFIG_FILE);
    if !path.exists() {
        debug!(path = %path.display(), "no config file, using defaults");
        return Ok(StoreConfig::default());
    }
    let text = fs::read_to_string(&path).map_err(|source| ConfigError::ReadError {
        path: path.clone(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::ParseError { path, source })
}

/// Write the commented default config unless one already exists.
pub fn write_default_config(store_dir: &Path) -> Result<(), ConfigError> {
    let path = store_dir.join(CONFIG_FILE);
    if !path.exists() {
        fs::write(&path, DEFAULT_CONFIG)?;
    }
    Ok(())
}
