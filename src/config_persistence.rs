use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::config::{sanitize_config, Config};

const CONFIG_DIR_NAME: &str = "queuesync";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default config location under the platform config directory.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Loads and sanitizes the config at `path`.
///
/// A missing file is created with defaults. Unreadable or invalid files are
/// reported and replaced in memory by defaults; the file itself is left alone.
pub fn load_config(path: &Path) -> Config {
    if !path.exists() {
        info!(
            "Config file not found. Creating default config. path={}",
            path.display()
        );
        let default_config = Config::default();
        persist_config(&default_config, path);
        return default_config;
    }

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            warn!("Failed to read config {}: {}", path.display(), err);
            return Config::default();
        }
    };
    match toml::from_str::<Config>(&content) {
        Ok(config) => sanitize_config(config),
        Err(err) => {
            warn!(
                "Failed to parse config {}, using defaults: {}",
                path.display(),
                err
            );
            Config::default()
        }
    }
}

/// Writes `config` to `path`, creating parent directories as needed.
pub fn persist_config(config: &Config, path: &Path) {
    if let Some(parent) = path.parent() {
        if let Err(err) = std::fs::create_dir_all(parent) {
            log::error!(
                "Failed to create config directory {}: {}",
                parent.display(),
                err
            );
            return;
        }
    }
    let Ok(text) = toml::to_string(config) else {
        log::error!("Failed to serialize config for {}", path.display());
        return;
    };
    if let Err(err) = std::fs::write(path, text) {
        log::error!("Failed to persist config to {}: {}", path.display(), err);
    }
}
