//! Persistent engine configuration model and defaults.

use std::collections::HashSet;

use crate::source_classifier::DEFAULT_LOCAL_PREFIXES;

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// Provenance classification rules.
    pub classifier: ClassifierConfig,
    #[serde(default)]
    /// Session wiring and startup behavior.
    pub session: SessionConfig,
    #[serde(default)]
    /// User-facing notice texts.
    pub notices: NoticeConfig,
    #[serde(default)]
    /// Log output of the demo binary.
    pub logging: LoggingConfig,
}

/// Provenance classification rules.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ClassifierConfig {
    /// Locator prefixes treated as on-device storage.
    #[serde(default = "default_local_prefixes")]
    pub local_prefixes: Vec<String>,
}

/// Session wiring and startup behavior.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct SessionConfig {
    /// Capacity of the session event bus.
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,
    /// Rebuild the visible queue as soon as the session starts.
    #[serde(default = "default_true")]
    pub refresh_on_start: bool,
    /// Treat the device as reachable when the initial network query fails.
    #[serde(default = "default_true")]
    pub assume_reachable_on_error: bool,
}

/// User-facing notice texts.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NoticeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_selection_failed")]
    pub selection_failed: String,
    #[serde(default = "default_reorder_failed")]
    pub reorder_failed: String,
}

/// Log level filter for the demo binary.
#[derive(Debug, Clone, Copy, serde::Deserialize, serde::Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,
}

pub const MIN_BUS_CAPACITY: usize = 16;
pub const MAX_BUS_CAPACITY: usize = 4096;

fn default_true() -> bool {
    true
}

fn default_local_prefixes() -> Vec<String> {
    DEFAULT_LOCAL_PREFIXES.iter().map(|p| p.to_string()).collect()
}

fn default_bus_capacity() -> usize {
    256
}

fn default_selection_failed() -> String {
    "Could not play this track".to_string()
}

fn default_reorder_failed() -> String {
    "Could not reorder the queue".to_string()
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            local_prefixes: default_local_prefixes(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            bus_capacity: default_bus_capacity(),
            refresh_on_start: true,
            assume_reachable_on_error: true,
        }
    }
}

impl Default for NoticeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            selection_failed: default_selection_failed(),
            reorder_failed: default_reorder_failed(),
        }
    }
}

/// Clamps numeric fields and restores empty texts to their defaults.
pub fn sanitize_config(config: Config) -> Config {
    let mut seen_prefixes = HashSet::new();
    let local_prefixes: Vec<String> = config
        .classifier
        .local_prefixes
        .into_iter()
        .map(|prefix| prefix.trim().to_string())
        .filter(|prefix| !prefix.is_empty() && seen_prefixes.insert(prefix.clone()))
        .collect();

    let selection_failed = if config.notices.selection_failed.trim().is_empty() {
        default_selection_failed()
    } else {
        config.notices.selection_failed
    };
    let reorder_failed = if config.notices.reorder_failed.trim().is_empty() {
        default_reorder_failed()
    } else {
        config.notices.reorder_failed
    };

    Config {
        classifier: ClassifierConfig { local_prefixes },
        session: SessionConfig {
            bus_capacity: config
                .session
                .bus_capacity
                .clamp(MIN_BUS_CAPACITY, MAX_BUS_CAPACITY),
            ..config.session
        },
        notices: NoticeConfig {
            enabled: config.notices.enabled,
            selection_failed,
            reorder_failed,
        },
        logging: config.logging,
    }
}

#[cfg(test)]
mod tests {
    use super::{sanitize_config, Config, LogLevel, MAX_BUS_CAPACITY, MIN_BUS_CAPACITY};

    #[test]
    fn test_partial_toml_fills_missing_fields_with_defaults() {
        let config: Config = toml::from_str(
            r#"
            [session]
            refresh_on_start = false

            [logging]
            level = "debug"
            "#,
        )
        .expect("partial config should parse");

        assert!(!config.session.refresh_on_start);
        assert_eq!(config.session.bus_capacity, 256);
        assert!(config.session.assume_reachable_on_error);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert!(config
            .classifier
            .local_prefixes
            .contains(&"content://".to_string()));
        assert!(config.notices.enabled);
    }

    #[test]
    fn test_sanitize_clamps_bus_capacity() {
        let mut config = Config::default();
        config.session.bus_capacity = 0;
        assert_eq!(sanitize_config(config.clone()).session.bus_capacity, MIN_BUS_CAPACITY);

        config.session.bus_capacity = 1_000_000;
        assert_eq!(sanitize_config(config).session.bus_capacity, MAX_BUS_CAPACITY);
    }

    #[test]
    fn test_sanitize_drops_blank_and_repeated_prefixes_and_restores_blank_notices() {
        let mut config = Config::default();
        config.classifier.local_prefixes = vec![
            " file:// ".to_string(),
            "".to_string(),
            "/mnt/usb/".to_string(),
            "file://".to_string(),
        ];
        config.notices.selection_failed = "   ".to_string();

        let sanitized = sanitize_config(config);

        assert_eq!(
            sanitized.classifier.local_prefixes,
            vec!["file://".to_string(), "/mnt/usb/".to_string()]
        );
        assert_eq!(
            sanitized.notices.selection_failed,
            Config::default().notices.selection_failed
        );
    }

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let config = Config::default();
        let text = toml::to_string(&config).expect("default config should serialize");
        let parsed: Config = toml::from_str(&text).expect("serialized config should parse");
        assert_eq!(parsed, config);
    }
}
