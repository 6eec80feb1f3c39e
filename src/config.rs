//! Highlighter configuration persistence
//!
//! Stores user preferences in `~/.config/token-syntax/config.yaml`

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::syntax::{LanguageRegistry, CANCELLATION_CHECK_INTERVAL};

/// Highlighter configuration that persists across sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighlighterConfig {
    /// Selected theme id (e.g., "default-dark", "default-light")
    #[serde(default = "default_theme")]
    pub theme: String,

    /// Captures processed between checks of a job's cancellation token
    #[serde(default = "default_check_interval")]
    pub cancellation_check_interval: usize,

    /// Extra injection names, e.g. `{ "ts": "javascript" }`
    #[serde(default)]
    pub language_aliases: HashMap<String, String>,
}

fn default_theme() -> String {
    "default-dark".to_string()
}

fn default_check_interval() -> usize {
    CANCELLATION_CHECK_INTERVAL
}

impl Default for HighlighterConfig {
    fn default() -> Self {
        Self {
            theme: default_theme(),
            cancellation_check_interval: default_check_interval(),
            language_aliases: HashMap::new(),
        }
    }
}

impl HighlighterConfig {
    /// Load config from disk, or return defaults if not found
    pub fn load() -> Self {
        let Some(path) = crate::config_paths::config_file() else {
            tracing::debug!("No config directory available, using defaults");
            return Self::default();
        };
        Self::load_from(&path)
    }

    /// Load config from `path`, falling back to defaults on any error
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            tracing::debug!(
                "Config file not found at {}, using defaults",
                path.display()
            );
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match serde_yaml::from_str(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse config at {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config at {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Save config to the user config file
    pub fn save(&self) -> Result<(), String> {
        let path = crate::config_paths::config_file()
            .ok_or_else(|| "No config directory available".to_string())?;
        self.save_to(&path)
    }

    /// Save config to `path`, creating its directory if needed
    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        let content = serde_yaml::to_string(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        std::fs::write(path, content)
            .map_err(|e| format!("Failed to write config to {}: {}", path.display(), e))?;

        tracing::info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Register the configured aliases with `registry`
    pub fn apply_aliases(&self, registry: &mut LanguageRegistry) {
        for (alias, language) in &self.language_aliases {
            if registry.resolve(language).is_none() {
                tracing::warn!(
                    "Ignoring alias {} for unknown language {}",
                    alias,
                    language
                );
                continue;
            }
            registry.add_alias(alias.as_str(), language.as_str());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config: HighlighterConfig = serde_yaml::from_str("theme: default-light\n").unwrap();
        assert_eq!(config.theme, "default-light");
        assert_eq!(config.cancellation_check_interval, 100);
        assert!(config.language_aliases.is_empty());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let mut config = HighlighterConfig::default();
        config.cancellation_check_interval = 10;
        config
            .language_aliases
            .insert("ts".to_string(), "javascript".to_string());
        config.save_to(&path).unwrap();

        assert_eq!(HighlighterConfig::load_from(&path), config);
    }

    #[test]
    fn test_invalid_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "theme: [unclosed").unwrap();
        assert_eq!(HighlighterConfig::load_from(&path), HighlighterConfig::default());
    }

    #[test]
    fn test_apply_aliases_skips_unknown_languages() {
        let mut registry = LanguageRegistry::with_builtin_languages();
        let mut config = HighlighterConfig::default();
        config
            .language_aliases
            .insert("ts".to_string(), "javascript".to_string());
        config
            .language_aliases
            .insert("cob".to_string(), "cobol".to_string());
        config.apply_aliases(&mut registry);

        assert_eq!(registry.resolve("ts").unwrap().name, "javascript");
        assert!(registry.resolve("cob").is_none());
    }
}
