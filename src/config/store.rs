use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::Settings;
use crate::error::{GadgetError, Result};

/// Settings file used when none is named
pub const DEFAULT_SETTINGS_PATH: &str = "/etc/gt/gt.toml";

/// Environment variable naming the settings file
pub const ENV_SETTINGS_PATH: &str = "GT_SETTINGS";

/// Environment variable overriding the default gadget
pub const ENV_DEFAULT_GADGET: &str = "GT_DEFAULT_GADGET";

/// Settings loaded from a TOML file
#[derive(Debug, Clone)]
pub struct ConfigStore {
    /// File the settings came from, if one was read
    path: Option<PathBuf>,
    settings: Settings,
}

impl ConfigStore {
    /// Load settings
    ///
    /// Source order: `explicit` path, then `$GT_SETTINGS`, then
    /// `/etc/gt/gt.toml`. Only the default file may be missing, in which case
    /// built-in defaults are used. `$GT_DEFAULT_GADGET` is applied last.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        Self::load_with(explicit, |name| std::env::var(name).ok())
    }

    /// Load settings with a custom environment lookup
    pub fn load_with<F>(explicit: Option<&Path>, var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let (path, required) = match explicit {
            Some(p) => (p.to_path_buf(), true),
            None => match var(super::ENV_SETTINGS_PATH) {
                Some(p) if !p.is_empty() => (PathBuf::from(p), true),
                _ => (PathBuf::from(DEFAULT_SETTINGS_PATH), false),
            },
        };

        let (mut settings, path) = if path.exists() || required {
            (Self::read(&path)?, Some(path))
        } else {
            debug!("No settings file at {}, using defaults", path.display());
            (Settings::default(), None)
        };

        settings.apply_env(var);
        Ok(Self { path, settings })
    }

    /// Parse a settings file
    fn read(path: &Path) -> Result<Settings> {
        let text = fs::read_to_string(path).map_err(|e| {
            GadgetError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let settings = toml::from_str(&text)
            .map_err(|e| GadgetError::Config(format!("{}: {}", path.display(), e)))?;
        debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Get loaded settings
    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}
