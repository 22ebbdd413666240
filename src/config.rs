/// Configuration module for pidtimer settings
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::duration::FieldPolicy;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub field_policy: FieldPolicy,
    pub prompt: String,
    pub bell: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            field_policy: FieldPolicy::Lenient,
            prompt: "Time remaining: ".to_string(),
            bell: false,
        }
    }
}

impl Config {
    /// Loads the config at `path`, falling back to defaults on any problem.
    /// A missing file is created with the defaults.
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(config) => config,
            Err(err) => {
                warn!("{err:#}, using defaults");
                Self::default()
            }
        }
    }

    pub fn try_load(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Self::default();
            if let Err(err) = config.save(path) {
                warn!("{err:#}");
            }
            return Ok(config);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read config file {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config format in {}", path.display()))?;
        debug!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Could not create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
            .with_context(|| format!("Could not write config file {}", path.display()))
    }
}

pub fn default_config_path() -> PathBuf {
    if let Some(home) = env::var_os("HOME") {
        PathBuf::from(home)
            .join(".config")
            .join("pidtimer")
            .join("config.json")
    } else {
        PathBuf::from("pidtimer-config.json")
    }
}
