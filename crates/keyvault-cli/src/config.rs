use std::{
    fs,
    path::{Path, PathBuf},
};

use color_eyre::Result;
use dirs::config_dir;
use keyvault_core::keys::SigningKeyConfig;
use serde::{Deserialize, Serialize};

/// User-level configuration loaded from `~/.config/keyvault/config.toml` (platform-specific).
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Symmetric secrets, 32 bytes each. The first one encrypts; all of them decrypt.
    #[serde(default)]
    pub secrets: Vec<String>,
    /// Override for the data directory holding signing keys.
    pub data_dir: Option<PathBuf>,
    /// Required signing keys; defaults to one RS256 key of 2048 bits per secret.
    pub signing_keys: Option<Vec<SigningKeyConfig>>,
}

impl Config {
    pub fn signing_key_configs(&self) -> Vec<SigningKeyConfig> {
        match &self.signing_keys {
            Some(configs) => configs.clone(),
            None => vec![SigningKeyConfig::default(); self.secrets.len()],
        }
    }
}

/// Load config from the default path; if missing, return defaults.
pub fn load() -> Result<Config> {
    let path = default_path()?;
    load_from_path(path)
}

/// Load config from a given path; if missing or empty, return defaults.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let cfg: Config = toml::from_str(&contents)?;
    Ok(cfg)
}

/// Resolve the default config path (platform aware).
pub fn default_path() -> Result<PathBuf> {
    let base = config_dir().ok_or_else(|| color_eyre::eyre::eyre!("no config dir available"))?;
    Ok(base.join("keyvault").join("config.toml"))
}

/// Write the given config to the default path unless a file is already there.
pub fn write_default_if_missing(config: &Config) -> Result<PathBuf> {
    write_if_missing(config, &default_path()?)
}

fn write_if_missing(config: &Config, path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = toml::to_string_pretty(config)?;
    fs::write(path, body)?;
    Ok(path.to_path_buf())
}
