use serde::{Deserialize, Serialize};
use steamlocate::SteamDir;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::AppError;
use crate::vdf::{DecodeOptions, DEFAULT_MAX_DEPTH, DEFAULT_MAX_TOKEN_SIZE};

pub const CONFIG_VERSION: u32 = 1;
pub const CONFIG_DIR_ENV: &str = "LAUNCHPATCH_CONFIG_DIR";
pub const DEFAULT_APP_ID: &str = "413150";

const DEFAULT_CONFIG_YAML: &str = include_str!("../config/default.yaml");

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub version: u32,
    pub steam: SteamConfig,
    pub format: FormatConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct SteamConfig {
    /// Empty means wherever the Steam client is installed.
    pub root: String,
    /// Empty means the platform's name for the Steam client process.
    pub process_name: String,
    pub app_id: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct FormatConfig {
    pub max_token_size: usize,
    pub max_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            steam: SteamConfig::default(),
            format: FormatConfig::default(),
        }
    }
}

impl Default for SteamConfig {
    fn default() -> Self {
        Self {
            root: String::new(),
            process_name: String::new(),
            app_id: DEFAULT_APP_ID.to_string(),
        }
    }
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            max_token_size: DEFAULT_MAX_TOKEN_SIZE,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl Config {
    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            max_token_size: self.format.max_token_size,
            max_depth: self.format.max_depth,
        }
    }

    /// `override_root` wins over the file, which wins over the located install.
    pub fn steam_root(&self, override_root: Option<&Path>) -> Result<PathBuf, AppError> {
        if let Some(root) = override_root {
            return Ok(root.to_path_buf());
        }
        let configured = self.steam.root.trim();
        if !configured.is_empty() {
            return Ok(PathBuf::from(expand_path(configured)));
        }
        locate_steam_root()
    }

    pub fn process_name(&self) -> String {
        let configured = self.steam.process_name.trim();
        if !configured.is_empty() {
            return configured.to_string();
        }
        default_process_name_for_os(env::consts::OS).to_string()
    }
}

pub fn default_process_name_for_os(os: &str) -> &'static str {
    match os {
        "macos" => "steam_osx",
        _ => "steam",
    }
}

/// Finds the Steam install the way the client registers it: the registry on Windows,
/// `~/.steam` and the Flatpak/Snap homes on Linux, `Application Support` on macOS.
pub fn locate_steam_root() -> Result<PathBuf, AppError> {
    let steam = SteamDir::locate().map_err(|err| {
        AppError::Config(format!(
            "unable to locate the Steam installation ({err}); set steam.root in config.yaml or pass --steam-root"
        ))
    })?;
    Ok(steam.path().to_path_buf())
}

pub fn expand_path(input: &str) -> String {
    if let Some(rest) = input.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest).to_string_lossy().to_string();
        }
    }
    input.to_string()
}

pub fn default_config_dir() -> PathBuf {
    if let Ok(path) = env::var(CONFIG_DIR_ENV) {
        return PathBuf::from(path);
    }
    let mut base = dirs::config_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."));
    base.push("launchpatch");
    base
}

pub fn resolve_config_path(override_path: Option<&PathBuf>) -> PathBuf {
    if let Some(path) = override_path {
        return path.clone();
    }
    default_config_dir().join("config.yaml")
}

pub fn default_config_yaml() -> &'static str {
    DEFAULT_CONFIG_YAML
}

pub fn read_config_from_str(content: &str) -> Result<Config, AppError> {
    let cfg: Config = serde_yaml::from_str(content)?;
    validate_config(&cfg)?;
    Ok(cfg)
}

/// Loads the config file; a missing file yields the defaults.
pub fn read_config(path: &Path) -> Result<Config, AppError> {
    match fs::read_to_string(path) {
        Ok(content) => read_config_from_str(&content),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Config::default()),
        Err(err) => Err(AppError::Io(err)),
    }
}

pub fn validate_config(cfg: &Config) -> Result<(), AppError> {
    if cfg.version != CONFIG_VERSION {
        return Err(AppError::Config(format!(
            "unsupported config version {}",
            cfg.version
        )));
    }
    let app_id = cfg.steam.app_id.trim();
    if app_id.is_empty() || !app_id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AppError::Config(format!(
            "steam.app_id must be a numeric application id, got '{}'",
            cfg.steam.app_id
        )));
    }
    if cfg.format.max_token_size == 0 {
        return Err(AppError::Config(
            "format.max_token_size must be greater than zero".to_string(),
        ));
    }
    if cfg.format.max_depth == 0 {
        return Err(AppError::Config(
            "format.max_depth must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

pub fn ensure_parent(path: &Path) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}
