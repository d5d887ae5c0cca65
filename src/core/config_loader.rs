// src/core/config_loader.rs

//! # Config Loader
//!
//! Reads the user configuration file (`~/.config/swamp/config.toml`) into a
//! [`SettingsLayer`]. A missing or empty file is an empty layer. Unknown keys
//! are reported with a warning and otherwise ignored.

use crate::core::paths;
use crate::core::settings::SettingsLayer;
use log::warn;
use serde::Deserialize;
use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("config file already exists at {0}")]
    AlreadyExists(PathBuf),
    #[error("write config file '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// --- File Schema ---

#[derive(Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct UserConfig {
    pub profile: Option<String>,
    pub preferred_role: Option<String>,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub discovery: DiscoverySection,
    #[serde(default)]
    pub ux: UxSection,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheSection {
    pub enabled: Option<bool>,
    pub dir: Option<String>,
    pub mode: Option<String>,
    pub ttl_accounts: Option<String>,
    pub ttl_roles: Option<String>,
    pub ttl_regions: Option<String>,
    pub ttl_instances: Option<String>,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct DiscoverySection {
    pub workers: Option<i64>,
    pub regions: Option<Vec<String>>,
    pub all_regions: Option<bool>,
    pub include_stopped: Option<bool>,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct UxSection {
    pub auto_select_single: Option<bool>,
    pub resume_by_default: Option<bool>,
    pub picker: Option<String>,
}

const KNOWN_ROOT: &[&str] = &["profile", "preferred_role", "cache", "discovery", "ux"];
const KNOWN_CACHE: &[&str] = &[
    "enabled",
    "dir",
    "mode",
    "ttl_accounts",
    "ttl_roles",
    "ttl_regions",
    "ttl_instances",
];
const KNOWN_DISCOVERY: &[&str] = &["workers", "regions", "all_regions", "include_stopped"];
const KNOWN_UX: &[&str] = &["auto_select_single", "resume_by_default", "picker"];

impl From<UserConfig> for SettingsLayer {
    fn from(config: UserConfig) -> Self {
        Self {
            profile: config.profile,
            account: None,
            role: config.preferred_role,
            workers: config.discovery.workers,
            regions: config.discovery.regions,
            all_regions: config.discovery.all_regions,
            include_stopped: config.discovery.include_stopped,
            resume: config.ux.resume_by_default,
            last: None,
            auto_select: config.ux.auto_select_single,
            cache_enabled: config.cache.enabled,
            cache_dir: config.cache.dir,
            cache_mode: config.cache.mode,
            ttl_accounts: config.cache.ttl_accounts,
            ttl_roles: config.cache.ttl_roles,
            ttl_regions: config.cache.ttl_regions,
            ttl_instances: config.cache.ttl_instances,
            picker: config.ux.picker,
        }
    }
}

// --- Loading ---

/// The config file to use: `explicit` (expanded) or the default location.
pub fn resolve_config_path(explicit: Option<&str>) -> Result<PathBuf, paths::PathError> {
    match explicit.map(str::trim).filter(|p| !p.is_empty()) {
        Some(path) => paths::expand_path(path),
        None => Ok(paths::default_config_path()),
    }
}

/// Loads the user config from `path`.
pub fn load_user_config(path: &Path) -> Result<UserConfig, ConfigError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::debug!("no config file at '{}'", path.display());
            return Ok(UserConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    parse_user_config(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_user_config(content: &str) -> Result<UserConfig, toml::de::Error> {
    if content.trim().is_empty() {
        return Ok(UserConfig::default());
    }
    let root: toml::Table = toml::from_str(content)?;
    for key in unknown_keys(&root) {
        warn!("ignoring unknown config key '{}'", key);
    }
    toml::from_str(content)
}

/// Dotted names of every key the schema does not know about.
fn unknown_keys(root: &toml::Table) -> Vec<String> {
    let mut unknown = Vec::new();
    for (key, value) in root {
        if !KNOWN_ROOT.contains(&key.as_str()) {
            unknown.push(key.clone());
            continue;
        }
        let known = match key.as_str() {
            "cache" => KNOWN_CACHE,
            "discovery" => KNOWN_DISCOVERY,
            "ux" => KNOWN_UX,
            _ => continue,
        };
        if let Some(table) = value.as_table() {
            unknown.extend(
                table
                    .keys()
                    .filter(|k| !known.contains(&k.as_str()))
                    .map(|k| format!("{}.{}", key, k)),
            );
        }
    }
    unknown
}

// --- Example File ---

/// An annotated config file with every key at its default.
pub fn config_example() -> String {
    render_config("my-sso-profile", "AdministratorAccess")
}

/// The content written when no config file exists yet.
pub fn default_config_content() -> String {
    render_config("", "")
}

fn render_config(profile: &str, preferred_role: &str) -> String {
    format!(
        r#"# swamp configuration. Command line flags take precedence over these values.
profile = {profile:?}
preferred_role = {preferred_role:?}

[cache]
enabled = true
dir = {dir:?}
mode = "balanced"        # balanced | fresh | speed
ttl_accounts = "6h"
ttl_roles = "6h"
ttl_regions = "24h"
ttl_instances = "60s"

[discovery]
workers = 12
regions = []
all_regions = false
include_stopped = false

[ux]
auto_select_single = true
resume_by_default = false
picker = "fzf"           # fzf | builtin
"#,
        dir = paths::default_cache_dir().display().to_string(),
    )
}

/// Writes [`config_example`] to `path`, refusing to overwrite an existing file.
pub fn write_config_example(path: &Path) -> Result<(), ConfigError> {
    if path.exists() {
        return Err(ConfigError::AlreadyExists(path.to_path_buf()));
    }
    write_config(path, &config_example())
}

/// Creates `path` with [`default_config_content`] unless it already exists.
/// Returns whether a file was created.
pub fn ensure_default_config(path: &Path) -> Result<bool, ConfigError> {
    if path.exists() {
        return Ok(false);
    }
    write_config(path, &default_config_content())?;
    Ok(true)
}

fn write_config(path: &Path, content: &str) -> Result<(), ConfigError> {
    let io_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(path, content).map_err(io_err)
}
