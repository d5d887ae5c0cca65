// src/core/paths.rs

use crate::constants::{APP_DIR, CONFIG_FILENAME};
use lazy_static::lazy_static;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

lazy_static! {
    static ref HOME_DIR: Option<PathBuf> = dirs::home_dir().filter(|h| !h.as_os_str().is_empty());
}

#[derive(Error, Debug)]
pub enum PathError {
    #[error("failed to expand path '{path}': {message}")]
    Expansion { path: String, message: String },
}

/// Joins `relative` onto the home directory, or returns it unchanged when
/// there is no home directory.
fn under_home(relative: &str) -> PathBuf {
    match HOME_DIR.as_ref() {
        Some(home) => home.join(relative),
        None => PathBuf::from(relative),
    }
}

/// `~/.config/swamp/config.toml`
pub fn default_config_path() -> PathBuf {
    under_home(".config").join(APP_DIR).join(CONFIG_FILENAME)
}

/// The platform cache directory plus `swamp`, falling back to `~/.cache/swamp`
/// and finally to `.swamp-cache` in the working directory.
pub fn default_cache_dir() -> PathBuf {
    if let Some(dir) = dirs::cache_dir() {
        return dir.join(APP_DIR);
    }
    match HOME_DIR.as_ref() {
        Some(home) => home.join(".cache").join(APP_DIR),
        None => PathBuf::from(format!(".{}-cache", APP_DIR)),
    }
}

/// `~/.aws/config`
pub fn aws_config_path() -> PathBuf {
    under_home(".aws/config")
}

/// `~/.aws/sso/cache`, where the AWS CLI stores SSO access tokens.
pub fn aws_sso_cache_dir() -> PathBuf {
    under_home(".aws/sso/cache")
}

/// Expands `~` and environment variables (`$VAR`, `${VAR}`) in a user-supplied path.
pub fn expand_path(raw: &str) -> Result<PathBuf, PathError> {
    let trimmed = raw.trim();
    let expanded = shellexpand::full(trimmed).map_err(|e| PathError::Expansion {
        path: trimmed.to_string(),
        message: e.to_string(),
    })?;
    Ok(PathBuf::from(expanded.into_owned()))
}

/// Writes `content` to a temporary file inside `dir`, then renames it over `path`.
///
/// Readers of `path` see either the previous content or the new one, never a
/// partial write. `dir` must be on the same filesystem as `path`.
pub fn write_atomically(dir: &Path, path: &Path, content: &[u8]) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::Builder::new()
        .prefix(".swamp-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    tmp.write_all(content)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
