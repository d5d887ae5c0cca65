// src/core/cache.rs

//! # Scope Cache
//!
//! A file-backed, TTL-based cache with stale-while-revalidate reads.
//!
//! Every entry is one JSON envelope stored under `<cache dir>/scope/`, named
//! after a blake3 hash of `profile|key`. Writes go through a temporary file in
//! the same directory followed by an atomic rename, so readers only ever see a
//! complete envelope. A read that finds a corrupt or mismatched envelope deletes
//! it and reports a miss.
//!
//! Failures of this module never abort discovery. `read` degrades to
//! [`CacheRead::Miss`] and callers log and ignore a failed `write`.

use crate::constants::{CACHE_SCHEMA_VERSION, REFRESH_PERMITS, SCOPE_CACHE_DIRNAME};
use crate::core::paths;
use chrono::{DateTime, Utc};
use log::{debug, trace};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{
    fmt,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
    thread,
    time::Duration,
};
use thiserror::Error;
use tokio::sync::Semaphore;

/// How reads treat cached entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// Serve fresh entries, serve stale entries while refreshing them.
    #[default]
    Balanced,
    /// Never read the cache. Results are still written back.
    Fresh,
    /// Same read policy as `Balanced`.
    Speed,
}

impl CacheMode {
    /// The accepted spellings, for error messages.
    pub const VARIANTS: &'static str = "balanced, fresh, speed";
}

impl FromStr for CacheMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "balanced" => Ok(Self::Balanced),
            "fresh" => Ok(Self::Fresh),
            "speed" => Ok(Self::Speed),
            other => Err(format!(
                "unknown cache mode '{}' (expected one of: {})",
                other,
                Self::VARIANTS
            )),
        }
    }
}

impl fmt::Display for CacheMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Balanced => "balanced",
            Self::Fresh => "fresh",
            Self::Speed => "speed",
        })
    }
}

/// Settings for a [`ScopeCache`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    /// The cache root. Entries live in its `scope/` sub-directory.
    pub dir: PathBuf,
    pub mode: CacheMode,
    /// Maximum number of background refreshes in flight.
    pub refresh_permits: usize,
}

impl CacheConfig {
    /// An enabled cache rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>, mode: CacheMode) -> Self {
        Self {
            enabled: true,
            dir: dir.into(),
            mode,
            refresh_permits: REFRESH_PERMITS,
        }
    }
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache I/O on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize cache entry: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The outcome of a cache read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheRead<T> {
    /// The entry exists and has not expired.
    Fresh(T),
    /// The entry exists but expired; `age` is measured from its creation.
    Stale { value: T, age: Duration },
    /// No usable entry.
    Miss,
}

/// On-disk envelope of one entry.
#[derive(Serialize, Deserialize, Debug)]
struct CacheEnvelope {
    version: u32,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    profile: String,
    key: String,
    payload: serde_json::Value,
}

/// The scope cache. Cheap to share behind an `Arc`.
#[derive(Debug)]
pub struct ScopeCache {
    config: CacheConfig,
    refresh_permits: Arc<Semaphore>,
}

impl ScopeCache {
    pub fn new(config: CacheConfig) -> Self {
        let permits = config.refresh_permits.max(1);
        Self {
            config,
            refresh_permits: Arc::new(Semaphore::new(permits)),
        }
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self::new(CacheConfig {
            enabled: false,
            dir: PathBuf::new(),
            mode: CacheMode::Fresh,
            refresh_permits: 1,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn mode(&self) -> CacheMode {
        self.config.mode
    }

    /// Whether a stale entry may be served while it is refreshed.
    pub fn allows_stale(&self) -> bool {
        self.config.enabled && matches!(self.config.mode, CacheMode::Balanced | CacheMode::Speed)
    }

    fn bypasses_reads(&self) -> bool {
        !self.config.enabled || self.config.mode == CacheMode::Fresh
    }

    /// The directory holding entry files.
    pub fn entries_dir(&self) -> PathBuf {
        self.config.dir.join(SCOPE_CACHE_DIRNAME)
    }

    /// The file an entry for `(profile, key)` is stored in.
    pub fn entry_path(&self, profile: &str, key: &str) -> PathBuf {
        let hash = blake3::hash(format!("{}|{}", profile, key).as_bytes());
        self.entries_dir()
            .join(format!("{}.json", hex::encode(hash.as_bytes())))
    }

    /// Reads the entry for `(profile, key)`.
    ///
    /// Corrupt, mismatched or undecodable entries are deleted and reported as a miss.
    pub fn read<T: DeserializeOwned>(&self, profile: &str, key: &str) -> CacheRead<T> {
        if self.bypasses_reads() {
            return CacheRead::Miss;
        }
        let path = self.entry_path(profile, key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                trace!("cache miss for '{}'", key);
                return CacheRead::Miss;
            }
            Err(e) => {
                debug!("cache read of '{}' failed: {}", path.display(), e);
                return CacheRead::Miss;
            }
        };

        let envelope: CacheEnvelope = match serde_json::from_slice(&bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                discard(&path, &format!("corrupt envelope: {}", e));
                return CacheRead::Miss;
            }
        };
        if envelope.version != CACHE_SCHEMA_VERSION
            || envelope.profile != profile
            || envelope.key != key
        {
            discard(&path, "schema or identity mismatch");
            return CacheRead::Miss;
        }
        let value: T = match serde_json::from_value(envelope.payload) {
            Ok(value) => value,
            Err(e) => {
                discard(&path, &format!("payload does not decode: {}", e));
                return CacheRead::Miss;
            }
        };

        let now = Utc::now();
        if now < envelope.expires_at {
            trace!("cache hit (fresh) for '{}'", key);
            CacheRead::Fresh(value)
        } else {
            let age = (now - envelope.created_at).to_std().unwrap_or(Duration::ZERO);
            debug!("cache hit (stale, {:?} old) for '{}'", age, key);
            CacheRead::Stale { value, age }
        }
    }

    /// Stores `payload` for `(profile, key)`, expiring after `ttl`.
    ///
    /// A zero `ttl` marks the value as not cacheable and writes nothing.
    pub fn write<T: Serialize + ?Sized>(
        &self,
        profile: &str,
        key: &str,
        ttl: Duration,
        payload: &T,
    ) -> Result<(), CacheError> {
        if !self.config.enabled || ttl.is_zero() {
            return Ok(());
        }
        let dir = self.entries_dir();
        fs::create_dir_all(&dir).map_err(|source| CacheError::Io {
            path: dir.clone(),
            source,
        })?;

        let created_at = Utc::now();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| created_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let envelope = CacheEnvelope {
            version: CACHE_SCHEMA_VERSION,
            created_at,
            expires_at,
            profile: profile.to_string(),
            key: key.to_string(),
            payload: serde_json::to_value(payload)?,
        };
        let content = serde_json::to_vec(&envelope)?;

        let path = self.entry_path(profile, key);
        paths::write_atomically(&dir, &path, &content)
            .map_err(|source| CacheError::Io { path, source })?;
        trace!("cache write for '{}' ({:?})", key, ttl);
        Ok(())
    }

    /// Deletes every entry. Other files in the cache root are left alone.
    pub fn clear(&self) -> Result<(), CacheError> {
        if !self.config.enabled {
            return Ok(());
        }
        let dir = self.entries_dir();
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CacheError::Io { path: dir, source }),
        }
    }

    /// Runs `refresh` on a background thread if a refresh permit is free.
    ///
    /// Returns whether the refresh was scheduled. When every permit is taken
    /// the request is dropped, never queued. Failures of `refresh` are logged
    /// and otherwise ignored.
    pub fn refresh_async<F>(&self, refresh: F) -> bool
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        if !self.config.enabled {
            return false;
        }
        let permit = match Arc::clone(&self.refresh_permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                debug!("background refresh dropped: all permits in use");
                return false;
            }
        };
        thread::Builder::new()
            .name("swamp-refresh".to_string())
            .spawn(move || {
                let _permit = permit;
                if let Err(e) = refresh() {
                    debug!("background refresh failed: {:#}", e);
                }
            })
            .map_err(|e| debug!("could not spawn background refresh: {}", e))
            .is_ok()
    }
}

fn discard(path: &Path, reason: &str) {
    debug!("discarding cache entry '{}': {}", path.display(), reason);
    if let Err(e) = fs::remove_file(path) {
        debug!("could not remove '{}': {}", path.display(), e);
    }
}

/// Logical keys of the cacheable discovery operations.
///
/// Components are escaped before joining, so distinct parameter tuples always
/// produce distinct keys.
pub mod keys {
    fn join(op: &str, parts: &[&str]) -> String {
        let mut key = String::from(op);
        for part in parts {
            key.push(':');
            key.push_str(&part.replace('\\', "\\\\").replace(':', "\\:"));
        }
        key
    }

    pub fn accounts(profile: &str, sso_region: &str) -> String {
        join("accounts", &[profile, sso_region])
    }

    pub fn roles(profile: &str, sso_region: &str, account_id: &str) -> String {
        join("roles", &[profile, sso_region, account_id])
    }

    pub fn regions(
        profile: &str,
        account_id: &str,
        role: &str,
        discovery_region: &str,
        all_regions: bool,
    ) -> String {
        let all = all_regions.to_string();
        join(
            "regions",
            &[profile, account_id, role, discovery_region, &all],
        )
    }

    pub fn instances(
        profile: &str,
        account_id: &str,
        role: &str,
        region: &str,
        running_only: bool,
    ) -> String {
        let running = running_only.to_string();
        join("instances", &[profile, account_id, role, region, &running])
    }
}
