// src/core/recent.rs

//! # Recent Targets
//!
//! Remembers, per SSO profile, the last scope and the last instance a session
//! was started against. The whole document lives in one JSON file that is
//! rewritten (read, modify, atomic replace) on every update.

use crate::constants::{RECENT_TARGETS_FILENAME, RECENT_TARGETS_VERSION};
use crate::core::paths;
use crate::models::{LaunchTarget, RecentInstance, Scope};
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecentError {
    #[error("failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize recent targets: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// What is remembered about one profile.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProfileRecord {
    pub last_scope: Scope,
    pub last_instance: RecentInstance,
    pub updated_at: DateTime<Utc>,
}

/// The recent targets document.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RecentTargets {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileRecord>,
}

impl Default for RecentTargets {
    fn default() -> Self {
        Self {
            version: RECENT_TARGETS_VERSION,
            profiles: BTreeMap::new(),
        }
    }
}

impl RecentTargets {
    /// The last scope of `profile`, if it names at least an account and a role.
    pub fn last_scope(&self, profile: &str) -> Option<&Scope> {
        let record = self.profiles.get(profile)?;
        let scope = &record.last_scope;
        (!scope.account_id.trim().is_empty() && !scope.role_name.trim().is_empty())
            .then_some(scope)
    }

    /// The last instance of `profile` together with its scope, if complete.
    pub fn last_instance(&self, profile: &str) -> Option<(&Scope, &RecentInstance)> {
        let scope = self.last_scope(profile)?;
        let instance = &self.profiles.get(profile)?.last_instance;
        if instance.instance_id.trim().is_empty() || instance.region.trim().is_empty() {
            return None;
        }
        Some((scope, instance))
    }
}

/// The file-backed store of [`RecentTargets`].
#[derive(Debug, Clone)]
pub struct RecentTargetStore {
    dir: PathBuf,
}

impl RecentTargetStore {
    /// A store keeping its file inside `dir` (the cache root).
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(RECENT_TARGETS_FILENAME)
    }

    /// Loads the document. A missing or unreadable-as-JSON file is empty.
    pub fn load(&self) -> Result<RecentTargets, RecentError> {
        let path = self.path();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(RecentTargets::default()),
            Err(source) => return Err(RecentError::Read { path, source }),
        };
        match serde_json::from_slice::<RecentTargets>(&bytes) {
            Ok(mut targets) => {
                if targets.version == 0 {
                    targets.version = RECENT_TARGETS_VERSION;
                }
                Ok(targets)
            }
            Err(e) => {
                debug!("ignoring malformed '{}': {}", path.display(), e);
                Ok(RecentTargets::default())
            }
        }
    }

    /// Records `target` as the last one used with `profile`.
    pub fn record(&self, profile: &str, target: &LaunchTarget) -> Result<(), RecentError> {
        self.record_parts(profile, target.scope(), target.recent_instance())
    }

    fn record_parts(
        &self,
        profile: &str,
        last_scope: Scope,
        last_instance: RecentInstance,
    ) -> Result<(), RecentError> {
        if profile.trim().is_empty() || self.dir.as_os_str().is_empty() {
            return Ok(());
        }
        let mut targets = self.load()?;
        targets.profiles.insert(
            profile.to_string(),
            ProfileRecord {
                last_scope,
                last_instance,
                updated_at: Utc::now(),
            },
        );
        let content = serde_json::to_vec_pretty(&targets)?;
        let path = self.path();
        write_document(&self.dir, &path, &content)
    }
}

fn write_document(dir: &Path, path: &Path, content: &[u8]) -> Result<(), RecentError> {
    paths::write_atomically(dir, path, content).map_err(|source| RecentError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Account, InstanceCandidate, InstanceFacts, RoleBinding};
    use tempfile::TempDir;

    fn target(instance_id: &str, region: &str) -> LaunchTarget {
        let account = Account {
            id: "111122223333".to_string(),
            name: "payments".to_string(),
            email: String::new(),
        };
        let binding = RoleBinding::new(&account, "Admin");
        let facts = InstanceFacts {
            instance_id: instance_id.to_string(),
            ..Default::default()
        };
        LaunchTarget::from_candidate(InstanceCandidate::new(&binding, region, &facts, true))
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = RecentTargetStore::new(dir.path());

        let targets = store.load().unwrap();

        assert_eq!(targets, RecentTargets::default());
        assert!(targets.last_scope("dev").is_none());
    }

    #[test]
    fn test_record_then_load_per_profile() {
        let dir = TempDir::new().unwrap();
        let store = RecentTargetStore::new(dir.path());

        store.record("dev", &target("i-1", "eu-west-1")).unwrap();
        store.record("prod", &target("i-2", "us-east-1")).unwrap();
        store.record("dev", &target("i-3", "eu-west-2")).unwrap();

        let targets = store.load().unwrap();
        let (scope, instance) = targets.last_instance("dev").unwrap();
        assert_eq!(scope.region, "eu-west-2");
        assert_eq!(scope.role_name, "Admin");
        assert_eq!(instance.instance_id, "i-3");
        assert_eq!(instance.profile_name, "swamp-111122223333-Admin");
        assert_eq!(
            targets.last_instance("prod").map(|(_, i)| i.instance_id.as_str()),
            Some("i-2")
        );
    }

    #[test]
    fn test_document_layout_on_disk() {
        let dir = TempDir::new().unwrap();
        let store = RecentTargetStore::new(dir.path());
        store.record("dev", &target("i-1", "eu-west-1")).unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&fs::read(store.path()).unwrap()).unwrap();

        assert_eq!(raw["version"], 1);
        assert_eq!(raw["profiles"]["dev"]["last_scope"]["account_id"], "111122223333");
        assert_eq!(raw["profiles"]["dev"]["last_instance"]["instance_id"], "i-1");
        assert!(raw["profiles"]["dev"]["updated_at"].is_string());
    }

    #[test]
    fn test_malformed_file_is_treated_as_empty_and_overwritten() {
        let dir = TempDir::new().unwrap();
        let store = RecentTargetStore::new(dir.path());
        fs::write(store.path(), b"{ definitely not json").unwrap();

        assert!(store.load().unwrap().profiles.is_empty());
        store.record("dev", &target("i-1", "eu-west-1")).unwrap();
        assert!(store.load().unwrap().last_instance("dev").is_some());
    }

    #[test]
    fn test_incomplete_records_are_ignored() {
        let dir = TempDir::new().unwrap();
        let store = RecentTargetStore::new(dir.path());
        store
            .record_parts(
                "dev",
                Scope {
                    account_id: "111".to_string(),
                    role_name: "Admin".to_string(),
                    ..Default::default()
                },
                RecentInstance::default(),
            )
            .unwrap();

        let targets = store.load().unwrap();
        assert!(targets.last_scope("dev").is_some());
        assert!(targets.last_instance("dev").is_none());
    }

    #[test]
    fn test_blank_profile_is_not_recorded() {
        let dir = TempDir::new().unwrap();
        let store = RecentTargetStore::new(dir.path());
        store.record("  ", &target("i-1", "eu-west-1")).unwrap();
        assert!(!store.path().exists());
    }
}
