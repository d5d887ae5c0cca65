// src/system/aws_config.rs

//! # AWS Profile Configuration
//!
//! Reads the SSO profile the run starts from out of `~/.aws/config`, and
//! maintains the temporary config file ([`ProfileSpace`]) in which every role
//! binding used during the run gets its own generated profile.

use crate::constants::FALLBACK_REGION;
use crate::models::RoleBinding;
use log::debug;
use std::{
    collections::BTreeMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
};
use tempfile::TempPath;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AwsConfigError {
    #[error("could not read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("profile '{0}' was not found in ~/.aws/config")]
    ProfileNotFound(String),
    #[error("profile '{0}' is not configured as an SSO profile")]
    NotSso(String),
    #[error("failed to write temporary AWS config: {0}")]
    Write(#[source] std::io::Error),
}

type Sections = BTreeMap<String, BTreeMap<String, String>>;

/// The resolved settings of one SSO profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileConfig {
    pub name: String,
    pub region: Option<String>,
    pub output: Option<String>,
    pub sso_session: Option<String>,
    pub sso_start_url: Option<String>,
    pub sso_region: Option<String>,
}

impl ProfileConfig {
    /// The region of the SSO portal.
    pub fn sso_region(&self) -> &str {
        self.sso_region.as_deref().unwrap_or(FALLBACK_REGION)
    }

    /// The region used to enumerate regions: the profile's, else the SSO region.
    pub fn discovery_region(&self) -> &str {
        self.region.as_deref().unwrap_or_else(|| self.sso_region())
    }
}

/// Splits an INI document into `section -> key -> value`.
///
/// Keys are lowercased; blank lines, `#` and `;` comments and keys outside a
/// section are skipped.
fn parse_sections(content: &str) -> Sections {
    let mut sections = Sections::new();
    let mut current: Option<String> = None;
    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            let name = name.trim().to_string();
            sections.entry(name.clone()).or_default();
            current = Some(name);
            continue;
        }
        let (Some(section), Some((key, value))) = (current.as_ref(), line.split_once('=')) else {
            continue;
        };
        let (key, value) = (key.trim().to_lowercase(), value.trim());
        if key.is_empty() || value.is_empty() {
            continue;
        }
        sections
            .entry(section.clone())
            .or_default()
            .insert(key, value.to_string());
    }
    sections
}

/// Resolves `profile` from the content of an AWS config file.
pub fn profile_from_content(content: &str, profile: &str) -> Result<ProfileConfig, AwsConfigError> {
    let sections = parse_sections(content);
    let values = sections
        .get(&format!("profile {}", profile))
        .ok_or_else(|| AwsConfigError::ProfileNotFound(profile.to_string()))?;
    let get = |key: &str| values.get(key).cloned();

    let mut config = ProfileConfig {
        name: profile.to_string(),
        region: get("region"),
        output: get("output"),
        sso_session: get("sso_session"),
        sso_start_url: get("sso_start_url"),
        sso_region: get("sso_region"),
    };

    if let Some(session) = config
        .sso_session
        .as_ref()
        .and_then(|s| sections.get(&format!("sso-session {}", s)))
    {
        if config.sso_start_url.is_none() {
            config.sso_start_url = session.get("sso_start_url").cloned();
        }
        if config.sso_region.is_none() {
            config.sso_region = session.get("sso_region").cloned();
        }
    }
    if config.sso_region.is_none() {
        config.sso_region = config.region.clone();
    }

    if config.sso_session.is_none()
        && (config.sso_start_url.is_none() || config.sso_region.is_none())
    {
        return Err(AwsConfigError::NotSso(profile.to_string()));
    }
    Ok(config)
}

/// Reads `profile` from the AWS config file at `path`.
pub fn read_profile_config(path: &Path, profile: &str) -> Result<ProfileConfig, AwsConfigError> {
    let content = fs::read_to_string(path).map_err(|source| AwsConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    profile_from_content(&content, profile)
}

// --- Profile Space ---

/// A temporary AWS config file: the user's config plus one generated profile
/// per registered role binding.
///
/// The file is rewritten atomically whenever a new binding is registered and
/// deleted when the space is dropped.
#[derive(Debug)]
pub struct ProfileSpace {
    base_content: String,
    base: ProfileConfig,
    path: TempPath,
    /// Registered bindings keyed by `(account_id, role_name)`.
    bindings: Mutex<BTreeMap<(String, String), RoleBinding>>,
}

impl ProfileSpace {
    /// Creates the temporary file, seeded with the user's config.
    pub fn create(base_config_path: &Path, base: ProfileConfig) -> Result<Self, AwsConfigError> {
        let base_content =
            fs::read_to_string(base_config_path).map_err(|source| AwsConfigError::Read {
                path: base_config_path.to_path_buf(),
                source,
            })?;
        Self::from_content(base_content, base)
    }

    fn from_content(base_content: String, base: ProfileConfig) -> Result<Self, AwsConfigError> {
        let mut file = tempfile::Builder::new()
            .prefix("aws-config-swamp-")
            .suffix(".ini")
            .tempfile()
            .map_err(AwsConfigError::Write)?;
        file.write_all(base_content.as_bytes())
            .map_err(AwsConfigError::Write)?;
        Ok(Self {
            base_content,
            base,
            path: file.into_temp_path(),
            bindings: Mutex::new(BTreeMap::new()),
        })
    }

    /// The file to hand to the AWS CLI as `AWS_CONFIG_FILE`.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Makes sure `binding` has a generated profile and returns its name.
    pub fn register(&self, binding: &RoleBinding) -> Result<String, AwsConfigError> {
        let handle = binding.profile_handle();
        let mut bindings = self
            .bindings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let identity = (binding.account_id.clone(), binding.role_name.clone());
        if !bindings.contains_key(&identity) {
            debug!("registering profile '{}'", handle);
            bindings.insert(identity.clone(), binding.clone());
            let content = self.render(bindings.values());
            if let Err(e) = self.rewrite(&content) {
                bindings.remove(&identity);
                return Err(e);
            }
        }
        Ok(handle)
    }

    fn rewrite(&self, content: &str) -> Result<(), AwsConfigError> {
        let dir = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(std::env::temp_dir);
        let mut next = tempfile::NamedTempFile::new_in(dir).map_err(AwsConfigError::Write)?;
        next.write_all(content.as_bytes())
            .map_err(AwsConfigError::Write)?;
        next.persist(&self.path)
            .map_err(|e| AwsConfigError::Write(e.error))?;
        Ok(())
    }

    fn render<'b>(&self, bindings: impl Iterator<Item = &'b RoleBinding>) -> String {
        let mut out = self.base_content.clone();
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        for binding in bindings {
            out.push_str(&format!("\n[profile {}]\n", binding.profile_handle()));
            match &self.base.sso_session {
                Some(session) => out.push_str(&format!("sso_session = {}\n", session)),
                None => {
                    out.push_str(&format!(
                        "sso_start_url = {}\n",
                        self.base.sso_start_url.as_deref().unwrap_or_default()
                    ));
                    out.push_str(&format!("sso_region = {}\n", self.base.sso_region()));
                }
            }
            out.push_str(&format!("sso_account_id = {}\n", binding.account_id));
            out.push_str(&format!("sso_role_name = {}\n", binding.role_name));
            out.push_str(&format!(
                "region = {}\n",
                self.base.region.as_deref().unwrap_or(FALLBACK_REGION)
            ));
            out.push_str(&format!(
                "output = {}\n",
                self.base.output.as_deref().unwrap_or("json")
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
# comment
[default]
region = eu-west-1

[profile legacy]
sso_start_url = https://legacy.awsapps.com/start
sso_region = us-east-2
region = eu-central-1

[profile modern]
sso_session = corp
Region = eu-west-1
output = table

[sso-session corp]
sso_start_url = https://corp.awsapps.com/start/
sso_region = eu-west-1

[profile plain]
region = us-east-1
"#;

    fn binding(account: &str, role: &str) -> RoleBinding {
        RoleBinding {
            account_id: account.to_string(),
            account_name: "acct".to_string(),
            role_name: role.to_string(),
        }
    }

    #[test]
    fn test_legacy_profile_keeps_its_own_values() {
        let config = profile_from_content(CONFIG, "legacy").unwrap();
        assert_eq!(config.sso_start_url.as_deref(), Some("https://legacy.awsapps.com/start"));
        assert_eq!(config.sso_region(), "us-east-2");
        assert_eq!(config.discovery_region(), "eu-central-1");
    }

    #[test]
    fn test_session_profile_inherits_from_session_section() {
        let config = profile_from_content(CONFIG, "modern").unwrap();
        assert_eq!(config.sso_session.as_deref(), Some("corp"));
        assert_eq!(config.sso_start_url.as_deref(), Some("https://corp.awsapps.com/start/"));
        assert_eq!(config.sso_region(), "eu-west-1");
        assert_eq!(config.output.as_deref(), Some("table"));
    }

    #[test]
    fn test_missing_and_non_sso_profiles_are_errors() {
        assert!(matches!(
            profile_from_content(CONFIG, "ghost"),
            Err(AwsConfigError::ProfileNotFound(_))
        ));
        assert!(matches!(
            profile_from_content(CONFIG, "plain"),
            Err(AwsConfigError::NotSso(_))
        ));
    }

    #[test]
    fn test_profile_space_registers_each_binding_once() {
        let base = profile_from_content(CONFIG, "modern").unwrap();
        let space = ProfileSpace::from_content(CONFIG.to_string(), base).unwrap();

        let handle = space.register(&binding("111", "Admin")).unwrap();
        space.register(&binding("111", "Admin")).unwrap();
        let spaced = space.register(&binding("222", "Read Only")).unwrap();

        let written = fs::read_to_string(space.path()).unwrap();
        assert_eq!(handle, "swamp-111-Admin");
        assert_eq!(written.matches("[profile swamp-111-Admin]").count(), 1);
        assert!(spaced.starts_with("swamp-222-Read_Only-"));
        assert!(written.contains(&format!("[profile {}]", spaced)));
        assert!(written.contains("sso_role_name = Read Only"));
        assert!(written.contains("sso_session = corp"));
        assert!(written.contains("output = table"));
        assert!(written.starts_with(CONFIG));
    }

    #[test]
    fn test_renamed_account_does_not_duplicate_a_profile() {
        let base = profile_from_content(CONFIG, "modern").unwrap();
        let space = ProfileSpace::from_content(CONFIG.to_string(), base).unwrap();
        let mut renamed = binding("111", "Admin");
        renamed.account_name = "acct-renamed".to_string();

        let first = space.register(&binding("111", "Admin")).unwrap();
        let second = space.register(&renamed).unwrap();

        assert_eq!(first, second);
        let written = fs::read_to_string(space.path()).unwrap();
        assert_eq!(written.matches("[profile swamp-111-Admin]").count(), 1);
    }

    #[test]
    fn test_roles_that_sanitize_alike_get_separate_profiles() {
        let base = profile_from_content(CONFIG, "modern").unwrap();
        let space = ProfileSpace::from_content(CONFIG.to_string(), base).unwrap();

        let dotted = space.register(&binding("111", "Admin.Ops")).unwrap();
        let plain = space.register(&binding("111", "Admin_Ops")).unwrap();

        assert_ne!(dotted, plain);
        let written = fs::read_to_string(space.path()).unwrap();
        assert_eq!(written.matches(&format!("[profile {}]\n", plain)).count(), 1);
        assert_eq!(written.matches(&format!("[profile {}]\n", dotted)).count(), 1);
        assert!(written.contains("sso_role_name = Admin.Ops"));
        assert!(written.contains("sso_role_name = Admin_Ops"));
    }

    #[test]
    fn test_profile_space_file_is_removed_on_drop() {
        let base = profile_from_content(CONFIG, "legacy").unwrap();
        let space = ProfileSpace::from_content(CONFIG.to_string(), base).unwrap();
        space.register(&binding("111", "Admin")).unwrap();
        let path = space.path().to_path_buf();
        assert!(path.exists());

        drop(space);
        assert!(!path.exists());
    }
}
