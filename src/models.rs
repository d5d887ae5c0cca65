// src/models.rs

use crate::constants::{ABSENT_FIELD, GENERATED_PROFILE_PREFIX, HANDLE_DIGEST_LEN};
use serde::{Deserialize, Serialize};
use std::fmt;

// --- DISCOVERY MODELS ---
// Transient values rebuilt on every run from the remote directory or the scope
// cache. They are never mutated after construction.

/// An account reachable through the SSO session.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    pub name: String,
    pub email: String,
}

impl Account {
    /// The line shown to the chooser: `name | id | email`.
    pub fn display_line(&self) -> String {
        format!(
            "{} | {} | {}",
            or_absent(&self.name),
            self.id,
            or_absent(&self.email)
        )
    }
}

/// A role the operator may assume inside an account.
/// Identity is `(account_id, role_name)`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoleBinding {
    pub account_id: String,
    pub account_name: String,
    pub role_name: String,
}

impl RoleBinding {
    /// Builds a binding for `role_name` inside `account`.
    pub fn new(account: &Account, role_name: impl Into<String>) -> Self {
        Self {
            account_id: account.id.clone(),
            account_name: account.name.clone(),
            role_name: role_name.into(),
        }
    }

    /// The line shown to the chooser: `accountName | accountId | role`.
    pub fn display_line(&self) -> String {
        format!(
            "{} | {} | {}",
            or_absent(&self.account_name),
            self.account_id,
            self.role_name
        )
    }

    /// The name of the generated AWS profile that assumes this binding.
    ///
    /// Deterministic per `(account, role)`, so handles stored in the scope cache
    /// or in the recent targets file stay valid across runs. Role names that
    /// need sanitizing get a digest of the raw name appended, so two roles
    /// never share a handle.
    pub fn profile_handle(&self) -> String {
        let role: String = self
            .role_name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        if role == self.role_name {
            return format!("{}-{}-{}", GENERATED_PROFILE_PREFIX, self.account_id, role);
        }
        let digest = blake3::hash(self.role_name.as_bytes()).to_hex();
        let short = digest.as_str().get(..HANDLE_DIGEST_LEN).unwrap_or_default();
        format!(
            "{}-{}-{}-{}",
            GENERATED_PROFILE_PREFIX, self.account_id, role, short
        )
    }
}

/// A region code such as `eu-west-1`.
pub type Region = String;

/// Raw fields of one instance, as reported by the remote inventory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceFacts {
    pub instance_id: String,
    pub name: Option<String>,
    pub private_ip: Option<String>,
    pub state: Option<String>,
    pub platform: Option<String>,
}

/// A connectable instance found by the instances stage.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct InstanceCandidate {
    pub instance_id: String,
    pub region: Region,
    pub profile_handle: String,
    pub binding: RoleBinding,
    pub display_line: String,
}

impl InstanceCandidate {
    /// Builds a candidate and its display row.
    ///
    /// Missing fields are rendered as [`ABSENT_FIELD`]. The state and platform
    /// columns are only shown when stopped instances are included.
    pub fn new(
        binding: &RoleBinding,
        region: &str,
        facts: &InstanceFacts,
        running_only: bool,
    ) -> Self {
        let mut line = format!(
            "{} | {} | {} | {} | {} | {} | {}",
            or_absent(&binding.account_name),
            binding.account_id,
            binding.role_name,
            region,
            facts.instance_id,
            opt_or_absent(facts.name.as_deref()),
            opt_or_absent(facts.private_ip.as_deref()),
        );
        if !running_only {
            line.push_str(&format!(
                " | state={} | platform={}",
                opt_or_absent(facts.state.as_deref()),
                opt_or_absent(facts.platform.as_deref()),
            ));
        }
        Self {
            instance_id: facts.instance_id.clone(),
            region: region.to_string(),
            profile_handle: binding.profile_handle(),
            binding: binding.clone(),
            display_line: line,
        }
    }
}

// --- NAVIGATION MODELS ---

/// The `(account, role, region)` coordinate the navigator operates within.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    pub account_id: String,
    pub account_name: String,
    pub role_name: String,
    pub region: String,
}

impl Scope {
    /// The binding this scope assumes.
    pub fn binding(&self) -> RoleBinding {
        RoleBinding {
            account_id: self.account_id.clone(),
            account_name: self.account_name.clone(),
            role_name: self.role_name.clone(),
        }
    }
}

/// The last instance a session was started against.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct RecentInstance {
    pub instance_id: String,
    pub region: String,
    pub profile_name: String,
    pub display_line: String,
}

/// The fully resolved target handed to the session launcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchTarget {
    pub binding: RoleBinding,
    pub region: Region,
    pub instance: InstanceCandidate,
}

impl LaunchTarget {
    /// Builds a target from the instance it points at.
    pub fn from_candidate(candidate: InstanceCandidate) -> Self {
        Self {
            binding: candidate.binding.clone(),
            region: candidate.region.clone(),
            instance: candidate,
        }
    }

    /// The scope persisted for `--resume`.
    pub fn scope(&self) -> Scope {
        Scope {
            account_id: self.binding.account_id.clone(),
            account_name: self.binding.account_name.clone(),
            role_name: self.binding.role_name.clone(),
            region: self.region.clone(),
        }
    }

    /// The instance persisted for `--last`.
    pub fn recent_instance(&self) -> RecentInstance {
        RecentInstance {
            instance_id: self.instance.instance_id.clone(),
            region: self.region.clone(),
            profile_name: self.instance.profile_handle.clone(),
            display_line: self.instance.display_line.clone(),
        }
    }
}

impl fmt::Display for LaunchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} in {} (account {}, role {})",
            self.instance.instance_id, self.region, self.binding.account_id, self.binding.role_name
        )
    }
}

// --- DISPLAY HELPERS ---

fn or_absent(value: &str) -> &str {
    if value.trim().is_empty() {
        ABSENT_FIELD
    } else {
        value
    }
}

fn opt_or_absent(value: Option<&str>) -> &str {
    or_absent(value.unwrap_or_default())
}

/// Human-readable name of a well-known region, or [`ABSENT_FIELD`].
pub fn region_display_name(code: &str) -> &'static str {
    match code {
        "af-south-1" => "Africa (Cape Town)",
        "ap-east-1" => "Asia Pacific (Hong Kong)",
        "ap-northeast-1" => "Asia Pacific (Tokyo)",
        "ap-northeast-2" => "Asia Pacific (Seoul)",
        "ap-northeast-3" => "Asia Pacific (Osaka)",
        "ap-south-1" => "Asia Pacific (Mumbai)",
        "ap-south-2" => "Asia Pacific (Hyderabad)",
        "ap-southeast-1" => "Asia Pacific (Singapore)",
        "ap-southeast-2" => "Asia Pacific (Sydney)",
        "ap-southeast-3" => "Asia Pacific (Jakarta)",
        "ap-southeast-4" => "Asia Pacific (Melbourne)",
        "ca-central-1" => "Canada (Central)",
        "ca-west-1" => "Canada West (Calgary)",
        "eu-central-1" => "Europe (Frankfurt)",
        "eu-central-2" => "Europe (Zurich)",
        "eu-north-1" => "Europe (Stockholm)",
        "eu-south-1" => "Europe (Milan)",
        "eu-south-2" => "Europe (Spain)",
        "eu-west-1" => "Europe (Ireland)",
        "eu-west-2" => "Europe (London)",
        "eu-west-3" => "Europe (Paris)",
        "il-central-1" => "Israel (Tel Aviv)",
        "me-central-1" => "Middle East (UAE)",
        "me-south-1" => "Middle East (Bahrain)",
        "sa-east-1" => "South America (Sao Paulo)",
        "us-east-1" => "US East (N. Virginia)",
        "us-east-2" => "US East (Ohio)",
        "us-west-1" => "US West (N. California)",
        "us-west-2" => "US West (Oregon)",
        _ => ABSENT_FIELD,
    }
}

/// The line shown to the chooser for a region: `code | name`.
pub fn region_display_line(code: &str) -> String {
    format!("{} | {}", code, region_display_name(code))
}
