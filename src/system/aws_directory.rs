// src/system/aws_directory.rs

//! The [`RemoteDirectory`] backed by the AWS CLI.
//!
//! SSO listings use the bearer token directly. EC2 listings run under the
//! generated profile of the role binding, through the temporary config file
//! of a [`ProfileSpace`].

use crate::core::interfaces::{RemoteDirectory, RemoteError};
use crate::models::{Account, InstanceCandidate, InstanceFacts, Region, RoleBinding};
use crate::system::aws_config::ProfileSpace;
use crate::system::executor;
use serde::Deserialize;
use std::{collections::HashMap, sync::Arc};

// --- Response Shapes ---

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountsResponse {
    #[serde(default)]
    account_list: Vec<AccountEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountEntry {
    #[serde(default)]
    account_id: String,
    #[serde(default)]
    account_name: String,
    #[serde(default)]
    email_address: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RolesResponse {
    #[serde(default)]
    role_list: Vec<RoleEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoleEntry {
    #[serde(default)]
    role_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RegionsResponse {
    #[serde(default)]
    regions: Vec<RegionEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RegionEntry {
    #[serde(default)]
    region_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstancesResponse {
    #[serde(default)]
    reservations: Vec<Reservation>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Reservation {
    #[serde(default)]
    instances: Vec<InstanceEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceEntry {
    #[serde(default)]
    instance_id: String,
    private_ip_address: Option<String>,
    platform_details: Option<String>,
    state: Option<InstanceState>,
    #[serde(default)]
    tags: Vec<Tag>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceState {
    name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Tag {
    key: String,
    #[serde(default)]
    value: String,
}

// --- Decoders ---

fn decode<T: for<'de> Deserialize<'de>>(operation: &str, json: &str) -> Result<T, RemoteError> {
    serde_json::from_str(json).map_err(|source| RemoteError::Decode {
        operation: operation.to_string(),
        source,
    })
}

/// Decodes `sso list-accounts` output. Entries without an id are skipped.
pub fn parse_accounts(json: &str) -> Result<Vec<Account>, RemoteError> {
    let response: AccountsResponse = decode("list-accounts", json)?;
    Ok(response
        .account_list
        .into_iter()
        .filter(|a| !a.account_id.trim().is_empty())
        .map(|a| Account {
            id: a.account_id,
            name: a.account_name,
            email: a.email_address,
        })
        .collect())
}

/// Decodes `sso list-account-roles` output for `account`. Blank role names are skipped.
pub fn parse_roles(json: &str, account: &Account) -> Result<Vec<RoleBinding>, RemoteError> {
    let response: RolesResponse = decode("list-account-roles", json)?;
    Ok(response
        .role_list
        .into_iter()
        .filter(|r| !r.role_name.trim().is_empty())
        .map(|r| RoleBinding::new(account, r.role_name))
        .collect())
}

/// Decodes `ec2 describe-regions` output, sorted.
pub fn parse_regions(json: &str) -> Result<Vec<Region>, RemoteError> {
    let response: RegionsResponse = decode("describe-regions", json)?;
    let mut regions: Vec<Region> = response
        .regions
        .into_iter()
        .map(|r| r.region_name.trim().to_string())
        .filter(|r| !r.is_empty())
        .collect();
    regions.sort();
    Ok(regions)
}

/// Decodes `ec2 describe-instances` output into candidates of `binding` in `region`.
pub fn parse_instances(
    json: &str,
    binding: &RoleBinding,
    region: &str,
    running_only: bool,
) -> Result<Vec<InstanceCandidate>, RemoteError> {
    let response: InstancesResponse = decode("describe-instances", json)?;
    Ok(response
        .reservations
        .into_iter()
        .flat_map(|r| r.instances)
        .filter(|i| !i.instance_id.trim().is_empty())
        .map(|i| {
            let facts = InstanceFacts {
                name: i
                    .tags
                    .iter()
                    .find(|t| t.key == "Name")
                    .map(|t| t.value.clone()),
                private_ip: i.private_ip_address,
                state: i.state.and_then(|s| s.name),
                platform: i.platform_details,
                instance_id: i.instance_id,
            };
            InstanceCandidate::new(binding, region, &facts, running_only)
        })
        .collect())
}

// --- Directory ---

/// Lists the access scope by running the `aws` CLI.
#[derive(Debug)]
pub struct AwsCliDirectory {
    sso_profile: String,
    sso_region: String,
    discovery_region: String,
    access_token: String,
    space: Arc<ProfileSpace>,
}

impl AwsCliDirectory {
    pub fn new(
        sso_profile: impl Into<String>,
        sso_region: impl Into<String>,
        discovery_region: impl Into<String>,
        access_token: impl Into<String>,
        space: Arc<ProfileSpace>,
    ) -> Self {
        Self {
            sso_profile: sso_profile.into(),
            sso_region: sso_region.into(),
            discovery_region: discovery_region.into(),
            access_token: access_token.into(),
            space,
        }
    }

    /// Runs `aws --profile <profile> <args> --output json`.
    fn run_json(
        &self,
        operation: &str,
        profile: &str,
        args: &[&str],
        with_profile_space: bool,
    ) -> Result<String, RemoteError> {
        let mut full: Vec<String> = vec!["--profile".to_string(), profile.to_string()];
        full.extend(args.iter().map(|a| a.to_string()));
        full.extend(["--output".to_string(), "json".to_string()]);

        let mut env = HashMap::new();
        if with_profile_space {
            env.insert("AWS_SDK_LOAD_CONFIG".to_string(), "1".to_string());
            env.insert(
                "AWS_CONFIG_FILE".to_string(),
                self.space.path().to_string_lossy().into_owned(),
            );
        }
        executor::capture_output("aws", &full, &env).map_err(|e| RemoteError::Transport {
            operation: operation.to_string(),
            message: e.to_string(),
        })
    }

    /// Registers `binding` in the profile space and returns its profile name.
    fn profile_for(&self, operation: &str, binding: &RoleBinding) -> Result<String, RemoteError> {
        self.space
            .register(binding)
            .map_err(|e| RemoteError::Transport {
                operation: operation.to_string(),
                message: e.to_string(),
            })
    }
}

impl RemoteDirectory for AwsCliDirectory {
    fn list_accounts(&self) -> Result<Vec<Account>, RemoteError> {
        let out = self.run_json(
            "list-accounts",
            &self.sso_profile,
            &[
                "sso",
                "list-accounts",
                "--region",
                &self.sso_region,
                "--access-token",
                &self.access_token,
            ],
            false,
        )?;
        parse_accounts(&out)
    }

    fn list_roles(&self, account: &Account) -> Result<Vec<RoleBinding>, RemoteError> {
        let out = self.run_json(
            "list-account-roles",
            &self.sso_profile,
            &[
                "sso",
                "list-account-roles",
                "--region",
                &self.sso_region,
                "--access-token",
                &self.access_token,
                "--account-id",
                &account.id,
            ],
            false,
        )?;
        parse_roles(&out, account)
    }

    fn list_regions(
        &self,
        binding: &RoleBinding,
        all_regions: bool,
    ) -> Result<Vec<Region>, RemoteError> {
        let profile = self.profile_for("describe-regions", binding)?;
        let mut args = vec!["ec2", "describe-regions", "--region", self.discovery_region.as_str()];
        if all_regions {
            args.push("--all-regions");
        }
        let out = self.run_json("describe-regions", &profile, &args, true)?;
        parse_regions(&out)
    }

    fn list_instances(
        &self,
        binding: &RoleBinding,
        region: &str,
        running_only: bool,
    ) -> Result<Vec<InstanceCandidate>, RemoteError> {
        let profile = self.profile_for("describe-instances", binding)?;
        let mut args = vec!["ec2", "describe-instances", "--region", region];
        if running_only {
            args.extend(["--filters", "Name=instance-state-name,Values=running"]);
        }
        let out = self.run_json("describe-instances", &profile, &args, true)?;
        parse_instances(&out, binding, region, running_only)
    }
}
