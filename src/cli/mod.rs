// src/cli/mod.rs

use crate::core::settings::SettingsLayer;
use clap::Parser;

pub mod handlers;

/// swamp: discover EC2 instances across your AWS SSO scope and connect via SSM.
#[derive(Parser, Debug, Default)]
#[command(
    name = "swamp",
    author,
    version,
    about,
    styles = clap::builder::Styles::styled()
        .header(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .usage(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .literal(clap::builder::styling::AnsiColor::Cyan.on_default().bold())
        .placeholder(clap::builder::styling::AnsiColor::Green.on_default()),
)]
pub struct Cli {
    /// AWS SSO profile name to bootstrap discovery (required).
    #[arg(long, short)]
    pub profile: Option<String>,

    /// Number of concurrent workers for role and instance scanning.
    #[arg(long, short, allow_negative_numbers = true)]
    pub workers: Option<i64>,

    /// Filter to a specific account ID or account-name substring.
    #[arg(long, short)]
    pub account: Option<String>,

    /// Filter to a specific role name.
    #[arg(long, short)]
    pub role: Option<String>,

    /// Comma-separated regions to scan (default: discover all enabled regions).
    #[arg(long, short = 'R')]
    pub regions: Option<String>,

    /// Include all regions, even those not enabled in the account.
    #[arg(long, short = 'A')]
    pub all_regions: bool,

    /// Include non-running instances in selection.
    #[arg(long, short = 's')]
    pub include_stopped: bool,

    /// Resume with the last successful account/role/region scope.
    #[arg(long, short = 'u')]
    pub resume: bool,

    /// Reconnect directly to the last successful instance.
    #[arg(long, short)]
    pub last: bool,

    /// Disable auto-selection when only one option is available.
    #[arg(long)]
    pub no_auto_select: bool,

    /// Path to the swamp config file (default: ~/.config/swamp/config.toml).
    #[arg(long, short)]
    pub config: Option<String>,

    /// Write an example config file (to --config, or `-` for stdout) and exit.
    #[arg(long)]
    pub write_config_example: bool,

    /// Print the effective runtime settings and where each came from, then exit.
    #[arg(long)]
    pub print_effective_config: bool,

    /// Enable the local discovery cache (`--cache=false` disables it).
    #[arg(long, num_args = 0..=1, default_missing_value = "true", require_equals = true)]
    pub cache: Option<bool>,

    /// Directory for local cache files.
    #[arg(long)]
    pub cache_dir: Option<String>,

    /// TTL for SSO account discovery cache (e.g. 6h).
    #[arg(long)]
    pub cache_ttl_accounts: Option<String>,

    /// TTL for SSO role discovery cache (e.g. 6h).
    #[arg(long)]
    pub cache_ttl_roles: Option<String>,

    /// TTL for region discovery cache (e.g. 24h).
    #[arg(long)]
    pub cache_ttl_regions: Option<String>,

    /// TTL for instance discovery cache (e.g. 60s).
    #[arg(long)]
    pub cache_ttl_instances: Option<String>,

    /// Cache mode: balanced, fresh, speed.
    #[arg(long)]
    pub cache_mode: Option<String>,

    /// Clear cached discovery results before discovery.
    #[arg(long)]
    pub cache_clear: bool,

    /// Picker used for selections: fzf or builtin.
    #[arg(long)]
    pub picker: Option<String>,
}

impl Cli {
    /// The settings given on the command line. Switches that were not passed
    /// are left unset so the config file can supply them.
    pub fn to_layer(&self) -> SettingsLayer {
        let flag = |set: bool| set.then_some(true);
        SettingsLayer {
            profile: self.profile.clone(),
            account: self.account.clone(),
            role: self.role.clone(),
            workers: self.workers,
            regions: self.regions.clone().map(|r| vec![r]),
            all_regions: flag(self.all_regions),
            include_stopped: flag(self.include_stopped),
            resume: flag(self.resume),
            last: flag(self.last),
            auto_select: self.no_auto_select.then_some(false),
            cache_enabled: self.cache,
            cache_dir: self.cache_dir.clone(),
            cache_mode: self.cache_mode.clone(),
            ttl_accounts: self.cache_ttl_accounts.clone(),
            ttl_roles: self.cache_ttl_roles.clone(),
            ttl_regions: self.cache_ttl_regions.clone(),
            ttl_instances: self.cache_ttl_instances.clone(),
            picker: self.picker.clone(),
        }
    }
}
