// src/core/settings.rs

//! # Effective Settings
//!
//! Every configurable value is resolved once at startup from three layers,
//! highest precedence first: the command line, the user config file, and the
//! built-in default. The winning layer is recorded next to each value so that
//! validation errors and `--print-effective-config` can say where a value came
//! from.

use crate::constants::{
    DEFAULT_TTL_ACCOUNTS, DEFAULT_TTL_INSTANCES, DEFAULT_TTL_REGIONS, DEFAULT_TTL_ROLES,
    DEFAULT_WORKERS, REFRESH_PERMITS,
};
use crate::core::cache::{CacheConfig, CacheMode};
use crate::core::discovery::{RoleFilter, StageTtls};
use crate::core::duration::{format_duration, parse_duration};
use crate::core::paths;
use crate::errors::{SwampError, SwampResult};
use std::{fmt, path::PathBuf, str::FromStr, time::Duration};

// --- Provenance ---

/// Where an effective value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Default,
    ConfigFile,
    CommandLine,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Default => "default",
            Self::ConfigFile => "config file",
            Self::CommandLine => "command line",
        })
    }
}

/// A value together with the layer it was taken from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Setting<T> {
    pub value: T,
    pub source: Source,
}

impl<T> Setting<T> {
    fn pick(cli: Option<T>, file: Option<T>, default: T) -> Self {
        match (cli, file) {
            (Some(value), _) => Self {
                value,
                source: Source::CommandLine,
            },
            (None, Some(value)) => Self {
                value,
                source: Source::ConfigFile,
            },
            (None, None) => Self {
                value: default,
                source: Source::Default,
            },
        }
    }

    fn try_map<U, E: fmt::Display>(
        self,
        flag: &str,
        parse: impl FnOnce(T) -> Result<U, E>,
    ) -> SwampResult<Setting<U>> {
        let source = self.source;
        parse(self.value)
            .map(|value| Setting { value, source })
            .map_err(|e| SwampError::Validation(format!("{}: {} (source={})", flag, e, source)))
    }
}

// --- Picker ---

/// The selection UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PickerKind {
    #[default]
    Fzf,
    Builtin,
}

impl FromStr for PickerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fzf" => Ok(Self::Fzf),
            "builtin" => Ok(Self::Builtin),
            other => Err(format!("unknown picker '{}' (expected fzf or builtin)", other)),
        }
    }
}

impl fmt::Display for PickerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fzf => "fzf",
            Self::Builtin => "builtin",
        })
    }
}

// --- Layers ---

/// The raw values one layer (command line or config file) provides.
/// `None` means the layer is silent about that value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsLayer {
    pub profile: Option<String>,
    pub account: Option<String>,
    pub role: Option<String>,
    pub workers: Option<i64>,
    pub regions: Option<Vec<String>>,
    pub all_regions: Option<bool>,
    pub include_stopped: Option<bool>,
    pub resume: Option<bool>,
    pub last: Option<bool>,
    pub auto_select: Option<bool>,
    pub cache_enabled: Option<bool>,
    pub cache_dir: Option<String>,
    pub cache_mode: Option<String>,
    pub ttl_accounts: Option<String>,
    pub ttl_roles: Option<String>,
    pub ttl_regions: Option<String>,
    pub ttl_instances: Option<String>,
    pub picker: Option<String>,
}

/// Drops blank strings so an empty value never shadows a lower layer.
fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// --- Effective Config ---

/// The immutable, fully resolved configuration of a run.
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    pub profile: Setting<String>,
    pub account: Setting<Option<String>>,
    pub role: Setting<Option<String>>,
    pub workers: Setting<usize>,
    pub regions: Setting<Vec<String>>,
    pub all_regions: Setting<bool>,
    pub include_stopped: Setting<bool>,
    pub resume: Setting<bool>,
    pub last: Setting<bool>,
    pub auto_select: Setting<bool>,
    pub cache_enabled: Setting<bool>,
    pub cache_dir: Setting<PathBuf>,
    pub cache_mode: Setting<CacheMode>,
    pub ttl_accounts: Setting<Duration>,
    pub ttl_roles: Setting<Duration>,
    pub ttl_regions: Setting<Duration>,
    pub ttl_instances: Setting<Duration>,
    pub picker: Setting<PickerKind>,
}

impl EffectiveConfig {
    /// Merges `cli` over `file` over the built-in defaults.
    ///
    /// Values that cannot be parsed (durations, modes, worker counts) are
    /// rejected here, naming the layer they came from.
    pub fn resolve(file: SettingsLayer, cli: SettingsLayer) -> SwampResult<Self> {
        let workers = Setting::pick(cli.workers, file.workers, i64::try_from(DEFAULT_WORKERS).unwrap_or(1))
            .try_map("--workers", |w| {
                usize::try_from(w)
                    .ok()
                    .filter(|w| *w >= 1)
                    .ok_or("must be at least 1")
            })?;
        let cache_dir = Setting::pick(
            non_blank(cli.cache_dir),
            non_blank(file.cache_dir),
            paths::default_cache_dir().to_string_lossy().into_owned(),
        )
        .try_map("--cache-dir", |dir| paths::expand_path(&dir))?;
        let cache_mode = Setting::pick(
            non_blank(cli.cache_mode),
            non_blank(file.cache_mode),
            CacheMode::default().to_string(),
        )
        .try_map("--cache-mode", |mode| mode.parse::<CacheMode>())?;
        let ttl = |flag: &str, cli: Option<String>, file: Option<String>, default: Duration| {
            Setting::pick(non_blank(cli), non_blank(file), format_duration(default))
                .try_map(flag, |raw| parse_duration(&raw))
        };
        let picker = Setting::pick(
            non_blank(cli.picker),
            non_blank(file.picker),
            PickerKind::default().to_string(),
        )
        .try_map("--picker", |p| p.parse::<PickerKind>())?;

        let regions = |layer: Option<Vec<String>>| {
            layer
                .map(|regions| {
                    regions
                        .iter()
                        .flat_map(|r| r.split(','))
                        .map(|r| r.trim().to_string())
                        .filter(|r| !r.is_empty())
                        .collect::<Vec<_>>()
                })
                .filter(|regions| !regions.is_empty())
        };

        Ok(Self {
            profile: Setting::pick(non_blank(cli.profile), non_blank(file.profile), String::new()),
            account: Setting::pick(non_blank(cli.account).map(Some), non_blank(file.account).map(Some), None),
            role: Setting::pick(non_blank(cli.role).map(Some), non_blank(file.role).map(Some), None),
            workers,
            regions: Setting::pick(regions(cli.regions), regions(file.regions), Vec::new()),
            all_regions: Setting::pick(cli.all_regions, file.all_regions, false),
            include_stopped: Setting::pick(cli.include_stopped, file.include_stopped, false),
            resume: Setting::pick(cli.resume, file.resume, false),
            last: Setting::pick(cli.last, file.last, false),
            auto_select: Setting::pick(cli.auto_select, file.auto_select, true),
            cache_enabled: Setting::pick(cli.cache_enabled, file.cache_enabled, true),
            cache_dir,
            cache_mode,
            ttl_accounts: ttl("--cache-ttl-accounts", cli.ttl_accounts, file.ttl_accounts, DEFAULT_TTL_ACCOUNTS)?,
            ttl_roles: ttl("--cache-ttl-roles", cli.ttl_roles, file.ttl_roles, DEFAULT_TTL_ROLES)?,
            ttl_regions: ttl("--cache-ttl-regions", cli.ttl_regions, file.ttl_regions, DEFAULT_TTL_REGIONS)?,
            ttl_instances: ttl("--cache-ttl-instances", cli.ttl_instances, file.ttl_instances, DEFAULT_TTL_INSTANCES)?,
            picker,
        })
    }

    /// Checks what a discovery run needs beyond well-formed values.
    pub fn validate(&self) -> SwampResult<()> {
        if self.profile.value.is_empty() {
            return Err(SwampError::Validation(
                "missing profile: set --profile, or configure profile in config file".to_string(),
            ));
        }
        if self.cache_enabled.value && self.cache_dir.value.as_os_str().is_empty() {
            return Err(SwampError::Validation(format!(
                "--cache-dir must not be empty when the cache is enabled (source={})",
                self.cache_dir.source
            )));
        }
        Ok(())
    }

    /// The role filter; a role from the config file is only a preference.
    pub fn role_filter(&self) -> RoleFilter {
        match (&self.role.value, self.role.source) {
            (None, _) => RoleFilter::Any,
            (Some(role), Source::ConfigFile) => RoleFilter::Preferred(role.clone()),
            (Some(role), _) => RoleFilter::Required(role.clone()),
        }
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            enabled: self.cache_enabled.value,
            dir: self.cache_dir.value.clone(),
            mode: self.cache_mode.value,
            refresh_permits: REFRESH_PERMITS,
        }
    }

    pub fn stage_ttls(&self) -> StageTtls {
        StageTtls {
            accounts: self.ttl_accounts.value,
            roles: self.ttl_roles.value,
            regions: self.ttl_regions.value,
            instances: self.ttl_instances.value,
        }
    }

    /// One `name: value (source)` line per setting.
    pub fn render(&self) -> Vec<String> {
        fn line<T: fmt::Display>(name: &str, value: T, source: Source) -> String {
            format!("{}: {} ({})", name, value, source)
        }
        let optional = |value: &Option<String>| value.clone().unwrap_or_default();
        vec![
            line("profile", &self.profile.value, self.profile.source),
            line("account", optional(&self.account.value), self.account.source),
            line("role", optional(&self.role.value), self.role.source),
            line("workers", self.workers.value, self.workers.source),
            line("regions", self.regions.value.join(","), self.regions.source),
            line("all_regions", self.all_regions.value, self.all_regions.source),
            line("include_stopped", self.include_stopped.value, self.include_stopped.source),
            line("resume", self.resume.value, self.resume.source),
            line("last", self.last.value, self.last.source),
            line("auto_select", self.auto_select.value, self.auto_select.source),
            line("picker", self.picker.value, self.picker.source),
            line("cache.enabled", self.cache_enabled.value, self.cache_enabled.source),
            line("cache.dir", self.cache_dir.value.display(), self.cache_dir.source),
            line("cache.mode", self.cache_mode.value, self.cache_mode.source),
            line("cache.ttl_accounts", format_duration(self.ttl_accounts.value), self.ttl_accounts.source),
            line("cache.ttl_roles", format_duration(self.ttl_roles.value), self.ttl_roles.source),
            line("cache.ttl_regions", format_duration(self.ttl_regions.value), self.ttl_regions.source),
            line("cache.ttl_instances", format_duration(self.ttl_instances.value), self.ttl_instances.source),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer_with_profile(profile: &str) -> SettingsLayer {
        SettingsLayer {
            profile: Some(profile.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_when_no_layer_speaks() {
        let config = EffectiveConfig::resolve(SettingsLayer::default(), SettingsLayer::default())
            .unwrap();

        assert_eq!(config.workers.value, 12);
        assert_eq!(config.workers.source, Source::Default);
        assert_eq!(config.ttl_regions.value, Duration::from_secs(86_400));
        assert_eq!(config.ttl_instances.value, Duration::from_secs(60));
        assert_eq!(config.cache_mode.value, CacheMode::Balanced);
        assert_eq!(config.picker.value, PickerKind::Fzf);
        assert!(config.auto_select.value);
        assert!(config.cache_enabled.value);
        assert_eq!(config.role_filter(), RoleFilter::Any);
    }

    #[test]
    fn test_command_line_beats_config_file() {
        let file = SettingsLayer {
            workers: Some(4),
            cache_mode: Some("speed".to_string()),
            ..layer_with_profile("from-file")
        };
        let cli = SettingsLayer {
            workers: Some(2),
            ..layer_with_profile("from-cli")
        };

        let config = EffectiveConfig::resolve(file, cli).unwrap();

        assert_eq!(config.profile.value, "from-cli");
        assert_eq!(config.profile.source, Source::CommandLine);
        assert_eq!(config.workers.value, 2);
        assert_eq!(config.cache_mode.value, CacheMode::Speed);
        assert_eq!(config.cache_mode.source, Source::ConfigFile);
    }

    #[test]
    fn test_blank_values_do_not_shadow_lower_layers() {
        let file = layer_with_profile("from-file");
        let cli = SettingsLayer {
            profile: Some("   ".to_string()),
            regions: Some(vec![String::new()]),
            ..Default::default()
        };

        let config = EffectiveConfig::resolve(file, cli).unwrap();

        assert_eq!(config.profile.value, "from-file");
        assert_eq!(config.regions.source, Source::Default);
    }

    #[test]
    fn test_invalid_values_name_their_source() {
        let file = SettingsLayer {
            workers: Some(0),
            ..Default::default()
        };
        let err = EffectiveConfig::resolve(file, SettingsLayer::default()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "--workers: must be at least 1 (source=config file)"
        );

        let cli = SettingsLayer {
            ttl_roles: Some("soon".to_string()),
            ..Default::default()
        };
        let err = EffectiveConfig::resolve(SettingsLayer::default(), cli).unwrap_err();
        assert!(err.to_string().starts_with("--cache-ttl-roles: invalid duration 'soon'"));
        assert!(err.to_string().ends_with("(source=command line)"));

        let cli = SettingsLayer {
            cache_mode: Some("turbo".to_string()),
            ..Default::default()
        };
        assert!(EffectiveConfig::resolve(SettingsLayer::default(), cli).is_err());
    }

    #[test]
    fn test_validate_requires_a_profile() {
        let config = EffectiveConfig::resolve(SettingsLayer::default(), SettingsLayer::default())
            .unwrap();
        assert!(matches!(config.validate(), Err(SwampError::Validation(_))));

        let config = EffectiveConfig::resolve(layer_with_profile("dev"), SettingsLayer::default())
            .unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_role_filter_strength_follows_source() {
        let file = SettingsLayer {
            role: Some("ReadOnly".to_string()),
            ..Default::default()
        };
        let config = EffectiveConfig::resolve(file.clone(), SettingsLayer::default()).unwrap();
        assert_eq!(config.role_filter(), RoleFilter::Preferred("ReadOnly".to_string()));

        let cli = SettingsLayer {
            role: Some("Admin".to_string()),
            ..Default::default()
        };
        let config = EffectiveConfig::resolve(file, cli).unwrap();
        assert_eq!(config.role_filter(), RoleFilter::Required("Admin".to_string()));
    }

    #[test]
    fn test_regions_accept_commas_inside_entries() {
        let cli = SettingsLayer {
            regions: Some(vec!["us-east-1, eu-west-1".to_string(), "us-east-1".to_string()]),
            ..Default::default()
        };
        let config = EffectiveConfig::resolve(SettingsLayer::default(), cli).unwrap();
        assert_eq!(config.regions.value, vec!["us-east-1", "eu-west-1", "us-east-1"]);
    }

    #[test]
    fn test_render_lists_every_value_with_source() {
        let config = EffectiveConfig::resolve(layer_with_profile("dev"), SettingsLayer::default())
            .unwrap();
        let rendered = config.render();
        assert!(rendered.contains(&"profile: dev (config file)".to_string()));
        assert!(rendered.contains(&"cache.ttl_accounts: 6h (default)".to_string()));
        assert_eq!(rendered.len(), 18);
    }
}
