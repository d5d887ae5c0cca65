// src/cli/handlers/run.rs

//! The default action: resolve settings, check prerequisites, authenticate,
//! then hand over to the navigator.

use crate::cli::Cli;
use crate::cli::handlers::config;
use crate::core::{
    cache::ScopeCache,
    config_loader,
    discovery::{DiscoveryPipeline, DiscoverySettings},
    interfaces::{Chooser, IdentityProvider},
    navigator::{Navigator, NavigatorOptions, Outcome},
    paths,
    recent::RecentTargetStore,
    settings::{EffectiveConfig, PickerKind},
};
use crate::errors::SwampError;
use crate::system::{
    aws_config::{ProfileSpace, read_profile_config},
    aws_directory::AwsCliDirectory,
    chooser::{FzfChooser, PromptChooser},
    executor,
    session::SsmLauncher,
    sso::SsoIdentity,
};
use anyhow::{Context, Result};
use colored::*;
use log::{debug, warn};
use std::sync::Arc;

pub fn handle(cli: &Cli) -> Result<()> {
    let config_path = config_loader::resolve_config_path(cli.config.as_deref())?;
    if cli.write_config_example {
        return config::write_example(cli.config.as_deref(), &config_path);
    }

    if cli.config.is_none() {
        match config_loader::ensure_default_config(&config_path) {
            Ok(true) => println!(
                "{} {}",
                "Created default config at".dimmed(),
                config_path.display()
            ),
            Ok(false) => {}
            Err(e) => warn!("{}", e),
        }
    }

    let user_config = config_loader::load_user_config(&config_path)?;
    let effective = EffectiveConfig::resolve(user_config.into(), cli.to_layer())?;
    if cli.print_effective_config {
        config::print_effective(&config_path, &effective);
        return Ok(());
    }

    effective.validate()?;
    preflight(&effective)?;

    let cache = Arc::new(ScopeCache::new(effective.cache_config()));
    if cli.cache_clear {
        if cache.is_enabled() {
            cache.clear().context("could not clear the cache")?;
            println!("{}", "Cleared discovery cache.".dimmed());
        } else {
            debug!("cache disabled, nothing to clear");
        }
    }

    let aws_config_path = paths::aws_config_path();
    let profile = read_profile_config(&aws_config_path, &effective.profile.value)?;
    let identity = SsoIdentity::new(
        profile.name.clone(),
        profile.sso_start_url.clone(),
        paths::aws_sso_cache_dir(),
    );
    let token = identity.access_token()?;

    let space = Arc::new(ProfileSpace::create(&aws_config_path, profile.clone())?);
    let directory = Arc::new(AwsCliDirectory::new(
        profile.name.clone(),
        profile.sso_region(),
        profile.discovery_region(),
        token,
        Arc::clone(&space),
    ));
    let settings = DiscoverySettings {
        profile: effective.profile.value.clone(),
        sso_region: profile.sso_region().to_string(),
        discovery_region: profile.discovery_region().to_string(),
        all_regions: effective.all_regions.value,
        workers: effective.workers.value,
        ttls: effective.stage_ttls(),
    };
    let pipeline = DiscoveryPipeline::new(directory, cache, settings);

    let chooser: Box<dyn Chooser> = match effective.picker.value {
        PickerKind::Fzf => Box::new(FzfChooser::default()),
        PickerKind::Builtin => Box::new(PromptChooser),
    };
    let launcher = SsmLauncher::new(Arc::clone(&space));
    let recent = RecentTargetStore::new(effective.cache_dir.value.clone());

    let navigator = Navigator::new(
        &pipeline,
        chooser.as_ref(),
        &launcher,
        &recent,
        NavigatorOptions::from_config(&effective),
    );
    match navigator.run()? {
        Outcome::Launched(target) => debug!("session on {} ended", target),
        Outcome::Cancelled => println!("No instance selected."),
    }
    Ok(())
}

/// Fails early when a binary the run will need is missing.
fn preflight(effective: &EffectiveConfig) -> Result<(), SwampError> {
    let mut required = vec!["aws"];
    if effective.picker.value == PickerKind::Fzf {
        required.push("fzf");
    }
    match required
        .into_iter()
        .find(|binary| !executor::is_executable_in_path(binary))
    {
        Some(binary) => Err(SwampError::DependencyMissing {
            binary: binary.to_string(),
        }),
        None => Ok(()),
    }
}
