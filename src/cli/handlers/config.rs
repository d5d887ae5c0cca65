// src/cli/handlers/config.rs

//! `--print-effective-config` and `--write-config-example`.

use crate::core::config_loader;
use crate::core::settings::EffectiveConfig;
use crate::errors::SwampError;
use anyhow::{Context, Result};
use colored::*;
use std::io::Write;
use std::path::Path;

/// Prints every effective setting with the layer it came from.
pub fn print_effective(config_path: &Path, effective: &EffectiveConfig) {
    println!("{} {}", "config file:".bold(), config_path.display());
    for line in effective.render() {
        println!("{}", line);
    }
}

/// Writes the example config to `target`, or to stdout when `target` is `-`.
pub fn write_example(target: Option<&str>, config_path: &Path) -> Result<()> {
    if target.map(str::trim) == Some("-") {
        let mut stdout = std::io::stdout();
        stdout
            .write_all(config_loader::config_example().as_bytes())
            .map_err(|source| SwampError::Io {
                context: "write config example to stdout".to_string(),
                source,
            })?;
        return Ok(());
    }

    config_loader::write_config_example(config_path)
        .with_context(|| format!("could not write example config to '{}'", config_path.display()))?;
    println!(
        "{} {}",
        "Wrote example config to".green(),
        config_path.display().to_string().cyan()
    );
    Ok(())
}
