// src/core/mod.rs

pub mod cache;
pub mod config_loader;
pub mod discovery;
pub mod duration;
pub mod interfaces;
pub mod navigator;
pub mod paths;
pub mod recent;
pub mod settings;
