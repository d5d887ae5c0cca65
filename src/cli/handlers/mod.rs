// src/cli/handlers/mod.rs

pub mod config;
pub mod run;
