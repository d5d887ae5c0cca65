//! # swamp
//!
//! Discovers EC2 instances across the accounts, roles and regions an AWS SSO
//! session can reach, and connects to the chosen one through SSM.
//!
//! - [`core`] holds the discovery pipeline, the scope cache, the navigator and
//!   the configuration layers, written against the traits in
//!   [`core::interfaces`].
//! - [`system`] implements those traits with the AWS CLI, `fzf` and the terminal.
//! - [`cli`] parses the command line and wires everything together.

pub mod cli;
pub mod constants;
pub mod core;
pub mod errors;
pub mod models;
pub mod system;
