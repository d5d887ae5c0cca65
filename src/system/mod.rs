//! # System Interaction Layer
//!
//! The concrete collaborators behind the traits of `core::interfaces`: everything
//! that spawns a process, reads AWS files, or talks to the terminal.
//!
//! ## Modules
//!
//! - **`executor`**: Spawns external commands, captures their output and renders
//!   redacted command lines for errors and logs.
//! - **`aws_config`**: Reads SSO profiles from `~/.aws/config` and maintains the
//!   temporary config file holding one generated profile per role binding.
//! - **`sso`**: Finds a valid SSO access token, logging in when none is cached.
//! - **`aws_directory`**: Lists accounts, roles, regions and instances through the AWS CLI.
//! - **`chooser`**: The `fzf` and built-in pickers.
//! - **`session`**: Starts the SSM session and forwards interrupts to it.

pub mod aws_config;
pub mod aws_directory;
pub mod chooser;
pub mod executor;
pub mod session;
pub mod sso;
