// src/core/interfaces.rs
//
// Collaborators injected into the pipeline and the navigator. The `system`
// module provides the real implementations; tests provide fakes.

use crate::errors::SwampError;
use crate::models::{Account, InstanceCandidate, LaunchTarget, Region, RoleBinding};
use thiserror::Error;

/// Errors returned by a [`RemoteDirectory`] call.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// The call could not be made or was rejected (auth, permission, network).
    #[error("{operation} failed: {message}")]
    Transport {
        /// The remote operation (e.g. `list-account-roles`).
        operation: String,
        /// The failure as reported by the transport.
        message: String,
    },
    /// The call succeeded but its response could not be decoded.
    #[error("decode {operation} response: {source}")]
    Decode {
        /// The remote operation whose response was malformed.
        operation: String,
        /// The decoding failure.
        #[source]
        source: serde_json::Error,
    },
}

impl RemoteError {
    /// Whether this failure must be surfaced even when other jobs succeed.
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }
}

/// Enumerates the access scope: accounts, roles, regions and instances.
pub trait RemoteDirectory: Send + Sync {
    /// Lists every account visible to the SSO session.
    fn list_accounts(&self) -> Result<Vec<Account>, RemoteError>;

    /// Lists the roles the operator may assume in `account`.
    fn list_roles(&self, account: &Account) -> Result<Vec<RoleBinding>, RemoteError>;

    /// Lists the regions reachable with `binding`.
    fn list_regions(
        &self,
        binding: &RoleBinding,
        all_regions: bool,
    ) -> Result<Vec<Region>, RemoteError>;

    /// Lists the instances visible to `binding` in `region`.
    fn list_instances(
        &self,
        binding: &RoleBinding,
        region: &str,
        running_only: bool,
    ) -> Result<Vec<InstanceCandidate>, RemoteError>;
}

/// The operator's answer to a chooser prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Choice {
    /// One of the offered lines, verbatim.
    Selected(String),
    /// Go to the previous stage.
    Back,
    /// Stop without doing anything.
    Cancelled,
}

/// Errors raised by a [`Chooser`] that failed to work at all.
#[derive(Error, Debug)]
pub enum ChooserError {
    /// The picker could not be started.
    #[error("could not start picker '{program}': {source}")]
    Spawn {
        /// The picker executable.
        program: String,
        /// The spawn failure.
        #[source]
        source: std::io::Error,
    },
    /// The picker ran but reported an error.
    #[error("picker '{program}' failed: {message}")]
    Failed {
        /// The picker executable or backend.
        program: String,
        /// What went wrong.
        message: String,
    },
    /// The picker returned a line that was never offered.
    #[error("selected value '{0}' not found")]
    UnknownSelection(String),
}

/// Picks one line out of many.
pub trait Chooser {
    /// Shows `lines` under `prompt`. When `allow_back` is set the operator may
    /// also ask to go back.
    fn pick(&self, lines: &[String], prompt: &str, allow_back: bool)
    -> Result<Choice, ChooserError>;
}

/// Starts the interactive remote session for a resolved target.
pub trait SessionLauncher {
    /// Runs the session to completion; interrupts are forwarded to it.
    fn start(&self, target: &LaunchTarget) -> Result<(), SwampError>;
}

/// Produces the bearer token used for directory calls.
pub trait IdentityProvider {
    /// Returns a valid access token, logging in first if necessary.
    fn access_token(&self) -> Result<String, SwampError>;
}
