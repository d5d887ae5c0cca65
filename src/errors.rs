// src/errors.rs

use thiserror::Error;

/// Errors that end a run.
///
/// Per-job remote failures and cache failures never reach this type: the
/// discovery pipeline absorbs the former and the scope cache swallows the latter.
#[derive(Error, Debug)]
pub enum SwampError {
    /// A bad command line or config file combination, detected before any remote call.
    #[error("{0}")]
    Validation(String),
    /// A required external binary is not on `PATH`.
    #[error("{binary} not found in PATH")]
    DependencyMissing {
        /// The missing executable.
        binary: String,
    },
    /// The identity provider could not produce a token.
    #[error("failed to authenticate profile '{profile}': {reason}")]
    Auth {
        /// The SSO profile being authenticated.
        profile: String,
        /// What went wrong.
        reason: String,
    },
    /// Every unit of work of a discovery stage failed.
    #[error("{stage} discovery failed for {context}: {message}")]
    PartialDiscovery {
        /// The stage that failed (`roles`, `instances`, ...).
        stage: &'static str,
        /// Identifiers of the job whose failure is reported.
        context: String,
        /// The underlying failure, plus a count of any others.
        message: String,
    },
    /// A filter removed every candidate of a stage.
    #[error("no {what} matched {filter}")]
    NoMatches {
        /// What was filtered (`accounts`, `roles`).
        what: &'static str,
        /// The filter as the operator wrote it (e.g. `--account="prod"`).
        filter: String,
    },
    /// A stage returned nothing and no call failed.
    #[error("{0}")]
    EmptyStage(String),
    /// The picker itself failed (as opposed to the operator cancelling it).
    #[error("selection failed: {0}")]
    Chooser(#[from] crate::core::interfaces::ChooserError),
    /// The remote session could not be started or ended with an error.
    #[error("ssm session failed: {0}")]
    SessionLaunch(String),
    /// The AWS profile configuration could not be used.
    #[error("failed to read profile config: {0}")]
    ProfileConfig(#[from] crate::system::aws_config::AwsConfigError),
    /// A local file operation outside the scope cache failed.
    #[error("{context}: {source}")]
    Io {
        /// What was being done.
        context: String,
        #[source]
        source: std::io::Error,
    },
    /// A remote call failed in a way that must be surfaced (a response that
    /// could not be decoded, or a single-shot stage such as accounts).
    #[error(transparent)]
    Remote(#[from] crate::core::interfaces::RemoteError),
}

/// Convenience alias for results carrying a [`SwampError`].
pub type SwampResult<T> = Result<T, SwampError>;
