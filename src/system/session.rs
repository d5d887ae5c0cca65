// src/system/session.rs

//! The [`SessionLauncher`] that opens an SSM session through the AWS CLI.
//!
//! The session inherits the terminal. While it runs, SIGINT and SIGTERM
//! received by this process are forwarded to the child instead of ending the
//! run, so Ctrl-C reaches the remote shell.

use crate::core::interfaces::SessionLauncher;
use crate::errors::SwampError;
use crate::models::LaunchTarget;
use crate::system::aws_config::ProfileSpace;
use crate::system::executor;
use log::debug;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

/// Arguments of `aws ... ssm start-session` for `target` under `profile`.
pub fn session_args(profile: &str, target: &LaunchTarget) -> Vec<String> {
    [
        "--profile",
        profile,
        "--region",
        target.region.as_str(),
        "ssm",
        "start-session",
        "--target",
        target.instance.instance_id.as_str(),
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Launches sessions with `aws ssm start-session`.
#[derive(Debug, Clone)]
pub struct SsmLauncher {
    space: Arc<ProfileSpace>,
}

impl SsmLauncher {
    pub fn new(space: Arc<ProfileSpace>) -> Self {
        Self { space }
    }
}

impl SessionLauncher for SsmLauncher {
    fn start(&self, target: &LaunchTarget) -> Result<(), SwampError> {
        let profile = self.space.register(&target.binding)?;
        let args = session_args(&profile, target);
        let rendered = executor::render_command("aws", &args);
        debug!("starting session: {}", rendered);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| SwampError::SessionLaunch(format!("could not start runtime: {}", e)))?;
        let status = runtime
            .block_on(run_forwarding_signals(&args, self.space.path()))
            .map_err(|e| SwampError::SessionLaunch(format!("{} ({})", e, rendered)))?;

        if status.success() {
            Ok(())
        } else {
            Err(SwampError::SessionLaunch(format!("{} ({})", status, rendered)))
        }
    }
}

async fn run_forwarding_signals(
    args: &[String],
    config_file: &std::path::Path,
) -> std::io::Result<ExitStatus> {
    let mut child = tokio::process::Command::new("aws")
        .args(args)
        .env("AWS_SDK_LOAD_CONFIG", "1")
        .env("AWS_CONFIG_FILE", config_file)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()?;

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;
        loop {
            tokio::select! {
                status = child.wait() => return status,
                _ = interrupt.recv() => forward_signal(child.id(), "INT"),
                _ = terminate.recv() => forward_signal(child.id(), "TERM"),
            }
        }
    }

    #[cfg(not(unix))]
    {
        loop {
            tokio::select! {
                status = child.wait() => return status,
                // The console delivers Ctrl-C to the child as well; keep waiting.
                _ = tokio::signal::ctrl_c() => debug!("interrupt passed to session"),
            }
        }
    }
}

#[cfg(unix)]
fn forward_signal(pid: Option<u32>, signal: &str) {
    let Some(pid) = pid else {
        return;
    };
    debug!("forwarding SIG{} to session process {}", signal, pid);
    let forwarded = std::process::Command::new("kill")
        .args(["-s", signal, &pid.to_string()])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    if let Err(e) = forwarded {
        debug!("could not forward SIG{}: {}", signal, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InstanceCandidate, InstanceFacts, RoleBinding};

    #[test]
    fn test_session_args() {
        let binding = RoleBinding {
            account_id: "111122223333".to_string(),
            account_name: "payments".to_string(),
            role_name: "Admin".to_string(),
        };
        let facts = InstanceFacts {
            instance_id: "i-0abc".to_string(),
            ..InstanceFacts::default()
        };
        let target =
            LaunchTarget::from_candidate(InstanceCandidate::new(&binding, "eu-west-1", &facts, true));

        assert_eq!(
            session_args(&binding.profile_handle(), &target).join(" "),
            "--profile swamp-111122223333-Admin --region eu-west-1 ssm start-session --target i-0abc"
        );
    }
}
