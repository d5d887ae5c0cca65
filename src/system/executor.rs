// src/system/executor.rs

use std::collections::HashMap;
use std::env;
use std::process::{Command as StdCommand, Stdio};
use thiserror::Error;

/// Arguments whose following value must never appear in logs or errors.
const SENSITIVE_FLAGS: &[&str] = &["--access-token"];

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Command '{0}' could not be executed: {1}")]
    CommandFailed(String, #[source] std::io::Error),
    #[error("{message} ({command})")]
    NonZeroExitStatus { command: String, message: String },
    #[error("Command '{command}' produced output that was not valid UTF-8")]
    InvalidUtf8Output {
        command: String,
        #[source]
        source: std::string::FromUtf8Error,
    },
}

/// Runs `program` and returns its standard output.
///
/// Stdin is closed and stderr is captured. On a non-zero exit the error
/// carries the trimmed stderr (or the exit status when stderr is empty) and
/// the command line with sensitive values redacted.
pub fn capture_output(
    program: &str,
    args: &[String],
    env_vars: &HashMap<String, String>,
) -> Result<String, ExecutionError> {
    let rendered = render_command(program, args);
    log::trace!("running: {}", rendered);

    let output = StdCommand::new(program)
        .args(args)
        .envs(env_vars)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| ExecutionError::CommandFailed(rendered.clone(), e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            output.status.to_string()
        } else {
            stderr
        };
        return Err(ExecutionError::NonZeroExitStatus {
            command: rendered,
            message,
        });
    }

    String::from_utf8(output.stdout).map_err(|e| ExecutionError::InvalidUtf8Output {
        command: rendered,
        source: e,
    })
}

/// Runs `program` attached to the user's terminal and waits for it.
pub fn run_interactive(
    program: &str,
    args: &[String],
    env_vars: &HashMap<String, String>,
) -> Result<(), ExecutionError> {
    let rendered = render_command(program, args);
    let status = StdCommand::new(program)
        .args(args)
        .envs(env_vars)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .map_err(|e| ExecutionError::CommandFailed(rendered.clone(), e))?;
    if status.success() {
        Ok(())
    } else {
        Err(ExecutionError::NonZeroExitStatus {
            command: rendered,
            message: status.to_string(),
        })
    }
}

/// Replaces the value after every sensitive flag with `<redacted>`.
pub fn redact_sensitive_args(args: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(args.len());
    let mut redact_next = false;
    for arg in args {
        if redact_next {
            out.push("<redacted>".to_string());
            redact_next = false;
        } else {
            redact_next = SENSITIVE_FLAGS.contains(&arg.as_str());
            out.push(arg.clone());
        }
    }
    out
}

/// Renders a redacted, shell-quoted command line for messages.
pub fn render_command(program: &str, args: &[String]) -> String {
    let redacted = redact_sensitive_args(args);
    let words = std::iter::once(program).chain(redacted.iter().map(String::as_str));
    shlex::try_join(words.clone())
        .unwrap_or_else(|_| words.collect::<Vec<_>>().join(" "))
}

/// Whether an executable named `executable_name` exists in a `PATH` directory.
pub fn is_executable_in_path(executable_name: &str) -> bool {
    let Some(path_var) = env::var_os("PATH") else {
        return false;
    };
    env::split_paths(&path_var).any(|dir| {
        let candidate = dir.join(executable_name);
        candidate.is_file() || (cfg!(windows) && candidate.with_extension("exe").is_file())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_redacts_access_token_values() {
        let args = strings(&["sso", "list-accounts", "--access-token", "secret", "--output", "json"]);
        let redacted = redact_sensitive_args(&args);
        assert_eq!(
            redacted,
            strings(&["sso", "list-accounts", "--access-token", "<redacted>", "--output", "json"])
        );
        // A trailing flag without a value is left as is.
        assert_eq!(redact_sensitive_args(&strings(&["--access-token"])), strings(&["--access-token"]));
    }

    #[test]
    fn test_render_command_quotes_and_redacts() {
        let args = strings(&["--access-token", "secret", "--query", "a b"]);
        let rendered = render_command("aws", &args);
        assert_eq!(rendered, "aws --access-token '<redacted>' --query 'a b'");
        assert!(!rendered.contains("secret"));
    }

    #[cfg(unix)]
    #[test]
    fn test_capture_output_success_and_failure() {
        let out = capture_output("sh", &strings(&["-c", "echo hello"]), &HashMap::new()).unwrap();
        assert_eq!(out.trim(), "hello");

        let err = capture_output("sh", &strings(&["-c", "echo boom >&2; exit 3"]), &HashMap::new())
            .unwrap_err();
        match err {
            ExecutionError::NonZeroExitStatus { message, command } => {
                assert_eq!(message, "boom");
                assert!(command.starts_with("sh -c"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_capture_output_passes_environment() {
        let mut env = HashMap::new();
        env.insert("SWAMP_TEST_VALUE".to_string(), "42".to_string());
        let out = capture_output("sh", &strings(&["-c", "printf %s \"$SWAMP_TEST_VALUE\""]), &env)
            .unwrap();
        assert_eq!(out, "42");
    }

    #[test]
    fn test_missing_program_is_a_spawn_failure() {
        let err = capture_output("swamp-no-such-binary-xyz", &[], &HashMap::new()).unwrap_err();
        assert!(matches!(err, ExecutionError::CommandFailed(..)));
        assert!(!is_executable_in_path("swamp-no-such-binary-xyz"));
    }
}
