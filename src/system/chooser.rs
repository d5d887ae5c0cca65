// src/system/chooser.rs

//! The two [`Chooser`] backends: `fzf`, and a built-in select list.

use crate::constants::BACK_OPTION;
use crate::core::interfaces::{Choice, Chooser, ChooserError};
use dialoguer::{Select, theme::ColorfulTheme};
use std::io::Write;
use std::process::{Command, Stdio};

/// fzf exits with 130 on escape / Ctrl-C and with 1 when nothing matched.
const FZF_CANCEL_CODES: &[i32] = &[1, 130];

/// The lines actually offered: the back option first when allowed.
pub fn offered_lines(lines: &[String], allow_back: bool) -> Vec<String> {
    let mut offered = Vec::with_capacity(lines.len() + 1);
    if allow_back {
        offered.push(BACK_OPTION.to_string());
    }
    offered.extend(lines.iter().cloned());
    offered
}

/// Maps the raw selection back onto a [`Choice`].
///
/// An empty selection is a cancellation; a line that was never offered is an error.
pub fn interpret_selection(
    selected: &str,
    lines: &[String],
    allow_back: bool,
) -> Result<Choice, ChooserError> {
    let selected = selected.trim_end_matches(['\r', '\n']);
    if selected.trim().is_empty() {
        return Ok(Choice::Cancelled);
    }
    if allow_back && selected == BACK_OPTION {
        return Ok(Choice::Back);
    }
    if lines.iter().any(|l| l == selected) {
        Ok(Choice::Selected(selected.to_string()))
    } else {
        Err(ChooserError::UnknownSelection(selected.to_string()))
    }
}

// --- fzf ---

/// Picks through an external `fzf` process.
#[derive(Debug, Clone)]
pub struct FzfChooser {
    program: String,
}

impl Default for FzfChooser {
    fn default() -> Self {
        Self::new("fzf")
    }
}

impl FzfChooser {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Chooser for FzfChooser {
    fn pick(
        &self,
        lines: &[String],
        prompt: &str,
        allow_back: bool,
    ) -> Result<Choice, ChooserError> {
        let offered = offered_lines(lines, allow_back);
        let spawn_err = |source| ChooserError::Spawn {
            program: self.program.clone(),
            source,
        };

        let mut child = Command::new(&self.program)
            .args(["--height", "80%", "--layout", "reverse", "--prompt"])
            .arg(format!("{} > ", prompt))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(spawn_err)?;

        if let Some(mut stdin) = child.stdin.take() {
            let mut input = offered.join("\n");
            input.push('\n');
            // fzf may exit before reading everything; the exit status decides.
            if let Err(e) = stdin.write_all(input.as_bytes()) {
                log::debug!("writing choices to {}: {}", self.program, e);
            }
        }

        let output = child.wait_with_output().map_err(spawn_err)?;
        if !output.status.success() {
            return match output.status.code() {
                Some(code) if FZF_CANCEL_CODES.contains(&code) => Ok(Choice::Cancelled),
                _ => Err(ChooserError::Failed {
                    program: self.program.clone(),
                    message: output.status.to_string(),
                }),
            };
        }
        let selected = String::from_utf8_lossy(&output.stdout);
        interpret_selection(selected.trim(), lines, allow_back)
    }
}

// --- Built-in ---

/// Picks through a `dialoguer` select list on the terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptChooser;

impl Chooser for PromptChooser {
    fn pick(
        &self,
        lines: &[String],
        prompt: &str,
        allow_back: bool,
    ) -> Result<Choice, ChooserError> {
        let offered = offered_lines(lines, allow_back);
        let default = usize::from(allow_back && !lines.is_empty());
        let picked = Select::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .items(&offered)
            .default(default)
            .interact_opt()
            .map_err(|e| ChooserError::Failed {
                program: "builtin".to_string(),
                message: e.to_string(),
            })?;

        match picked.and_then(|index| offered.get(index)) {
            Some(line) => interpret_selection(line, lines, allow_back),
            None => Ok(Choice::Cancelled),
        }
    }
}
