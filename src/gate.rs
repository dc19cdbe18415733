//! Blocking prompt that only lets an operator through once a process has exited.

use dialoguer::Input;
use std::io::{self, BufRead, IsTerminal};
use thiserror::Error;

use crate::report::Reporter;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("input closed before a valid option was chosen")]
    InputClosed,
    #[error("failed to read input: {0}")]
    Io(#[from] io::Error),
}

/// Result of validating one line of operator input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    Accepted(String),
    InvalidOption,
    ProcessRunning,
}

/// One line of operator input per call. `Ok(None)` means the source is exhausted.
pub trait LineSource {
    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>>;
}

/// Reads from the terminal, or plain stdin when it is not a TTY.
#[derive(Debug, Default)]
pub struct TerminalInput;

impl LineSource for TerminalInput {
    fn read_line(&mut self, _prompt: &str) -> io::Result<Option<String>> {
        if io::stdin().is_terminal() {
            // The prompt text has already been reported; dialoguer only draws the marker.
            let line = Input::<String>::new()
                .with_prompt(">")
                .allow_empty(true)
                .report(false)
                .interact_text()
                .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
            return Ok(Some(line));
        }
        let mut line = String::new();
        let read = io::stdin().lock().read_line(&mut line)?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(line))
    }
}

pub fn normalize(input: &str) -> String {
    input.trim().to_lowercase()
}

/// The validation step of the gate: membership first, then the process check.
/// `is_blocked` is only consulted for valid options.
pub fn evaluate(
    input: &str,
    allowed: &[&str],
    is_blocked: &mut dyn FnMut() -> bool,
) -> GateOutcome {
    let choice = normalize(input);
    if !allowed.iter().any(|option| option.to_lowercase() == choice) {
        return GateOutcome::InvalidOption;
    }
    if is_blocked() {
        return GateOutcome::ProcessRunning;
    }
    GateOutcome::Accepted(choice)
}

/// Prompts until the operator enters one of `allowed` while `is_blocked` reports false.
/// Never times out; invalid input just re-prompts.
pub fn await_choice(
    prompt: &str,
    allowed: &[&str],
    mut is_blocked: impl FnMut() -> bool,
    blocked_message: &str,
    input: &mut dyn LineSource,
    reporter: &dyn Reporter,
) -> Result<String, GateError> {
    loop {
        reporter.info(prompt);
        let Some(line) = input.read_line(prompt)? else {
            return Err(GateError::InputClosed);
        };
        match evaluate(&line, allowed, &mut is_blocked) {
            GateOutcome::Accepted(choice) => return Ok(choice),
            GateOutcome::InvalidOption => reporter.error("That's not a valid option."),
            GateOutcome::ProcessRunning => reporter.error(blocked_message),
        }
    }
}

#[cfg(test)]
pub struct ScriptedInput {
    lines: std::collections::VecDeque<String>,
    pub prompts: Vec<String>,
}

#[cfg(test)]
impl ScriptedInput {
    pub fn new(lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().map(|line| line.to_string()).collect(),
            prompts: Vec::new(),
        }
    }
}

#[cfg(test)]
impl LineSource for ScriptedInput {
    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        self.prompts.push(prompt.to_string());
        Ok(self.lines.pop_front())
    }
}
