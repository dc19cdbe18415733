//! Operator-facing message sink.

use dialoguer::console::style;
use std::cell::RefCell;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
    Success,
}

/// Anything that can accept a message at a severity level.
pub trait Reporter {
    fn report(&self, level: Level, message: &str);

    fn info(&self, message: &str) {
        self.report(Level::Info, message);
    }

    fn warn(&self, message: &str) {
        self.report(Level::Warn, message);
    }

    fn error(&self, message: &str) {
        self.report(Level::Error, message);
    }

    fn success(&self, message: &str) {
        self.report(Level::Success, message);
    }
}

/// Writes styled messages to the terminal. With `quiet_stdout` set every message goes to
/// stderr so stdout carries only the JSON result.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleReporter {
    pub quiet_stdout: bool,
}

impl Reporter for ConsoleReporter {
    fn report(&self, level: Level, message: &str) {
        let to_stderr = self.quiet_stdout || matches!(level, Level::Warn | Level::Error);
        let base = if to_stderr {
            style(message).for_stderr()
        } else {
            style(message).for_stdout()
        };
        let styled = match level {
            Level::Info => base.cyan(),
            Level::Warn => base.yellow(),
            Level::Error => base.red(),
            Level::Success => base.green(),
        };
        if to_stderr {
            eprintln!("{styled}");
        } else {
            println!("{styled}");
        }
    }
}

/// Keeps every message in memory, for callers that want a transcript instead of output.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    messages: RefCell<Vec<(Level, String)>>,
}

impl MemoryReporter {
    pub fn messages(&self) -> Vec<(Level, String)> {
        self.messages.borrow().clone()
    }

    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.messages
            .borrow()
            .iter()
            .any(|(lvl, text)| *lvl == level && text.contains(needle))
    }
}

impl Reporter for MemoryReporter {
    fn report(&self, level: Level, message: &str) {
        self.messages
            .borrow_mut()
            .push((level, message.to_string()));
    }
}
