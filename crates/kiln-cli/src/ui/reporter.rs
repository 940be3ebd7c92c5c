//! Console implementation of the pipeline reporter.
//!
//! Progress goes to stderr so that command output on stdout (hashes, JSON)
//! stays clean. Download progress redraws a single line when stderr is a
//! terminal and is silent otherwise.

use std::io::{IsTerminal, Write, stderr};

use crossterm::QueueableCommand;
use crossterm::cursor::MoveToColumn;
use crossterm::style::Stylize;
use crossterm::terminal::{Clear, ClearType};
use kiln_core::Reporter;

use super::theme::{Mark, Theme, format_size};

#[derive(Debug, Clone)]
pub struct ConsoleReporter {
    theme: Theme,
    interactive: bool,
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self {
            theme: Theme::default(),
            interactive: stderr().is_terminal(),
        }
    }

    /// Clear a progress line left by `downloading`.
    fn clear_line(&self) {
        if !self.interactive {
            return;
        }
        let mut err = stderr();
        let _ = err.queue(MoveToColumn(0));
        let _ = err.queue(Clear(ClearType::CurrentLine));
        let _ = err.flush();
    }

    fn line(&self, mark: Mark, name: &str, detail: &str) {
        self.clear_line();
        eprintln!(
            "  {} {} {}",
            mark.icon.with(mark.color),
            format!("{name:<12}").with(self.theme.name),
            detail.with(self.theme.detail)
        );
    }

    fn message(&self, mark: Mark, msg: &str) {
        self.clear_line();
        eprintln!("{} {msg}", mark.icon.with(mark.color));
    }
}

impl Reporter for ConsoleReporter {
    fn section(&self, title: &str) {
        self.clear_line();
        eprintln!();
        eprintln!("{}", title.with(self.theme.header).bold());
    }

    fn downloading(&self, name: &str, current: u64, total: Option<u64>) {
        if !self.interactive {
            return;
        }
        let progress = match total {
            Some(total) => format!("{} / {}", format_size(current), format_size(total)),
            None => format_size(current),
        };
        let mut err = stderr();
        let _ = err.queue(MoveToColumn(0));
        let _ = err.queue(Clear(ClearType::CurrentLine));
        let _ = write!(
            err,
            "  {} {} {}",
            self.theme.running.icon.with(self.theme.running.color),
            format!("{name:<12}").with(self.theme.name),
            progress.with(self.theme.detail)
        );
        let _ = err.flush();
    }

    fn step(&self, name: &str, detail: &str) {
        self.line(self.theme.running, name, detail);
    }

    fn done(&self, name: &str, detail: &str) {
        self.line(self.theme.done, name, detail);
    }

    fn failed(&self, name: &str, reason: &str) {
        self.line(self.theme.failed, name, reason);
    }

    fn info(&self, msg: &str) {
        self.message(self.theme.info, msg);
    }

    fn success(&self, msg: &str) {
        self.message(self.theme.done, msg);
    }

    fn warning(&self, msg: &str) {
        self.message(self.theme.warning, msg);
    }

    fn summary(&self, action: &str, elapsed_secs: f64) {
        self.clear_line();
        eprintln!();
        eprintln!(
            "{} {action} in {}",
            self.theme.done.icon.with(self.theme.done.color),
            format!("{elapsed_secs:.1}s").with(self.theme.detail)
        );
    }
}
