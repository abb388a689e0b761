//! Terminal front end: the transcript goes to stdout, logs to stderr.

use std::io::{self, IsTerminal, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use crossterm::terminal::SetTitle;
use crossterm::execute;
use tracing::{debug, info};

use crate::observer::Presenter;

#[derive(Debug, Default)]
pub struct ConsolePresenter {
    input_enabled: AtomicBool,
}

impl ConsolePresenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether operator input should currently be accepted.
    pub fn input_enabled(&self) -> bool {
        self.input_enabled.load(Ordering::Acquire)
    }
}

impl Presenter for ConsolePresenter {
    fn set_title(&self, title: &str) {
        info!(%title, "status");

        let mut stdout = io::stdout();
        if stdout.is_terminal() {
            if let Err(e) = execute!(stdout, SetTitle(title)) {
                debug!(error = %e, "failed to set terminal title");
            }
        }
    }

    fn print_line(&self, line: &str) {
        let mut stdout = io::stdout().lock();
        // A closed stdout is not worth taking the server down for.
        let _ = writeln!(stdout, "{line}");
        let _ = stdout.flush();
    }

    fn enable_input(&self, enabled: bool) {
        self.input_enabled.store(enabled, Ordering::Release);
    }
}
