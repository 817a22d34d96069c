//! Progress reporting for command runs.
//!
//! Quiet runs (no `-v`) get a live spinner whose message tracks the current
//! phase; verbose runs get plain text logs instead, so log lines and spinner
//! redraws never interleave. Call [`Notifier::finish`] before printing
//! results to stdout.

use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::cell::RefCell;
use std::time::Duration;

pub struct Notifier {
    quiet: bool,
    spinner: RefCell<Option<ProgressBar>>,
}

impl Notifier {
    /// `verbose` is the `-v` occurrence count; zero selects spinner mode.
    pub fn new(verbose: u8) -> Self {
        Self {
            quiet: verbose == 0,
            spinner: RefCell::new(None),
        }
    }

    /// Announces a new phase of the command.
    pub fn phase(&self, message: &str) {
        if self.quiet {
            let mut spinner = self.spinner.borrow_mut();
            let spinner = spinner.get_or_insert_with(|| {
                let style = ProgressStyle::default_spinner()
                    .template("{spinner:.green} {msg}")
                    .unwrap();
                let bar = ProgressBar::new_spinner();
                bar.set_style(style);
                bar.enable_steady_tick(Duration::from_millis(100));
                bar
            });
            spinner.set_message(message.to_string());
        } else {
            info!("{}", message);
        }
    }

    /// Phase progress within a counted loop, e.g. per-layer downloads.
    pub fn step(&self, current: usize, total: usize, message: &str) {
        self.phase(&format!("{} ({}/{})", message, current, total));
    }

    /// Warning that must survive spinner redraws.
    pub fn warn(&self, message: &str) {
        if let Some(spinner) = self.spinner.borrow().as_ref() {
            spinner.println(format!("warning: {}", message));
        } else {
            warn!("{}", message);
        }
    }

    /// Clears the spinner; stdout is safe to write afterwards.
    pub fn finish(&self) {
        if let Some(spinner) = self.spinner.borrow_mut().take() {
            spinner.finish_and_clear();
        }
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        self.finish();
    }
}
