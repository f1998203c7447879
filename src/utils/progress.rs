//! Terminal progress indicators.
//!
//! Thin wrapper over `indicatif` giving every command the same look. Bars are
//! hidden when `SOLDEPLOY_NO_PROGRESS` is set, when `--no-progress` is passed,
//! or when the caller asks for a hidden bar (quiet mode).
//!
//! ```rust
//! use solution_deployer::utils::progress::ProgressBar;
//!
//! let progress = ProgressBar::hidden();
//! progress.set_length(10);
//! progress.set_message("Deploying");
//! progress.set_position(4);
//! progress.finish_and_clear();
//! ```

use indicatif::{ProgressBar as IndicatifBar, ProgressStyle as IndicatifStyle};
use std::time::Duration;

use crate::constants::NO_PROGRESS_ENV_VAR;

/// Checks if progress bars are disabled through the environment.
pub fn is_progress_disabled() -> bool {
    std::env::var_os(NO_PROGRESS_ENV_VAR).is_some()
}

/// A progress bar with consistent styling.
#[derive(Clone)]
pub struct ProgressBar {
    inner: IndicatifBar,
}

impl ProgressBar {
    /// Creates a progress bar over `len` units, hidden if disabled by environment.
    pub fn new(len: u64) -> Self {
        Self::with_visibility(len, !is_progress_disabled())
    }

    /// Creates a progress bar that is only drawn when `visible` is true.
    pub fn with_visibility(len: u64, visible: bool) -> Self {
        let bar = if visible {
            let bar = IndicatifBar::new(len);
            bar.set_style(default_style());
            bar
        } else {
            IndicatifBar::hidden()
        };
        Self { inner: bar }
    }

    /// A bar that silently ignores every update.
    pub fn hidden() -> Self {
        Self {
            inner: IndicatifBar::hidden(),
        }
    }

    /// Creates a spinner for work of unknown length.
    pub fn new_spinner() -> Self {
        let bar = if is_progress_disabled() {
            IndicatifBar::hidden()
        } else {
            let bar = IndicatifBar::new_spinner();
            bar.set_style(spinner_style());
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        };
        Self { inner: bar }
    }

    /// Sets the message displayed next to the bar.
    pub fn set_message(&self, msg: impl Into<String>) {
        self.inner.set_message(msg.into());
    }

    /// Sets the prefix displayed before the bar.
    pub fn set_prefix(&self, prefix: impl Into<String>) {
        self.inner.set_prefix(prefix.into());
    }

    /// Changes the total length.
    pub fn set_length(&self, len: u64) {
        self.inner.set_length(len);
    }

    /// Increments the position.
    pub fn inc(&self, delta: u64) {
        self.inner.inc(delta);
    }

    /// Sets the absolute position.
    pub fn set_position(&self, pos: u64) {
        self.inner.set_position(pos);
    }

    /// Current position.
    pub fn position(&self) -> u64 {
        self.inner.position()
    }

    /// Finishes the bar, leaving `msg` on screen.
    pub fn finish_with_message(&self, msg: impl Into<String>) {
        self.inner.finish_with_message(msg.into());
    }

    /// Finishes the bar and removes it from the terminal.
    pub fn finish_and_clear(&self) {
        self.inner.finish_and_clear();
    }
}

fn default_style() -> IndicatifStyle {
    IndicatifStyle::default_bar()
        .template("{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| IndicatifStyle::default_bar())
        .progress_chars("━╸━")
}

fn spinner_style() -> IndicatifStyle {
    IndicatifStyle::default_spinner()
        .template("{prefix:.bold} {spinner:.cyan} {msg}")
        .unwrap_or_else(|_| IndicatifStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
}
