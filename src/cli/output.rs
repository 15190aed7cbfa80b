//! Output formatting and progress indicators
//!
//! This module provides the build progress bar and formatted messages
//! to the user.

use indicatif::{ProgressBar, ProgressStyle};

use crate::core::events::{BuildObserver, StageEvent};
use crate::core::registry::BuildOutcome;

/// Create a progress bar for package stages
pub fn create_build_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} packages ({msg})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░"),
    );
    pb.enable_steady_tick(std::time::Duration::from_millis(120));
    pb
}

/// Observer advancing a progress bar as stages finish
pub struct ProgressObserver {
    bar: ProgressBar,
}

impl ProgressObserver {
    /// Track `total` stages
    pub fn new(total: usize) -> Self {
        Self {
            bar: create_build_bar(total as u64),
        }
    }

    /// Observer that draws nothing
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    /// Remove the bar from the terminal
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl BuildObserver for ProgressObserver {
    fn on_event(&self, event: StageEvent) {
        match event {
            StageEvent::Materialized { name, .. } => self.bar.set_message(name),
            StageEvent::Finished { name, result, .. } => {
                self.bar.inc(1);
                match result {
                    Ok(outcome) => self.bar.println(format!(
                        "{} {name} ({})",
                        status::SUCCESS,
                        outcome_label(outcome)
                    )),
                    Err(e) => self.bar.println(format!("{} {name}: {e}", status::ERROR)),
                }
            }
            _ => {}
        }
    }
}

/// Human readable outcome
pub fn outcome_label(outcome: BuildOutcome) -> &'static str {
    match outcome {
        BuildOutcome::Built => "built",
        BuildOutcome::Cached => "cached",
    }
}

/// Print an error and its causes to stderr
pub fn display_error(error: &anyhow::Error) {
    eprintln!("{} {error}", status::ERROR);
    for cause in error.chain().skip(1) {
        eprintln!("  caused by: {cause}");
    }
}

/// Status message prefixes
pub mod status {
    /// Success prefix (green checkmark)
    pub const SUCCESS: &str = "✓";

    /// Error prefix (red X)
    pub const ERROR: &str = "✗";

    /// Warning prefix (yellow triangle)
    pub const WARNING: &str = "⚠";
}
