//! Text rendering of aggregate snapshots.

use std::io::{self, IsTerminal};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use tally_engine::{AggregateState, ProgressSink};
use tally_types::format_euros;

/// `12,50 € (C: 3 / I: 1)`: total, processed count, count without a price.
///
/// Skipped failures are appended only when there are any.
#[must_use]
pub(crate) fn summary_line(state: &AggregateState) -> String {
    let mut line = format!(
        "{} (C: {} / I: {})",
        format_euros(state.total_price_minor_units()),
        state.items_processed(),
        state.items_without_price()
    );
    if state.items_failed() > 0 {
        line.push_str(&format!(" [{} failed]", state.items_failed()));
    }
    line
}

/// Shows each snapshot on stderr.
///
/// On a terminal a spinner line is redrawn in place and cleared when the run
/// ends. Otherwise every snapshot is printed on its own line.
pub(crate) struct StderrProgress {
    bar: Option<ProgressBar>,
}

impl StderrProgress {
    pub(crate) fn new() -> Self {
        if io::stderr().is_terminal() {
            let bar = Self::with_bar(ProgressBar::new_spinner());
            if let Some(pb) = &bar.bar {
                pb.enable_steady_tick(Duration::from_millis(80));
            }
            bar
        } else {
            Self { bar: None }
        }
    }

    fn with_bar(pb: ProgressBar) -> Self {
        let style = ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
        pb.set_style(style);
        Self { bar: Some(pb) }
    }

    /// Clear the spinner line so later output starts on a clean one.
    pub(crate) fn finish(&mut self) {
        if let Some(pb) = self.bar.take() {
            pb.finish_and_clear();
        }
    }
}

impl Drop for StderrProgress {
    fn drop(&mut self) {
        self.finish();
    }
}

impl ProgressSink for StderrProgress {
    fn on_progress(&mut self, snapshot: AggregateState) {
        let line = summary_line(&snapshot);
        match &self.bar {
            Some(pb) => pb.set_message(line),
            None => eprintln!("{line}"),
        }
    }
}
