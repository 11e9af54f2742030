// ABOUTME: Progress reporting seam between the transfer engine and the console
// ABOUTME: indicatif progress bar for interactive runs, a silent reporter otherwise

use indicatif::{ProgressBar, ProgressStyle};

/// Receives row-count progress from a transfer.
pub trait ProgressReporter: Send + Sync {
    /// A transfer of `total` rows is starting.
    fn start(&self, total: u64);

    /// `rows` more rows were committed.
    fn report(&self, rows: u64);

    fn finish(&self);
}

/// Reports nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn start(&self, _total: u64) {}

    fn report(&self, _rows: u64) {}

    fn finish(&self) {}
}

/// Console progress bar.
pub struct IndicatifProgress {
    bar: ProgressBar,
}

impl IndicatifProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::hidden();
        if let Ok(style) = ProgressStyle::with_template(
            "{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} rows ({per_sec}, eta {eta})",
        ) {
            bar.set_style(style.progress_chars("#>-"));
        }
        bar.set_message("Transferring");
        Self { bar }
    }
}

impl Default for IndicatifProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for IndicatifProgress {
    fn start(&self, total: u64) {
        self.bar.set_length(total);
        self.bar.set_position(0);
        self.bar
            .set_draw_target(indicatif::ProgressDrawTarget::stderr());
    }

    fn report(&self, rows: u64) {
        self.bar.inc(rows);
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

/// Reporter for a run: a progress bar when `show_progress` is set.
pub fn reporter(show_progress: bool) -> Box<dyn ProgressReporter> {
    if show_progress {
        Box::new(IndicatifProgress::new())
    } else {
        Box::new(NoProgress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indicatif_progress_tracks_position() {
        let progress = IndicatifProgress::new();
        progress.start(2500);
        progress.report(1000);
        progress.report(1000);
        assert_eq!(progress.bar.position(), 2000);
        assert_eq!(progress.bar.length(), Some(2500));
        progress.finish();
    }
}
