#[cfg(feature = "progress_bar")]
use std::{
    fmt::{Display, Formatter},
    sync::atomic::{AtomicUsize, Ordering},
};

#[cfg(feature = "progress_bar")]
use colored::Colorize;
#[cfg(feature = "progress_bar")]
use status_line::StatusLine;
#[cfg(feature = "progress_bar")]
use tokio::time;

#[cfg(feature = "progress_bar")]
/// Counts processed block-list rows.
pub struct Progress {
    progress: AtomicUsize, // Rows processed so far.
    max: usize,            // Rows in the block list.
    timer: time::Instant,  // Started when the run began.
}

#[cfg(feature = "progress_bar")]
impl Display for Progress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let done = self.progress.load(Ordering::Relaxed);
        let percent = if self.max == 0 {
            100.0
        } else {
            (done as f64 / self.max as f64) * 100.0
        };
        write!(
            f,
            "{} {} Patching networks: {}/{} ({:.2}%)",
            format!("{}:", module_path!()).bright_blue(),
            "INFO".bright_blue(),
            done,
            self.max,
            percent
        )
    }
}

#[cfg(all(feature = "progress_bar", feature = "log"))]
impl Drop for Progress {
    fn drop(&mut self) {
        log::debug!(
            "Processed {} rows in {:?}",
            self.progress.load(Ordering::Relaxed),
            self.timer.elapsed()
        );
    }
}

/// Status line shown on stderr while rows are processed.
///
/// Without the `progress_bar` feature this is a no-op.
pub struct ProgressDisplay {
    #[cfg(feature = "progress_bar")]
    status: StatusLine<Progress>,
}

impl ProgressDisplay {
    /// Starts a display for `total` rows.
    pub fn new(total: usize) -> Self {
        #[cfg(not(feature = "progress_bar"))]
        let _ = total;
        Self {
            #[cfg(feature = "progress_bar")]
            status: StatusLine::new(Progress {
                progress: AtomicUsize::new(0),
                max: total,
                timer: time::Instant::now(),
            }),
        }
    }

    /// Records one more processed row.
    pub fn advance(&self) {
        #[cfg(feature = "progress_bar")]
        self.status.progress.fetch_add(1, Ordering::Relaxed);
    }

    #[cfg(all(test, feature = "progress_bar"))]
    fn position(&self) -> usize {
        self.status.progress.load(Ordering::Relaxed)
    }
}

#[cfg(all(test, feature = "progress_bar"))]
mod tests {
    use super::*;

    #[test]
    fn counts_rows() {
        let display = ProgressDisplay::new(3);
        display.advance();
        display.advance();
        assert_eq!(display.position(), 2);
    }

    #[test]
    fn empty_run_is_complete() {
        let progress = Progress {
            progress: AtomicUsize::new(0),
            max: 0,
            timer: time::Instant::now(),
        };
        colored::control::set_override(false);
        assert!(progress.to_string().ends_with("Patching networks: 0/0 (100.00%)"));
    }
}
