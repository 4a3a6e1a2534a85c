//! Terminal progress rendering.
//!
//! A thin wrapper over `indicatif` shared by all workers: each byte
//! transfer gets its own bar under one `MultiProgress`, so concurrent
//! downloads render without interleaving. With progress bars disabled the
//! same interface produces hidden bars and the pipeline code stays free
//! of conditionals.

use std::sync::Arc;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::client::ProgressCallback;

/// Shared progress renderer for one session.
#[derive(Clone)]
pub struct Progress {
    multi: Arc<MultiProgress>,
    enabled: bool,
}

impl Progress {
    /// Creates the renderer. With `enabled` false all bars are hidden.
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            multi: Arc::new(MultiProgress::new()),
            enabled,
        }
    }

    /// Starts a byte-transfer bar labeled with the track description.
    #[must_use]
    pub fn transfer(&self, total_bytes: u64, label: &str) -> TransferBar {
        let bar = if self.enabled {
            let bar = self.multi.add(ProgressBar::new(total_bytes));
            bar.set_style(
                ProgressStyle::with_template(
                    "{msg:30!} {bytes:>10}/{total_bytes:<10} {bar:30} {bytes_per_sec}",
                )
                .expect("valid template"),
            );
            bar.set_message(label.to_string());
            bar
        } else {
            ProgressBar::hidden()
        };

        TransferBar { bar }
    }

    /// Prints a line above the live bars.
    pub fn println(&self, message: &str) {
        if self.enabled {
            let _ = self.multi.println(message);
        } else {
            println!("{message}");
        }
    }
}

/// One in-flight transfer's bar.
pub struct TransferBar {
    bar: ProgressBar,
}

impl TransferBar {
    /// Callback moving the bar to the cumulative byte count.
    #[must_use]
    pub fn callback(&self) -> ProgressCallback {
        let bar = self.bar.clone();
        Box::new(move |received| bar.set_position(received))
    }

    /// Removes the bar from the display.
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
