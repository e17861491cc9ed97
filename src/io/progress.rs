//! Epoch/loss progress rendering for a training run, backed by
//! [`crate::algorithm::builder::BuildProgress`] snapshots.

use std::sync::{Arc, LazyLock, Mutex};

use indicatif::{ProgressBar, ProgressStyle};

use crate::algorithm::builder::BuildProgress;
use crate::io::configuration::PROGRESS_BAR_WIDTH;

static TRAIN_STYLE: LazyLock<ProgressStyle> = LazyLock::new(|| {
    let template = format!("{{msg}} [{{bar:{PROGRESS_BAR_WIDTH}.cyan/blue}}] {{pos}}/{{len}} epochs");
    ProgressStyle::default_bar()
        .template(&template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏ ")
});

/// Renders a single `indicatif` bar tracking a training run's progress
/// snapshot. Polling is the caller's responsibility; this struct only
/// knows how to render whatever [`BuildProgress`] it is shown.
pub struct TrainingProgressBar {
    bar: ProgressBar,
}

impl TrainingProgressBar {
    /// Creates a bar for a run of `total_epochs` epochs.
    #[must_use]
    pub fn new(total_epochs: usize) -> Self {
        let bar = ProgressBar::new(total_epochs as u64);
        bar.set_style(TRAIN_STYLE.clone());
        Self { bar }
    }

    /// Renders the current snapshot: position, loss, and learning rate.
    pub fn render(&self, progress: &BuildProgress) {
        self.bar.set_length(progress.total_epochs as u64);
        self.bar.set_position(progress.epoch as u64);
        self.bar.set_message(format!(
            "loss={:.4} avg20={:.4} lr={:.5}",
            progress.loss_last, progress.loss_avg20, progress.lr
        ));
    }

    /// Polls `progress` once and renders it. Convenience for a caller
    /// driving a simple poll loop from the shared snapshot handle.
    pub fn poll(&self, progress: &Arc<Mutex<BuildProgress>>) {
        let Ok(snapshot) = progress.lock() else {
            return;
        };
        self.render(&snapshot);
    }

    /// Finishes the bar with a terminal message describing `state`.
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}
