//! Progress bar driven by pipeline notifications.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tiledist::pipeline::{PipelineError, PipelineObserver, TileStage};
use tiledist::tiler::TileIndex;

/// Stages reported per tile: split, distanced, repaired, merged.
const STAGES_PER_TILE: u64 = 4;

/// Shows one bar step per completed tile stage.
pub struct ProgressObserver {
    bar: ProgressBar,
}

impl ProgressObserver {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
        bar.set_style(style);
        Self { bar }
    }

    /// A bar that draws nothing.
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    pub fn abandon(&self) {
        self.bar.abandon();
    }
}

impl PipelineObserver for ProgressObserver {
    fn tiles_planned(&self, count: usize) {
        self.bar.set_length(count as u64 * STAGES_PER_TILE);
    }

    fn stage_completed(&self, index: TileIndex, stage: TileStage) {
        self.bar.inc(1);
        self.bar.set_message(format!("tile {} {}", index, stage));
    }

    fn tile_failed(&self, index: TileIndex, error: &PipelineError) {
        if !error.is_cancelled() {
            self.bar.println(format!(
                "{} tile {}: {}",
                style("failed").red().bold(),
                index,
                error
            ));
        }
    }
}
