//! Progress hooks.

use super::error::PipelineError;
use super::stage::TileStage;
use crate::tiler::TileIndex;

/// Receives progress notifications from a running pipeline.
///
/// Called from worker threads; implementations must be cheap and must not
/// block. Every method has an empty default.
pub trait PipelineObserver: Send + Sync {
    /// The tile plan is known.
    fn tiles_planned(&self, _count: usize) {}

    /// A tile completed `stage`.
    fn stage_completed(&self, _index: TileIndex, _stage: TileStage) {}

    /// A tile stopped with `error`.
    fn tile_failed(&self, _index: TileIndex, _error: &PipelineError) {}
}

/// Observer that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}
