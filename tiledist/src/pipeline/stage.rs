//! Per-tile stage tracking.
//!
//! Every tile moves through the stages in order:
//!
//! ```text
//! Planned -> Split -> Distanced -> Repaired -> Merged
//!    \---------\---------\-----------\---------> Failed
//! ```
//!
//! Completion is recorded in the [`TileLedger`] as it happens; nothing looks
//! at the filesystem to decide what stage a tile is in. Artifacts written
//! along the way are attached to the ledger record under the stage that
//! produced them.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::error::PipelineError;
use crate::grid::Window;
use crate::tiler::{TileIndex, TilePlacement};

/// Processing stage of a tile.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TileStage {
    /// Placement computed, nothing read yet.
    Planned,
    /// Source cells read.
    Split,
    /// Distance transform computed.
    Distanced,
    /// Original values restored.
    Repaired,
    /// Folded into the output grid.
    Merged,
    /// Processing stopped with an error or cancellation.
    Failed,
}

impl TileStage {
    /// The stage that follows this one on success.
    pub fn next(&self) -> Option<TileStage> {
        match self {
            TileStage::Planned => Some(TileStage::Split),
            TileStage::Split => Some(TileStage::Distanced),
            TileStage::Distanced => Some(TileStage::Repaired),
            TileStage::Repaired => Some(TileStage::Merged),
            TileStage::Merged | TileStage::Failed => None,
        }
    }

    /// Returns true if a tile in this stage may move to `to`.
    pub fn can_advance_to(&self, to: TileStage) -> bool {
        match to {
            TileStage::Failed => !self.is_terminal(),
            _ => self.next() == Some(to),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TileStage::Merged | TileStage::Failed)
    }

    /// Lowercase name, also used in artifact file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            TileStage::Planned => "planned",
            TileStage::Split => "split",
            TileStage::Distanced => "distanced",
            TileStage::Repaired => "repaired",
            TileStage::Merged => "merged",
            TileStage::Failed => "failed",
        }
    }
}

impl fmt::Display for TileStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ledger entry for one tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileRecord {
    pub index: TileIndex,
    pub window: Window,
    pub stage: TileStage,
    /// Artifact written at each stage, if it is still on disk.
    pub artifacts: BTreeMap<TileStage, PathBuf>,
    /// Failure message for tiles in [`TileStage::Failed`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TileRecord {
    fn planned(placement: &TilePlacement) -> Self {
        Self {
            index: placement.index,
            window: placement.window,
            stage: TileStage::Planned,
            artifacts: BTreeMap::new(),
            error: None,
        }
    }
}

/// Concurrent map from tile index to its stage and artifacts.
///
/// Each worker only touches the record of the tile it owns, so entries are
/// never contended in practice.
#[derive(Debug, Default)]
pub struct TileLedger {
    records: DashMap<TileIndex, TileRecord>,
}

impl TileLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a ledger with every placement in [`TileStage::Planned`].
    pub fn planned(placements: &[TilePlacement]) -> Self {
        let ledger = Self::new();
        for placement in placements {
            ledger
                .records
                .insert(placement.index, TileRecord::planned(placement));
        }
        ledger
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Current stage of a tile.
    pub fn stage(&self, index: TileIndex) -> Option<TileStage> {
        self.records.get(&index).map(|r| r.stage)
    }

    /// Records that `index` completed `stage`.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::StageOrder` if the tile is unknown or `stage`
    /// does not directly follow its current stage.
    pub fn advance(&self, index: TileIndex, stage: TileStage) -> Result<(), PipelineError> {
        let mut record = self
            .records
            .get_mut(&index)
            .ok_or(PipelineError::StageOrder {
                index,
                from: TileStage::Failed,
                to: stage,
            })?;
        if !record.stage.can_advance_to(stage) {
            return Err(PipelineError::StageOrder {
                index,
                from: record.stage,
                to: stage,
            });
        }
        record.stage = stage;
        Ok(())
    }

    /// Marks a tile failed. Terminal tiles are left untouched.
    pub fn fail(&self, index: TileIndex, message: impl Into<String>) {
        if let Some(mut record) = self.records.get_mut(&index) {
            if !record.stage.is_terminal() {
                record.stage = TileStage::Failed;
                record.error = Some(message.into());
            }
        }
    }

    /// Attaches the artifact written for `stage`.
    pub fn attach_artifact(&self, index: TileIndex, stage: TileStage, path: PathBuf) {
        if let Some(mut record) = self.records.get_mut(&index) {
            record.artifacts.insert(stage, path);
        }
    }

    /// Path of the artifact written for `(index, stage)`, if still present.
    pub fn artifact(&self, index: TileIndex, stage: TileStage) -> Option<PathBuf> {
        self.records
            .get(&index)
            .and_then(|r| r.artifacts.get(&stage).cloned())
    }

    /// Detaches and returns the artifact for `(index, stage)`.
    pub fn release_artifact(&self, index: TileIndex, stage: TileStage) -> Option<PathBuf> {
        self.records
            .get_mut(&index)
            .and_then(|mut r| r.artifacts.remove(&stage))
    }

    /// Number of tiles currently in `stage`.
    pub fn count_in(&self, stage: TileStage) -> usize {
        self.records.iter().filter(|r| r.stage == stage).count()
    }

    /// Snapshot of every record, ordered by tile index.
    pub fn records(&self) -> Vec<TileRecord> {
        let mut records: Vec<TileRecord> = self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by_key(|r| r.index);
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> TileLedger {
        TileLedger::planned(&[
            TilePlacement {
                index: TileIndex::new(0, 0),
                window: Window::new(0, 0, 4, 4),
            },
            TilePlacement {
                index: TileIndex::new(1, 0),
                window: Window::new(2, 0, 4, 4),
            },
        ])
    }

    #[test]
    fn test_stage_order() {
        assert_eq!(TileStage::Planned.next(), Some(TileStage::Split));
        assert_eq!(TileStage::Repaired.next(), Some(TileStage::Merged));
        assert_eq!(TileStage::Merged.next(), None);
        assert!(TileStage::Split.can_advance_to(TileStage::Distanced));
        assert!(!TileStage::Split.can_advance_to(TileStage::Repaired));
        assert!(TileStage::Distanced.can_advance_to(TileStage::Failed));
        assert!(!TileStage::Merged.can_advance_to(TileStage::Failed));
    }

    #[test]
    fn test_advance_through_all_stages() {
        let ledger = ledger();
        let index = TileIndex::new(1, 0);
        for stage in [
            TileStage::Split,
            TileStage::Distanced,
            TileStage::Repaired,
            TileStage::Merged,
        ] {
            ledger.advance(index, stage).unwrap();
            assert_eq!(ledger.stage(index), Some(stage));
        }
        assert_eq!(ledger.count_in(TileStage::Merged), 1);
        assert_eq!(ledger.count_in(TileStage::Planned), 1);
    }

    #[test]
    fn test_skipping_a_stage_is_rejected() {
        let ledger = ledger();
        let index = TileIndex::new(0, 0);
        let err = ledger.advance(index, TileStage::Repaired).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::StageOrder {
                from: TileStage::Planned,
                to: TileStage::Repaired,
                ..
            }
        ));
        assert_eq!(ledger.stage(index), Some(TileStage::Planned));
    }

    #[test]
    fn test_unknown_tile_is_rejected() {
        let err = ledger()
            .advance(TileIndex::new(5, 5), TileStage::Split)
            .unwrap_err();
        assert!(matches!(err, PipelineError::StageOrder { .. }));
    }

    #[test]
    fn test_fail_records_message_once() {
        let ledger = ledger();
        let index = TileIndex::new(0, 0);
        ledger.advance(index, TileStage::Split).unwrap();
        ledger.fail(index, "read error");
        ledger.fail(index, "second failure");

        let record = &ledger.records()[0];
        assert_eq!(record.stage, TileStage::Failed);
        assert_eq!(record.error.as_deref(), Some("read error"));
    }

    #[test]
    fn test_artifacts_by_stage() {
        let ledger = ledger();
        let index = TileIndex::new(0, 0);
        ledger.attach_artifact(index, TileStage::Distanced, PathBuf::from("/tmp/d.tif"));
        assert_eq!(
            ledger.artifact(index, TileStage::Distanced),
            Some(PathBuf::from("/tmp/d.tif"))
        );
        assert_eq!(ledger.artifact(index, TileStage::Split), None);

        let released = ledger.release_artifact(index, TileStage::Distanced);
        assert_eq!(released, Some(PathBuf::from("/tmp/d.tif")));
        assert_eq!(ledger.artifact(index, TileStage::Distanced), None);
    }

    #[test]
    fn test_records_sorted_and_serializable() {
        let ledger = ledger();
        let records = ledger.records();
        assert_eq!(records[0].index, TileIndex::new(0, 0));
        assert_eq!(records[1].index, TileIndex::new(1, 0));

        let json = serde_json::to_string(&records[0]).unwrap();
        assert!(json.contains("\"stage\":\"planned\""));
        assert!(!json.contains("error"));
    }
}
