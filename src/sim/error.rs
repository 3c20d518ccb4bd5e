//! Simulation error type

use super::track::SegmentKey;
use super::train::TrainId;

/// Misuse of the simulation API.
///
/// Soft conditions (a footprint that the tape cannot supply yet) are reported as
/// `None` by the query itself and never surface here.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// A leg needs at least two points.
    #[error("leg needs at least 2 points, got {0}")]
    TooFewPoints(usize),
    /// No live train with this id.
    #[error("unknown train {0}")]
    UnknownTrain(TrainId),
    /// No registered track segment with this key.
    #[error("unknown track segment {0}")]
    UnknownSegment(SegmentKey),
    /// The train was asked to move before any leg was loaded.
    #[error("train {0} has no leg loaded")]
    NoLeg(TrainId),
    /// Cart offsets must be finite, non-negative and strictly increasing.
    #[error("invalid cart offsets {0:?}")]
    InvalidCartOffsets(Vec<f32>),
    /// Route flattening was given a fraction outside `0..=1`.
    #[error("invalid route fraction {0}")]
    InvalidFraction(f32),
    /// Run-to-next-event needs a positive per-tick budget.
    #[error("meters per tick must be positive, got {0}")]
    InvalidTickSize(f32),
    /// Run-to-next-event hit its safety bound without arriving or blocking.
    #[error("train {id} produced no event within {ticks} ticks")]
    Runaway { id: TrainId, ticks: u32 },
    /// A settings or train config value is out of range.
    #[error("invalid setting {field} = {value}")]
    InvalidSettings { field: &'static str, value: f32 },
    /// Settings JSON could not be parsed.
    #[error("settings parse failed: {0}")]
    Settings(#[from] serde_json::Error),
    /// Settings file could not be read.
    #[error("settings io failed: {0}")]
    Io(#[from] std::io::Error),
}
