//! Rail Sim - train movement and collision core for a rail puzzle game
//!
//! Core modules:
//! - `sim`: Deterministic simulation (arc-length paths, back tapes, trains, world)
//! - `settings`: Data-driven tuning for cell size, sampling and tolerances

pub mod settings;
pub mod sim;

pub use settings::Settings;
pub use sim::{
    AdvanceKind, AdvanceResult, ArcLengthPath, BackTape, Pose, SimError, SpawnSpec, TrainEvent,
    TrainId, TrainSim, TrackRegistry, World,
};

use glam::Vec2;

/// Simulation configuration constants
pub mod consts {
    /// Default grid cell size in world meters
    pub const DEFAULT_CELL_SIZE: f32 = 1.0;
    /// Footprint / sweep sample spacing, as a fraction of cell size
    pub const SAMPLE_STEP_FACTOR: f32 = 0.25;
    /// Geometric epsilon, as a fraction of cell size
    pub const EPSILON_FACTOR: f32 = 1e-4;
    /// Capsule contact radius, as a fraction of cell size
    pub const LATERAL_TOLERANCE_FACTOR: f32 = 0.1;
    /// Distance from leg end that still counts as arrived, as a fraction of cell size
    pub const END_TOLERANCE_FACTOR: f32 = 1e-3;
    /// Locomotive length, as a fraction of cell size
    pub const HEAD_LENGTH_FACTOR: f32 = 1.0;
    /// Cart length, as a fraction of cell size
    pub const CART_LENGTH_FACTOR: f32 = 1.0;

    /// Upper bound on ticks a single run-to-next-event call may take
    pub const MAX_EVENT_TICKS: u32 = 100_000;
    /// Iterations when bisecting for first capsule contact
    pub const CONTACT_BISECT_ITERS: u32 = 24;
}

/// Unit vector of `v`, or `fallback` when `v` is (nearly) zero
#[inline]
pub fn unit_or(v: Vec2, fallback: Vec2) -> Vec2 {
    let len = v.length();
    if len > f32::EPSILON { v / len } else { fallback }
}

/// Total length of a polyline
pub fn polyline_length(points: &[Vec2]) -> f32 {
    points.windows(2).map(|w| w[0].distance(w[1])).sum()
}
