//! Deterministic simulation module
//!
//! All train movement lives here. This module must be pure and deterministic:
//! - Explicit ticks driven by the caller, no frame callbacks
//! - Fixed per-tick distance budgets, no dynamics
//! - Stable iteration order (by train ID)
//! - No rendering or platform dependencies

pub mod collision;
pub mod error;
pub mod path;
pub mod tape;
pub mod track;
pub mod train;
pub mod world;

pub use collision::{ContactKind, PolylineContact, polyline_contact, segment_contact};
pub use error::SimError;
pub use path::{ArcLengthPath, Pose};
pub use tape::BackTape;
pub use track::{BakedTrackPart, RouteStep, SegmentKey, TrackPart, TrackRegistry};
pub use train::{AdvanceKind, AdvanceResult, TrainConfig, TrainId, TrainPhase, TrainSim};
pub use world::{SpawnSpec, TrainEvent, World};
