//! Simulation settings
//!
//! Everything scales with the grid cell size, so most fields are factors of
//! it. Loaded from JSON; any missing field falls back to its default.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::sim::{SimError, TrainConfig};

/// Simulation tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Grid cell size used when a spawn gives no hint
    pub cell_size: f32,

    // === Sampling ===
    /// Footprint sample spacing (sweeps sub-step at half of this)
    pub sample_step_factor: f32,
    /// Geometric epsilon
    pub epsilon_factor: f32,

    // === Contact ===
    /// Capsule contact radius
    pub lateral_tolerance_factor: f32,
    /// Arrival slack at leg end
    pub end_tolerance_factor: f32,
    /// Extra length behind every tail, in meters
    pub safety_gap: f32,

    // === Body ===
    /// Head length in cells
    pub head_length_factor: f32,
    /// Cart length in cells
    pub cart_length_factor: f32,

    // === Orchestration ===
    /// Safety bound for run-to-next-event
    pub max_event_ticks: u32,
    /// Delete consumable segments once a train finishes them
    pub auto_consume_segments: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cell_size: DEFAULT_CELL_SIZE,

            sample_step_factor: SAMPLE_STEP_FACTOR,
            epsilon_factor: EPSILON_FACTOR,

            lateral_tolerance_factor: LATERAL_TOLERANCE_FACTOR,
            end_tolerance_factor: END_TOLERANCE_FACTOR,
            safety_gap: 0.0,

            head_length_factor: HEAD_LENGTH_FACTOR,
            cart_length_factor: CART_LENGTH_FACTOR,

            max_event_ticks: MAX_EVENT_TICKS,
            auto_consume_segments: true,
        }
    }
}

impl Settings {
    /// Per-train config for a cell size hint and optional safety gap override
    pub fn train_config(&self, cell_size_hint: Option<f32>, safety_gap: Option<f32>) -> TrainConfig {
        let cell = cell_size_hint
            .filter(|c| c.is_finite() && *c > 0.0)
            .unwrap_or(self.cell_size);
        TrainConfig {
            cell_size: cell,
            sample_step: cell * self.sample_step_factor,
            epsilon: cell * self.epsilon_factor,
            safety_gap: safety_gap.unwrap_or(self.safety_gap).max(0.0),
            lateral_tolerance: cell * self.lateral_tolerance_factor,
            end_tolerance: cell * self.end_tolerance_factor,
            head_length: cell * self.head_length_factor,
            cart_length: cell * self.cart_length_factor,
        }
    }

    /// Reject values that would stall or break the simulation
    pub fn validate(&self) -> Result<(), SimError> {
        require_positive("cell_size", self.cell_size)?;
        require_positive("sample_step_factor", self.sample_step_factor)?;
        require_positive("epsilon_factor", self.epsilon_factor)?;
        require_non_negative("lateral_tolerance_factor", self.lateral_tolerance_factor)?;
        require_non_negative("end_tolerance_factor", self.end_tolerance_factor)?;
        require_non_negative("safety_gap", self.safety_gap)?;
        require_non_negative("head_length_factor", self.head_length_factor)?;
        require_non_negative("cart_length_factor", self.cart_length_factor)
    }

    pub fn from_json(json: &str) -> Result<Self, SimError> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_json(&self) -> Result<String, SimError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load settings from a JSON file
    pub fn load(path: &Path) -> Result<Self, SimError> {
        let json = std::fs::read_to_string(path)?;
        let settings = Self::from_json(&json)?;
        log::info!("Loaded settings from {}", path.display());
        Ok(settings)
    }
}

pub(crate) fn require_positive(field: &'static str, value: f32) -> Result<(), SimError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SimError::InvalidSettings { field, value })
    }
}

pub(crate) fn require_non_negative(field: &'static str, value: f32) -> Result<(), SimError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(SimError::InvalidSettings { field, value })
    }
}
