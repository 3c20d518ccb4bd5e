//! World: owns the trains and track registry, drives ticks
//!
//! Trains are advanced one at a time by the caller. Each advance sees every
//! other train as of that train's last commit, gathered in ascending id order,
//! so results are reproducible run to run.

use std::collections::BTreeMap;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::error::SimError;
use super::path::Pose;
use super::track::{RouteStep, SegmentKey, TrackRegistry};
use super::train::{AdvanceKind, AdvanceResult, TrainId, TrainPhase, TrainSim};
use crate::Settings;

/// How to place a new train
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnSpec {
    pub position: Vec2,
    /// Direction the head faces
    pub forward: Vec2,
    /// Cart center distances behind the head, strictly increasing
    #[serde(default)]
    pub cart_offsets: Vec<f32>,
    /// Straight tape seeded behind the head
    #[serde(default)]
    pub seed_length: f32,
    /// Cell size hint; defaults come from [`Settings`]
    #[serde(default)]
    pub cell_size: Option<f32>,
    #[serde(default)]
    pub safety_gap: Option<f32>,
    /// Fixed body length behind the head, ignoring carts
    #[serde(default)]
    pub length_override: Option<f32>,
}

impl SpawnSpec {
    pub fn new(position: Vec2, forward: Vec2) -> Self {
        Self {
            position,
            forward,
            cart_offsets: Vec::new(),
            seed_length: 0.0,
            cell_size: None,
            safety_gap: None,
            length_override: None,
        }
    }

    pub fn with_carts(mut self, offsets: Vec<f32>) -> Self {
        self.cart_offsets = offsets;
        self
    }

    pub fn with_seed_length(mut self, length: f32) -> Self {
        self.seed_length = length;
        self
    }
}

/// What ended a run-to-next-event loop
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TrainEvent {
    Arrived {
        ticks: u32,
        distance: f32,
    },
    Blocked {
        obstacle: TrainId,
        hit_pos: Vec2,
        ticks: u32,
        distance: f32,
    },
}

impl TrainEvent {
    pub fn ticks(&self) -> u32 {
        match *self {
            TrainEvent::Arrived { ticks, .. } | TrainEvent::Blocked { ticks, .. } => ticks,
        }
    }
}

/// A live simulation: trains, tracks, and the segments trains are consuming.
///
/// `Clone` yields a fully independent instance, which is how a mirror
/// simulation for parity checks is made.
#[derive(Debug, Clone)]
pub struct World {
    settings: Settings,
    trains: BTreeMap<TrainId, TrainSim>,
    tracks: TrackRegistry,
    /// Segments each train will have fully driven when its leg ends
    traversing: BTreeMap<TrainId, Vec<SegmentKey>>,
    next_id: u32,
}

impl World {
    pub fn new(settings: Settings) -> Self {
        Self::with_tracks(settings, TrackRegistry::new())
    }

    pub fn with_tracks(settings: Settings, tracks: TrackRegistry) -> Self {
        Self {
            settings,
            trains: BTreeMap::new(),
            tracks,
            traversing: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn tracks(&self) -> &TrackRegistry {
        &self.tracks
    }

    pub fn tracks_mut(&mut self) -> &mut TrackRegistry {
        &mut self.tracks
    }

    /// Place a stationary train; it is collidable immediately.
    pub fn spawn(&mut self, spec: SpawnSpec) -> Result<TrainId, SimError> {
        self.settings.validate()?;
        let config = self.settings.train_config(spec.cell_size, spec.safety_gap);
        let id = TrainId(self.next_id);
        let train = TrainSim::spawn(
            id,
            config,
            Pose::new(spec.position, spec.forward),
            spec.cart_offsets,
            spec.seed_length,
            spec.length_override,
        )?;
        self.next_id += 1;
        self.trains.insert(id, train);
        log::info!("Spawned train {id} at {}", spec.position);
        Ok(id)
    }

    pub fn train(&self, id: TrainId) -> Result<&TrainSim, SimError> {
        self.trains.get(&id).ok_or(SimError::UnknownTrain(id))
    }

    fn train_mut(&mut self, id: TrainId) -> Result<&mut TrainSim, SimError> {
        self.trains.get_mut(&id).ok_or(SimError::UnknownTrain(id))
    }

    /// Trains in id order
    pub fn trains(&self) -> impl Iterator<Item = &TrainSim> {
        self.trains.values()
    }

    pub fn train_count(&self) -> usize {
        self.trains.len()
    }

    /// Give a train an explicit point sequence to follow
    pub fn load_leg(&mut self, id: TrainId, points: &[Vec2]) -> Result<(), SimError> {
        self.train_mut(id)?.load_leg(points)?;
        self.traversing.remove(&id);
        Ok(())
    }

    /// Follow one registered segment end to end
    pub fn load_segment_leg(&mut self, id: TrainId, key: SegmentKey, reversed: bool) -> Result<(), SimError> {
        let points = self.tracks.oriented(&key, reversed)?;
        self.train_mut(id)?.load_leg(&points)?;
        self.traversing.insert(id, vec![key]);
        Ok(())
    }

    /// Follow a route of registered segments. Steps covering a whole segment
    /// count as traversed once the leg ends.
    pub fn load_route(&mut self, id: TrainId, steps: &[RouteStep]) -> Result<(), SimError> {
        let epsilon = self.train(id)?.config().epsilon;
        let points = self.tracks.flatten_route(steps, epsilon)?;
        self.train_mut(id)?.load_leg(&points)?;
        let full: Vec<SegmentKey> = steps
            .iter()
            .filter(|s| s.entry <= 0.0 && s.exit >= 1.0)
            .map(|s| s.key)
            .collect();
        self.traversing.insert(id, full);
        Ok(())
    }

    pub fn set_cart_offsets(&mut self, id: TrainId, offsets: Vec<f32>) -> Result<(), SimError> {
        self.train_mut(id)?.set_cart_offsets(offsets)
    }

    /// The train's body as others see it, `None` while its tape is too short
    pub fn footprint(&self, id: TrainId) -> Result<Option<Vec<Vec2>>, SimError> {
        let train = self.train(id)?;
        let cfg = train.config();
        Ok(train.occupied_back_slice(cfg.safety_gap, cfg.sample_step))
    }

    /// How far `id` could move toward `want` right now. Changes nothing.
    pub fn preview_advance(&self, id: TrainId, want: f32) -> Result<AdvanceResult, SimError> {
        let train = self.train(id)?;
        let others = self.trains.values().filter(|t| t.id() != id);
        train.compute_allowed_advance(want, others)
    }

    /// Move `id` by an already computed distance
    pub fn commit_advance(&mut self, id: TrainId, allowed: f32) -> Result<Pose, SimError> {
        self.train_mut(id)?.commit_advance(allowed)
    }

    /// One tick for one train: preview, commit, update phase, consume track.
    pub fn advance(&mut self, id: TrainId, want: f32) -> Result<AdvanceResult, SimError> {
        let result = self.preview_advance(id, want)?;
        let train = self.train_mut(id)?;
        train.commit_advance(result.allowed)?;
        train.record_outcome(&result);

        match result.kind {
            AdvanceKind::ReachedEnd => {
                log::debug!("train {id} reached end of leg");
                self.consume_traversed(id);
            }
            AdvanceKind::Blocked => {
                log::debug!(
                    "train {id} blocked by {:?} after {:.4} m",
                    result.obstacle,
                    result.allowed
                );
            }
            AdvanceKind::None => {}
        }
        Ok(result)
    }

    fn consume_traversed(&mut self, id: TrainId) {
        let Some(keys) = self.traversing.remove(&id) else {
            return;
        };
        if !self.settings.auto_consume_segments {
            return;
        }
        for key in keys {
            if self.tracks.is_consumable(&key) {
                self.tracks.remove(&key);
                log::info!("Train {id} consumed segment {key}");
            }
        }
    }

    /// Advance `id` by `meters_per_tick` each tick until it arrives or is blocked.
    pub fn run_to_next_event(&mut self, id: TrainId, meters_per_tick: f32) -> Result<TrainEvent, SimError> {
        if !(meters_per_tick.is_finite() && meters_per_tick > 0.0) {
            return Err(SimError::InvalidTickSize(meters_per_tick));
        }
        self.train(id)?;

        let max_ticks = self.settings.max_event_ticks;
        let mut distance = 0.0;
        for tick in 1..=max_ticks {
            let result = self.advance(id, meters_per_tick)?;
            distance += result.allowed;
            match (result.kind, result.obstacle, result.contact) {
                (AdvanceKind::ReachedEnd, _, _) => {
                    log::info!("Train {id} arrived after {tick} ticks");
                    return Ok(TrainEvent::Arrived { ticks: tick, distance });
                }
                (AdvanceKind::Blocked, Some(obstacle), Some(hit_pos)) => {
                    log::warn!("Train {id} blocked by {obstacle} at {hit_pos}");
                    return Ok(TrainEvent::Blocked {
                        obstacle,
                        hit_pos,
                        ticks: tick,
                        distance,
                    });
                }
                _ => {}
            }
        }

        log::error!("Train {id} produced no event within {max_ticks} ticks");
        Err(SimError::Runaway { id, ticks: max_ticks })
    }

    /// One tick over every train that has somewhere to go, in id order
    pub fn tick_all(&mut self, meters_per_tick: f32) -> Result<Vec<(TrainId, AdvanceResult)>, SimError> {
        let movable: Vec<TrainId> = self
            .trains
            .values()
            .filter(|t| t.path().is_some() && t.phase() != TrainPhase::Arrived)
            .map(TrainSim::id)
            .collect();

        let mut results = Vec::with_capacity(movable.len());
        for id in movable {
            results.push((id, self.advance(id, meters_per_tick)?));
        }
        Ok(results)
    }

    /// Explicitly delete a track segment
    pub fn remove_segment(&mut self, key: &SegmentKey) -> Result<Vec<Vec2>, SimError> {
        self.tracks
            .remove(key)
            .ok_or(SimError::UnknownSegment(*key))
    }

    /// First train whose head differs between `self` and `mirror` by more
    /// than `tolerance`, or that exists in only one of them.
    pub fn parity_mismatch(&self, mirror: &World, tolerance: f32) -> Option<TrainId> {
        for (id, train) in &self.trains {
            let Some(other) = mirror.trains.get(id) else {
                return Some(*id);
            };
            let drift = train.head().position.distance(other.head().position);
            if drift > tolerance || (train.s() - other.s()).abs() > tolerance {
                return Some(*id);
            }
        }
        mirror
            .trains
            .keys()
            .find(|id| !self.trains.contains_key(*id))
            .copied()
    }
}
