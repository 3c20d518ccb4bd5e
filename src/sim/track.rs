//! Track segment registry
//!
//! Every spline of every placed track part is registered under a
//! [`SegmentKey`]. Some segments are consumable: they disappear once a train
//! has driven all the way along them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use glam::{IVec2, Vec2};
use serde::{Deserialize, Serialize};

use super::error::SimError;
use super::path::ArcLengthPath;

/// Identifies one polyline: owning part, spline within it, point sub-range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SegmentKey {
    pub part_id: u32,
    pub spline_index: u32,
    /// First point index of the sub-range
    pub range_start: u32,
    /// Last point index of the sub-range (inclusive)
    pub range_end: u32,
}

impl SegmentKey {
    /// Key covering a whole spline of `point_count` points
    pub fn whole(part_id: u32, spline_index: u32, point_count: usize) -> Self {
        Self {
            part_id,
            spline_index,
            range_start: 0,
            range_end: point_count.saturating_sub(1) as u32,
        }
    }
}

impl fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "part {} spline {} [{}..={}]",
            self.part_id, self.spline_index, self.range_start, self.range_end
        )
    }
}

/// A placed track part with splines already in world coordinates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackPart {
    pub id: u32,
    pub splines: Vec<Vec<Vec2>>,
}

/// A track part baked onto the grid: splines are in cell-local units
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BakedTrackPart {
    pub id: u32,
    /// Grid cell of the part's local origin
    pub cell: IVec2,
    pub splines: Vec<Vec<Vec2>>,
}

/// One step of a route through registered segments
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteStep {
    pub key: SegmentKey,
    /// Traverse against the authored point order
    pub reversed: bool,
    /// Fraction of the segment's length where the train enters, in traversal order
    pub entry: f32,
    /// Fraction where it leaves, in traversal order
    pub exit: f32,
}

impl RouteStep {
    /// Whole segment, in authored or reversed direction
    pub fn full(key: SegmentKey, reversed: bool) -> Self {
        Self {
            key,
            reversed,
            entry: 0.0,
            exit: 1.0,
        }
    }
}

/// Segment polylines plus the consumable subset
#[derive(Debug, Clone, Default)]
pub struct TrackRegistry {
    segments: BTreeMap<SegmentKey, Vec<Vec2>>,
    /// Always a subset of `segments` keys
    consumable: BTreeSet<SegmentKey>,
}

impl TrackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every spline of parts given in world coordinates
    pub fn from_world_geometry(parts: &[TrackPart]) -> Self {
        let mut registry = Self::new();
        for part in parts {
            registry.insert_part(part.id, part.splines.iter().cloned());
        }
        registry
    }

    /// Register every spline of grid-baked parts, mapping cell-local points to
    /// `origin + (cell + local) * cell_size`.
    pub fn from_baked_grid(parts: &[BakedTrackPart], cell_size: f32, origin: Vec2) -> Self {
        let mut registry = Self::new();
        for part in parts {
            let cell = part.cell.as_vec2();
            let splines = part.splines.iter().map(|spline| {
                spline
                    .iter()
                    .map(|&local| origin + (cell + local) * cell_size)
                    .collect::<Vec<_>>()
            });
            registry.insert_part(part.id, splines);
        }
        registry
    }

    fn insert_part(&mut self, part_id: u32, splines: impl Iterator<Item = Vec<Vec2>>) {
        for (index, points) in splines.enumerate() {
            if points.len() < 2 {
                log::warn!("part {part_id} spline {index} has fewer than 2 points, skipped");
                continue;
            }
            let key = SegmentKey::whole(part_id, index as u32, points.len());
            self.segments.insert(key, points);
        }
    }

    /// Register (or replace) a single segment
    pub fn insert(&mut self, key: SegmentKey, points: Vec<Vec2>) {
        self.segments.insert(key, points);
    }

    pub fn get(&self, key: &SegmentKey) -> Option<&[Vec2]> {
        self.segments.get(key).map(Vec::as_slice)
    }

    pub fn contains(&self, key: &SegmentKey) -> bool {
        self.segments.contains_key(key)
    }

    /// Remove a segment, unmarking it as consumable
    pub fn remove(&mut self, key: &SegmentKey) -> Option<Vec<Vec2>> {
        self.consumable.remove(key);
        self.segments.remove(key)
    }

    /// Mark a registered segment for deletion once fully traversed
    pub fn mark_consumable(&mut self, key: SegmentKey) -> Result<(), SimError> {
        if !self.segments.contains_key(&key) {
            return Err(SimError::UnknownSegment(key));
        }
        self.consumable.insert(key);
        Ok(())
    }

    pub fn is_consumable(&self, key: &SegmentKey) -> bool {
        self.consumable.contains(key)
    }

    pub fn consumable_keys(&self) -> impl Iterator<Item = &SegmentKey> {
        self.consumable.iter()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Segments in key order
    pub fn iter(&self) -> impl Iterator<Item = (&SegmentKey, &[Vec2])> {
        self.segments.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Polyline for `key` as traversed, reversed if needed
    pub fn oriented(&self, key: &SegmentKey, reversed: bool) -> Result<Vec<Vec2>, SimError> {
        let points = self.get(key).ok_or(SimError::UnknownSegment(*key))?;
        let mut points = points.to_vec();
        if reversed {
            points.reverse();
        }
        Ok(points)
    }

    /// Flatten route steps into one leg.
    ///
    /// Each step's polyline is oriented, trimmed to its entry/exit fractions of
    /// arc length, and appended; a join point equal to the previous end (within
    /// `epsilon`) is dropped.
    pub fn flatten_route(&self, steps: &[RouteStep], epsilon: f32) -> Result<Vec<Vec2>, SimError> {
        let mut out: Vec<Vec2> = Vec::new();
        for step in steps {
            for f in [step.entry, step.exit] {
                if !(0.0..=1.0).contains(&f) {
                    return Err(SimError::InvalidFraction(f));
                }
            }

            let points = self.oriented(&step.key, step.reversed)?;
            let path = ArcLengthPath::load(&points, epsilon)?;
            let length = path.length();
            let piece = if step.entry <= 0.0 && step.exit >= 1.0 {
                path.points().to_vec()
            } else {
                path.slice(step.entry * length, step.exit * length)
            };

            for p in piece {
                if out.last().is_none_or(|last| last.distance(p) > epsilon) {
                    out.push(p);
                }
            }
        }
        Ok(out)
    }
}
