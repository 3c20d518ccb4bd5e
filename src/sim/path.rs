//! Arc-length parameterized polyline
//!
//! A leg is an ordered point sequence. Positions along it are addressed by
//! arc length `s` measured from the first point, backed by a cumulative-length
//! table built once at load time.

use std::cell::Cell;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::error::SimError;

/// Position plus unit direction of travel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec2,
    pub tangent: Vec2,
}

impl Pose {
    pub fn new(position: Vec2, tangent: Vec2) -> Self {
        Self { position, tangent }
    }

    /// Point `distance` ahead along the tangent
    #[inline]
    pub fn ahead(&self, distance: f32) -> Vec2 {
        self.position + self.tangent * distance
    }
}

/// A polyline re-parameterized by arc length
#[derive(Debug, Clone)]
pub struct ArcLengthPath {
    points: Vec<Vec2>,
    /// `cumulative[i]` is the arc length at `points[i]`
    cumulative: Vec<f32>,
    /// Segment index of the last sample; sampling mostly moves forward
    cursor: Cell<usize>,
}

impl ArcLengthPath {
    /// Build a path from at least two points.
    ///
    /// Consecutive points closer than `epsilon` are pushed apart along the
    /// previous segment direction instead of being rejected, so upstream
    /// geometry glitches never produce a zero-length segment.
    pub fn load(points: &[Vec2], epsilon: f32) -> Result<Self, SimError> {
        if points.len() < 2 {
            return Err(SimError::TooFewPoints(points.len()));
        }

        let nudge = epsilon.max(1e-6) * 2.0;
        let mut repaired: Vec<Vec2> = Vec::with_capacity(points.len());
        let mut last_dir = Vec2::X;
        for (i, &p) in points.iter().enumerate() {
            let Some(&prev) = repaired.last() else {
                repaired.push(p);
                continue;
            };
            let delta = p - prev;
            let len = delta.length();
            if len <= epsilon {
                log::debug!("nudging coincident leg point {i} at {p}");
                repaired.push(prev + last_dir * nudge);
            } else {
                last_dir = delta / len;
                repaired.push(p);
            }
        }

        let mut cumulative = Vec::with_capacity(repaired.len());
        let mut total = 0.0;
        cumulative.push(0.0);
        for w in repaired.windows(2) {
            total += w[0].distance(w[1]);
            cumulative.push(total);
        }

        Ok(Self {
            points: repaired,
            cumulative,
            cursor: Cell::new(0),
        })
    }

    /// Total arc length
    #[inline]
    pub fn length(&self) -> f32 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    pub fn points(&self) -> &[Vec2] {
        &self.points
    }

    pub fn segment_count(&self) -> usize {
        self.points.len() - 1
    }

    pub fn start(&self) -> Vec2 {
        self.points[0]
    }

    pub fn end(&self) -> Vec2 {
        self.points[self.points.len() - 1]
    }

    /// Position and tangent at arc length `s`, clamped to the path
    pub fn sample_at(&self, s: f32) -> Pose {
        let s = s.clamp(0.0, self.length());
        let i = self.segment_index(s);
        let a = self.points[i];
        let b = self.points[i + 1];
        let seg_len = self.cumulative[i + 1] - self.cumulative[i];
        let t = ((s - self.cumulative[i]) / seg_len).clamp(0.0, 1.0);
        Pose {
            position: a.lerp(b, t),
            tangent: (b - a) / seg_len,
        }
    }

    /// Like [`Self::sample_at`] but continues straight past either end
    pub fn point_at_extended(&self, s: f32) -> Vec2 {
        if s < 0.0 {
            let first = self.sample_at(0.0);
            first.ahead(s)
        } else if s > self.length() {
            let last = self.sample_at(self.length());
            last.ahead(s - self.length())
        } else {
            self.sample_at(s).position
        }
    }

    /// Polyline covering arc lengths `s0..=s1`, interior vertices included.
    ///
    /// Ends outside the path extrapolate along the first/last segment.
    pub fn slice(&self, s0: f32, s1: f32) -> Vec<Vec2> {
        let (s0, s1) = if s0 <= s1 { (s0, s1) } else { (s1, s0) };
        let lo = self.cumulative.partition_point(|&c| c <= s0);
        let hi = self.cumulative.partition_point(|&c| c < s1);

        let mut out = Vec::with_capacity(hi.saturating_sub(lo) + 2);
        out.push(self.point_at_extended(s0));
        if lo < hi {
            out.extend_from_slice(&self.points[lo..hi]);
        }
        out.push(self.point_at_extended(s1));
        out
    }

    /// Cursor walk: rewinds only when asked for an earlier segment
    fn segment_index(&self, s: f32) -> usize {
        let last = self.points.len() - 2;
        let mut i = self.cursor.get().min(last);
        if i > 0 && s <= self.cumulative[i] {
            i = 0;
        }
        while i < last && s > self.cumulative[i + 1] {
            i += 1;
        }
        self.cursor.set(i);
        i
    }
}
