//! Rolling history of a train head's trajectory
//!
//! Carts and the stationary footprint are placed by asking "where was the head
//! `d` meters ago?". Recorded points answer that exactly; a synthetic straight
//! prefix behind the oldest point answers it for trains that have not moved far
//! enough yet.

use glam::Vec2;

use super::path::Pose;
use crate::unit_or;

/// Head trajectory, oldest point first
#[derive(Debug, Clone)]
pub struct BackTape {
    points: Vec<Vec2>,
    /// `cumulative[i]` is the recorded length from `points[0]` to `points[i]`
    cumulative: Vec<f32>,
    /// Direction pointing away from the head, continuing past `points[0]`
    prefix_dir: Vec2,
    prefix_len: f32,
    /// Largest back-distance ever promised through `ensure_prefix`
    guaranteed: f32,
    /// Recorded history to keep when trimming; `None` keeps everything
    retain: Option<f32>,
    epsilon: f32,
}

impl BackTape {
    pub fn new(epsilon: f32) -> Self {
        Self {
            points: Vec::new(),
            cumulative: Vec::new(),
            prefix_dir: -Vec2::X,
            prefix_len: 0.0,
            guaranteed: 0.0,
            retain: None,
            epsilon,
        }
    }

    /// Reset to a single head point with a straight prefix of `length`
    /// trailing opposite `forward`.
    pub fn seed_straight(&mut self, head: Vec2, forward: Vec2, length: f32) {
        self.points.clear();
        self.cumulative.clear();
        self.points.push(head);
        self.cumulative.push(0.0);
        self.prefix_dir = -unit_or(forward, Vec2::X);
        self.prefix_len = length.max(0.0);
        self.guaranteed = self.guaranteed.max(self.prefix_len);
    }

    /// Newest recorded point
    pub fn head(&self) -> Option<Vec2> {
        self.points.last().copied()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Length of real recorded history
    #[inline]
    pub fn recorded_length(&self) -> f32 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    pub fn prefix_length(&self) -> f32 {
        self.prefix_len
    }

    /// Furthest back-distance `sample_back` can answer
    #[inline]
    pub fn available_length(&self) -> f32 {
        self.recorded_length() + self.prefix_len
    }

    /// Grow the prefix until at least `min_length` is samplable. Never shrinks.
    pub fn ensure_prefix(&mut self, min_length: f32) {
        let needed = min_length - self.recorded_length();
        if needed > self.prefix_len {
            self.prefix_len = needed;
        }
        self.guaranteed = self.guaranteed.max(min_length);
    }

    /// Keep at least `length` of recorded history when trimming
    pub fn set_retain(&mut self, length: Option<f32>) {
        self.retain = length;
    }

    /// Record the head moving from `a` to `b`.
    pub fn append_segment(&mut self, a: Vec2, b: Vec2) {
        match self.points.last() {
            None => self.push_point(a),
            Some(&last) if last.distance(a) > self.epsilon => self.push_point(a),
            _ => {}
        }
        if let Some(&last) = self.points.last() {
            if last.distance(b) > self.epsilon {
                self.push_point(b);
            }
        }
        self.trim();
    }

    fn push_point(&mut self, p: Vec2) {
        let total = match self.points.last() {
            Some(&last) => self.recorded_length() + last.distance(p),
            None => 0.0,
        };
        self.points.push(p);
        self.cumulative.push(total);
    }

    /// Head position `d` meters back along the trajectory
    pub fn sample_back(&self, d: f32) -> Option<Vec2> {
        self.sample_back_pose(d).map(|pose| pose.position)
    }

    /// Position `d` meters back, with the direction of travel at that spot
    pub fn sample_back_pose(&self, d: f32) -> Option<Pose> {
        let head = self.head()?;
        let d = d.max(0.0);
        let recorded = self.recorded_length();
        let forward_in_prefix = -self.prefix_dir;

        if d <= recorded && self.points.len() >= 2 {
            let target = recorded - d;
            // First index whose cumulative length exceeds target
            let hi = self
                .cumulative
                .partition_point(|&c| c <= target)
                .clamp(1, self.points.len() - 1);
            let lo = hi - 1;
            let a = self.points[lo];
            let b = self.points[hi];
            let seg_len = self.cumulative[hi] - self.cumulative[lo];
            let t = ((target - self.cumulative[lo]) / seg_len).clamp(0.0, 1.0);
            return Some(Pose::new(a.lerp(b, t), (b - a) / seg_len));
        }

        if d <= recorded + self.prefix_len + self.epsilon {
            let oldest = if self.points.len() >= 2 {
                self.points[0]
            } else {
                head
            };
            let past = (d - recorded).max(0.0);
            return Some(Pose::new(oldest + self.prefix_dir * past, forward_in_prefix));
        }

        None
    }

    /// Drop history older than the retention window.
    ///
    /// Runs only once twice the window is recorded so the cost is amortized.
    fn trim(&mut self) {
        let Some(retain) = self.retain.filter(|r| *r > 0.0) else {
            return;
        };
        let recorded = self.recorded_length();
        if recorded <= retain * 2.0 + self.epsilon || self.points.len() < 3 {
            return;
        }

        // Last index that still leaves at least `retain` in front of it,
        // never fewer than two points
        let cut = self
            .cumulative
            .partition_point(|&c| recorded - c >= retain)
            .saturating_sub(1)
            .min(self.points.len() - 2);
        if cut == 0 {
            return;
        }

        self.points.drain(..cut);
        self.cumulative.drain(..cut);
        let base = self.cumulative[0];
        for c in &mut self.cumulative {
            *c -= base;
        }

        self.prefix_dir = unit_or(self.points[0] - self.points[1], self.prefix_dir);
        self.prefix_len = (self.guaranteed - self.recorded_length()).max(0.0);
        log::debug!(
            "tape trimmed {cut} points, {:.3} m recorded",
            self.recorded_length()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn straight_tape() -> BackTape {
        let mut tape = BackTape::new(1e-4);
        tape.seed_straight(Vec2::ZERO, Vec2::X, 2.0);
        for i in 0..10 {
            let a = Vec2::new(i as f32, 0.0);
            tape.append_segment(a, a + Vec2::X);
        }
        tape
    }

    #[test]
    fn test_seed_gives_footprint_without_motion() {
        let mut tape = BackTape::new(1e-4);
        tape.seed_straight(Vec2::new(3.0, 1.0), Vec2::Y, 2.0);
        assert_eq!(tape.recorded_length(), 0.0);
        assert_eq!(tape.available_length(), 2.0);

        let p = tape.sample_back(1.5).unwrap();
        assert!((p - Vec2::new(3.0, -0.5)).length() < 1e-6);
        assert!(tape.sample_back(2.5).is_none());
    }

    #[test]
    fn test_append_ignores_near_duplicates() {
        let mut tape = BackTape::new(1e-3);
        tape.append_segment(Vec2::ZERO, Vec2::X);
        tape.append_segment(Vec2::X, Vec2::new(1.0005, 0.0));
        assert_eq!(tape.len(), 2);
        assert!((tape.recorded_length() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_sample_back_interpolates_recorded_history() {
        let mut tape = BackTape::new(1e-4);
        tape.seed_straight(Vec2::ZERO, Vec2::X, 0.0);
        tape.append_segment(Vec2::ZERO, Vec2::new(2.0, 0.0));
        tape.append_segment(Vec2::new(2.0, 0.0), Vec2::new(2.0, 2.0));

        let p = tape.sample_back_pose(1.0).unwrap();
        assert!((p.position - Vec2::new(2.0, 1.0)).length() < 1e-6);
        assert!((p.tangent - Vec2::Y).length() < 1e-6);

        let p = tape.sample_back_pose(3.0).unwrap();
        assert!((p.position - Vec2::new(1.0, 0.0)).length() < 1e-6);
        assert!((p.tangent - Vec2::X).length() < 1e-6);

        assert!(tape.sample_back(4.5).is_none());
    }

    #[test]
    fn test_prefix_continues_beyond_recorded_history() {
        let tape = straight_tape();
        assert!((tape.recorded_length() - 10.0).abs() < 1e-5);
        let p = tape.sample_back(11.5).unwrap();
        assert!((p - Vec2::new(-1.5, 0.0)).length() < 1e-5);
        assert!(tape.sample_back(12.5).is_none());
    }

    #[test]
    fn test_ensure_prefix_never_shrinks() {
        let mut tape = BackTape::new(1e-4);
        tape.seed_straight(Vec2::ZERO, Vec2::X, 3.0);
        tape.ensure_prefix(1.0);
        assert_eq!(tape.available_length(), 3.0);
        tape.ensure_prefix(5.0);
        assert_eq!(tape.available_length(), 5.0);
        assert!(tape.sample_back(5.0).is_some());
    }

    #[test]
    fn test_trim_keeps_retention_window() {
        let mut tape = BackTape::new(1e-4);
        tape.seed_straight(Vec2::ZERO, Vec2::X, 1.0);
        tape.set_retain(Some(3.0));
        for i in 0..50 {
            let a = Vec2::new(i as f32 * 0.5, 0.0);
            tape.append_segment(a, a + Vec2::new(0.5, 0.0));
        }
        assert!(tape.recorded_length() >= 3.0);
        assert!(tape.recorded_length() <= 6.0 + 0.5);
        assert!(tape.len() < 20);

        let p = tape.sample_back(2.75).unwrap();
        assert!((p - Vec2::new(22.25, 0.0)).length() < 1e-4);
        // Guarantee from the seed survives trimming
        assert!(tape.available_length() >= 1.0);
    }

    #[test]
    fn test_degenerate_retain_keeps_a_segment() {
        for retain in [0.0, -1.0, f32::NAN, 1e-6] {
            let mut tape = BackTape::new(1e-4);
            tape.seed_straight(Vec2::ZERO, Vec2::X, 0.5);
            tape.set_retain(Some(retain));
            for i in 0..20 {
                let a = Vec2::new(i as f32, 0.0);
                tape.append_segment(a, a + Vec2::X);
            }
            assert!(tape.len() >= 2, "retain {retain}");
            assert_eq!(tape.head(), Some(Vec2::new(20.0, 0.0)));
            let p = tape.sample_back(0.0).unwrap();
            assert!((p - Vec2::new(20.0, 0.0)).length() < 1e-5);
            assert!(tape.sample_back(0.5).is_some());
        }
    }

    proptest! {
        #[test]
        fn prop_seeded_samples_lie_on_seed_line(
            hx in -50.0f32..50.0,
            hy in -50.0f32..50.0,
            angle in 0.0f32..std::f32::consts::TAU,
            len in 0.1f32..20.0,
            frac in 0.0f32..=1.0,
        ) {
            let head = Vec2::new(hx, hy);
            let forward = Vec2::new(angle.cos(), angle.sin());
            let mut tape = BackTape::new(1e-4);
            tape.seed_straight(head, forward, len);

            let d = len * frac;
            let p = tape.sample_back(d).unwrap();
            let expected = head - forward * d;
            prop_assert!((p - expected).length() < 1e-3);
            // Perpendicular offset from the seeded line is zero
            prop_assert!((p - head).perp_dot(forward).abs() < 1e-3);
        }
    }
}
