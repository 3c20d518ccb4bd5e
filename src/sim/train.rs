//! Per-train simulation: leg following, footprint, and collision-capped advance
//!
//! A train is a head riding an [`ArcLengthPath`] at arc length `s`, followed
//! by carts whose centers sit fixed distances behind the head along the
//! [`BackTape`]. Movement is split into a read-only preview
//! ([`TrainSim::compute_allowed_advance`]) and a commit, so a mirror simulation
//! can ask "how far could I go?" without touching state.

use std::fmt;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::collision::polyline_contact;
use super::error::SimError;
use super::path::{ArcLengthPath, Pose};
use super::tape::BackTape;
use crate::settings::{require_non_negative, require_positive};
use crate::unit_or;

/// World-assigned train identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrainId(pub u32);

impl fmt::Display for TrainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Per-train tuning, all in world meters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    pub cell_size: f32,
    /// Footprint sample spacing; sweeps sub-step at half of this
    pub sample_step: f32,
    pub epsilon: f32,
    /// Extra body length appended behind the tail in footprints
    pub safety_gap: f32,
    /// Capsule contact radius
    pub lateral_tolerance: f32,
    /// Slack when deciding whether the head reached the leg end
    pub end_tolerance: f32,
    pub head_length: f32,
    pub cart_length: f32,
}

impl TrainConfig {
    /// Sampling and epsilon must be positive, lengths and tolerances non-negative
    pub fn validate(&self) -> Result<(), SimError> {
        require_positive("cell_size", self.cell_size)?;
        require_positive("sample_step", self.sample_step)?;
        require_positive("epsilon", self.epsilon)?;
        require_non_negative("safety_gap", self.safety_gap)?;
        require_non_negative("lateral_tolerance", self.lateral_tolerance)?;
        require_non_negative("end_tolerance", self.end_tolerance)?;
        require_non_negative("head_length", self.head_length)?;
        require_non_negative("cart_length", self.cart_length)
    }
}

/// How an advance ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdvanceKind {
    /// Full request granted, leg continues
    None,
    /// Capped by contact with another train
    Blocked,
    /// Head is at (or within tolerance of) the leg end
    ReachedEnd,
}

/// Outcome of a collision-capped advance request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdvanceResult {
    /// Distance the head may move, `0 <= allowed <= requested`
    pub allowed: f32,
    pub kind: AdvanceKind,
    /// Offending train, only when blocked
    pub obstacle: Option<TrainId>,
    /// Approximate contact point, only when blocked
    pub contact: Option<Vec2>,
}

impl AdvanceResult {
    pub fn is_blocked(&self) -> bool {
        self.kind == AdvanceKind::Blocked
    }

    pub fn reached_end(&self) -> bool {
        self.kind == AdvanceKind::ReachedEnd
    }
}

/// Lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrainPhase {
    /// Footprint from the seeded tape, no leg yet
    Spawned,
    /// Leg loaded, head advancing
    Running,
    /// Last advance was capped by another train
    Blocked,
    /// Head reached the end of its leg
    Arrived,
}

/// One train's movement state
#[derive(Debug, Clone)]
pub struct TrainSim {
    id: TrainId,
    config: TrainConfig,
    path: Option<ArcLengthPath>,
    /// Head arc length along `path`
    s: f32,
    head: Pose,
    /// Cart center distances behind the head, strictly increasing
    cart_offsets: Vec<f32>,
    tape: BackTape,
    length_override: Option<f32>,
    phase: TrainPhase,
}

impl TrainSim {
    /// Create a stationary train whose tape is seeded straight behind `head`.
    pub fn spawn(
        id: TrainId,
        config: TrainConfig,
        head: Pose,
        cart_offsets: Vec<f32>,
        seed_length: f32,
        length_override: Option<f32>,
    ) -> Result<Self, SimError> {
        config.validate()?;
        validate_offsets(&cart_offsets)?;

        let head = Pose::new(head.position, unit_or(head.tangent, Vec2::X));
        let mut tape = BackTape::new(config.epsilon);
        tape.seed_straight(head.position, head.tangent, seed_length);

        let mut train = Self {
            id,
            config,
            path: None,
            s: 0.0,
            head,
            cart_offsets,
            tape,
            length_override,
            phase: TrainPhase::Spawned,
        };
        train.guarantee_capacity();
        Ok(train)
    }

    pub fn id(&self) -> TrainId {
        self.id
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    pub fn head(&self) -> Pose {
        self.head
    }

    /// Head arc length along the current leg
    pub fn s(&self) -> f32 {
        self.s
    }

    pub fn path(&self) -> Option<&ArcLengthPath> {
        self.path.as_ref()
    }

    pub fn tape(&self) -> &BackTape {
        &self.tape
    }

    pub fn phase(&self) -> TrainPhase {
        self.phase
    }

    pub fn cart_offsets(&self) -> &[f32] {
        &self.cart_offsets
    }

    /// Leg distance still ahead of the head
    pub fn remaining(&self) -> f32 {
        self.path
            .as_ref()
            .map_or(0.0, |p| (p.length() - self.s).max(0.0))
    }

    #[inline]
    pub fn half_head_length(&self) -> f32 {
        self.config.head_length * 0.5
    }

    /// Distance from head center to the rear of the body
    pub fn tail_behind(&self) -> f32 {
        if let Some(len) = self.length_override {
            return len;
        }
        match self.cart_offsets.last() {
            Some(&last) => last + self.config.cart_length * 0.5,
            None => self.half_head_length(),
        }
    }

    /// Follow a new leg from its first point.
    ///
    /// If the leg starts away from the current head the tape records the jump,
    /// so carts stay attached.
    pub fn load_leg(&mut self, points: &[Vec2]) -> Result<(), SimError> {
        let path = ArcLengthPath::load(points, self.config.epsilon)?;
        let start = path.sample_at(0.0);
        self.tape.append_segment(self.head.position, start.position);
        self.head = start;
        self.s = 0.0;
        log::debug!(
            "train {} loaded leg: {} points, {:.3} m",
            self.id,
            path.points().len(),
            path.length()
        );
        self.path = Some(path);
        self.phase = TrainPhase::Running;
        Ok(())
    }

    pub fn set_cart_offsets(&mut self, offsets: Vec<f32>) -> Result<(), SimError> {
        validate_offsets(&offsets)?;
        self.cart_offsets = offsets;
        self.guarantee_capacity();
        log::debug!("train {} carts now at {:?}", self.id, self.cart_offsets);
        Ok(())
    }

    pub fn set_length_override(&mut self, length: Option<f32>) {
        self.length_override = length;
        self.guarantee_capacity();
    }

    /// Make sure the tape can always reach the tail, and size its retention
    fn guarantee_capacity(&mut self) {
        let needed = self.tail_behind() + self.config.safety_gap;
        self.tape.ensure_prefix(needed);
        let retain = needed + self.config.sample_step * 2.0 + self.config.cell_size;
        self.tape.set_retain(Some(retain));
    }

    /// Cart center poses, `None` where the tape cannot reach yet
    pub fn cart_poses(&self) -> Vec<Option<Pose>> {
        self.cart_offsets
            .iter()
            .map(|&d| self.tape.sample_back_pose(d))
            .collect()
    }

    /// Body polyline of this train as a stationary obstacle.
    ///
    /// Starts at the nose (half a head length ahead of the head center), then
    /// the head center, then tape samples every `sample_step` back to the tail
    /// plus `safety_gap`. `None` when the tape is too short.
    pub fn occupied_back_slice(&self, safety_gap: f32, sample_step: f32) -> Option<Vec<Vec2>> {
        let reach = self.tail_behind() + safety_gap;
        let step = sample_step.max(self.config.epsilon);
        let count = (reach / step).ceil().max(1.0) as usize;

        let mut points = Vec::with_capacity(count + 2);
        points.push(self.head.ahead(self.half_head_length()));
        points.push(self.head.position);
        for i in 1..=count {
            let d = (i as f32 * step).min(reach);
            let p = self.tape.sample_back(d)?;
            if points
                .last()
                .is_none_or(|last| last.distance(p) > self.config.epsilon)
            {
                points.push(p);
            }
        }
        Some(points)
    }

    /// How far the head may move toward `want` before touching `others`.
    ///
    /// Never mutates; repeated calls give identical results. Others with the
    /// same id as `self` and others whose footprint is unavailable are skipped.
    pub fn compute_allowed_advance<'a, I>(&self, want: f32, others: I) -> Result<AdvanceResult, SimError>
    where
        I: IntoIterator<Item = &'a TrainSim>,
    {
        let path = self.path.as_ref().ok_or(SimError::NoLeg(self.id))?;
        let length = path.length();
        let want = want.max(0.0).min(self.remaining());

        // Footprints as of the start of the call
        let obstacles: Vec<(TrainId, Vec<Vec2>)> = others
            .into_iter()
            .filter(|o| o.id != self.id)
            .filter_map(|o| {
                o.occupied_back_slice(o.config.safety_gap, o.config.sample_step)
                    .map(|fp| (o.id, fp))
            })
            .collect();

        let max_step = (self.config.sample_step * 0.5).max(self.config.epsilon);
        let steps = if want > 0.0 {
            (want / max_step).ceil().max(1.0) as usize
        } else {
            0
        };
        let nose = self.s + self.half_head_length();

        let mut advanced = 0.0;
        let mut hit: Option<(TrainId, Vec2)> = None;
        for i in 0..steps {
            let u0 = want * i as f32 / steps as f32;
            let u1 = if i + 1 == steps {
                want
            } else {
                want * (i + 1) as f32 / steps as f32
            };
            let sweep = path.slice(nose + u0, nose + u1);

            let mut first: Option<(f32, TrainId, Vec2)> = None;
            for (id, footprint) in &obstacles {
                let Some(c) = polyline_contact(
                    &sweep,
                    footprint,
                    self.config.lateral_tolerance,
                    self.config.epsilon,
                ) else {
                    continue;
                };
                if first.is_none_or(|(d, _, _)| c.distance < d) {
                    first = Some((c.distance, *id, c.point));
                }
            }

            match first {
                Some((d, id, point)) => {
                    advanced = u0 + d.clamp(0.0, u1 - u0);
                    hit = Some((id, point));
                    break;
                }
                None => advanced = u1,
            }
        }

        let kind = if self.s + advanced >= length - self.config.end_tolerance {
            AdvanceKind::ReachedEnd
        } else if hit.is_some() {
            AdvanceKind::Blocked
        } else {
            AdvanceKind::None
        };
        let (obstacle, contact) = match (kind, hit) {
            (AdvanceKind::Blocked, Some((id, point))) => (Some(id), Some(point)),
            _ => (None, None),
        };

        Ok(AdvanceResult {
            allowed: advanced,
            kind,
            obstacle,
            contact,
        })
    }

    /// Move the head `allowed` meters along the leg and record it on the tape.
    pub fn commit_advance(&mut self, allowed: f32) -> Result<Pose, SimError> {
        let path = self.path.as_ref().ok_or(SimError::NoLeg(self.id))?;
        let previous = self.head.position;
        self.s = (self.s + allowed.max(0.0)).min(path.length());
        self.head = path.sample_at(self.s);
        self.tape.append_segment(previous, self.head.position);
        Ok(self.head)
    }

    /// Update the lifecycle phase from an advance that was just committed
    pub(crate) fn record_outcome(&mut self, result: &AdvanceResult) {
        self.phase = match result.kind {
            AdvanceKind::ReachedEnd => TrainPhase::Arrived,
            AdvanceKind::Blocked => TrainPhase::Blocked,
            AdvanceKind::None => TrainPhase::Running,
        };
    }
}

fn validate_offsets(offsets: &[f32]) -> Result<(), SimError> {
    let finite = offsets.iter().all(|d| d.is_finite() && *d >= 0.0);
    let increasing = offsets.windows(2).all(|w| w[1] > w[0]);
    if finite && increasing {
        Ok(())
    } else {
        Err(SimError::InvalidCartOffsets(offsets.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Settings;
    use proptest::prelude::*;

    fn config() -> TrainConfig {
        Settings::default().train_config(Some(1.0), None)
    }

    fn train_at(id: u32, position: Vec2, forward: Vec2) -> TrainSim {
        TrainSim::spawn(
            TrainId(id),
            config(),
            Pose::new(position, forward),
            Vec::new(),
            2.0,
            None,
        )
        .unwrap()
    }

    fn straight_runner(length: f32) -> TrainSim {
        let mut train = train_at(1, Vec2::ZERO, Vec2::X);
        train
            .load_leg(&[Vec2::ZERO, Vec2::new(length, 0.0)])
            .unwrap();
        train
    }

    #[test]
    fn test_spawned_train_has_footprint() {
        let train = train_at(1, Vec2::new(0.5, 0.0), -Vec2::X);
        assert_eq!(train.phase(), TrainPhase::Spawned);
        let fp = train.occupied_back_slice(0.0, 0.25).unwrap();
        assert!((fp[0] - Vec2::new(0.0, 0.0)).length() < 1e-5);
        assert!((fp[1] - Vec2::new(0.5, 0.0)).length() < 1e-5);
        assert!((fp.last().unwrap() - Vec2::new(1.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_footprint_reaches_last_cart_and_gap() {
        let mut train = train_at(1, Vec2::ZERO, Vec2::X);
        train.set_cart_offsets(vec![1.0, 2.0]).unwrap();
        assert!((train.tail_behind() - 2.5).abs() < 1e-6);

        let fp = train.occupied_back_slice(0.3, 0.25).unwrap();
        assert!((fp.last().unwrap() - Vec2::new(-2.8, 0.0)).length() < 1e-4);

        train.set_length_override(Some(4.0));
        let fp = train.occupied_back_slice(0.0, 0.25).unwrap();
        assert!((fp.last().unwrap() - Vec2::new(-4.0, 0.0)).length() < 1e-4);
    }

    #[test]
    fn test_invalid_cart_offsets_rejected() {
        let mut train = train_at(1, Vec2::ZERO, Vec2::X);
        assert!(matches!(
            train.set_cart_offsets(vec![1.0, 1.0]),
            Err(SimError::InvalidCartOffsets(_))
        ));
        assert!(matches!(
            train.set_cart_offsets(vec![-0.5]),
            Err(SimError::InvalidCartOffsets(_))
        ));
        assert!(matches!(
            train.set_cart_offsets(vec![f32::NAN]),
            Err(SimError::InvalidCartOffsets(_))
        ));
    }

    #[test]
    fn test_zero_sample_step_rejected_at_spawn() {
        let config = TrainConfig {
            sample_step: 0.0,
            ..config()
        };
        let spawned = TrainSim::spawn(
            TrainId(1),
            config,
            Pose::new(Vec2::ZERO, Vec2::X),
            Vec::new(),
            1.0,
            None,
        );
        assert!(matches!(
            spawned,
            Err(SimError::InvalidSettings {
                field: "sample_step",
                ..
            })
        ));
    }

    #[test]
    fn test_advance_without_leg_is_an_error() {
        let train = train_at(7, Vec2::ZERO, Vec2::X);
        let others: [&TrainSim; 0] = [];
        assert!(matches!(
            train.compute_allowed_advance(1.0, others),
            Err(SimError::NoLeg(TrainId(7)))
        ));
    }

    #[test]
    fn test_reaches_end_of_clear_leg() {
        let train = straight_runner(10.0);
        let result = train.compute_allowed_advance(12.0, std::iter::empty()).unwrap();
        assert!((result.allowed - 10.0).abs() < 1e-4);
        assert_eq!(result.kind, AdvanceKind::ReachedEnd);
        assert!(result.obstacle.is_none());
    }

    #[test]
    fn test_blocked_by_stationary_train_ahead() {
        // Stationary train occupies [0, 1], nose at 0, facing -x
        let parked = train_at(1, Vec2::new(0.5, 0.0), -Vec2::X);
        let mut mover = train_at(2, Vec2::new(6.0, 0.0), -Vec2::X);
        mover
            .load_leg(&[Vec2::new(6.0, 0.0), Vec2::new(-10.0, 0.0)])
            .unwrap();

        let result = mover.compute_allowed_advance(10.0, [&parked]).unwrap();
        let cfg = config();
        let expected = 5.0 - cfg.head_length * 0.5 - cfg.lateral_tolerance;
        assert_eq!(result.kind, AdvanceKind::Blocked);
        assert_eq!(result.obstacle, Some(TrainId(1)));
        assert!((result.allowed - expected).abs() < 1e-3, "{result:?}");
        let contact = result.contact.unwrap();
        assert!((contact - Vec2::new(1.0, 0.0)).length() < 1e-3);
    }

    #[test]
    fn test_crossing_train_blocks_at_junction() {
        // Parked across the leg with its nose touching the line at x = 5
        let parked = train_at(1, Vec2::new(5.0, -0.5), Vec2::Y);
        let mut mover = train_at(2, Vec2::ZERO, Vec2::X);
        mover.load_leg(&[Vec2::ZERO, Vec2::new(10.0, 0.0)]).unwrap();

        let result = mover.compute_allowed_advance(10.0, [&parked]).unwrap();
        assert!(result.is_blocked());
        assert_eq!(result.obstacle, Some(TrainId(1)));
        let cfg = config();
        let expected = 5.0 - cfg.head_length * 0.5 - cfg.lateral_tolerance;
        assert!((result.allowed - expected).abs() < 1e-3, "{result:?}");
    }

    #[test]
    fn test_parallel_track_never_blocks() {
        let parked = train_at(1, Vec2::new(5.0, 1.0), Vec2::X);
        let train = straight_runner(10.0);
        let result = train.compute_allowed_advance(10.0, [&parked]).unwrap();
        assert_eq!(result.kind, AdvanceKind::ReachedEnd);
        assert!(result.obstacle.is_none());
    }

    #[test]
    fn test_reached_end_wins_over_cap_at_leg_end() {
        // Contact lands 0.5 mm before a 4.4 m leg ends, inside end tolerance
        let parked = train_at(1, Vec2::new(4.9995, -0.5), Vec2::Y);

        let train = straight_runner(10.0);
        let capped = train.compute_allowed_advance(10.0, [&parked]).unwrap();
        assert!(capped.is_blocked());
        assert!((capped.allowed - 4.3995).abs() < 1e-3, "{capped:?}");

        let train = straight_runner(4.4);
        let result = train.compute_allowed_advance(10.0, [&parked]).unwrap();
        assert_eq!(result.kind, AdvanceKind::ReachedEnd);
        assert!(result.obstacle.is_none());
        assert!(result.contact.is_none());
        assert!((result.allowed - 4.4).abs() < 2e-3, "{result:?}");
    }

    #[test]
    fn test_closest_obstacle_wins() {
        let near = train_at(5, Vec2::new(4.0, -0.5), Vec2::Y);
        let far = train_at(3, Vec2::new(7.0, -0.5), Vec2::Y);
        let train = straight_runner(10.0);
        let result = train.compute_allowed_advance(10.0, [&far, &near]).unwrap();
        assert_eq!(result.obstacle, Some(TrainId(5)));
    }

    #[test]
    fn test_self_is_ignored_in_others() {
        let train = straight_runner(10.0);
        let result = train.compute_allowed_advance(3.0, [&train]).unwrap();
        assert_eq!(result.kind, AdvanceKind::None);
        assert!((result.allowed - 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_commit_extends_tape_and_carts_follow() {
        let mut train = straight_runner(10.0);
        train.set_cart_offsets(vec![1.0]).unwrap();
        let pose = train.commit_advance(4.0).unwrap();
        assert!((pose.position - Vec2::new(4.0, 0.0)).length() < 1e-5);
        assert!((train.s() - 4.0).abs() < 1e-6);

        let carts = train.cart_poses();
        let cart = carts[0].unwrap();
        assert!((cart.position - Vec2::new(3.0, 0.0)).length() < 1e-5);
        assert!((cart.tangent - Vec2::X).length() < 1e-5);
    }

    #[test]
    fn test_commit_clamps_to_leg_end() {
        let mut train = straight_runner(3.0);
        let pose = train.commit_advance(50.0).unwrap();
        assert!((pose.position - Vec2::new(3.0, 0.0)).length() < 1e-5);
        assert_eq!(train.remaining(), 0.0);
    }

    #[test]
    fn test_load_leg_away_from_head_keeps_tape_continuous() {
        let mut train = straight_runner(2.0);
        train.commit_advance(2.0).unwrap();
        train
            .load_leg(&[Vec2::new(2.0, 1.0), Vec2::new(2.0, 5.0)])
            .unwrap();
        assert_eq!(train.phase(), TrainPhase::Running);
        assert_eq!(train.s(), 0.0);
        let back = train.tape().sample_back(1.0).unwrap();
        assert!((back - Vec2::new(2.0, 0.0)).length() < 1e-5);
    }

    proptest! {
        #[test]
        fn prop_split_commits_match_single_commit(
            length in 1.0f32..40.0,
            bend in -5.0f32..5.0,
            f1 in 0.0f32..=1.0,
            f2 in 0.0f32..=1.0,
        ) {
            let leg = [Vec2::ZERO, Vec2::new(length * 0.5, bend), Vec2::new(length, 0.0)];
            let mut split = train_at(1, Vec2::ZERO, Vec2::X);
            split.load_leg(&leg).unwrap();
            let mut whole = split.clone();

            let total = split.path().unwrap().length();
            let w1 = total * f1 * 0.5;
            let w2 = total * f2 * 0.5;

            split.commit_advance(w1).unwrap();
            let a = split.commit_advance(w2).unwrap();
            let b = whole.commit_advance(w1 + w2).unwrap();
            prop_assert!((a.position - b.position).length() < 1e-3);
            prop_assert!((a.tangent - b.tangent).length() < 1e-3);
        }

        #[test]
        fn prop_allowed_never_exceeds_request_or_leg(
            length in 0.5f32..30.0,
            start in 0.0f32..=1.0,
            want in 0.0f32..50.0,
            obstacle_x in -5.0f32..35.0,
        ) {
            let mut train = straight_runner(length);
            train.commit_advance(length * start).unwrap();
            let parked = train_at(9, Vec2::new(obstacle_x, -0.5), Vec2::Y);

            let result = train.compute_allowed_advance(want, [&parked]).unwrap();
            prop_assert!(result.allowed >= 0.0);
            prop_assert!(result.allowed <= want.min(train.remaining()) + 1e-5);
        }

        #[test]
        fn prop_laterally_clear_train_never_blocks(
            lateral in 0.12f32..5.0,
            above in any::<bool>(),
            x in -5.0f32..15.0,
            facing_east in any::<bool>(),
        ) {
            let y = if above { lateral } else { -lateral };
            let forward = if facing_east { Vec2::X } else { -Vec2::X };
            let parked = train_at(9, Vec2::new(x, y), forward);
            let train = straight_runner(10.0);

            let result = train.compute_allowed_advance(10.0, [&parked]).unwrap();
            prop_assert!(!result.is_blocked(), "{:?}", result);
            prop_assert!(result.obstacle.is_none());
            prop_assert!((result.allowed - 10.0).abs() < 1e-4);
        }

        #[test]
        fn prop_preview_is_idempotent(
            want in 0.0f32..20.0,
            obstacle_x in 0.0f32..20.0,
        ) {
            let train = straight_runner(15.0);
            let parked = train_at(9, Vec2::new(obstacle_x, -0.5), Vec2::Y);
            let first = train.compute_allowed_advance(want, [&parked]).unwrap();
            let second = train.compute_allowed_advance(want, [&parked]).unwrap();
            prop_assert_eq!(first, second);
        }
    }
}
