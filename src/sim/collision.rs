//! Segment and polyline contact tests
//!
//! The tricky part of the rail sim: a moving nose sweep is tested against
//! another train's body polyline, and we need the *first* point along the sweep
//! where they touch, not just a yes/no answer.
//!
//! Each segment pair is checked in three tiers:
//! 1. exact crossing (parametric line intersection)
//! 2. colinear overlap (parallel and on the same line)
//! 3. capsule proximity (closest approach within a lateral tolerance)

use glam::Vec2;

use crate::consts::CONTACT_BISECT_ITERS;

/// Which tier detected a contact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactKind {
    Crossing,
    Colinear,
    Proximity,
}

/// Contact on a single moving segment
#[derive(Debug, Clone, Copy)]
pub struct SegmentContact {
    /// Parameter along the moving segment, 0 at its start
    pub t: f32,
    /// Approximate contact point
    pub point: Vec2,
    pub kind: ContactKind,
}

/// Contact along a moving polyline
#[derive(Debug, Clone, Copy)]
pub struct PolylineContact {
    /// Arc length along the moving polyline to the contact
    pub distance: f32,
    pub point: Vec2,
    pub kind: ContactKind,
}

/// Closest points between segments `p1-q1` and `p2-q2`.
///
/// Returns `(s, t, c1, c2)` with `c1 = p1 + (q1 - p1) * s` and
/// `c2 = p2 + (q2 - p2) * t`. Degenerate segments are treated as points.
pub fn closest_points_on_segments(p1: Vec2, q1: Vec2, p2: Vec2, q2: Vec2) -> (f32, f32, Vec2, Vec2) {
    const DEGENERATE: f32 = 1e-12;

    let d1 = q1 - p1;
    let d2 = q2 - p2;
    let r = p1 - p2;
    let a = d1.dot(d1);
    let e = d2.dot(d2);
    let f = d2.dot(r);

    if a <= DEGENERATE && e <= DEGENERATE {
        return (0.0, 0.0, p1, p2);
    }

    let (s, t) = if a <= DEGENERATE {
        (0.0, (f / e).clamp(0.0, 1.0))
    } else {
        let c = d1.dot(r);
        if e <= DEGENERATE {
            ((-c / a).clamp(0.0, 1.0), 0.0)
        } else {
            let b = d1.dot(d2);
            let denom = a * e - b * b;
            // Parallel segments: pick an arbitrary s, the clamp below fixes it up
            let mut s = if denom > DEGENERATE {
                ((b * f - c * e) / denom).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let mut t = (b * s + f) / e;
            if t < 0.0 {
                t = 0.0;
                s = (-c / a).clamp(0.0, 1.0);
            } else if t > 1.0 {
                t = 1.0;
                s = ((b - c) / a).clamp(0.0, 1.0);
            }
            (s, t)
        }
    };

    (s, t, p1 + d1 * s, p2 + d2 * t)
}

/// Closest point on segment `a-b` to `p`
pub fn closest_point_on_segment(p: Vec2, a: Vec2, b: Vec2) -> Vec2 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq <= f32::EPSILON * f32::EPSILON {
        return a;
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    a + ab * t
}

/// Distance from `p` to segment `a-b`
#[inline]
pub fn point_segment_distance(p: Vec2, a: Vec2, b: Vec2) -> f32 {
    p.distance(closest_point_on_segment(p, a, b))
}

/// Tier 1: proper crossing of `a0-a1` and `b0-b1`
pub fn segment_crossing(a0: Vec2, a1: Vec2, b0: Vec2, b1: Vec2, epsilon: f32) -> Option<SegmentContact> {
    let r = a1 - a0;
    let s = b1 - b0;
    let denom = r.perp_dot(s);
    let scale = r.length() * s.length();
    if denom.abs() <= epsilon * scale || scale == 0.0 {
        return None;
    }

    let qp = b0 - a0;
    let t = qp.perp_dot(s) / denom;
    let u = qp.perp_dot(r) / denom;
    if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u) {
        Some(SegmentContact {
            t,
            point: a0 + r * t,
            kind: ContactKind::Crossing,
        })
    } else {
        None
    }
}

/// Tier 2: both segments lie on one line and share a stretch of it.
///
/// The contact parameter is where the overlap begins along `a0-a1`; the
/// reported point is the overlap midpoint.
pub fn colinear_overlap(a0: Vec2, a1: Vec2, b0: Vec2, b1: Vec2, epsilon: f32) -> Option<SegmentContact> {
    let r = a1 - a0;
    let rr = r.length_squared();
    if rr <= epsilon * epsilon {
        return None;
    }
    let r_len = rr.sqrt();

    let off_line = |p: Vec2| (p - a0).perp_dot(r).abs() / r_len > epsilon;
    if off_line(b0) || off_line(b1) {
        return None;
    }

    let t0 = (b0 - a0).dot(r) / rr;
    let t1 = (b1 - a0).dot(r) / rr;
    let lo = t0.min(t1).max(0.0);
    let hi = t0.max(t1).min(1.0);
    if lo > hi + epsilon / r_len {
        return None;
    }
    let hi = hi.max(lo);

    Some(SegmentContact {
        t: lo,
        point: a0 + r * ((lo + hi) * 0.5),
        kind: ContactKind::Colinear,
    })
}

/// Tier 3: `a0-a1` comes within `tolerance` of `b0-b1`.
///
/// Distance from a point moving along a segment to another segment is convex,
/// so the first parameter inside the capsule is found by bisecting between the
/// start and the closest approach.
pub fn capsule_contact(a0: Vec2, a1: Vec2, b0: Vec2, b1: Vec2, tolerance: f32) -> Option<SegmentContact> {
    let (closest_t, _, ca, cb) = closest_points_on_segments(a0, a1, b0, b1);
    if ca.distance(cb) > tolerance {
        return None;
    }

    let r = a1 - a0;
    let dist_at = |t: f32| point_segment_distance(a0 + r * t, b0, b1);

    let t = if dist_at(0.0) <= tolerance {
        0.0
    } else {
        let mut outside = 0.0;
        let mut inside = closest_t;
        for _ in 0..CONTACT_BISECT_ITERS {
            let mid = (outside + inside) * 0.5;
            if dist_at(mid) <= tolerance {
                inside = mid;
            } else {
                outside = mid;
            }
        }
        inside
    };

    let at = a0 + r * t;
    Some(SegmentContact {
        t,
        point: closest_point_on_segment(at, b0, b1),
        kind: ContactKind::Proximity,
    })
}

/// Earliest contact of moving segment `a0-a1` with obstacle segment `b0-b1`.
///
/// Ties between tiers go to the more exact tier.
pub fn segment_contact(
    a0: Vec2,
    a1: Vec2,
    b0: Vec2,
    b1: Vec2,
    tolerance: f32,
    epsilon: f32,
) -> Option<SegmentContact> {
    let tiers = [
        segment_crossing(a0, a1, b0, b1, epsilon),
        colinear_overlap(a0, a1, b0, b1, epsilon),
        capsule_contact(a0, a1, b0, b1, tolerance),
    ];

    let mut best: Option<SegmentContact> = None;
    for contact in tiers.into_iter().flatten() {
        if best.is_none_or(|b| contact.t < b.t) {
            best = Some(contact);
        }
    }
    best
}

/// First contact walking along `moving` against any segment of `obstacle`.
///
/// A single-point obstacle is treated as a zero-length segment.
pub fn polyline_contact(
    moving: &[Vec2],
    obstacle: &[Vec2],
    tolerance: f32,
    epsilon: f32,
) -> Option<PolylineContact> {
    let obstacle_segments: Vec<(Vec2, Vec2)> = match obstacle {
        [] => return None,
        [p] => vec![(*p, *p)],
        _ => obstacle.windows(2).map(|w| (w[0], w[1])).collect(),
    };

    let mut travelled = 0.0;
    for w in moving.windows(2) {
        let (a0, a1) = (w[0], w[1]);
        let seg_len = a0.distance(a1);

        let mut best: Option<SegmentContact> = None;
        for &(b0, b1) in &obstacle_segments {
            if let Some(c) = segment_contact(a0, a1, b0, b1, tolerance, epsilon) {
                if best.is_none_or(|b| c.t < b.t) {
                    best = Some(c);
                }
            }
        }

        if let Some(c) = best {
            return Some(PolylineContact {
                distance: travelled + c.t * seg_len,
                point: c.point,
                kind: c.kind,
            });
        }
        travelled += seg_len;
    }

    None
}
