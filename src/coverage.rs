//! Coverage scoring and the coarse-to-fine AFK point optimizer.
//!
//! Each monument contributes a fixed spawnable box: 58x58 columns in
//! x/z around the center, y in [39, 61]. A block counts toward an AFK
//! point when its distance lies in the spawn annulus [24, 128], both
//! bounds inclusive.
//!
//! Scoring never iterates the 3D box. For each of the 58x58 columns the
//! annulus constraint collapses to an integer |dy| interval, and the
//! number of valid y levels is the length of the outer interval clipped
//! to [39, 61] minus the clipped inner hole. That turns ~77k block
//! visits into ~3.4k column visits per monument and is what makes the
//! coarse-to-fine search affordable.
//!
//! The search itself: score the centroid and the pairwise intersection
//! points of the 128-disks, coarse-scan the feasible rectangle on a
//! step lattice, keep the best N in a bounded min-heap, then refine
//! each survivor with a moving-window descent at shrinking steps. All
//! candidate points must satisfy the hard within-128-of-every-center
//! constraint; the annulus alone would happily drift somewhere that
//! only covers part of the group.

use log::warn;

use crate::config::Config;
use crate::group::AFK_RADIUS;
use crate::types::{AfkSpot, MonumentPos};

const INNER_R2: i64 = 24 * 24;
const OUTER_R2: i64 = 128 * 128;

const MON_Y_MIN: i32 = 39;
const MON_Y_MAX: i32 = 61;

/// Empirically optimal AFK height: the midpoint of the monument y-range.
pub const FIXED_AFK_Y: i32 = 50;

/// Spawnable box of one monument, inclusive block bounds.
#[derive(Debug, Clone, Copy)]
pub struct SpawnBox {
    pub x0: i32,
    pub x1: i32,
    pub z0: i32,
    pub z1: i32,
}

impl SpawnBox {
    pub fn from_center(m: &MonumentPos) -> Self {
        SpawnBox {
            x0: m.center_x - 29,
            x1: m.center_x + 28,
            z0: m.center_z - 29,
            z1: m.center_z + 28,
        }
    }
}

/// Integer floor square root by Newton iteration with explicit
/// correction. Exact for the whole u64 range; no float round-trip.
pub fn isqrt(n: u64) -> u64 {
    if n == 0 {
        return 0;
    }
    let mut x = n;
    let mut y = (x + 1) / 2;
    while y < x {
        x = y;
        y = (x + n / x) / 2;
    }
    while x.checked_mul(x).map_or(true, |sq| sq > n) {
        x -= 1;
    }
    while (x + 1).checked_mul(x + 1).is_some_and(|sq| sq <= n) {
        x += 1;
    }
    x
}

/// Number of y in [39, 61] with min_abs <= |y - center| <= max_abs.
fn count_y_in_annulus(y: i32, min_abs: i32, max_abs: i32) -> u64 {
    if max_abs < 0 || min_abs > max_abs {
        return 0;
    }
    let outer = overlap_len(y - max_abs, y + max_abs, MON_Y_MIN, MON_Y_MAX);
    if outer == 0 || min_abs <= 0 {
        return outer;
    }
    let hole_r = min_abs - 1;
    let hole = overlap_len(y - hole_r, y + hole_r, MON_Y_MIN, MON_Y_MAX);
    outer.saturating_sub(hole)
}

fn overlap_len(a0: i32, a1: i32, b0: i32, b1: i32) -> u64 {
    let lo = a0.max(b0);
    let hi = a1.min(b1);
    if hi >= lo {
        (hi - lo + 1) as u64
    } else {
        0
    }
}

/// Coverage at one candidate point. Per-monument counts are written to
/// `per` (cleared first); the return value is their sum.
pub fn score_at(
    boxes: &[SpawnBox],
    x: i32,
    y: i32,
    z: i32,
    require_outside24: bool,
    per: &mut Vec<u64>,
) -> u64 {
    per.clear();
    let mut total = 0u64;
    for b in boxes {
        let mut count = 0u64;
        for bx in b.x0..=b.x1 {
            let dx2 = {
                let dx = (bx - x) as i64;
                dx * dx
            };
            if dx2 > OUTER_R2 {
                continue;
            }
            for bz in b.z0..=b.z1 {
                let dz = (bz - z) as i64;
                let d2h = dx2 + dz * dz;
                if d2h > OUTER_R2 {
                    continue;
                }

                // |dy| <= floor(sqrt(128^2 - d2h)), and when the inner
                // exclusion applies, |dy| >= ceil(sqrt(24^2 - d2h)).
                let max_abs = isqrt((OUTER_R2 - d2h) as u64) as i32;
                let min_abs = if require_outside24 && d2h < INNER_R2 {
                    let lower = (INNER_R2 - d2h) as u64;
                    let s = isqrt(lower);
                    (if s * s == lower { s } else { s + 1 }) as i32
                } else {
                    0
                };
                count += count_y_in_annulus(y, min_abs, max_abs);
            }
        }
        per.push(count);
        total += count;
    }
    total
}

/// Candidate AFK point retained by the coarse scan. Scores are
/// recomputed during refinement, so only the location and ranking
/// score are kept.
struct Candidate {
    x: i32,
    z: i32,
    score: u64,
}

/// Bounded min-heap keeping the best N candidates by score. Classic
/// array-backed binary heap with score-only comparisons; the final
/// ordering is a stable descending sort of the backing array, so equal
/// scores keep a deterministic order for any given offer sequence.
struct TopN {
    cap: usize,
    heap: Vec<Candidate>,
}

impl TopN {
    fn new(cap: usize) -> Self {
        TopN {
            cap: cap.max(1),
            heap: Vec::with_capacity(cap.max(1)),
        }
    }

    fn offer(&mut self, c: Candidate) {
        if self.heap.len() < self.cap {
            self.heap.push(c);
            self.sift_up(self.heap.len() - 1);
        } else if c.score > self.heap[0].score {
            self.heap[0] = c;
            self.sift_down(0);
        }
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if self.heap[i].score < self.heap[parent].score {
                self.heap.swap(i, parent);
                i = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut i: usize) {
        let n = self.heap.len();
        loop {
            let mut smallest = i;
            for child in [2 * i + 1, 2 * i + 2] {
                if child < n && self.heap[child].score < self.heap[smallest].score {
                    smallest = child;
                }
            }
            if smallest == i {
                return;
            }
            self.heap.swap(i, smallest);
            i = smallest;
        }
    }

    fn into_sorted_desc(self) -> Vec<Candidate> {
        let mut arr = self.heap;
        arr.sort_by(|a, b| b.score.cmp(&a.score));
        arr
    }
}

/// Hard constraint: (x, z) within the AFK radius of every center.
fn within_all_centers(centers: &[MonumentPos], x: i32, z: i32) -> bool {
    let r2 = (AFK_RADIUS as i64) * (AFK_RADIUS as i64);
    centers.iter().all(|c| {
        let dx = (c.center_x - x) as i64;
        let dz = (c.center_z - z) as i64;
        dx * dx + dz * dz <= r2
    })
}

fn floor_to_step(v: i32, step: i32) -> i32 {
    if step <= 1 {
        v
    } else {
        v.div_euclid(step) * step
    }
}

fn round_half_up(v: f64) -> i32 {
    (v + 0.5).floor() as i32
}

/// Pairwise intersection points of the radius-r circles around the
/// centers, rounded to block coordinates. The best AFK point often sits
/// on the boundary of the feasible region, where a step lattice would
/// miss it.
fn circle_intersection_seeds(centers: &[MonumentPos], r: f64, out: &mut Vec<(i32, i32)>) {
    for i in 0..centers.len() {
        for j in i + 1..centers.len() {
            let x0 = centers[i].center_x as f64;
            let z0 = centers[i].center_z as f64;
            let dx = centers[j].center_x as f64 - x0;
            let dz = centers[j].center_z as f64 - z0;
            let d2 = dx * dx + dz * dz;
            if d2 == 0.0 {
                continue;
            }
            let d = d2.sqrt();
            if d > 2.0 * r {
                continue;
            }
            let xm = x0 + dx * 0.5;
            let zm = z0 + dz * 0.5;
            let h2 = r * r - d2 * 0.25;
            if h2 < 0.0 {
                continue;
            }
            let h = h2.sqrt();
            let ux = -dz / d;
            let uz = dx / d;
            out.push((round_half_up(xm + ux * h), round_half_up(zm + uz * h)));
            out.push((round_half_up(xm - ux * h), round_half_up(zm - uz * h)));
        }
    }
}

/// Finds the best AFK point for a canonical monument group.
pub fn optimize_group(monuments: &[MonumentPos], config: &Config) -> AfkSpot {
    assert!(!monuments.is_empty());
    let boxes: Vec<SpawnBox> = monuments.iter().map(SpawnBox::from_center).collect();
    let k = monuments.len();
    let y = FIXED_AFK_Y;
    let outside24 = config.require_outside24;

    // Search space centered on the member average, f32 quotient like
    // the game tools it cross-checks against.
    let sum_x: i64 = monuments.iter().map(|m| m.center_x as i64).sum();
    let sum_z: i64 = monuments.iter().map(|m| m.center_z as i64).sum();
    let ax = (sum_x as f32 / k as f32 + 0.5).floor() as i32;
    let az = (sum_z as f32 / k as f32 + 0.5).floor() as i32;

    let mut per = Vec::with_capacity(k);

    // Feasible rectangle: intersection of the +-128 squares.
    let mut x_min = i32::MIN;
    let mut x_max = i32::MAX;
    let mut z_min = i32::MIN;
    let mut z_max = i32::MAX;
    for m in monuments {
        x_min = x_min.max(m.center_x - AFK_RADIUS);
        x_max = x_max.min(m.center_x + AFK_RADIUS);
        z_min = z_min.max(m.center_z - AFK_RADIUS);
        z_max = z_max.min(m.center_z + AFK_RADIUS);
    }
    if x_min > x_max || z_min > z_max {
        // Enumeration should never let this through; score the centroid
        // so the group still yields a well-defined answer.
        warn!(
            "empty feasible rectangle for a {k}-group anchored at ({ax}, {az}); \
             falling back to the centroid"
        );
        let total = score_at(&boxes, ax, y, az, outside24, &mut per);
        return finished(ax, y, az, total, per, monuments);
    }

    let mut seeds2d = vec![(ax, az)];
    circle_intersection_seeds(monuments, AFK_RADIUS as f64, &mut seeds2d);

    let mut top = TopN::new(config.keep_top);
    for &(px, pz) in &seeds2d {
        if !within_all_centers(monuments, px, pz) {
            continue;
        }
        let total = score_at(&boxes, px, y, pz, outside24, &mut per);
        top.offer(Candidate {
            x: px,
            z: pz,
            score: total,
        });
    }

    let step0 = config.local_step.max(1);
    let mut x = floor_to_step(x_min, step0);
    while x <= x_max {
        let mut z = floor_to_step(z_min, step0);
        while z <= z_max {
            if within_all_centers(monuments, x, z) {
                let total = score_at(&boxes, x, y, z, outside24, &mut per);
                top.offer(Candidate {
                    x,
                    z,
                    score: total,
                });
            }
            z += step0;
        }
        x += step0;
    }

    let seeds = top.into_sorted_desc();
    if seeds.is_empty() {
        let total = score_at(&boxes, ax, y, az, outside24, &mut per);
        return finished(ax, y, az, total, per, monuments);
    }

    // Refine each retained seed; the window recenters on every strict
    // improvement so a seed can walk beyond its initial radius.
    let mut best: Option<(i32, i32, u64, Vec<u64>)> = None;
    for seed in &seeds {
        let mut rx = seed.x;
        let mut rz = seed.z;
        let mut local_best = score_at(&boxes, rx, y, rz, outside24, &mut per);
        let mut local_per = per.clone();

        for &step in &config.refine_steps {
            let r = config.refine_radius;
            let mut x = rx - r;
            while x <= rx + r {
                let mut z = rz - r;
                while z <= rz + r {
                    if within_all_centers(monuments, x, z) {
                        let total = score_at(&boxes, x, y, z, outside24, &mut per);
                        if total > local_best {
                            local_best = total;
                            rx = x;
                            rz = z;
                            local_per = per.clone();
                        }
                    }
                    z += step;
                }
                x += step;
            }
        }

        if best.as_ref().map_or(true, |b| local_best > b.2) {
            best = Some((rx, rz, local_best, local_per));
        }
    }

    let (bx, bz, total, per) = best.expect("seeds is non-empty");
    finished(bx, y, bz, total, per, monuments)
}

fn finished(
    x: i32,
    y: i32,
    z: i32,
    total: u64,
    per: Vec<u64>,
    monuments: &[MonumentPos],
) -> AfkSpot {
    AfkSpot {
        x,
        y,
        z,
        total_covered: total,
        per_monument: per,
        monuments: monuments.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(boxes: &[SpawnBox], x: i32, z: i32, outside24: bool) -> (u64, Vec<u64>) {
        let mut per = Vec::new();
        let total = score_at(boxes, x, FIXED_AFK_Y, z, outside24, &mut per);
        (total, per)
    }

    fn centered_box(cx: i32, cz: i32) -> SpawnBox {
        SpawnBox::from_center(&MonumentPos::new(cx, cz))
    }

    #[test]
    fn isqrt_exact() {
        for (n, e) in [
            (0u64, 0u64),
            (1, 1),
            (2, 1),
            (3, 1),
            (4, 2),
            (15, 3),
            (16, 4),
            (16383, 127),
            (16384, 128),
            (16385, 128),
            (u32::MAX as u64, 65535),
            ((1u64 << 32) + 1, 65536),
            (u64::MAX, u32::MAX as u64),
        ] {
            assert_eq!(isqrt(n), e, "isqrt({n})");
        }
    }

    #[test]
    fn isqrt_matches_squares() {
        for r in 0u64..2000 {
            assert_eq!(isqrt(r * r), r);
            if r > 0 {
                assert_eq!(isqrt(r * r - 1), r - 1);
            }
            assert_eq!(isqrt(r * r + 1), r);
        }
    }

    #[test]
    fn y_annulus_counts() {
        // No hole: every level of [39, 61] within |dy| <= 11.
        assert_eq!(count_y_in_annulus(50, 0, 11), 23);
        // Hole of radius 0 removes nothing.
        assert_eq!(count_y_in_annulus(50, 0, 100), 23);
        // min_abs 1 removes only the center level.
        assert_eq!(count_y_in_annulus(50, 1, 11), 22);
        // Requiring |dy| >= 12 leaves nothing inside [39, 61].
        assert_eq!(count_y_in_annulus(50, 12, 100), 0);
        // Degenerate: only dy = 0.
        assert_eq!(count_y_in_annulus(50, 0, 0), 1);
        // Empty interval.
        assert_eq!(count_y_in_annulus(50, 5, 4), 0);
    }

    #[test]
    fn score_reference_values() {
        // Standing at the center of a single monument box.
        let boxes = [centered_box(0, 0)];
        assert_eq!(score(&boxes, 0, 0, true), (39017, vec![39017]));
        assert_eq!(score(&boxes, 0, 0, false), (77372, vec![77372]));
    }

    #[test]
    fn outer_boundary_inclusive() {
        // Box center 156 blocks east: only the nearest column (bx = 28)
        // reaches d2h = 128^2 exactly, contributing the single dy = 0
        // level.
        let boxes = [centered_box(0, 0)];
        assert_eq!(score(&boxes, 156, 0, true).0, 1);
        assert_eq!(score(&boxes, 157, 0, true).0, 0);
    }

    #[test]
    fn inner_boundary_inclusive() {
        // A column at exactly d2h = 24^2: the dy = 0 block sits on the
        // inner sphere and counts, so the full y-range does.
        let boxes = [SpawnBox {
            x0: 24,
            x1: 24,
            z0: 0,
            z1: 0,
        }];
        assert_eq!(score(&boxes, 0, 0, true).0, 23);
        // One block closer, |dy| >= ceil(sqrt(576 - 529)) = 7 is
        // required, carving a 13-level hole out of the 23.
        let boxes = [SpawnBox {
            x0: 23,
            x1: 23,
            z0: 0,
            z1: 0,
        }];
        assert_eq!(score(&boxes, 0, 0, true).0, 10);
    }

    #[test]
    fn total_equals_per_monument_sum() {
        let boxes = [centered_box(0, 0), centered_box(100, 50)];
        let (total, per) = score(&boxes, 40, 20, true);
        assert_eq!(total, per.iter().sum::<u64>());
        assert_eq!(per.len(), 2);
    }

    #[test]
    fn top_n_keeps_best_and_orders_descending() {
        let mut top = TopN::new(3);
        for (i, s) in [5u64, 9, 1, 7, 9, 3].iter().enumerate() {
            top.offer(Candidate {
                x: i as i32,
                z: 0,
                score: *s,
            });
        }
        let sorted = top.into_sorted_desc();
        assert_eq!(
            sorted.iter().map(|c| c.score).collect::<Vec<_>>(),
            vec![9, 9, 7]
        );
    }

    fn mp(x: i32, z: i32) -> MonumentPos {
        MonumentPos::new(x, z)
    }

    #[test]
    fn optimize_symmetric_pair() {
        let monuments = [mp(0, 0), mp(160, 0)];
        let spot = optimize_group(&monuments, &Config::default());
        assert_eq!((spot.x, spot.y, spot.z), (80, 50, 0));
        assert_eq!(spot.total_covered, 154744);
        assert_eq!(spot.per_monument, vec![77372, 77372]);
    }

    #[test]
    fn optimize_reference_pair() {
        // Both monument boxes can be covered in full from many points;
        // the deterministic search order pins which one is reported.
        let monuments = [mp(-12048, 7552), mp(-12032, 7696)];
        let spot = optimize_group(&monuments, &Config::default());
        assert_eq!((spot.x, spot.y, spot.z), (-12032, 50, 7616));
        assert_eq!(spot.total_covered, 154744);
        assert_eq!(spot.per_monument, vec![77372, 77372]);
    }

    #[test]
    fn optimize_reference_quad() {
        let monuments = [
            mp(-31888, -19088),
            mp(-31888, -18944),
            mp(-31744, -18928),
            mp(-31728, -19056),
        ];
        let spot = optimize_group(&monuments, &Config::default());
        assert_eq!((spot.x, spot.y, spot.z), (-31815, 50, -19009));
        assert_eq!(spot.total_covered, 282308);
        assert_eq!(spot.per_monument, vec![66063, 74509, 67393, 74343]);
        assert_eq!(
            spot.total_covered,
            spot.per_monument.iter().sum::<u64>()
        );
    }

    #[test]
    fn optimize_single_monument() {
        let monuments = [mp(100, 200)];
        let spot = optimize_group(&monuments, &Config::default());
        // The whole box can sit inside the annulus from a point far
        // enough from the center.
        assert_eq!(spot.total_covered, 77372);
        assert!(within_all_centers(&monuments, spot.x, spot.z));
    }

    #[test]
    fn result_within_radius_of_all_members() {
        let monuments = [mp(0, 0), mp(200, 0), mp(100, 150)];
        let spot = optimize_group(&monuments, &Config::default());
        assert!(within_all_centers(&monuments, spot.x, spot.z));
        assert_eq!(
            spot.total_covered,
            spot.per_monument.iter().sum::<u64>()
        );
    }

    #[test]
    fn empty_feasible_rectangle_falls_back_to_centroid() {
        // 300 blocks apart: the +-128 squares do not intersect. The
        // enumerator never emits such a group; the optimizer must still
        // answer with the centroid's score.
        let monuments = [mp(0, 0), mp(300, 0)];
        let spot = optimize_group(&monuments, &Config::default());
        assert_eq!((spot.x, spot.z), (150, 0));
        let mut per = Vec::new();
        let boxes: Vec<SpawnBox> = monuments.iter().map(SpawnBox::from_center).collect();
        let expected = score_at(&boxes, 150, 50, 0, true, &mut per);
        assert_eq!(spot.total_covered, expected);
    }

    #[test]
    fn inner_annulus_flag_changes_close_scores_only() {
        let monuments = [mp(0, 0), mp(160, 0)];
        let mut config = Config::default();
        config.require_outside24 = false;
        let spot = optimize_group(&monuments, &config);
        // The optimum keeps both boxes outside 24 blocks anyway, so the
        // flag must not change the best total here.
        assert_eq!(spot.total_covered, 154744);
    }
}
