//! Regional ocean monument placement for 1.18+ worlds.
//!
//! Monuments are placed one per 32x32-chunk region. Each region mixes
//! its coordinates and the world seed into a region seed, then draws the
//! start chunk with two triangular draws so candidates cluster away from
//! region edges. The constants match the game's RegionalStructureProducer
//! parameters for monuments: spacing 32, separation 5, salt 10387313.

use crate::rng::JavaRandom;

pub const SPACING: i32 = 32;
pub const SEPARATION: i32 = 5;
pub const SALT: i64 = 10387313;

const REGION_MIX_X: i64 = 341873128712;
const REGION_MIX_Z: i64 = 132897987541;

/// Region seed for (rx, rz). Wrapping 64-bit arithmetic, matching the
/// game's overflow behavior for extreme seeds.
pub fn region_seed(world_seed: i64, region_x: i32, region_z: i32) -> i64 {
    (region_x as i64)
        .wrapping_mul(REGION_MIX_X)
        .wrapping_add((region_z as i64).wrapping_mul(REGION_MIX_Z))
        .wrapping_add(world_seed)
        .wrapping_add(SALT)
}

fn struct_coord_in_region(rand: &mut JavaRandom, region_coord: i32) -> i32 {
    let base = region_coord * SPACING;
    let bound = SPACING - SEPARATION;
    // Two-draw average: triangular distribution over [0, 26].
    base + (rand.next_int(bound) + rand.next_int(bound)) / 2
}

/// The candidate start chunk for a region. X is drawn before Z; the
/// result may fall outside the caller's chunk bounds and is filtered
/// downstream.
pub fn possible_location(world_seed: i64, region_x: i32, region_z: i32) -> (i32, i32) {
    let mut rand = JavaRandom::new(region_seed(world_seed, region_x, region_z));
    let chunk_x = struct_coord_in_region(&mut rand, region_x);
    let chunk_z = struct_coord_in_region(&mut rand, region_z);
    (chunk_x, chunk_z)
}

/// Shifts negative chunk coordinates by (spacing - 1) before the floor
/// division that derives region scan bounds. 1.18+ uses the fixed branch
/// of the negative coordinate math.
pub fn modified_coord(coordinate: i32) -> i32 {
    if coordinate < 0 {
        coordinate - SPACING + 1
    } else {
        coordinate
    }
}

/// Region scan bound for a chunk bound. Widens on the negative side,
/// which only adds regions whose candidates get bounds-filtered.
pub fn scan_region_bound(chunk: i32) -> i32 {
    modified_coord(chunk).div_euclid(SPACING)
}

/// The region that contains a chunk. Used for neighborhood keys after
/// validation, where exact containment matters.
pub fn containing_region(chunk: i32) -> i32 {
    chunk.div_euclid(SPACING)
}

/// Monument center block coordinate for a start chunk. The offset is 0
/// for the 16-aligned convention, 8 for center-of-chunk.
pub fn chunk_to_block(chunk: i32, center_offset: i32) -> i32 {
    chunk * 16 + center_offset
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_seed_reference() {
        assert_eq!(region_seed(-141, 0, 0), 10387172);
        assert_eq!(region_seed(0, -1, -1), -474760728940);
        assert_eq!(
            region_seed(2595230174950416391, 100, -200),
            2595237782676166704
        );
    }

    #[test]
    fn possible_location_reference() {
        assert_eq!(possible_location(-141, 0, 0), (18, 9));
        assert_eq!(possible_location(-141, -24, 14), (-753, 472));
        assert_eq!(possible_location(-141, -24, 15), (-752, 481));
        assert_eq!(possible_location(0, 0, 0), (21, 18));
        assert_eq!(possible_location(0, -1, -1), (-30, -20));
        assert_eq!(possible_location(123456789, 5, -7), (173, -216));
        assert_eq!(
            possible_location(2595230174950416391, 100, -200),
            (3211, -6390)
        );
    }

    #[test]
    fn candidates_stay_inside_their_region() {
        for seed in [-141, 0, 987654321] {
            for rx in -3..=3 {
                for rz in -3..=3 {
                    let (cx, cz) = possible_location(seed, rx, rz);
                    assert!(cx >= rx * SPACING && cx <= rx * SPACING + 26);
                    assert!(cz >= rz * SPACING && cz <= rz * SPACING + 26);
                }
            }
        }
    }

    #[test]
    fn modified_coord_shifts_negatives_only() {
        assert_eq!(modified_coord(0), 0);
        assert_eq!(modified_coord(31), 31);
        assert_eq!(modified_coord(-1), -32);
        assert_eq!(modified_coord(-32), -63);
    }

    #[test]
    fn containing_region_floor_division() {
        assert_eq!(containing_region(0), 0);
        assert_eq!(containing_region(31), 0);
        assert_eq!(containing_region(32), 1);
        assert_eq!(containing_region(-1), -1);
        assert_eq!(containing_region(-32), -1);
        assert_eq!(containing_region(-33), -2);
    }

    #[test]
    fn scan_bound_widens_negative_side() {
        // The scan bound may be one region lower than containment for
        // negative chunks; never higher.
        for chunk in -200..200 {
            let scan = scan_region_bound(chunk);
            let contain = containing_region(chunk);
            assert!(scan <= contain && scan >= contain - 1);
        }
    }

    #[test]
    fn center_offset_conventions() {
        assert_eq!(chunk_to_block(-753, 0), -12048);
        assert_eq!(chunk_to_block(-753, 8), -12040);
        assert_eq!(chunk_to_block(472, 0), 7552);
    }
}
