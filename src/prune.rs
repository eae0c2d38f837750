//! Stage C: isolation re-prune over the biome-viable subset.
//!
//! Validation removes monuments, which can leave survivors whose only
//! close peers were rejected. Those survivors can no longer appear in
//! any group, so the isolation filter runs again, this time over a
//! region-keyed hash map instead of the scan's sliding window: at most
//! one monument exists per 32x32-chunk region, so the 3x3 region
//! neighborhood around a candidate contains every monument that could
//! possibly be within the pairwise threshold.

use log::info;

use crate::error::PipelineError;
use crate::placement::containing_region;
use crate::table::PackedCoordMap;
use crate::types::{pack_coords, unpack_x, unpack_z};

/// Drops candidates with fewer than (k - 1) neighbors within
/// `pairwise_blocks` among the viable set. Preserves input order.
///
/// The region table and the survivor buffer are the stage's large
/// allocations; failure to obtain either surfaces as
/// [`PipelineError::ResourceExhaustion`] instead of aborting.
pub fn prune_isolated_after_validation(
    packed: &[u64],
    k: u32,
    pairwise_blocks: i32,
) -> Result<Vec<u64>, PipelineError> {
    let oom = |what: &str| PipelineError::ResourceExhaustion(what.to_string());
    let required = k.saturating_sub(1) as usize;
    if packed.is_empty() || required == 0 {
        let mut all = Vec::new();
        all.try_reserve_exact(packed.len())
            .map_err(|_| oom("buffering stage C survivors"))?;
        all.extend_from_slice(packed);
        return Ok(all);
    }
    let pairwise2 = (pairwise_blocks as i64) * (pairwise_blocks as i64);

    let mut by_region = PackedCoordMap::with_expected(packed.len())
        .map_err(|_| oom("building the stage C region table"))?;
    for &p in packed {
        let rx = containing_region(unpack_x(p));
        let rz = containing_region(unpack_z(p));
        by_region.put(pack_coords(rx, rz), p);
    }

    let mut kept = Vec::new();
    kept.try_reserve(packed.len())
        .map_err(|_| oom("buffering stage C survivors"))?;
    let mut excluded = 0u64;
    for &p in packed {
        let ax = unpack_x(p);
        let az = unpack_z(p);
        let rx = containing_region(ax);
        let rz = containing_region(az);

        let mut neighbors = 0usize;
        'count: for dx in -1..=1 {
            for dz in -1..=1 {
                if dx == 0 && dz == 0 {
                    continue;
                }
                let Some(np) = by_region.get(pack_coords(rx + dx, rz + dz)) else {
                    continue;
                };
                let dxb = ((unpack_x(np) - ax) as i64) << 4;
                let dzb = ((unpack_z(np) - az) as i64) << 4;
                if dxb * dxb + dzb * dzb <= pairwise2 {
                    neighbors += 1;
                    if neighbors >= required {
                        break 'count;
                    }
                }
            }
        }

        if neighbors >= required {
            kept.push(p);
        } else {
            excluded += 1;
        }
    }

    if excluded > 0 {
        info!("stage C: excluded {excluded} viable but isolated monument(s)");
    }
    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packed(chunks: &[(i32, i32)]) -> Vec<u64> {
        chunks.iter().map(|&(x, z)| pack_coords(x, z)).collect()
    }

    // Inputs below keep at most one chunk per 32x32-chunk region, the
    // invariant the placement oracle guarantees upstream.

    #[test]
    fn pair_survives_isolated_loner_dropped() {
        // Regions 0 and 1 on the x axis, 160 blocks apart; the loner is
        // far from both.
        let input = packed(&[(31, 0), (41, 0), (100, 100)]);
        let kept = prune_isolated_after_validation(&input, 2, 224).expect("prune");
        assert_eq!(kept, packed(&[(31, 0), (41, 0)]));
    }

    #[test]
    fn threshold_is_inclusive() {
        // Exactly 224 blocks apart: 14 chunks * 16, straddling a region
        // boundary.
        let input = packed(&[(31, 0), (45, 0)]);
        let kept = prune_isolated_after_validation(&input, 2, 224).expect("prune");
        assert_eq!(kept.len(), 2);
        // One chunk over.
        let input = packed(&[(31, 0), (46, 0)]);
        let kept = prune_isolated_after_validation(&input, 2, 224).expect("prune");
        assert!(kept.is_empty());
    }

    #[test]
    fn neighbors_across_origin_regions() {
        // Chunks -6 and 0 sit in regions -1 and 0 but only 96 blocks
        // apart; containment keying must pair them. The origin chunk
        // also packs to 0, which must stay distinguishable from an
        // empty map slot.
        let input = packed(&[(-6, 0), (0, 0)]);
        let kept = prune_isolated_after_validation(&input, 2, 224).expect("prune");
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn quad_needs_three_neighbors() {
        // Four chunks around a region corner, one per region, all
        // pairwise within 224.
        let input = packed(&[(31, 31), (33, 31), (31, 33), (33, 33)]);
        let kept = prune_isolated_after_validation(&input, 4, 224).expect("prune");
        assert_eq!(kept.len(), 4);
        // Remove one: the rest only have two neighbors each.
        let input = packed(&[(31, 31), (33, 31), (31, 33)]);
        let kept = prune_isolated_after_validation(&input, 4, 224).expect("prune");
        assert!(kept.is_empty());
    }

    #[test]
    fn k1_keeps_everything() {
        let input = packed(&[(0, 0), (1000, 1000)]);
        assert_eq!(
            prune_isolated_after_validation(&input, 1, 224).expect("prune"),
            input
        );
    }

    #[test]
    fn empty_input() {
        assert!(prune_isolated_after_validation(&[], 2, 224)
            .expect("prune")
            .is_empty());
    }
}
