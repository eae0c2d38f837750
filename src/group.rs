//! k-subset enumeration over a spatial hash, plus canonical dedup.
//!
//! Every group of monuments sharing an AFK disk has all pairwise
//! center distances within the group threshold, so enumeration only
//! ever looks at the neighborhood of one anchor monument at a time. A
//! 256-block-cell spatial hash bounds each neighborhood query to a 3x3
//! cell window. Anchors are sharded into batches across the worker
//! pool; each batch writes to its own buffer and the single-threaded
//! merge deduplicates.
//!
//! A group is identified by its canonical member list (sorted by
//! (x, z)); the same set discovered from different anchors folds to the
//! same 64-bit key. The centroid pre-check is necessary but not
//! sufficient for a non-empty AFK intersection; exactness is the
//! optimizer's job.

use std::sync::atomic::{AtomicBool, Ordering};

use log::info;
use rayon::prelude::*;

use crate::config::Config;
use crate::error::PipelineError;
use crate::table::{mix64, DedupMap, FxHashMap};
use crate::types::{pack_coords, Group, MonumentPos};

/// AFK disk radius in blocks; a group is only useful if one point is
/// within this distance of every member.
pub const AFK_RADIUS: i32 = 128;

const CELL_SIZE: i32 = 256;

/// Spatial hash over monument centers for radius queries.
pub struct SpatialIndex<'a> {
    points: &'a [MonumentPos],
    cells: FxHashMap<Vec<u32>>,
}

impl<'a> SpatialIndex<'a> {
    pub fn build(points: &'a [MonumentPos]) -> Self {
        let mut cells: FxHashMap<Vec<u32>> = FxHashMap::default();
        for (i, p) in points.iter().enumerate() {
            cells
                .entry(cell_key(p.center_x, p.center_z))
                .or_default()
                .push(i as u32);
        }
        SpatialIndex { points, cells }
    }

    /// All monuments within `radius` blocks of (x, z), inclusive, in
    /// index order within each visited cell.
    pub fn query_within(&self, x: i32, z: i32, radius: i32, out: &mut Vec<MonumentPos>) {
        out.clear();
        let r_cells = (radius + CELL_SIZE - 1).div_euclid(CELL_SIZE);
        let r2 = (radius as i64) * (radius as i64);
        let cx = x.div_euclid(CELL_SIZE);
        let cz = z.div_euclid(CELL_SIZE);
        for dx in -r_cells..=r_cells {
            for dz in -r_cells..=r_cells {
                let Some(bucket) = self.cells.get(&pack_coords(cx + dx, cz + dz)) else {
                    continue;
                };
                for &i in bucket {
                    let p = self.points[i as usize];
                    let ddx = (p.center_x - x) as i64;
                    let ddz = (p.center_z - z) as i64;
                    if ddx * ddx + ddz * ddz <= r2 {
                        out.push(p);
                    }
                }
            }
        }
    }
}

fn cell_key(x: i32, z: i32) -> u64 {
    pack_coords(x.div_euclid(CELL_SIZE), z.div_euclid(CELL_SIZE))
}

/// Canonical dedup key: packed member coordinates folded through the
/// avalanche mixer, members in sorted order.
pub fn group_key(sorted: &[MonumentPos]) -> u64 {
    let mut h: u64 = 0x9e37_79b9_7f4a_7c15;
    for p in sorted {
        h = mix64(h ^ p.packed());
    }
    h
}

/// Enumerates all canonical k-groups among `monuments`.
///
/// The pruned-monument buffer and the dedup map are the stage's large
/// allocations; failure to obtain or grow them surfaces as
/// [`PipelineError::ResourceExhaustion`] instead of aborting.
pub fn enumerate_groups(
    monuments: &[MonumentPos],
    k: u32,
    config: &Config,
    cancel: &AtomicBool,
) -> Result<Vec<Group>, PipelineError> {
    assert!((2..=4).contains(&k), "groups are enumerated for k in 2..=4");
    if monuments.is_empty() {
        return Ok(Vec::new());
    }
    let pairwise = config.pairwise_blocks_group;

    let oom = |what: &str| PipelineError::ResourceExhaustion(what.to_string());

    // Monuments with no distinct neighbor in range cannot be in any
    // group; dropping them first shrinks every later query.
    let index = SpatialIndex::build(monuments);
    let mut scratch = Vec::new();
    let mut pruned: Vec<MonumentPos> = Vec::new();
    pruned
        .try_reserve(monuments.len())
        .map_err(|_| oom("buffering pairable monuments"))?;
    for &m in monuments {
        index.query_within(m.center_x, m.center_z, pairwise, &mut scratch);
        if scratch.iter().any(|&n| n != m) {
            pruned.push(m);
        }
    }
    info!(
        "group enumeration: monuments={}, after isolation prune={}",
        monuments.len(),
        pruned.len()
    );
    if pruned.is_empty() {
        return Ok(Vec::new());
    }

    let pruned_index = SpatialIndex::build(&pruned);
    let batches: Vec<Vec<Group>> = pruned
        .par_chunks(config.anchor_batch_size.max(1))
        .map(|anchors| {
            let mut local: Vec<Group> = Vec::new();
            if cancel.load(Ordering::Relaxed) {
                return local;
            }
            let mut neigh = Vec::new();
            for &a in anchors {
                pruned_index.query_within(a.center_x, a.center_z, pairwise, &mut neigh);
                neigh.retain(|&n| n != a);
                neigh.sort_unstable();
                subsets_from_anchor(a, &neigh, k, pairwise, &mut local);
            }
            local
        })
        .collect();
    if cancel.load(Ordering::Relaxed) {
        return Err(PipelineError::Interrupted);
    }

    let mut dedup: DedupMap<Group> =
        DedupMap::with_expected(pruned.len()).map_err(|_| oom("deduplicating groups"))?;
    for batch in batches {
        for group in batch {
            let key = group_key(&group.monuments);
            dedup
                .put_if_absent(key, group)
                .map_err(|_| oom("deduplicating groups"))?;
        }
    }
    info!("group enumeration: unique {k}-groups={}", dedup.len());
    Ok(dedup.into_values())
}

/// Emits every canonical k-subset containing the anchor whose members
/// are pairwise within the threshold and whose centroid is within the
/// AFK radius of every member.
fn subsets_from_anchor(
    a: MonumentPos,
    neigh: &[MonumentPos],
    k: u32,
    pairwise: i32,
    out: &mut Vec<Group>,
) {
    let p2 = (pairwise as i64) * (pairwise as i64);
    match k {
        2 => {
            for &b in neigh {
                try_add(&[a, b], out);
            }
        }
        3 => {
            for (i, &b) in neigh.iter().enumerate() {
                for &c in &neigh[i + 1..] {
                    if b.dist2(&c) > p2 {
                        continue;
                    }
                    try_add(&[a, b, c], out);
                }
            }
        }
        _ => {
            for (i, &b) in neigh.iter().enumerate() {
                for (j, &c) in neigh.iter().enumerate().skip(i + 1) {
                    if b.dist2(&c) > p2 {
                        continue;
                    }
                    for &d in &neigh[j + 1..] {
                        if b.dist2(&d) > p2 || c.dist2(&d) > p2 {
                            continue;
                        }
                        try_add(&[a, b, c, d], out);
                    }
                }
            }
        }
    }
}

fn try_add(members: &[MonumentPos], out: &mut Vec<Group>) {
    let group = Group::canonical(members.to_vec());
    if !centroid_within_all(&group.monuments) {
        return;
    }
    out.push(group);
}

/// Necessary condition for a non-empty feasible region: the centroid
/// must itself be within the AFK radius of every member.
fn centroid_within_all(members: &[MonumentPos]) -> bool {
    let k = members.len() as f64;
    let ax = members.iter().map(|p| p.center_x as f64).sum::<f64>() / k;
    let az = members.iter().map(|p| p.center_z as f64).sum::<f64>() / k;
    let r2 = (AFK_RADIUS as f64) * (AFK_RADIUS as f64);
    members.iter().all(|p| {
        let dx = ax - p.center_x as f64;
        let dz = az - p.center_z as f64;
        dx * dx + dz * dz <= r2
    })
}
