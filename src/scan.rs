//! Parallel placement scan and the Stage A isolation prefilter.
//!
//! The scan walks a rectangle of structure regions one regionX column at
//! a time. Columns are computed in parallel batches with bounded
//! inflight, but consumed strictly in regionX order: Stage A decides
//! each candidate's fate from a three-column sliding window (previous,
//! current, next), so a candidate only needs its own column and the two
//! neighbors to be alive at once. A column is released as soon as the
//! window moves past it.
//!
//! Stage A drops every candidate without at least (k - 1) distinct
//! neighbors within the placement pairwise threshold. An AFK disk has
//! radius 128, so any two monuments sharing one are within 256 blocks;
//! a monument whose nearest peer is farther than that can never appear
//! in a result, no matter what the biome oracle says later.

use std::sync::atomic::{AtomicBool, Ordering};

use log::{info, warn};
use rayon::prelude::*;

use crate::config::Config;
use crate::error::PipelineError;
use crate::placement::{possible_location, scan_region_bound};
use crate::types::pack_coords;

const PROGRESS_EVERY_COLUMNS: usize = 250;

/// Chunk-space bounds of a search plus the derived region rectangle.
#[derive(Debug, Clone, Copy)]
pub struct ScanBounds {
    pub min_chunk: i32,
    pub max_chunk: i32,
    pub min_region: i32,
    pub max_region: i32,
    /// Chebyshev chunk radius around the origin to suppress; 0 disables.
    pub exclude_chunks: i32,
}

impl ScanBounds {
    /// Derives bounds from block-space range and exclusion radius.
    pub fn from_blocks(range_blocks: i32, exclude_blocks: i32) -> Result<Self, PipelineError> {
        if range_blocks <= 0 {
            return Err(PipelineError::Arg("rangeBlocks must be > 0".into()));
        }
        if exclude_blocks < 0 || exclude_blocks > range_blocks {
            return Err(PipelineError::Arg(
                "excludeRadius must be in [0, rangeBlocks]".into(),
            ));
        }
        let min_chunk = (-range_blocks).div_euclid(16);
        let max_chunk = range_blocks.div_euclid(16);
        let exclude_chunks = if exclude_blocks <= 0 {
            0
        } else {
            exclude_blocks.div_euclid(16)
        };
        Ok(ScanBounds {
            min_chunk,
            max_chunk,
            min_region: scan_region_bound(min_chunk),
            max_region: scan_region_bound(max_chunk),
            exclude_chunks,
        })
    }

    fn region_len(&self) -> usize {
        (self.max_region - self.min_region + 1) as usize
    }
}

/// One regionX worth of candidates: parallel arrays indexed by
/// (regionZ - minRegionZ). The unit of parallel work and of the Stage A
/// sliding window.
pub struct Column {
    pub region_x: i32,
    min_region_z: i32,
    chunk_x: Vec<i32>,
    chunk_z: Vec<i32>,
    present: Vec<bool>,
}

impl Column {
    fn compute(seed: i64, region_x: i32, bounds: &ScanBounds) -> Column {
        let len = bounds.region_len();
        let mut col = Column {
            region_x,
            min_region_z: bounds.min_region,
            chunk_x: vec![0; len],
            chunk_z: vec![0; len],
            present: vec![false; len],
        };
        for rz in bounds.min_region..=bounds.max_region {
            let (cx, cz) = possible_location(seed, region_x, rz);
            if cx < bounds.min_chunk
                || cx > bounds.max_chunk
                || cz < bounds.min_chunk
                || cz > bounds.max_chunk
            {
                continue;
            }
            let idx = (rz - bounds.min_region) as usize;
            col.present[idx] = true;
            col.chunk_x[idx] = cx;
            col.chunk_z[idx] = cz;
        }
        col
    }

    pub fn get(&self, region_z: i32) -> Option<(i32, i32)> {
        let idx = region_z - self.min_region_z;
        if idx < 0 || idx as usize >= self.present.len() {
            return None;
        }
        let idx = idx as usize;
        if self.present[idx] {
            Some((self.chunk_x[idx], self.chunk_z[idx]))
        } else {
            None
        }
    }

    fn count_present(&self) -> u64 {
        self.present.iter().filter(|&&p| p).count() as u64
    }
}

/// Runs the placement scan and Stage A, returning packed pairable chunk
/// coordinates in deterministic (regionX, regionZ) order.
pub fn scan_pairable(
    seed: i64,
    bounds: &ScanBounds,
    k: u32,
    config: &Config,
    cancel: &AtomicBool,
) -> Result<Vec<u64>, PipelineError> {
    let required_neighbors = k.saturating_sub(1) as usize;
    let pairwise2 = {
        let p = config.pairwise_blocks_placement as i64;
        p * p
    };
    if config.keep_all {
        warn!("keep_all=true disables pruning and can be very slow and memory-heavy");
    }

    let threads = rayon::current_num_threads().max(1);
    let batch_len = (threads * 4).max(8);
    let total_columns = bounds.region_len();

    let mut pairable: Vec<u64> = Vec::new();
    let mut total_candidates: u64 = 0;
    let mut total_excluded: u64 = 0;
    let mut processed: usize = 0;

    info!(
        "stage A: scanning {total_columns} columns in batches of {batch_len} \
         (regions [{}, {}])",
        bounds.min_region, bounds.max_region
    );

    let mut prev: Option<Column> = None;
    let mut curr: Option<Column> = None;

    let mut batch_start = bounds.min_region;
    while batch_start <= bounds.max_region {
        if cancel.load(Ordering::Relaxed) {
            return Err(PipelineError::Interrupted);
        }
        let batch_end =
            (batch_start as i64 + batch_len as i64 - 1).min(bounds.max_region as i64) as i32;
        let batch: Vec<Column> = (batch_start..=batch_end)
            .into_par_iter()
            .map(|rx| Column::compute(seed, rx, bounds))
            .collect();
        batch_start = batch_end + 1;

        for next in batch {
            total_candidates += next.count_present();
            if let Some(c) = curr.take() {
                prefilter_column(
                    &c,
                    prev.as_ref(),
                    Some(&next),
                    bounds,
                    required_neighbors,
                    pairwise2,
                    config.keep_all,
                    &mut pairable,
                    &mut total_excluded,
                )?;
                processed += 1;
                if processed % PROGRESS_EVERY_COLUMNS == 0 {
                    info!(
                        "stage A: columns {processed}/{total_columns}, \
                         candidates={total_candidates}, pairable={}, excluded={total_excluded}",
                        pairable.len()
                    );
                }
                prev = Some(c);
            }
            curr = Some(next);
        }
    }
    if let Some(c) = curr.take() {
        prefilter_column(
            &c,
            prev.as_ref(),
            None,
            bounds,
            required_neighbors,
            pairwise2,
            config.keep_all,
            &mut pairable,
            &mut total_excluded,
        )?;
    }

    info!(
        "stage A complete: candidates={total_candidates}, pairable={}, excluded={total_excluded}",
        pairable.len()
    );
    Ok(pairable)
}

/// Stage A decision for every candidate of one column. Neighbor counting
/// short-circuits once (k - 1) is reached.
#[allow(clippy::too_many_arguments)]
fn prefilter_column(
    curr: &Column,
    prev: Option<&Column>,
    next: Option<&Column>,
    bounds: &ScanBounds,
    required_neighbors: usize,
    pairwise2: i64,
    keep_all: bool,
    pairable: &mut Vec<u64>,
    excluded: &mut u64,
) -> Result<(), PipelineError> {
    for rz in bounds.min_region..=bounds.max_region {
        let Some((ax, az)) = curr.get(rz) else {
            continue;
        };

        // Ring search: skip the inner square (Chebyshev in chunk coords).
        if bounds.exclude_chunks > 0 && ax.abs().max(az.abs()) <= bounds.exclude_chunks {
            continue;
        }

        let mut neighbor_count = 0usize;
        'count: for (dx, col) in [(-1, prev), (0, Some(curr)), (1, next)] {
            if neighbor_count >= required_neighbors {
                break;
            }
            let Some(col) = col else { continue };
            for dz in -1..=1 {
                if dx == 0 && dz == 0 {
                    continue;
                }
                let Some((bx, bz)) = col.get(rz + dz) else {
                    continue;
                };
                let dxb = ((bx - ax) as i64) << 4;
                let dzb = ((bz - az) as i64) << 4;
                if dxb * dxb + dzb * dzb <= pairwise2 {
                    neighbor_count += 1;
                    if neighbor_count >= required_neighbors {
                        break 'count;
                    }
                }
            }
        }

        if keep_all || neighbor_count >= required_neighbors {
            pairable
                .try_reserve(1)
                .map_err(|_| PipelineError::ResourceExhaustion("buffering candidates".into()))?;
            pairable.push(pack_coords(ax, az));
        } else {
            *excluded += 1;
        }
    }
    Ok(())
}
