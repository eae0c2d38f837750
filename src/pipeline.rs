//! Pipeline orchestration.
//!
//! Stages run strictly in order, each consuming the previous stage's
//! output: placement scan + pairability prefilter (A), biome validation
//! (B, optional), isolation re-prune (C), group enumeration with dedup,
//! coverage optimization, final sort. Candidate flow is monotone; no
//! stage ever adds monuments back.
//!
//! Worker panics propagate through the pool and abort the run. A shared
//! cancellation flag is polled between batches; once set, the stages
//! drain what is in flight and return `Interrupted` without touching
//! any output.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use log::info;
use rayon::prelude::*;

use crate::config::Config;
use crate::coverage::optimize_group;
use crate::error::PipelineError;
use crate::group::enumerate_groups;
use crate::placement::chunk_to_block;
use crate::prune::prune_isolated_after_validation;
use crate::rng::stream_self_check;
use crate::scan::{scan_pairable, ScanBounds};
use crate::types::{unpack_x, unpack_z, AfkSpot, Group, MonumentPos};
use crate::validator::{validate_in_batches, NativeValidator};

/// What to search for. Wraps the user arguments after validation.
#[derive(Debug, Clone, Copy)]
pub struct SearchParams {
    pub seed: i64,
    /// Group size. 1 scores every monument alone; 2..=4 enumerate
    /// groups.
    pub k: u32,
    pub range_blocks: i32,
    pub exclude_blocks: i32,
    pub threads: usize,
}

/// Runs the whole pipeline and returns sorted AFK spots.
pub fn run(params: &SearchParams, config: &Config) -> Result<Vec<AfkSpot>, PipelineError> {
    run_with_cancel(params, config, &AtomicBool::new(false))
}

/// As [`run`], polling `cancel` between batches for cooperative
/// shutdown.
pub fn run_with_cancel(
    params: &SearchParams,
    config: &Config,
    cancel: &AtomicBool,
) -> Result<Vec<AfkSpot>, PipelineError> {
    if !(1..=4).contains(&params.k) {
        return Err(PipelineError::Arg(format!(
            "group size must be 1..=4 (got {})",
            params.k
        )));
    }
    if params.threads < 1 {
        return Err(PipelineError::Arg("threads must be >= 1".into()));
    }
    config.validate().map_err(PipelineError::Arg)?;
    let bounds = ScanBounds::from_blocks(params.range_blocks, params.exclude_blocks)?;

    if !stream_self_check() {
        return Err(PipelineError::PrngParity);
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(params.threads)
        .build()
        .map_err(|e| PipelineError::Arg(format!("cannot build worker pool: {e}")))?;

    pool.install(|| run_stages(params, config, &bounds, cancel))
}

fn run_stages(
    params: &SearchParams,
    config: &Config,
    bounds: &ScanBounds,
    cancel: &AtomicBool,
) -> Result<Vec<AfkSpot>, PipelineError> {
    // Stage A: placement scan + pairability prefilter.
    let pairable = scan_pairable(params.seed, bounds, params.k, config, cancel)?;

    // Stage B: biome viability, when the native oracle is present.
    let viable = match NativeValidator::open(params.seed, config)? {
        Some(validator) => validate_in_batches(
            &pairable,
            &validator,
            config.validator_batch_size,
            cancel,
        )?,
        None => pairable,
    };
    if cancel.load(Ordering::Relaxed) {
        return Err(PipelineError::Interrupted);
    }

    // Stage C: validation may have removed the peers that made a
    // survivor pairable.
    let surviving = if config.keep_all {
        viable
    } else {
        prune_isolated_after_validation(&viable, params.k, config.pairwise_blocks_group)?
    };
    info!("stage C complete: surviving={}", surviving.len());

    let monuments: Vec<MonumentPos> = surviving
        .iter()
        .map(|&p| {
            MonumentPos::new(
                chunk_to_block(unpack_x(p), config.center_offset),
                chunk_to_block(unpack_z(p), config.center_offset),
            )
        })
        .collect();

    let groups: Vec<Group> = if params.k == 1 {
        monuments
            .iter()
            .map(|&m| Group {
                monuments: vec![m],
            })
            .collect()
    } else {
        enumerate_groups(&monuments, params.k, config, cancel)?
    };
    if groups.is_empty() {
        info!("no {}-groups in range; finished with empty output", params.k);
        return Ok(Vec::new());
    }

    info!("optimizing {} group(s)", groups.len());
    let mut spots: Vec<AfkSpot> = groups
        .par_iter()
        .map(|g| {
            if cancel.load(Ordering::Relaxed) {
                None
            } else {
                Some(optimize_group(&g.monuments, config))
            }
        })
        .collect::<Option<Vec<_>>>()
        .ok_or(PipelineError::Interrupted)?;

    sort_results(&mut spots);
    info!("pipeline complete: {} AFK spot(s)", spots.len());
    Ok(spots)
}

/// Best coverage first; among equals, closest to the origin, then
/// coordinates for a total order.
fn sort_results(spots: &mut [AfkSpot]) {
    spots.sort_by(|a, b| {
        b.total_covered
            .cmp(&a.total_covered)
            .then_with(|| {
                a.distance_to_origin()
                    .partial_cmp(&b.distance_to_origin())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.x.cmp(&b.x))
            .then_with(|| a.z.cmp(&b.z))
    });
}
