//! Pipeline error taxonomy.
//!
//! Only `ValidatorMissing` is recovered from (the pipeline downgrades to
//! placement-only candidates with a warning); it is therefore not a
//! variant here. Everything else aborts the run.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// User-supplied bounds or flags invalid. Reported before any work.
    #[error("invalid argument: {0}")]
    Arg(String),

    /// The native oracle loaded but handle creation or a batch call
    /// failed. Never downgraded silently; users opt out of validation
    /// by removing the library instead.
    #[error("validator failure: {0}")]
    ValidatorInternal(String),

    /// The LCG self-check failed. Unreachable on a sane platform.
    #[error("PRNG parity check failed: the random stream does not match the reference")]
    PrngParity,

    /// Out of memory while buffering candidates or groups. Shrink the
    /// range or use a ring scan (excludeRadius) to work around.
    #[error("out of memory while {0}; shrink the range or use a ring scan")]
    ResourceExhaustion(String),

    /// Cooperative cancellation. The output file is left untouched.
    #[error("interrupted")]
    Interrupted,
}
