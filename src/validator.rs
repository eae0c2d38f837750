//! Optional biome-viability oracle.
//!
//! The placement oracle produces *candidate* start chunks; the game then
//! applies biome checks (deep ocean plus surrounding ocean) before a
//! monument actually generates. Reproducing those checks offline is
//! delegated to a small native shim around cubiomes, loaded at runtime.
//! When the shim is absent the pipeline continues placement-only: a
//! superset with false positives but no placement false negatives.
//!
//! The shim exports four C symbols:
//!   c_create(seed, mcVersionOrdinal) -> handle   (0 on failure)
//!   c_isViableMonument(handle, chunkX, chunkZ) -> 0/1
//!   c_isViableMonumentBatch(handle, xs, zs, outFlags, n)
//!   c_free(handle)
//!
//! Handles are assumed single-threaded; validation runs on the
//! orchestrator thread in large batches to amortize the FFI boundary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use libloading::Library;
use log::{info, warn};

use crate::config::Config;
use crate::error::PipelineError;
use crate::types::{pack_coords, unpack_x, unpack_z};

const PROGRESS_EVERY_ITEMS: usize = 100_000;

/// The one operation the pipeline needs. Single-item queries dispatch
/// through the batch path with n = 1.
pub trait MonumentValidator {
    fn is_viable_batch(
        &self,
        xs: &[i32],
        zs: &[i32],
        out: &mut [u8],
    ) -> Result<(), PipelineError>;
}

type CreateFn = unsafe extern "C" fn(i64, i32) -> i64;
type BatchFn = unsafe extern "C" fn(i64, *const i32, *const i32, *mut u8, i32);
type FreeFn = unsafe extern "C" fn(i64);

/// Native cubiomes-backed validator. Frees its handle on drop.
pub struct NativeValidator {
    lib: Library,
    handle: i64,
}

impl NativeValidator {
    /// Opens the shim and creates a generator handle for the seed.
    /// Returns Ok(None) when no library can be found (survivable) and
    /// an error when the library loads but refuses the seed (fatal).
    pub fn open(seed: i64, config: &Config) -> Result<Option<Self>, PipelineError> {
        let lib = match Self::open_library(config) {
            Some(lib) => lib,
            None => return Ok(None),
        };

        let create: libloading::Symbol<CreateFn> = match unsafe { lib.get(b"c_create") } {
            Ok(s) => s,
            Err(e) => {
                warn!("validator library found but c_create is missing ({e}); continuing without validation");
                return Ok(None);
            }
        };
        let handle = unsafe { create(seed, config.mc_version.ordinal()) };
        drop(create);
        if handle == 0 {
            return Err(PipelineError::ValidatorInternal(
                "c_create returned a null handle".into(),
            ));
        }
        Ok(Some(NativeValidator { lib, handle }))
    }

    fn open_library(config: &Config) -> Option<Library> {
        let mut names: Vec<std::ffi::OsString> = Vec::new();
        if let Some(path) = &config.validator_library {
            names.push(path.into());
        } else {
            names.push(libloading::library_filename("cubiomeswrap"));
            names.push(libloading::library_filename("cubiomes_wrap"));
        }
        let mut last_err = None;
        for name in &names {
            match unsafe { Library::new(name) } {
                Ok(lib) => return Some(lib),
                Err(e) => last_err = Some(e),
            }
        }
        warn!(
            "biome validator unavailable ({}); results are placement-only and may \
             include non-viable monuments",
            last_err.map_or_else(|| "no names probed".to_string(), |e| e.to_string())
        );
        None
    }
}

impl MonumentValidator for NativeValidator {
    fn is_viable_batch(
        &self,
        xs: &[i32],
        zs: &[i32],
        out: &mut [u8],
    ) -> Result<(), PipelineError> {
        let n = xs.len();
        debug_assert!(zs.len() == n && out.len() == n);
        if n == 0 {
            return Ok(());
        }
        let batch: libloading::Symbol<BatchFn> =
            unsafe { self.lib.get(b"c_isViableMonumentBatch") }.map_err(|e| {
                PipelineError::ValidatorInternal(format!(
                    "c_isViableMonumentBatch missing: {e}"
                ))
            })?;
        unsafe {
            batch(
                self.handle,
                xs.as_ptr(),
                zs.as_ptr(),
                out.as_mut_ptr(),
                n as i32,
            );
        }
        Ok(())
    }
}

impl Drop for NativeValidator {
    fn drop(&mut self) {
        if let Ok(free) = unsafe { self.lib.get::<FreeFn>(b"c_free") } {
            unsafe { free(self.handle) };
        }
    }
}

/// Stage B: filters packed candidates through the validator in batches,
/// preserving input order. Runs on the calling thread. The cancellation
/// flag is polled before every batch; validation over a wide range can
/// take longer than every other stage combined and must not block a
/// requested shutdown until it finishes.
pub fn validate_in_batches(
    packed: &[u64],
    validator: &dyn MonumentValidator,
    batch_size: usize,
    cancel: &AtomicBool,
) -> Result<Vec<u64>, PipelineError> {
    if packed.is_empty() {
        return Ok(Vec::new());
    }
    let batch_size = batch_size.max(1);
    let started = Instant::now();
    info!(
        "stage B: validating {} candidate(s) in batches of {batch_size}",
        packed.len()
    );

    let mut viable = Vec::new();
    let mut xs = vec![0i32; batch_size.min(packed.len())];
    let mut zs = vec![0i32; batch_size.min(packed.len())];
    let mut flags = vec![0u8; batch_size.min(packed.len())];
    let mut next_log_at = PROGRESS_EVERY_ITEMS.min(packed.len());

    let mut pos = 0;
    while pos < packed.len() {
        if cancel.load(Ordering::Relaxed) {
            return Err(PipelineError::Interrupted);
        }
        let n = batch_size.min(packed.len() - pos);
        for (i, &p) in packed[pos..pos + n].iter().enumerate() {
            xs[i] = unpack_x(p);
            zs[i] = unpack_z(p);
        }
        flags[..n].fill(0);
        validator.is_viable_batch(&xs[..n], &zs[..n], &mut flags[..n])?;
        for i in 0..n {
            if flags[i] != 0 {
                viable.push(pack_coords(xs[i], zs[i]));
            }
        }
        pos += n;

        if pos >= next_log_at {
            let elapsed = started.elapsed().as_secs_f64();
            let rate = if elapsed > 0.0 { pos as f64 / elapsed } else { 0.0 };
            let eta = if rate > 0.0 {
                format_duration(((packed.len() - pos) as f64 / rate) as u64)
            } else {
                "?".to_string()
            };
            info!(
                "stage B: processed {pos}/{} ({:.1}%), rate={rate:.0}/s, ETA={eta}",
                packed.len(),
                100.0 * pos as f64 / packed.len() as f64
            );
            while next_log_at <= pos && next_log_at < packed.len() {
                next_log_at = (next_log_at + PROGRESS_EVERY_ITEMS).min(packed.len());
            }
        }
    }

    info!("stage B complete: viable={}", viable.len());
    Ok(viable)
}

fn format_duration(secs: u64) -> String {
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Predicate-backed stub standing in for the native shim.
    struct StubValidator<F: Fn(i32, i32) -> bool>(F);

    impl<F: Fn(i32, i32) -> bool> MonumentValidator for StubValidator<F> {
        fn is_viable_batch(
            &self,
            xs: &[i32],
            zs: &[i32],
            out: &mut [u8],
        ) -> Result<(), PipelineError> {
            for i in 0..xs.len() {
                out[i] = u8::from((self.0)(xs[i], zs[i]));
            }
            Ok(())
        }
    }

    fn no_cancel() -> AtomicBool {
        AtomicBool::new(false)
    }

    #[test]
    fn batch_filter_preserves_order() {
        let packed: Vec<u64> = (0..100).map(|i| pack_coords(i, -i)).collect();
        let v = StubValidator(|x, _| x % 3 == 0);
        let out = validate_in_batches(&packed, &v, 7, &no_cancel()).expect("validate");
        let expected: Vec<u64> = (0..100)
            .filter(|i| i % 3 == 0)
            .map(|i| pack_coords(i, -i))
            .collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn batch_size_one_matches_large_batches() {
        let packed: Vec<u64> = (-50..50).map(|i| pack_coords(i * 7, i * 13)).collect();
        let v = StubValidator(|x, z| (x + z) % 2 == 0);
        let small = validate_in_batches(&packed, &v, 1, &no_cancel()).expect("validate");
        let large = validate_in_batches(&packed, &v, 10_000, &no_cancel()).expect("validate");
        assert_eq!(small, large);
    }

    #[test]
    fn empty_input_short_circuits() {
        let v = StubValidator(|_, _| panic!("must not be called"));
        assert!(validate_in_batches(&[], &v, 100, &no_cancel())
            .expect("validate")
            .is_empty());
    }

    #[test]
    fn errors_propagate() {
        struct Failing;
        impl MonumentValidator for Failing {
            fn is_viable_batch(
                &self,
                _: &[i32],
                _: &[i32],
                _: &mut [u8],
            ) -> Result<(), PipelineError> {
                Err(PipelineError::ValidatorInternal("boom".into()))
            }
        }
        let r = validate_in_batches(&[pack_coords(1, 2)], &Failing, 10, &no_cancel());
        assert!(matches!(r, Err(PipelineError::ValidatorInternal(_))));
    }

    #[test]
    fn cancellation_between_validator_batches() {
        use std::sync::atomic::AtomicUsize;

        // Sets the shared flag from inside the first batch; the loop
        // must notice before dispatching the second.
        struct CancellingValidator<'a> {
            cancel: &'a AtomicBool,
            calls: AtomicUsize,
        }
        impl MonumentValidator for CancellingValidator<'_> {
            fn is_viable_batch(
                &self,
                _xs: &[i32],
                _zs: &[i32],
                out: &mut [u8],
            ) -> Result<(), PipelineError> {
                self.calls.fetch_add(1, Ordering::Relaxed);
                self.cancel.store(true, Ordering::Relaxed);
                out.fill(1);
                Ok(())
            }
        }

        let packed: Vec<u64> = (0..100).map(|i| pack_coords(i, i)).collect();
        let cancel = AtomicBool::new(false);
        let v = CancellingValidator {
            cancel: &cancel,
            calls: AtomicUsize::new(0),
        };
        let r = validate_in_batches(&packed, &v, 10, &cancel);
        assert!(matches!(r, Err(PipelineError::Interrupted)));
        assert_eq!(v.calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn missing_library_is_survivable() {
        let mut config = Config::default();
        config.validator_library = Some("/nonexistent/libdoesnotexist.so".into());
        let v = NativeValidator::open(1, &config).expect("open must not be fatal");
        assert!(v.is_none());
    }

    #[test]
    fn duration_formatting() {
        assert_eq!(format_duration(0), "00:00:00");
        assert_eq!(format_duration(3661), "01:01:01");
        assert_eq!(format_duration(86399), "23:59:59");
    }
}
