//! Open-addressed hash tables keyed by packed 64-bit coordinates.
//!
//! The pipeline keys everything by coordinates packed into a u64, so a
//! generic string-keyed map would waste both memory and hashing work.
//! These tables use linear probing with a splitmix-style avalanche mixer
//! so that the regular structure of region keys (low entropy in the low
//! bits) cannot degenerate the probe sequences. Capacity is sized to
//! keep the load factor at or below 0.5. Construction and growth
//! allocate fallibly: these tables back the largest live state of the
//! pipeline, and an out-of-memory there must reach the caller as an
//! error, not a process abort.

use std::collections::{HashMap, TryReserveError};
use std::hash::{BuildHasherDefault, Hasher};

/// 64-bit avalanche mixer (splitmix64 finalizer constants).
#[inline]
pub fn mix64(mut z: u64) -> u64 {
    z ^= z >> 33;
    z = z.wrapping_mul(0xff51_afd7_ed55_8ccd);
    z ^= z >> 33;
    z = z.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    z ^ (z >> 33)
}

/// Fast non-cryptographic hasher (FxHash) for u64 keys, used where a
/// bucketed map with payload vectors is more convenient than the
/// open-addressed tables below (spatial index cells). One multiply-XOR
/// per word; the keys are packed coordinates, not adversarial input.
pub struct FxHasher {
    hash: u64,
}

/// Constant from Firefox/rustc FxHash: a good odd multiplier for mixing.
const FX_SEED: u64 = 0x517c_c1b7_2722_0a95;

impl Hasher for FxHasher {
    #[inline]
    fn finish(&self) -> u64 {
        self.hash
    }

    #[inline]
    fn write(&mut self, _bytes: &[u8]) {
        unreachable!("FxHasher: only write_u64 is supported");
    }

    #[inline]
    fn write_u64(&mut self, i: u64) {
        self.hash = (self.hash.rotate_left(5) ^ i).wrapping_mul(FX_SEED);
    }
}

impl Default for FxHasher {
    #[inline]
    fn default() -> Self {
        FxHasher { hash: 0 }
    }
}

/// HashMap over u64 keys using FxHash instead of SipHash.
pub type FxHashMap<V> = HashMap<u64, V, BuildHasherDefault<FxHasher>>;

/// Key 0 would collide with the empty sentinel; remap it to a fixed odd
/// constant that no packed coordinate pair produces under remapping.
const ZERO_KEY: u64 = 0x9e37_79b9_7f4a_7c15;
const EMPTY: u64 = 0;

fn table_capacity(expected: usize) -> usize {
    let mut cap = 1usize;
    while cap < expected.saturating_mul(2).max(2) {
        cap <<= 1;
    }
    cap
}

fn try_filled_u64(len: usize, value: u64) -> Result<Vec<u64>, TryReserveError> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)?;
    v.resize(len, value);
    Ok(v)
}

fn try_none_filled<V>(len: usize) -> Result<Vec<Option<V>>, TryReserveError> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)?;
    v.resize_with(len, || None);
    Ok(v)
}

#[inline]
fn remap(key: u64) -> u64 {
    if key == EMPTY {
        ZERO_KEY
    } else {
        key
    }
}

/// Fixed-capacity u64 -> u64 map. The caller sizes it for the full key
/// set up front; inserting more than `expected` keys is a logic error.
pub struct PackedCoordMap {
    keys: Vec<u64>,
    vals: Vec<u64>,
    mask: usize,
}

impl PackedCoordMap {
    pub fn with_expected(expected: usize) -> Result<Self, TryReserveError> {
        let cap = table_capacity(expected);
        Ok(PackedCoordMap {
            keys: try_filled_u64(cap, EMPTY)?,
            vals: try_filled_u64(cap, 0)?,
            mask: cap - 1,
        })
    }

    pub fn put(&mut self, key: u64, val: u64) {
        let key = remap(key);
        let mut pos = (mix64(key) as usize) & self.mask;
        loop {
            let k = self.keys[pos];
            if k == EMPTY || k == key {
                self.keys[pos] = key;
                self.vals[pos] = val;
                return;
            }
            pos = (pos + 1) & self.mask;
        }
    }

    /// Presence is decided by the key slot, so a stored value of 0 is
    /// still distinguishable from an absent key.
    pub fn get(&self, key: u64) -> Option<u64> {
        let key = remap(key);
        let mut pos = (mix64(key) as usize) & self.mask;
        loop {
            let k = self.keys[pos];
            if k == EMPTY {
                return None;
            }
            if k == key {
                return Some(self.vals[pos]);
            }
            pos = (pos + 1) & self.mask;
        }
    }

    /// Iterates occupied slots as (key, value) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.keys
            .iter()
            .zip(self.vals.iter())
            .filter(|(&k, _)| k != EMPTY)
            .map(|(&k, &v)| (k, v))
    }
}

/// Insert-if-absent map from u64 keys to owned payloads, used for group
/// deduplication. Grows by doubling past the 0.5 load factor; growth is
/// fallible and leaves the map intact when the larger arrays cannot be
/// allocated.
pub struct DedupMap<V> {
    keys: Vec<u64>,
    vals: Vec<Option<V>>,
    len: usize,
    mask: usize,
    max_fill: usize,
}

impl<V> DedupMap<V> {
    pub fn with_expected(expected: usize) -> Result<Self, TryReserveError> {
        let cap = table_capacity(expected.max(8));
        Ok(DedupMap {
            keys: try_filled_u64(cap, EMPTY)?,
            vals: try_none_filled(cap)?,
            len: 0,
            mask: cap - 1,
            max_fill: cap / 2,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Inserts the payload for a key not seen before; later insertions
    /// of the same key are no-ops. Returns true if the key was new.
    pub fn put_if_absent(&mut self, key: u64, val: V) -> Result<bool, TryReserveError> {
        if self.len >= self.max_fill {
            self.grow()?;
        }
        let key = remap(key);
        let mut pos = (mix64(key) as usize) & self.mask;
        loop {
            let k = self.keys[pos];
            if k == EMPTY {
                self.keys[pos] = key;
                self.vals[pos] = Some(val);
                self.len += 1;
                return Ok(true);
            }
            if k == key {
                return Ok(false);
            }
            pos = (pos + 1) & self.mask;
        }
    }

    /// Drains all payloads in slot order.
    pub fn into_values(self) -> Vec<V> {
        self.vals.into_iter().flatten().collect()
    }

    fn grow(&mut self) -> Result<(), TryReserveError> {
        let new_cap = self.keys.len() << 1;
        // Allocate both replacement arrays before touching the map so a
        // failed growth leaves it usable.
        let new_keys = try_filled_u64(new_cap, EMPTY)?;
        let new_vals = try_none_filled(new_cap)?;
        let old_keys = std::mem::replace(&mut self.keys, new_keys);
        let old_vals = std::mem::replace(&mut self.vals, new_vals);
        self.mask = new_cap - 1;
        self.max_fill = new_cap / 2;
        for (k, v) in old_keys.into_iter().zip(old_vals) {
            if k == EMPTY {
                continue;
            }
            let mut pos = (mix64(k) as usize) & self.mask;
            while self.keys[pos] != EMPTY {
                pos = (pos + 1) & self.mask;
            }
            self.keys[pos] = k;
            self.vals[pos] = v;
        }
        Ok(())
    }
}
