//! Tuning configuration.
//!
//! All knobs live in one immutable value threaded through the pipeline;
//! workers never read ambient state. Defaults are built in and an
//! optional `afkfinder.toml` in the working directory overrides them
//! field by field.

use std::path::Path;

use serde::Deserialize;

/// Default config file name looked up in the working directory.
pub const CONFIG_FILE: &str = "afkfinder.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Block offset added to chunk*16 for the monument center; 8 selects
    /// the center-of-chunk convention.
    pub center_offset: i32,
    /// Stage A isolation threshold in blocks. Two disks of radius 128
    /// intersect only if their centers are within 256, so this is the
    /// safe placement-only bound.
    pub pairwise_blocks_placement: i32,
    /// Pairwise threshold for the viability re-prune and for group
    /// enumeration. Tighter than 256: groups near the limit share only
    /// sliver intersections and are dominated in the ranking.
    pub pairwise_blocks_group: i32,
    /// Disables both isolation filters. Slow; intended for cross-checks.
    pub keep_all: bool,
    /// Coarse scan lattice step over the feasible rectangle.
    pub local_step: i32,
    /// Number of coarse candidates kept for refinement.
    pub keep_top: usize,
    /// Half-width of each refinement window in blocks.
    pub refine_radius: i32,
    /// Descending step sizes of the multi-scale refinement.
    pub refine_steps: Vec<i32>,
    /// Enforce the inner 24-block exclusion of the spawn annulus.
    pub require_outside24: bool,
    /// Anchors per group-enumeration task.
    pub anchor_batch_size: usize,
    /// Candidates per native validator call.
    pub validator_batch_size: usize,
    /// Explicit path to the validator shim; by default the standard
    /// library names are probed.
    pub validator_library: Option<String>,
    /// Game version handed to the validator shim.
    pub mc_version: McVersion,
    /// Result CSV path.
    pub output_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            center_offset: 0,
            pairwise_blocks_placement: 256,
            pairwise_blocks_group: 224,
            keep_all: false,
            local_step: 32,
            keep_top: 40,
            refine_radius: 24,
            refine_steps: vec![4, 2, 1],
            require_outside24: true,
            anchor_batch_size: 25_000,
            validator_batch_size: 10_000,
            validator_library: None,
            mc_version: McVersion::Mc1_18,
            output_file: "results.csv".to_string(),
        }
    }
}

impl Config {
    /// Loads the config file if present, otherwise the defaults.
    pub fn load(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
        let config: Config = toml::from_str(&text)
            .map_err(|e| format!("failed to parse {}: {e}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.pairwise_blocks_placement <= 0 || self.pairwise_blocks_group <= 0 {
            return Err("pairwise thresholds must be positive".into());
        }
        if self.local_step < 1 {
            return Err("local_step must be >= 1".into());
        }
        if self.refine_steps.is_empty() || self.refine_steps.iter().any(|&s| s < 1) {
            return Err("refine_steps must be non-empty positive integers".into());
        }
        if self.refine_radius < 0 {
            return Err("refine_radius must be >= 0".into());
        }
        if self.anchor_batch_size == 0 || self.validator_batch_size == 0 {
            return Err("batch sizes must be >= 1".into());
        }
        Ok(())
    }
}

/// Game versions the validator shim understands. The ordinal crosses the
/// FFI boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum McVersion {
    #[serde(rename = "1.18")]
    Mc1_18,
    #[serde(rename = "1.19")]
    Mc1_19,
    #[serde(rename = "1.20")]
    Mc1_20,
    #[serde(rename = "1.21")]
    Mc1_21,
}

impl McVersion {
    pub fn ordinal(self) -> i32 {
        match self {
            McVersion::Mc1_18 => 0,
            McVersion::Mc1_19 => 1,
            McVersion::Mc1_20 => 2,
            McVersion::Mc1_21 => 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let c = Config::default();
        assert!(c.validate().is_ok());
        assert_eq!(c.pairwise_blocks_placement, 256);
        assert_eq!(c.pairwise_blocks_group, 224);
        assert_eq!(c.refine_steps, vec![4, 2, 1]);
        assert!(c.require_outside24);
    }

    #[test]
    fn partial_toml_overrides() {
        let c: Config = toml::from_str(
            r#"
            center_offset = 8
            local_step = 16
            refine_steps = [8, 2]
            mc_version = "1.20"
            "#,
        )
        .expect("parse");
        assert_eq!(c.center_offset, 8);
        assert_eq!(c.local_step, 16);
        assert_eq!(c.refine_steps, vec![8, 2]);
        assert_eq!(c.mc_version, McVersion::Mc1_20);
        // untouched fields keep their defaults
        assert_eq!(c.keep_top, 40);
        assert_eq!(c.output_file, "results.csv");
    }

    #[test]
    fn unknown_keys_rejected() {
        let r: Result<Config, _> = toml::from_str("no_such_option = 1");
        assert!(r.is_err());
    }

    #[test]
    fn bad_values_rejected() {
        let c: Config = toml::from_str("local_step = 0").expect("parse");
        assert!(c.validate().is_err());
        let c: Config = toml::from_str("refine_steps = []").expect("parse");
        assert!(c.validate().is_err());
    }

    #[test]
    fn version_ordinals() {
        assert_eq!(McVersion::Mc1_18.ordinal(), 0);
        assert_eq!(McVersion::Mc1_21.ordinal(), 3);
    }
}
