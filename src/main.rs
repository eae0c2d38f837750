//! Command-line entry point.
//!
//! Exactly five positional arguments, validated before any work:
//!
//! ```text
//! afkfinder <seed> <double|triple|quad> <rangeBlocks> <excludeRadius> <threads>
//! ```
//!
//! Exit codes: 0 on success (including an empty result), 1 on argument
//! errors, 2 on pipeline failures.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use log::error;

use afkfinder::config::{Config, CONFIG_FILE};
use afkfinder::output::write_csv;
use afkfinder::pipeline::{self, SearchParams};

/// Requested group size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpotKind {
    Double,
    Triple,
    Quad,
}

impl SpotKind {
    fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "double" => Ok(SpotKind::Double),
            "triple" => Ok(SpotKind::Triple),
            "quad" => Ok(SpotKind::Quad),
            other => Err(anyhow!(
                "type must be one of: double, triple, quad (got {other:?})"
            )),
        }
    }

    fn k(self) -> u32 {
        match self {
            SpotKind::Double => 2,
            SpotKind::Triple => 3,
            SpotKind::Quad => 4,
        }
    }

    fn name(self) -> &'static str {
        match self {
            SpotKind::Double => "double",
            SpotKind::Triple => "triple",
            SpotKind::Quad => "quad",
        }
    }
}

struct CliArgs {
    params: SearchParams,
    kind: SpotKind,
}

fn parse_args(args: &[String]) -> Result<CliArgs> {
    if args.len() != 5 {
        return Err(anyhow!(
            "expected 5 arguments, got {}\n{USAGE}",
            args.len()
        ));
    }
    let seed: i64 = args[0]
        .trim()
        .parse()
        .with_context(|| format!("invalid seed: {:?}", args[0]))?;
    let kind = SpotKind::parse(&args[1])?;
    let range_blocks: i32 = args[2]
        .trim()
        .parse()
        .with_context(|| format!("invalid rangeBlocks: {:?}", args[2]))?;
    let exclude_blocks: i32 = args[3]
        .trim()
        .parse()
        .with_context(|| format!("invalid excludeRadius: {:?}", args[3]))?;
    let threads: usize = args[4]
        .trim()
        .parse()
        .with_context(|| format!("invalid threads: {:?}", args[4]))?;

    if range_blocks <= 0 {
        return Err(anyhow!("rangeBlocks must be > 0"));
    }
    if exclude_blocks < 0 || exclude_blocks > range_blocks {
        return Err(anyhow!("excludeRadius must be in [0, rangeBlocks]"));
    }
    if threads < 1 {
        return Err(anyhow!("threads must be >= 1"));
    }

    Ok(CliArgs {
        params: SearchParams {
            seed,
            k: kind.k(),
            range_blocks,
            exclude_blocks,
            threads,
        },
        kind,
    })
}

const USAGE: &str = "Usage:
  afkfinder <seed> <double|triple|quad> <rangeBlocks> <excludeRadius> <threads>
Example:
  afkfinder 123456789 double 20000 10000 4";

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = match parse_args(&args) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{e:#}");
            return ExitCode::from(1);
        }
    };

    let config = match Config::load(Path::new(CONFIG_FILE)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(1);
        }
    };

    let spots = match pipeline::run(&cli.params, &config) {
        Ok(spots) => spots,
        Err(e) => {
            error!("{e}");
            return ExitCode::from(2);
        }
    };

    let path = Path::new(&config.output_file);
    if let Err(e) = write_csv(path, cli.kind.name(), &spots) {
        error!("failed to write {}: {e}", path.display());
        return ExitCode::from(2);
    }

    println!(
        "Wrote {} with {} AFK spot(s).",
        path.display(),
        spots.len()
    );
    ExitCode::SUCCESS
}
