//! Result CSV writing.
//!
//! One row per AFK spot, sorted upstream. Overworld, nether and
//! place-block coordinates are all emitted so the row can be pasted
//! straight into waypoint tools.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::types::AfkSpot;

pub const CSV_HEADER: &str = "type,afkX,afkY,afkZ,netherX,netherY,netherZ,\
placeBlockX,placeBlockY,placeBlockZ,totalCovered,count,monuments";

/// Overworld to nether: divide by 8, round half up. Integer arithmetic,
/// no float round-trip.
pub fn nether_coord(overworld: i32) -> i32 {
    (overworld + 4).div_euclid(8)
}

/// Minimal CSV escaping: quote when the field contains a comma, quote
/// or newline; double embedded quotes.
pub fn csv_escape(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn monuments_field(spot: &AfkSpot) -> String {
    let joined = spot
        .monuments
        .iter()
        .map(|m| format!("({},{})", m.center_x, m.center_z))
        .collect::<Vec<_>>()
        .join(";");
    csv_escape(&joined)
}

/// Formats one result row.
pub fn format_row(type_name: &str, spot: &AfkSpot) -> String {
    let (pbx, pby, pbz) = spot.place_block();
    format!(
        "{},{},{},{},{},{},{},{},{},{},{},{},{}",
        type_name,
        spot.x,
        spot.y,
        spot.z,
        nether_coord(spot.x),
        nether_coord(spot.y),
        nether_coord(spot.z),
        pbx,
        pby,
        pbz,
        spot.total_covered,
        spot.monuments.len(),
        monuments_field(spot)
    )
}

/// Writes the full result file, truncating any previous one.
pub fn write_csv(path: &Path, type_name: &str, spots: &[AfkSpot]) -> std::io::Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    writeln!(w, "{CSV_HEADER}")?;
    for spot in spots {
        writeln!(w, "{}", format_row(type_name, spot))?;
    }
    w.flush()
}
