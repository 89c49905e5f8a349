//! Look up the pitch periods behind each unit of a built voice.
//!
//! Usage:
//!   cargo run --example lookup -- path/to/db
//!   cargo run --example lookup -- path/to/db --units 20 --half-phones
//!
//! The database must already contain a unit file and a waveform timeline
//! (`voxbuild units` and `voxbuild waveforms`).

use std::path::PathBuf;

use voxbuild::{makers, unitfile, TimelineReader, UnitFileReader};

fn main() -> anyhow::Result<()> {
    // ── Parse simple CLI arguments ───────────────────────────────────────────
    let mut args = std::env::args().skip(1);

    let mut root = PathBuf::from(".");
    let mut limit = 10usize;
    let mut half_phones = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--units"       => { if let Some(v) = args.next() { limit = v.parse().unwrap_or(10); } }
            "--half-phones" => { half_phones = true; }
            "--help"        => {
                println!("Usage: lookup <db root> [--units N] [--half-phones]");
                return Ok(());
            }
            other => root = PathBuf::from(other),
        }
    }

    let out = root.join("mary");
    let unit_file = if half_phones { unitfile::HALFPHONE_UNIT_FILE } else { unitfile::PHONE_UNIT_FILE };
    let units = UnitFileReader::open(&out.join(unit_file))?;
    let waves = TimelineReader::open(&out.join(makers::WAVEFORM_TIMELINE))?;

    println!(
        "{} units at {} Hz, waveform timeline {} samples",
        units.num_units(),
        units.sample_rate(),
        waves.total_duration()
    );
    for unit in units.units().iter().take(limit) {
        if unit.is_sentinel() {
            println!("#{:<6} sentinel at {}", unit.index, unit.start);
            continue;
        }
        let span = match waves.unit_datagrams(unit) {
            Ok(span) => span,
            Err(e) => {
                println!("#{:<6} {e}", unit.index);
                continue;
            }
        };
        let samples: usize = span.datagrams.iter().map(|d| d.payload().len() / 2).sum();
        println!(
            "#{:<6} start {:>9}  {:>6} samples  {:>3} periods  {:>6} wav samples",
            unit.index,
            unit.start,
            unit.duration,
            span.datagrams.len(),
            samples
        );
    }
    Ok(())
}
