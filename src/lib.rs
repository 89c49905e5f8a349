//! # voxbuild
//!
//! Core of a unit-selection voice-building toolchain: turns a recorded
//! speech database (waveforms, pitchmarks, phone labels) into the binary
//! files a concatenative synthesiser reads at runtime.
//!
//! ## Quick start
//!
//! ```no_run
//! use voxbuild::{BuildConfig, UnitFileWriter, makers};
//!
//! let config = BuildConfig::load(std::path::Path::new("db/voxbuild.json")).unwrap();
//! let basenames = config.basenames().unwrap();
//!
//! // Unit catalogue on the global sample axis
//! let units = UnitFileWriter::build(&config, &basenames).unwrap();
//!
//! // Waveforms cut into pitch periods, on the same axis
//! let summary = makers::make_waveform_timeline(&config, &basenames).unwrap();
//! println!("{units} units, {} samples", summary.total_duration);
//! ```
//!
//! Reading back is random access by time:
//!
//! ```no_run
//! use voxbuild::{TimelineReader, UnitFileReader};
//!
//! let units = UnitFileReader::open("db/mary/phoneUnits.mry".as_ref()).unwrap();
//! let waves = TimelineReader::open("db/mary/timeline_waveforms.mry".as_ref()).unwrap();
//! let unit = units.unit(1).unwrap();
//! let span = waves.unit_datagrams(unit).unwrap();
//! println!("{} pitch periods", span.datagrams.len());
//! ```
//!
//! ## Pipeline
//! 1. **Pause clean-up** — pause symbols canonicalised, adjacent pauses
//!    merged, short interior pauses absorbed by their neighbours.
//! 2. **Half-phone labels** — each phone split in two, at its centre or at
//!    the release burst for plosives and affricates.
//! 3. **Unit file** — label boundaries snapped to pitchmarks, utterances
//!    bracketed by sentinels and laid end to end on one sample axis.
//! 4. **Timelines** — waveform and basename timelines on that same axis.
//! 5. **Cost file** — one target cost per unit.
//!
//! ## File formats
//! All files share a 12-byte big-endian header (magic `"MARY"`, version,
//! kind); see [`header`].  Timelines are documented in [`timeline_writer`],
//! their index in [`index`], unit files in [`unitfile`].

pub mod batch;
pub mod config;
pub mod datagram;
pub mod error;
pub mod halfphone;
pub mod header;
pub mod index;
pub mod labels;
pub mod makers;
pub mod pitchmarks;
pub mod scost;
pub mod timeline_reader;
pub mod timeline_writer;
pub mod unitfile;
pub mod wave;

// C FFI for synthesis runtimes — unit file and timeline readers.
pub mod ffi;

// ─── Re-exports for convenience ─────────────────────────────────────────────

pub use config::BuildConfig;
pub use datagram::Datagram;
pub use error::{Error, Result};
pub use pitchmarks::PitchmarkTrack;
pub use scost::{ScostFileReader, ScostFileWriter};
pub use timeline_reader::TimelineReader;
pub use timeline_writer::TimelineWriter;
pub use unitfile::{Unit, UnitFileReader, UnitFileWriter};
