//! Half-phone label generation.
//!
//! Every phone label becomes two labels, `<phone>_L` and `<phone>_R`, meeting
//! at a split point.  The split point is the temporal centre of the phone,
//! except for configured plosives and affricates when energy refinement is
//! on: there it is the frame with the steepest rise in short-term RMS
//! energy, which tracks the release burst.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    batch::{BatchReport, Progress},
    config::{DatabaseLayout, EnergyConfig},
    error::{Error, Result},
    labels::{Label, LabelFile},
    wave::Waveform,
};

pub const LEFT_SUFFIX: &str = "_L";
pub const RIGHT_SUFFIX: &str = "_R";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Half {
    Left,
    Right,
}

/// Split a half-phone name into the phone and which half it is.
pub fn parse_halfphone_name(name: &str) -> Option<(&str, Half)> {
    if let Some(phone) = name.strip_suffix(LEFT_SUFFIX) {
        Some((phone, Half::Left))
    } else {
        name.strip_suffix(RIGHT_SUFFIX).map(|phone| (phone, Half::Right))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Energy contour
// ─────────────────────────────────────────────────────────────────────────────

/// Short-term RMS energy, one value per frame.  Frame `i` covers
/// `[i * skip, i * skip + window)` seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyContour {
    pub window: f64,
    pub skip: f64,
    pub rms: Vec<f64>,
}

impl EnergyContour {
    pub fn compute(wave: &Waveform, window: f64, skip: f64) -> Self {
        let rate = f64::from(wave.sample_rate);
        let win = ((window * rate).round() as usize).max(1);
        let hop = ((skip * rate).round() as usize).max(1);
        let mut rms = Vec::new();
        let mut start = 0;
        while start + win <= wave.samples.len() {
            let sum: f64 = wave.samples[start..start + win]
                .iter()
                .map(|&s| {
                    let x = f64::from(s) / 32768.0;
                    x * x
                })
                .sum();
            rms.push((sum / win as f64).sqrt());
            start += hop;
        }
        Self { window, skip, rms }
    }

    /// Centre time of frame `i`, seconds.
    pub fn frame_time(&self, i: usize) -> f64 {
        i as f64 * self.skip + self.window / 2.0
    }

    /// Time of the steepest energy increase between frames whose centres
    /// lie strictly inside `(start, end)`.  `None` when fewer than two
    /// energy differences are available there.
    pub fn steepest_rise(&self, start: f64, end: f64) -> Option<f64> {
        let frames: Vec<usize> = (0..self.rms.len())
            .filter(|&i| {
                let t = self.frame_time(i);
                t > start && t < end
            })
            .collect();
        if frames.len() < 3 {
            return None;
        }
        let mut best: Option<(usize, f64)> = None;
        for w in frames.windows(2) {
            let diff = self.rms[w[1]] - self.rms[w[0]];
            if best.map_or(true, |(_, d)| diff > d) {
                best = Some((w[1], diff));
            }
        }
        best.map(|(i, _)| self.frame_time(i))
    }

    /// Load the cached contour for a waveform, computing and caching it if
    /// the cache is missing, unreadable or was made with other settings.
    pub fn load_or_compute(wav: &Path, cache: &Path, window: f64, skip: f64) -> Result<Self> {
        if let Ok(bytes) = std::fs::read(cache) {
            match serde_json::from_slice::<EnergyContour>(&bytes) {
                Ok(c) if c.window == window && c.skip == skip => return Ok(c),
                Ok(_) => debug!(cache = %cache.display(), "energy cache settings changed"),
                Err(e) => warn!(cache = %cache.display(), error = %e, "ignoring corrupt energy cache"),
            }
        }
        let contour = Self::compute(&Waveform::load(wav)?, window, skip);
        if let Some(dir) = cache.parent() {
            std::fs::create_dir_all(dir)
                .map_err(|e| Error::io(format!("creating {}", dir.display()), e))?;
        }
        let json = serde_json::to_vec(&contour)
            .map_err(|e| Error::format(cache, format!("cannot serialise energy contour: {e}")))?;
        std::fs::write(cache, json)
            .map_err(|e| Error::io(format!("writing energy cache {}", cache.display()), e))?;
        Ok(contour)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Splitting
// ─────────────────────────────────────────────────────────────────────────────

/// Where to split one phone.  The result is strictly inside `(start, end)`
/// for phones of positive duration.
pub fn split_point(label: &Label, energy: Option<(&EnergyContour, &EnergyConfig)>) -> f64 {
    let centre = label.start + label.duration() / 2.0;
    let refined = energy
        .filter(|(_, cfg)| cfg.phones.contains(&label.name))
        .and_then(|(contour, _)| contour.steepest_rise(label.start, label.end));
    match refined {
        Some(t) if t > label.start && t < label.end => t,
        _ => centre,
    }
}

/// Split each phone into its two halves.
pub fn split_labels(phones: &[Label], energy: Option<(&EnergyContour, &EnergyConfig)>) -> Vec<Label> {
    let mut halves = Vec::with_capacity(phones.len() * 2);
    for phone in phones {
        let mid = split_point(phone, energy);
        halves.push(Label {
            start: phone.start,
            end: mid,
            unit_index: phone.unit_index,
            name: format!("{}{LEFT_SUFFIX}", phone.name),
            extra: phone.extra.clone(),
        });
        halves.push(Label {
            start: mid,
            end: phone.end,
            unit_index: phone.unit_index,
            name: format!("{}{RIGHT_SUFFIX}", phone.name),
            extra: phone.extra.clone(),
        });
    }
    halves
}

/// Write half-phone labels for every basename.  A basename whose phone
/// labels cannot be read is skipped and reported; a missing waveform only
/// disables refinement for that basename.
pub fn make_halfphone_labels(
    basenames: &[String],
    layout: &DatabaseLayout,
    energy: &EnergyConfig,
) -> Result<BatchReport> {
    let out_dir = layout.dir(&layout.hplab_dir);
    std::fs::create_dir_all(&out_dir)
        .map_err(|e| Error::config(format!("cannot create {}: {e}", out_dir.display())))?;

    let mut report = BatchReport::default();
    let mut progress = Progress::new("halfphone-labels", basenames.len());
    for basename in basenames {
        let outcome = (|| -> Result<()> {
            let phones = LabelFile::load(&layout.phone_labels(basename))?;
            let contour = if energy.enabled {
                match EnergyContour::load_or_compute(
                    &layout.wav(basename),
                    &layout.energy_cache(basename),
                    energy.window,
                    energy.skip,
                ) {
                    Ok(c) => Some(c),
                    Err(e) => {
                        warn!(basename = %basename, error = %e, "no energy contour, splitting at phone centres");
                        None
                    }
                }
            } else {
                None
            };
            let halves = split_labels(&phones.labels, contour.as_ref().map(|c| (c, energy)));
            LabelFile {
                header: phones.header,
                labels: halves,
            }
            .save(&layout.halfphone_labels(basename))
        })();
        report.record(basename, outcome);
        progress.advance();
    }
    report.log_summary("halfphone-labels");
    Ok(report)
}
