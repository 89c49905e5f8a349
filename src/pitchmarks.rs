//! Per-utterance pitchmark tracks.
//!
//! A pitchmark is the time of one glottal pulse.  The track is the
//! segmentation authority: label boundaries are snapped to it and its last
//! pitchmark defines the utterance length on the global unit axis.
//!
//! Accepted input is an EST-style ASCII track (header lines up to
//! `EST_Header_End`, then one frame per line with the time in seconds in the
//! first column) or a bare list of times, one per line.

use std::path::Path;

use crate::error::{Error, Result};

const EST_HEADER_END: &str = "EST_Header_End";

#[derive(Debug, Clone, PartialEq)]
pub struct PitchmarkTrack {
    times: Vec<f64>,
}

impl PitchmarkTrack {
    /// Build a track from ascending, non-negative times in seconds.
    pub fn new(times: Vec<f64>) -> Result<Self> {
        validate(&times).map_err(Error::invalid_argument)?;
        Ok(Self { times })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("cannot read pitchmarks {}: {e}", path.display()))
        })?;
        Self::parse(&text, path)
    }

    /// Parse track text; `path` is only used in error messages.
    pub fn parse(text: &str, path: &Path) -> Result<Self> {
        let has_header = text
            .lines()
            .find(|l| !l.trim().is_empty())
            .is_some_and(|l| l.trim_start().starts_with("EST_File"));

        let mut lines = text.lines().enumerate();
        if has_header {
            lines
                .by_ref()
                .find(|(_, l)| l.trim() == EST_HEADER_END)
                .ok_or_else(|| Error::format(path, format!("missing {EST_HEADER_END}")))?;
        }

        let mut times = Vec::new();
        for (n, line) in lines {
            let Some(first) = line.split_whitespace().next() else {
                continue;
            };
            let t: f64 = first.parse().map_err(|_| {
                Error::format(path, format!("line {}: bad pitchmark time '{first}'", n + 1))
            })?;
            times.push(t);
        }
        validate(&times).map_err(|m| Error::format(path, m))?;
        Ok(Self { times })
    }

    /// Write an EST-style ASCII track.
    pub fn to_est_string(&self) -> String {
        let mut out = String::from("EST_File Track\nDataType ascii\nNumFrames ");
        out.push_str(&self.times.len().to_string());
        out.push_str("\nNumChannels 0\nBreaksPresent true\n");
        out.push_str(EST_HEADER_END);
        out.push('\n');
        for t in &self.times {
            out.push_str(&format!("{t:.6}\t1\n"));
        }
        out
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Utterance length according to the track: the last pitchmark time.
    pub fn total_duration(&self) -> f64 {
        self.times.last().copied().unwrap_or(0.0)
    }

    /// The pitchmark nearest to `t`.  When `t` is exactly halfway between two
    /// pitchmarks the earlier one wins.
    pub fn closest_time(&self, t: f64) -> f64 {
        let i = self.times.partition_point(|&p| p < t);
        match (i.checked_sub(1).map(|j| self.times[j]), self.times.get(i).copied()) {
            (Some(before), Some(after)) => {
                if after - t < t - before {
                    after
                } else {
                    before
                }
            }
            (Some(before), None) => before,
            (None, Some(after)) => after,
            (None, None) => 0.0,
        }
    }
}

/// Seconds → samples, rounded to the nearest sample.
pub fn seconds_to_samples(t: f64, sample_rate: u32) -> u64 {
    (t * f64::from(sample_rate)).round().max(0.0) as u64
}

fn validate(times: &[f64]) -> std::result::Result<(), String> {
    if times.is_empty() {
        return Err("pitchmark track is empty".to_string());
    }
    for (i, w) in times.windows(2).enumerate() {
        if !(w[1] >= w[0]) {
            return Err(format!(
                "pitchmark {} at {} s precedes pitchmark {} at {} s",
                i + 1,
                w[1],
                i,
                w[0]
            ));
        }
    }
    if !(times[0] >= 0.0) || !times[times.len() - 1].is_finite() {
        return Err("pitchmark times must be finite and non-negative".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(times: &[f64]) -> PitchmarkTrack {
        PitchmarkTrack::new(times.to_vec()).unwrap()
    }

    #[test]
    fn test_parse_est_track() {
        let text = "EST_File Track\nDataType ascii\nNumFrames 3\nEST_Header_End\n0.005 1\n0.010 1\n0.016 1\n";
        let t = PitchmarkTrack::parse(text, Path::new("a.pm")).unwrap();
        assert_eq!(t.times(), &[0.005, 0.010, 0.016]);
        assert_eq!(t.total_duration(), 0.016);
    }

    #[test]
    fn test_parse_bare_list() {
        let t = PitchmarkTrack::parse("0.1\n\n0.2\n0.35\n", Path::new("a.pm")).unwrap();
        assert_eq!(t.len(), 3);
    }

    #[test]
    fn test_missing_header_end() {
        let text = "EST_File Track\nNumFrames 3\n0.1 1\n";
        assert!(PitchmarkTrack::parse(text, Path::new("a.pm")).is_err());
    }

    #[test]
    fn test_rejects_unsorted_and_garbage() {
        assert!(PitchmarkTrack::parse("0.2\n0.1\n", Path::new("a.pm")).is_err());
        assert!(PitchmarkTrack::parse("0.2\nabc\n", Path::new("a.pm")).is_err());
        assert!(PitchmarkTrack::parse("", Path::new("a.pm")).is_err());
    }

    #[test]
    fn test_closest_time() {
        let t = track(&[0.1, 0.2, 0.3]);
        assert_eq!(t.closest_time(0.0), 0.1);
        assert_eq!(t.closest_time(0.17), 0.2);
        assert_eq!(t.closest_time(0.2), 0.2);
        assert_eq!(t.closest_time(0.9), 0.3);
    }

    #[test]
    fn test_tie_goes_to_earlier_pitchmark() {
        let t = track(&[0.25, 0.75]);
        assert_eq!(t.closest_time(0.5), 0.25);
    }

    #[test]
    fn test_est_string_parses_back() {
        let t = track(&[0.004, 0.0125, 0.02]);
        let back = PitchmarkTrack::parse(&t.to_est_string(), Path::new("a.pm")).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn test_seconds_to_samples() {
        assert_eq!(seconds_to_samples(0.3, 16_000), 4800);
        assert_eq!(seconds_to_samples(0.998, 16_000), 15_968);
        assert_eq!(seconds_to_samples(1.0 / 3.0, 3), 1);
    }
}
