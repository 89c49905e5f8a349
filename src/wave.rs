//! 16-bit PCM waveform I/O via `hound`.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::error::{Error, Result};

/// Mono 16-bit waveform.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    /// Load a 16-bit integer WAV file.  Multi-channel files keep the first
    /// channel.
    pub fn load(path: &Path) -> Result<Self> {
        let reader = WavReader::open(path).map_err(|e| hound_error(path, e))?;
        let spec = reader.spec();
        if spec.sample_format != SampleFormat::Int || spec.bits_per_sample != 16 {
            return Err(Error::format(
                path,
                format!(
                    "expected 16-bit PCM, found {}-bit {:?}",
                    spec.bits_per_sample, spec.sample_format
                ),
            ));
        }
        let channels = usize::from(spec.channels.max(1));
        let samples = reader
            .into_samples::<i16>()
            .step_by(channels)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| hound_error(path, e))?;
        Ok(Self::new(samples, spec.sample_rate))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let spec = WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).map_err(|e| hound_error(path, e))?;
        for &s in &self.samples {
            writer.write_sample(s).map_err(|e| hound_error(path, e))?;
        }
        writer.finalize().map_err(|e| hound_error(path, e))
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / f64::from(self.sample_rate.max(1))
    }

    /// Samples `[from, to)`, zero-padded where the range runs past the end.
    pub fn slice_padded(&self, from: usize, to: usize) -> Vec<i16> {
        (from..to).map(|i| self.samples.get(i).copied().unwrap_or(0)).collect()
    }
}

fn hound_error(path: &Path, e: hound::Error) -> Error {
    match e {
        hound::Error::IoError(io) if io.kind() == std::io::ErrorKind::NotFound => {
            Error::config(format!("waveform {} not found", path.display()))
        }
        hound::Error::IoError(io) => Error::io(format!("reading waveform {}", path.display()), io),
        other => Error::format(path, other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        let w = Waveform::new(vec![0, 100, -100, i16::MAX, i16::MIN], 16_000);
        w.save(&path).unwrap();
        assert_eq!(Waveform::load(&path).unwrap(), w);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = Waveform::load(Path::new("/nonexistent/a.wav")).unwrap_err();
        assert!(matches!(err, Error::Config { .. }), "{err}");
    }

    #[test]
    fn test_slice_padded() {
        let w = Waveform::new(vec![1, 2, 3], 8000);
        assert_eq!(w.slice_padded(1, 5), vec![2, 3, 0, 0]);
        assert!((w.duration() - 3.0 / 8000.0).abs() < 1e-12);
    }
}
