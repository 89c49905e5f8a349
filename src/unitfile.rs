//! Unit files: the global catalogue of units across all utterances.
//!
//! | Field       | Type | Notes |
//! |-------------|------|-------|
//! | header      | 12 B | kind = units |
//! | unit count  | i32  | placeholder, backpatched on close |
//! | sample rate | u32  | |
//! | units…      | `[start: i64][duration: i32]` | 12 B each |
//!
//! Units live on one global sample axis.  Every utterance is bracketed by
//! two sentinel units of duration `-1`: one at the utterance start, one right
//! after its last real unit.  Real units are contiguous inside an utterance.
//! The utterance then advances the global axis by its pitchmark track's total
//! duration, which is the same quantity the timeline makers use, so unit
//! times index straight into every timeline built from the same tracks.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use tracing::{debug, info, warn};

use crate::{
    batch::Progress,
    config::BuildConfig,
    error::{Error, IoContext, Result},
    header::{read_header, read_i32, read_i64, read_u32, write_header, FileKind, HEADER_LEN},
    labels::LabelFile,
    pitchmarks::{seconds_to_samples, PitchmarkTrack},
};

pub const PHONE_UNIT_FILE: &str = "phoneUnits.mry";
pub const HALFPHONE_UNIT_FILE: &str = "halfphoneUnits.mry";

/// Duration marking an utterance-boundary sentinel.
pub const SENTINEL_DURATION: i32 = -1;

const RECORD_LEN: u64 = 12;
/// Unit count field follows the common header.
const COUNT_POS: u64 = HEADER_LEN;
const UNITS_POS: u64 = HEADER_LEN + 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unit {
    /// Position in the unit file.
    pub index: u32,
    /// Start on the global axis, in samples.
    pub start: u64,
    /// Samples, or [`SENTINEL_DURATION`].
    pub duration: i32,
}

impl Unit {
    pub fn is_sentinel(&self) -> bool {
        self.duration < 0
    }

    /// End on the global axis; a sentinel ends where it starts.
    pub fn end(&self) -> u64 {
        self.start + u64::try_from(self.duration).unwrap_or(0)
    }
}

/// Per-utterance bookkeeping returned by [`UnitFileWriter::add_utterance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtteranceUnits {
    /// Real units written (sentinels excluded).
    pub units: usize,
    /// Global position of the utterance start.
    pub start: u64,
    /// Pitchmark total, samples.  The global axis advances by this much.
    pub advance: u64,
    /// Pitchmark total minus label total, samples.
    pub drift: i64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Writer
// ─────────────────────────────────────────────────────────────────────────────

pub struct UnitFileWriter {
    out: BufWriter<File>,
    path: PathBuf,
    sample_rate: u32,
    position: u64,
    num_units: u32,
}

impl UnitFileWriter {
    pub fn create(path: &Path, sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(Error::invalid_argument("unit file sample rate must be positive"));
        }
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .io_context(|| format!("creating unit file {}", path.display()))?;
        let mut out = BufWriter::new(file);
        write_header(&mut out, FileKind::Units)
            .and_then(|_| out.write_all(&0i32.to_be_bytes()))
            .and_then(|_| out.write_all(&sample_rate.to_be_bytes()))
            .io_context(|| format!("writing header of {}", path.display()))?;
        Ok(Self {
            out,
            path: path.to_path_buf(),
            sample_rate,
            position: 0,
            num_units: 0,
        })
    }

    /// Build the unit file for `basenames` into the configured output
    /// directory, returning the number of units (sentinels included).
    ///
    /// Any unreadable utterance fails the whole file.
    pub fn build(config: &BuildConfig, basenames: &[String]) -> Result<u32> {
        let layout = &config.layout;
        let out_dir = layout.dir(&layout.out_dir);
        std::fs::create_dir_all(&out_dir)
            .map_err(|e| Error::config(format!("cannot create {}: {e}", out_dir.display())))?;
        let file_name = if config.half_phones { HALFPHONE_UNIT_FILE } else { PHONE_UNIT_FILE };
        let (label_dir, label_ext) = config.unit_labels();

        let mut writer = Self::create(&layout.output(file_name), config.sample_rate)?;
        let mut progress = Progress::new("unit-file", basenames.len());
        for basename in basenames {
            let track = PitchmarkTrack::load(&layout.pitchmarks(basename))?;
            let labels = LabelFile::load(&label_dir.join(format!("{basename}{label_ext}")))?;
            writer.add_utterance(basename, &track, &labels.end_times())?;
            progress.advance();
        }
        writer.close()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Current position on the global axis, in samples.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn num_units(&self) -> u32 {
        self.num_units
    }

    /// Append one utterance: start sentinel, one unit per label end time
    /// snapped to the nearest pitchmark, end sentinel.
    pub fn add_utterance(
        &mut self,
        basename: &str,
        track: &PitchmarkTrack,
        label_ends: &[f64],
    ) -> Result<UtteranceUnits> {
        let start = self.position;
        self.write_unit(start, SENTINEL_DURATION)?;

        let mut prev = 0u64;
        for &t in label_ends {
            let boundary = seconds_to_samples(track.closest_time(t), self.sample_rate);
            let samples = boundary.checked_sub(prev).ok_or_else(|| {
                Error::invalid_argument(format!("{basename}: label end times go backwards at {t} s"))
            })?;
            let duration = i32::try_from(samples).map_err(|_| {
                Error::invalid_argument(format!(
                    "{basename}: unit ending at {t} s is too long for the unit file"
                ))
            })?;
            self.write_unit(start + prev, duration)?;
            prev = boundary;
        }
        self.write_unit(start + prev, SENTINEL_DURATION)?;

        let advance = seconds_to_samples(track.total_duration(), self.sample_rate);
        let label_total = label_ends
            .last()
            .map_or(0, |&t| seconds_to_samples(t, self.sample_rate));
        let drift = advance as i64 - label_total as i64;
        if drift < 0 {
            warn!(
                basename,
                drift_samples = drift,
                pitchmark_samples = advance,
                label_samples = label_total,
                "labels run past the last pitchmark"
            );
        } else if drift > 0 {
            debug!(basename, drift_samples = drift, "pitchmarks run past the last label");
        }

        self.position = start.checked_add(advance).ok_or_else(|| {
            Error::invalid_argument(format!("{basename}: global unit axis overflows"))
        })?;
        Ok(UtteranceUnits {
            units: label_ends.len(),
            start,
            advance,
            drift,
        })
    }

    fn write_unit(&mut self, start: u64, duration: i32) -> Result<()> {
        let start = i64::try_from(start)
            .map_err(|_| Error::invalid_argument(format!("unit start {start} does not fit the unit file")))?;
        self.out
            .write_all(&start.to_be_bytes())
            .and_then(|_| self.out.write_all(&duration.to_be_bytes()))
            .io_context(|| format!("writing unit {} to {}", self.num_units, self.path.display()))?;
        self.num_units = self.num_units.checked_add(1).filter(|&n| n <= i32::MAX as u32).ok_or_else(|| {
            Error::invalid_argument("too many units for one unit file")
        })?;
        Ok(())
    }

    /// Backpatch the unit count, close the file and check it by reading it
    /// back.  Returns the unit count.
    pub fn close(self) -> Result<u32> {
        let Self {
            out,
            path,
            num_units,
            position,
            ..
        } = self;
        let mut file = out
            .into_inner()
            .map_err(|e| Error::io(format!("flushing {}", path.display()), e.into_error()))?;
        file.seek(SeekFrom::Start(COUNT_POS))
            .and_then(|_| file.write_all(&(num_units as i32).to_be_bytes()))
            .and_then(|_| file.sync_all())
            .io_context(|| format!("backpatching unit count of {}", path.display()))?;
        drop(file);

        let reader = UnitFileReader::open(&path)?;
        if reader.num_units() != num_units {
            return Err(Error::count_mismatch(
                format!("unit file {}", path.display()),
                u64::from(num_units),
                u64::from(reader.num_units()),
            ));
        }
        info!(path = %path.display(), units = num_units, total_samples = position, "closed unit file");
        Ok(num_units)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Reader
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct UnitFileReader {
    path: PathBuf,
    sample_rate: u32,
    units: Vec<Unit>,
}

impl UnitFileReader {
    /// Open and fully load a unit file.  The declared count must match the
    /// records on disk exactly.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            Error::config(format!("cannot open unit file {}: {e}", path.display()))
        })?;
        let len = file
            .metadata()
            .io_context(|| format!("reading metadata of {}", path.display()))?
            .len();
        let mut r = BufReader::new(file);
        read_header(&mut r, FileKind::Units, path)?;
        let declared = read_i32(&mut r, path)?;
        let sample_rate = read_u32(&mut r, path)?;
        let declared = u32::try_from(declared)
            .map_err(|_| Error::format(path, format!("negative unit count {declared}")))?;

        let body = len.saturating_sub(UNITS_POS);
        let on_disk = body / RECORD_LEN;
        if on_disk != u64::from(declared) {
            return Err(Error::count_mismatch(
                format!("unit file {}", path.display()),
                u64::from(declared),
                on_disk,
            ));
        }
        if body % RECORD_LEN != 0 {
            return Err(Error::format(
                path,
                format!("{} trailing bytes after the last unit", body % RECORD_LEN),
            ));
        }

        let mut units = Vec::with_capacity(declared as usize);
        for index in 0..declared {
            let start = read_i64(&mut r, path)?;
            let duration = read_i32(&mut r, path)?;
            let start = u64::try_from(start)
                .map_err(|_| Error::format(path, format!("unit {index} starts at negative time {start}")))?;
            units.push(Unit { index, start, duration });
        }
        debug!(path = %path.display(), units = units.len(), sample_rate, "opened unit file");
        Ok(Self {
            path: path.to_path_buf(),
            sample_rate,
            units,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn num_units(&self) -> u32 {
        self.units.len() as u32
    }

    pub fn unit(&self, index: u32) -> Option<&Unit> {
        self.units.get(index as usize)
    }

    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    /// End of the last unit on the global axis.
    pub fn last_end(&self) -> u64 {
        self.units.iter().map(Unit::end).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(times: &[f64]) -> PitchmarkTrack {
        PitchmarkTrack::new(times.to_vec()).unwrap()
    }

    /// Pitchmarks every 10 ms up to `total` seconds.
    fn regular_track(total: f64) -> PitchmarkTrack {
        let n = (total * 100.0).round() as usize;
        track(&(1..=n).map(|i| i as f64 / 100.0).collect::<Vec<_>>())
    }

    #[test]
    fn test_one_second_utterance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("units.mry");
        let mut w = UnitFileWriter::create(&path, 16_000).unwrap();
        let u = w.add_utterance("a", &regular_track(1.0), &[0.30, 0.60, 1.00]).unwrap();
        assert_eq!(u.advance, 16_000);
        assert_eq!(u.drift, 0);
        assert_eq!(w.position(), 16_000);
        assert_eq!(w.close().unwrap(), 5);

        let r = UnitFileReader::open(&path).unwrap();
        assert_eq!(r.sample_rate(), 16_000);
        let got: Vec<(u64, i32)> = r.units().iter().map(|u| (u.start, u.duration)).collect();
        assert_eq!(
            got,
            vec![(0, -1), (0, 4800), (4800, 4800), (9600, 6400), (16_000, -1)]
        );
    }

    #[test]
    fn test_pitchmarks_shorter_than_labels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("units.mry");
        let mut w = UnitFileWriter::create(&path, 16_000).unwrap();
        let mut times: Vec<f64> = (1..=99).map(|i| i as f64 / 100.0).collect();
        times.push(0.998);
        let u = w.add_utterance("a", &track(&times), &[0.5, 1.0]).unwrap();
        assert_eq!(u.drift, -32);
        assert_eq!(w.position(), 15_968);

        let next = w.add_utterance("b", &regular_track(0.5), &[0.5]).unwrap();
        assert_eq!(next.start, 15_968);
        w.close().unwrap();

        let r = UnitFileReader::open(&path).unwrap();
        assert_eq!(r.unit(3).unwrap().start, 15_968);
        assert!(r.unit(3).unwrap().is_sentinel());
        assert!(r.unit(4).unwrap().is_sentinel());
        assert_eq!(r.unit(5).unwrap().start, 15_968);
        assert_eq!(r.unit(5).unwrap().duration, 8000);
        assert_eq!(r.last_end(), 15_968 + 8000);
    }

    /// Formatted log output collected from the current thread.
    #[derive(Clone, Default)]
    struct LogBuffer(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn logged<T>(f: impl FnOnce() -> T) -> (T, String) {
        let buffer = LogBuffer::default();
        let sink = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || sink.clone())
            .with_ansi(false)
            .finish();
        let out = tracing::subscriber::with_default(subscriber, f);
        let text = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        (out, text)
    }

    #[test]
    fn test_drift_warns_only_when_labels_overrun() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("units.mry");
        let mut w = UnitFileWriter::create(&path, 16_000).unwrap();
        let mut times: Vec<f64> = (1..=99).map(|i| i as f64 / 100.0).collect();
        times.push(0.998);

        let (u, logs) = logged(|| w.add_utterance("a", &track(&times), &[0.5, 1.0]).unwrap());
        assert_eq!(u.drift, -32);
        assert!(logs.contains("WARN"), "{logs}");
        assert!(logs.contains("labels run past the last pitchmark"), "{logs}");
        assert!(logs.contains("drift_samples=-32"), "{logs}");

        // pitchmarks outlasting the labels is expected and not worth a warning
        let (u, logs) = logged(|| w.add_utterance("b", &regular_track(0.5), &[0.4]).unwrap());
        assert_eq!(u.drift, 1600);
        assert!(!logs.contains("WARN"), "{logs}");
        w.close().unwrap();
    }

    #[test]
    fn test_units_are_contiguous() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("units.mry");
        let mut w = UnitFileWriter::create(&path, 22_050).unwrap();
        w.add_utterance("a", &regular_track(0.8), &[0.123, 0.2, 0.201, 0.55, 0.79]).unwrap();
        w.add_utterance("b", &regular_track(0.4), &[0.1, 0.4]).unwrap();
        w.close().unwrap();

        let r = UnitFileReader::open(&path).unwrap();
        let units = r.units();
        let mut i = 0;
        while i < units.len() {
            assert!(units[i].is_sentinel());
            assert_eq!(units[i].duration, SENTINEL_DURATION);
            let mut end = units[i].start;
            i += 1;
            while !units[i].is_sentinel() {
                assert_eq!(units[i].start, end);
                end = units[i].end();
                i += 1;
            }
            assert_eq!(units[i].start, end);
            i += 1;
        }
        assert_eq!(r.num_units(), 11);
    }

    #[test]
    fn test_empty_label_list_gives_two_sentinels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("units.mry");
        let mut w = UnitFileWriter::create(&path, 16_000).unwrap();
        w.add_utterance("a", &regular_track(0.1), &[]).unwrap();
        assert_eq!(w.close().unwrap(), 2);
    }

    #[test]
    fn test_truncated_or_padded_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("units.mry");
        let mut w = UnitFileWriter::create(&path, 16_000).unwrap();
        w.add_utterance("a", &regular_track(1.0), &[0.3, 1.0]).unwrap();
        w.close().unwrap();
        let bytes = std::fs::read(&path).unwrap();

        std::fs::write(&path, &bytes[..bytes.len() - 12]).unwrap();
        let err = UnitFileReader::open(&path).unwrap_err();
        assert!(matches!(err, Error::CountMismatch { expected: 4, actual: 3, .. }), "{err}");

        let mut padded = bytes.clone();
        padded.extend_from_slice(&[0u8; 12]);
        std::fs::write(&path, &padded).unwrap();
        assert!(matches!(
            UnitFileReader::open(&path).unwrap_err(),
            Error::CountMismatch { expected: 4, actual: 5, .. }
        ));

        let mut ragged = bytes;
        ragged.push(0);
        std::fs::write(&path, &ragged).unwrap();
        assert!(matches!(UnitFileReader::open(&path).unwrap_err(), Error::Format { .. }));
    }

    #[test]
    fn test_wrong_kind_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.bin");
        crate::timeline_writer::TimelineWriter::create(&path, "", 16_000, 0.1)
            .unwrap()
            .close()
            .unwrap();
        assert!(matches!(UnitFileReader::open(&path).unwrap_err(), Error::Format { .. }));
    }
}
