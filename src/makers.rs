//! Timeline makers: waveform and basename timelines.
//!
//! Both lay utterances end to end, each one lasting exactly its pitchmark
//! track's total duration at the timeline rate.  That is the advance the
//! unit file uses, so a unit's `start` is directly a timeline time.

use tracing::{info, warn};

use crate::{
    batch::Progress,
    config::BuildConfig,
    datagram::Datagram,
    error::{Error, Result},
    pitchmarks::{seconds_to_samples, PitchmarkTrack},
    timeline_writer::{TimelineSummary, TimelineWriter},
    wave::Waveform,
};

pub const WAVEFORM_TIMELINE: &str = "timeline_waveforms.mry";
pub const BASENAME_TIMELINE: &str = "timeline_basenames.mry";

/// One datagram per pitch period.  Durations are in `timeline_rate`
/// samples; payloads are the waveform's own samples for that period as
/// big-endian `i16`.
pub fn pitch_period_datagrams(track: &PitchmarkTrack, wave: &Waveform, timeline_rate: u32) -> Vec<Datagram> {
    let mut datagrams = Vec::with_capacity(track.len());
    let (mut prev_time, mut prev_sample) = (0u64, 0usize);
    for &t in track.times() {
        let time = seconds_to_samples(t, timeline_rate);
        let sample = seconds_to_samples(t, wave.sample_rate) as usize;
        let payload = wave
            .slice_padded(prev_sample, sample.max(prev_sample))
            .iter()
            .flat_map(|s| s.to_be_bytes())
            .collect();
        datagrams.push(Datagram::new(time.saturating_sub(prev_time), payload));
        prev_time = prev_time.max(time);
        prev_sample = prev_sample.max(sample);
    }
    datagrams
}

/// Decode a waveform datagram payload.
pub fn decode_pcm(payload: &[u8]) -> Vec<i16> {
    payload
        .chunks_exact(2)
        .map(|b| i16::from_be_bytes([b[0], b[1]]))
        .collect()
}

pub fn make_waveform_timeline(config: &BuildConfig, basenames: &[String]) -> Result<TimelineSummary> {
    let layout = &config.layout;
    let path = create_out_dir(config)?.join(WAVEFORM_TIMELINE);
    let mut writer = TimelineWriter::create(
        &path,
        "voxbuild: waveforms cut into pitch periods",
        config.sample_rate,
        config.index_interval,
    )?;
    let mut progress = Progress::new("waveform-timeline", basenames.len());
    for basename in basenames {
        let track = PitchmarkTrack::load(&layout.pitchmarks(basename))?;
        let wave = Waveform::load(&layout.wav(basename))?;
        if wave.duration() + 1.0 / f64::from(wave.sample_rate.max(1)) < track.total_duration() {
            warn!(
                basename = %basename,
                wave_seconds = wave.duration(),
                pitchmark_seconds = track.total_duration(),
                "pitchmarks run past the waveform; padding with silence"
            );
        }
        writer.feed_all(&pitch_period_datagrams(&track, &wave, config.sample_rate), config.sample_rate)?;
        progress.advance();
    }
    let summary = writer.close()?;
    info!(path = %path.display(), utterances = basenames.len(), "waveform timeline done");
    Ok(summary)
}

/// One datagram per utterance carrying its basename.
pub fn make_basename_timeline(config: &BuildConfig, basenames: &[String]) -> Result<TimelineSummary> {
    let layout = &config.layout;
    let path = create_out_dir(config)?.join(BASENAME_TIMELINE);
    let mut writer = TimelineWriter::create(&path, "voxbuild: utterance basenames", config.sample_rate, config.index_interval)?;
    let mut progress = Progress::new("basename-timeline", basenames.len());
    for basename in basenames {
        let track = PitchmarkTrack::load(&layout.pitchmarks(basename))?;
        let duration = seconds_to_samples(track.total_duration(), config.sample_rate);
        writer.feed(&Datagram::new(duration, basename.as_bytes().to_vec()), config.sample_rate)?;
        progress.advance();
    }
    writer.close()
}

fn create_out_dir(config: &BuildConfig) -> Result<std::path::PathBuf> {
    let dir = config.layout.dir(&config.layout.out_dir);
    std::fs::create_dir_all(&dir)
        .map_err(|e| Error::config(format!("cannot create {}: {e}", dir.display())))?;
    Ok(dir)
}
