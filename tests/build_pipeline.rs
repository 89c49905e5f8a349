//! End-to-end runs of the build steps over a small synthetic database.

use std::path::Path;

use voxbuild::{
    config::BuildConfig,
    halfphone, labels,
    makers::{self, decode_pcm, BASENAME_TIMELINE, WAVEFORM_TIMELINE},
    pitchmarks::PitchmarkTrack,
    scost::SCOST_FILE,
    unitfile::{HALFPHONE_UNIT_FILE, PHONE_UNIT_FILE},
    wave::Waveform,
    Error, ScostFileReader, ScostFileWriter, TimelineReader, UnitFileReader, UnitFileWriter,
};

const RATE: u32 = 16_000;

/// Utterance `name`: pitchmarks every 5 ms up to `total`, a ramp waveform
/// and the given labels.
fn add_utterance(config: &BuildConfig, name: &str, total: f64, label_text: &str) {
    let layout = &config.layout;
    for dir in [&layout.wav_dir, &layout.pm_dir, &layout.lab_dir] {
        std::fs::create_dir_all(layout.dir(dir)).unwrap();
    }
    let n = (total * 200.0).round() as usize;
    let times: Vec<f64> = (1..=n).map(|i| i as f64 / 200.0).collect();
    let track = PitchmarkTrack::new(times).unwrap();
    std::fs::write(layout.pitchmarks(name), track.to_est_string()).unwrap();

    let samples = (total * f64::from(RATE)).round() as usize;
    Waveform::new((0..samples).map(|i| (i % 1000) as i16).collect(), RATE)
        .save(&layout.wav(name))
        .unwrap();
    std::fs::write(layout.phone_labels(name), label_text).unwrap();
}

fn database(root: &Path) -> (BuildConfig, Vec<String>) {
    let mut config = BuildConfig::for_root(root);
    config.sample_rate = RATE;
    config.index_interval = 0.05;
    add_utterance(
        &config,
        "u1",
        0.5,
        "#\n0.100 125 pau\n0.200 125 t 1.5\n0.210 125 sil\n0.350 125 a 0.25\n0.500 125 _\n",
    );
    add_utterance(&config, "u2", 0.3, "#\n0.050 125 _\n0.150 125 k 2\n0.300 125 i\n");
    (config, vec!["u1".to_string(), "u2".to_string()])
}

#[test]
fn test_full_build_in_phone_mode() {
    let dir = tempfile::tempdir().unwrap();
    let (config, basenames) = database(dir.path());
    let layout = &config.layout;
    let lab_dir = layout.dir(&layout.lab_dir);

    let report = labels::clean_pause_labels(&basenames, &lab_dir, &lab_dir, ".lab", &config.pauses.policy()).unwrap();
    assert!(report.is_clean());
    let u1 = labels::LabelFile::load(&layout.phone_labels("u1")).unwrap();
    let names: Vec<_> = u1.labels.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, vec!["_", "t", "a", "_"]);
    assert!((u1.labels[1].end - 0.205).abs() < 1e-9);

    let n = UnitFileWriter::build(&config, &basenames).unwrap();
    assert_eq!(n, (4 + 2) + (3 + 2));
    let units = UnitFileReader::open(&layout.output(PHONE_UNIT_FILE)).unwrap();
    assert_eq!(units.num_units(), n);
    // u2 starts where u1's pitchmarks end
    assert_eq!(units.unit(6).unwrap().start, 8000);
    assert!(units.unit(6).unwrap().is_sentinel());

    let waves = makers::make_waveform_timeline(&config, &basenames).unwrap();
    let names_tl = makers::make_basename_timeline(&config, &basenames).unwrap();
    assert_eq!(waves.total_duration, 8000 + 4800);
    assert_eq!(waves.total_duration, units.last_end());
    assert_eq!(names_tl.total_duration, waves.total_duration);

    // the "t" unit of u1 maps to the pitch periods it spans
    let timeline = TimelineReader::open(&layout.output(WAVEFORM_TIMELINE)).unwrap();
    let t_unit = units.unit(2).unwrap();
    let span = timeline.unit_datagrams(t_unit).unwrap();
    assert_eq!(span.offset, 0);
    assert_eq!(span.duration(), t_unit.duration as u64);
    let first = decode_pcm(span.datagrams[0].payload());
    assert_eq!(first[0], (t_unit.start % 1000) as i16);

    let basenames_tl = TimelineReader::open(&layout.output(BASENAME_TIMELINE)).unwrap();
    let owner = basenames_tl.datagram_at(units.unit(8).unwrap().start).unwrap();
    assert_eq!(owner.payload(), b"u2");

    assert_eq!(ScostFileWriter::build(&config, &basenames).unwrap(), n);
    let costs = ScostFileReader::open(&layout.output(SCOST_FILE)).unwrap();
    assert_eq!(costs.cost(0), Some(0.0));
    assert_eq!(costs.cost(2), Some(1.5));
    assert_eq!(costs.cost(3), Some(0.25));
    assert_eq!(costs.cost(8), Some(2.0));
}

#[test]
fn test_half_phone_mode() {
    let dir = tempfile::tempdir().unwrap();
    let (mut config, basenames) = database(dir.path());
    config.half_phones = true;
    config.energy.enabled = true;

    let report = halfphone::make_halfphone_labels(&basenames, &config.layout, &config.energy).unwrap();
    assert!(report.is_clean());
    assert!(config.layout.energy_cache("u1").exists());

    let n = UnitFileWriter::build(&config, &basenames).unwrap();
    assert_eq!(n, (10 + 2) + (6 + 2));
    let units = UnitFileReader::open(&config.layout.output(HALFPHONE_UNIT_FILE)).unwrap();
    let real: u64 = units
        .units()
        .iter()
        .filter(|u| !u.is_sentinel())
        .map(|u| u.duration as u64)
        .sum();
    assert_eq!(real, 8000 + 4800);
    assert_eq!(ScostFileWriter::build(&config, &basenames).unwrap(), n);
}

#[test]
fn test_missing_utterance_fails_the_unit_file() {
    let dir = tempfile::tempdir().unwrap();
    let (config, mut basenames) = database(dir.path());
    basenames.push("ghost".to_string());
    let err = UnitFileWriter::build(&config, &basenames).unwrap_err();
    assert!(matches!(err, Error::Config { .. }), "{err}");
}

#[test]
fn test_stale_costs_are_refused() {
    let dir = tempfile::tempdir().unwrap();
    let (config, basenames) = database(dir.path());
    UnitFileWriter::build(&config, &basenames).unwrap();
    // one more label than the unit file knows about
    std::fs::write(
        config.layout.phone_labels("u2"),
        "#\n0.050 125 _\n0.150 125 k 2\n0.200 125 i\n0.300 125 _\n",
    )
    .unwrap();
    let err = ScostFileWriter::build(&config, &basenames).unwrap_err();
    assert!(matches!(err, Error::CountMismatch { .. }), "{err}");
}
