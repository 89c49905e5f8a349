//! voxbuild — batch driver for the voice-building steps.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use voxbuild::{
    batch::BatchReport,
    config::read_basenames,
    halfphone, labels, makers, BuildConfig, ScostFileReader, ScostFileWriter, TimelineReader,
    UnitFileReader, UnitFileWriter,
};

#[derive(Debug, Parser)]
#[command(
    name = "voxbuild",
    about = "Build unit-selection voice files from a speech database",
    version = env!("CARGO_PKG_VERSION")
)]
struct Args {
    /// Build config (JSON); defaults apply when the file does not exist
    #[arg(short, long, default_value = "voxbuild.json")]
    config: PathBuf,

    /// Basename list, overriding the one named in the config
    #[arg(short, long)]
    basenames: Option<PathBuf>,

    #[command(subcommand)]
    step: Step,
}

#[derive(Debug, Subcommand)]
enum Step {
    /// Canonicalise, merge and drop short pauses in label files (in place)
    Pauses {
        /// Clean half-phone labels instead of phone labels
        #[arg(long)]
        half_phones: bool,
    },
    /// Split phone labels into half-phone labels
    Halfphones {
        /// Move plosive/affricate split points to the energy rise
        #[arg(long)]
        energy: bool,
    },
    /// Write the unit file
    Units,
    /// Write the waveform timeline
    Waveforms,
    /// Write the basename timeline
    Basenames,
    /// Write the per-unit cost file
    Scost,
    /// Run units, waveforms, basenames and scost in order
    All,
    /// Print a summary of a built file
    Info {
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voxbuild=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match args.step {
        Step::Info { file } => print_info(&file),
        step => {
            let (config, basenames) = load_database(&args.config, args.basenames.as_deref())?;
            run(step, config, &basenames)
        }
    }
}

fn load_database(config_path: &Path, basenames: Option<&Path>) -> Result<(BuildConfig, Vec<String>)> {
    let config = if config_path.exists() {
        BuildConfig::load(config_path)?
    } else {
        let root = config_path.parent().unwrap_or(Path::new("."));
        info!(config = %config_path.display(), "no config file, using defaults");
        BuildConfig::for_root(root)
    };
    let basenames = match basenames {
        Some(list) => read_basenames(list)?,
        None => config.basenames()?,
    };
    info!(utterances = basenames.len(), root = %config.layout.root.display(), "loaded database");
    Ok((config, basenames))
}

fn run(step: Step, mut config: BuildConfig, basenames: &[String]) -> Result<()> {
    match step {
        Step::Pauses { half_phones } => {
            let layout = &config.layout;
            let (dir, ext) = if half_phones {
                (layout.dir(&layout.hplab_dir), layout.hplab_ext.clone())
            } else {
                (layout.dir(&layout.lab_dir), layout.lab_ext.clone())
            };
            let report = labels::clean_pause_labels(basenames, &dir, &dir, &ext, &config.pauses.policy())
                .context("pause clean-up failed")?;
            warn_skipped("pauses", &report);
        }
        Step::Halfphones { energy } => {
            config.energy.enabled |= energy;
            let report = halfphone::make_halfphone_labels(basenames, &config.layout, &config.energy)
                .context("half-phone labelling failed")?;
            warn_skipped("halfphones", &report);
        }
        Step::Units => units(&config, basenames)?,
        Step::Waveforms => waveforms(&config, basenames)?,
        Step::Basenames => basename_timeline(&config, basenames)?,
        Step::Scost => scost(&config, basenames)?,
        Step::All => {
            units(&config, basenames)?;
            waveforms(&config, basenames)?;
            basename_timeline(&config, basenames)?;
            scost(&config, basenames)?;
        }
        Step::Info { file } => print_info(&file)?,
    }
    Ok(())
}

fn units(config: &BuildConfig, basenames: &[String]) -> Result<()> {
    let n = UnitFileWriter::build(config, basenames).context("unit file step failed")?;
    println!("unit file: {n} units");
    Ok(())
}

fn waveforms(config: &BuildConfig, basenames: &[String]) -> Result<()> {
    let s = makers::make_waveform_timeline(config, basenames).context("waveform timeline step failed")?;
    println!(
        "waveform timeline: {} datagrams, {} samples",
        s.num_datagrams, s.total_duration
    );
    Ok(())
}

fn basename_timeline(config: &BuildConfig, basenames: &[String]) -> Result<()> {
    let s = makers::make_basename_timeline(config, basenames).context("basename timeline step failed")?;
    println!(
        "basename timeline: {} datagrams, {} samples",
        s.num_datagrams, s.total_duration
    );
    Ok(())
}

fn scost(config: &BuildConfig, basenames: &[String]) -> Result<()> {
    let n = ScostFileWriter::build(config, basenames).context("scost step failed")?;
    println!("cost file: {n} costs");
    Ok(())
}

fn warn_skipped(step: &str, report: &BatchReport) {
    for (basename, reason) in &report.failed {
        warn!(step, basename = %basename, reason = %reason, "skipped");
    }
    println!(
        "{step}: {} processed, {} skipped",
        report.succeeded.len(),
        report.failed.len()
    );
}

/// Try each reader in turn; the header kind decides which one succeeds.
fn print_info(file: &Path) -> Result<()> {
    if let Ok(t) = TimelineReader::open(file) {
        println!("timeline {}", file.display());
        println!("  history      {}", t.processing_history());
        println!("  sample rate  {}", t.sample_rate());
        println!("  datagrams    {}", t.num_datagrams());
        println!("  duration     {} samples", t.total_duration());
        println!("  index        {} entries every {} samples", t.index().len(), t.index().interval());
        return Ok(());
    }
    if let Ok(u) = UnitFileReader::open(file) {
        let sentinels = u.units().iter().filter(|u| u.is_sentinel()).count();
        println!("unit file {}", file.display());
        println!("  sample rate  {}", u.sample_rate());
        println!("  units        {} ({} sentinels)", u.num_units(), sentinels);
        println!("  axis end     {} samples", u.last_end());
        return Ok(());
    }
    let c = ScostFileReader::open(file)
        .with_context(|| format!("{} is not a readable timeline, unit or cost file", file.display()))?;
    println!("cost file {}", file.display());
    println!("  costs        {}", c.len());
    Ok(())
}
