//! Voice database layout and build settings.
//!
//! A build is driven by a JSON file, `voxbuild.json` by convention, sitting
//! at the database root.  Every field has a default, so `{}` is a valid
//! config for a database using the standard directory names:
//!
//! ```text
//! <root>/
//!   basenames.lst   one utterance basename per line
//!   wav/            16-bit PCM waveforms
//!   pm/             pitchmark tracks
//!   lab/            phone labels
//!   hplab/          half-phone labels (written by the half-phone step)
//!   energy/         cached energy contours
//!   mary/           timeline, unit and cost files
//! ```

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::labels::PausePolicy;

// ─────────────────────────────────────────────────────────────────────────────
// voxbuild.json schema
// ─────────────────────────────────────────────────────────────────────────────

/// Deserialised `voxbuild.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Sample rate of the unit file and every timeline.
    pub sample_rate: u32,

    /// Seconds of timeline per index entry.
    pub index_interval: f64,

    /// Build units from half-phone labels instead of phone labels.
    pub half_phones: bool,

    #[serde(flatten)]
    pub layout: DatabaseLayout,

    pub pauses: PauseConfig,

    pub energy: EnergyConfig,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            index_interval: 0.1,
            half_phones: false,
            layout: DatabaseLayout::default(),
            pauses: PauseConfig::default(),
            energy: EnergyConfig::default(),
        }
    }
}

impl BuildConfig {
    /// Read and validate a config file.  Relative directories in the file are
    /// resolved against the config file's own directory.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Cannot read config: {}", path.display()))?;
        let mut config: BuildConfig = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        if let Some(dir) = path.parent() {
            config.layout.root = dir.join(&config.layout.root);
        }
        config.validate()?;
        Ok(config)
    }

    /// Defaults for a database rooted at `root`.
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        let mut config = Self::default();
        config.layout.root = root.into();
        config
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            bail!("sample_rate must be positive");
        }
        if !(self.index_interval > 0.0) {
            bail!("index_interval must be positive, got {}", self.index_interval);
        }
        if !(self.pauses.min_duration >= 0.0) {
            bail!("pauses.min_duration must be non-negative, got {}", self.pauses.min_duration);
        }
        if !(self.energy.window > 0.0 && self.energy.skip > 0.0) {
            bail!(
                "energy window and skip must be positive, got {} / {}",
                self.energy.window,
                self.energy.skip
            );
        }
        Ok(())
    }

    /// Label directory and extension the unit/cost steps read from.
    pub fn unit_labels(&self) -> (PathBuf, &str) {
        if self.half_phones {
            (self.layout.dir(&self.layout.hplab_dir), &self.layout.hplab_ext)
        } else {
            (self.layout.dir(&self.layout.lab_dir), &self.layout.lab_ext)
        }
    }

    /// Read the basename list named by the layout.
    pub fn basenames(&self) -> Result<Vec<String>> {
        read_basenames(&self.layout.dir(&self.layout.basenames))
    }
}

/// Where inputs live and outputs go.  Directory fields are relative to
/// `root` unless absolute.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseLayout {
    pub root: PathBuf,
    pub basenames: PathBuf,
    pub wav_dir: PathBuf,
    pub pm_dir: PathBuf,
    pub lab_dir: PathBuf,
    pub hplab_dir: PathBuf,
    pub energy_dir: PathBuf,
    pub out_dir: PathBuf,
    pub wav_ext: String,
    pub pm_ext: String,
    pub lab_ext: String,
    pub hplab_ext: String,
}

impl Default for DatabaseLayout {
    fn default() -> Self {
        Self {
            root: PathBuf::new(),
            basenames: "basenames.lst".into(),
            wav_dir: "wav".into(),
            pm_dir: "pm".into(),
            lab_dir: "lab".into(),
            hplab_dir: "hplab".into(),
            energy_dir: "energy".into(),
            out_dir: "mary".into(),
            wav_ext: ".wav".into(),
            pm_ext: ".pm".into(),
            lab_ext: ".lab".into(),
            hplab_ext: ".hplab".into(),
        }
    }
}

impl DatabaseLayout {
    /// Resolve a configured directory against the root.
    pub fn dir(&self, rel: &Path) -> PathBuf {
        self.root.join(rel)
    }

    pub fn wav(&self, basename: &str) -> PathBuf {
        self.dir(&self.wav_dir).join(format!("{basename}{}", self.wav_ext))
    }

    pub fn pitchmarks(&self, basename: &str) -> PathBuf {
        self.dir(&self.pm_dir).join(format!("{basename}{}", self.pm_ext))
    }

    pub fn phone_labels(&self, basename: &str) -> PathBuf {
        self.dir(&self.lab_dir).join(format!("{basename}{}", self.lab_ext))
    }

    pub fn halfphone_labels(&self, basename: &str) -> PathBuf {
        self.dir(&self.hplab_dir).join(format!("{basename}{}", self.hplab_ext))
    }

    pub fn energy_cache(&self, basename: &str) -> PathBuf {
        self.dir(&self.energy_dir).join(format!("{basename}.energy.json"))
    }

    /// Path of an output file, e.g. `output("timeline_waveforms.mry")`.
    pub fn output(&self, file_name: &str) -> PathBuf {
        self.dir(&self.out_dir).join(file_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PauseConfig {
    pub symbol: String,
    pub aliases: Vec<String>,
    /// Seconds.
    pub min_duration: f64,
}

impl Default for PauseConfig {
    fn default() -> Self {
        let policy = PausePolicy::default();
        let mut aliases: Vec<String> = policy.aliases.into_iter().collect();
        aliases.sort();
        Self {
            symbol: policy.symbol,
            aliases,
            min_duration: policy.min_duration,
        }
    }
}

impl PauseConfig {
    pub fn policy(&self) -> PausePolicy {
        PausePolicy {
            symbol: self.symbol.clone(),
            aliases: self.aliases.iter().cloned().collect(),
            min_duration: self.min_duration,
        }
    }
}

/// Energy-based half-phone boundary refinement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyConfig {
    pub enabled: bool,
    /// Phones whose split point follows the energy rise.
    pub phones: HashSet<String>,
    /// RMS window, seconds.
    pub window: f64,
    /// Frame shift, seconds.
    pub skip: f64,
}

impl Default for EnergyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            phones: ["p", "b", "t", "d", "k", "g", "tS", "dZ", "ts", "pf"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            window: 0.01,
            skip: 0.005,
        }
    }
}

/// One basename per non-empty line; `#` starts a comment line.
pub fn read_basenames(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read basename list: {}", path.display()))?;
    let names: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect();
    if names.is_empty() {
        bail!("Basename list {} is empty", path.display());
    }
    Ok(names)
}
