//! Per-unit target cost file, parallel to a unit file.
//!
//! Layout: header (kind = scost), `count: i32`, then `count` big-endian
//! `f32` costs, one per unit in unit-file order.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use tracing::{debug, info};

use crate::{
    batch::Progress,
    config::BuildConfig,
    error::{Error, IoContext, Result},
    header::{read_header, read_f32, read_i32, write_header, FileKind, HEADER_LEN},
    labels::LabelFile,
    unitfile::{UnitFileReader, HALFPHONE_UNIT_FILE, PHONE_UNIT_FILE},
};

pub const SCOST_FILE: &str = "scost.mry";

pub struct ScostFileWriter;

impl ScostFileWriter {
    /// Write `costs`, refusing when they do not line up with `units`.
    pub fn write(path: &Path, costs: &[f32], units: &UnitFileReader) -> Result<()> {
        if costs.len() as u64 != u64::from(units.num_units()) {
            return Err(Error::count_mismatch(
                format!("costs for {}", units.path().display()),
                u64::from(units.num_units()),
                costs.len() as u64,
            ));
        }
        let count = i32::try_from(costs.len())
            .map_err(|_| Error::invalid_argument("too many costs for one file"))?;

        let file = File::create(path).io_context(|| format!("creating {}", path.display()))?;
        let mut out = BufWriter::new(file);
        write_header(&mut out, FileKind::Scost)
            .and_then(|_| out.write_all(&count.to_be_bytes()))
            .and_then(|_| costs.iter().try_for_each(|c| out.write_all(&c.to_be_bytes())))
            .and_then(|_| out.flush())
            .io_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), costs = costs.len(), "wrote cost file");
        Ok(())
    }

    /// Collect one cost per unit from the cost field of the unit labels
    /// (missing or non-numeric fields cost 0; sentinels cost 0) and write
    /// them next to the unit file.
    pub fn build(config: &BuildConfig, basenames: &[String]) -> Result<u32> {
        let layout = &config.layout;
        let unit_file = if config.half_phones { HALFPHONE_UNIT_FILE } else { PHONE_UNIT_FILE };
        let units = UnitFileReader::open(&layout.output(unit_file))?;
        let (label_dir, label_ext) = config.unit_labels();

        let mut costs = Vec::with_capacity(units.num_units() as usize);
        let mut progress = Progress::new("scost-file", basenames.len());
        for basename in basenames {
            let labels = LabelFile::load(&label_dir.join(format!("{basename}{label_ext}")))?;
            costs.push(0.0);
            costs.extend(labels.labels.iter().map(|l| l.cost().unwrap_or(0.0)));
            costs.push(0.0);
            progress.advance();
        }
        Self::write(&layout.output(SCOST_FILE), &costs, &units)?;
        Ok(costs.len() as u32)
    }
}

#[derive(Debug, Clone)]
pub struct ScostFileReader {
    path: PathBuf,
    costs: Vec<f32>,
}

impl ScostFileReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| Error::config(format!("cannot open cost file {}: {e}", path.display())))?;
        let len = file
            .metadata()
            .io_context(|| format!("reading metadata of {}", path.display()))?
            .len();
        let mut r = BufReader::new(file);
        read_header(&mut r, FileKind::Scost, path)?;
        let declared = read_i32(&mut r, path)?;
        let declared = u64::try_from(declared)
            .map_err(|_| Error::format(path, format!("negative cost count {declared}")))?;
        let body = len.saturating_sub(HEADER_LEN + 4);
        if body != declared * 4 {
            return Err(Error::count_mismatch(format!("cost file {}", path.display()), declared, body / 4));
        }
        let costs = (0..declared)
            .map(|_| read_f32(&mut r, path))
            .collect::<Result<Vec<_>>>()?;
        debug!(path = %path.display(), costs = costs.len(), "opened cost file");
        Ok(Self {
            path: path.to_path_buf(),
            costs,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.costs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.costs.is_empty()
    }

    pub fn cost(&self, unit: u32) -> Option<f32> {
        self.costs.get(unit as usize).copied()
    }

    pub fn costs(&self) -> &[f32] {
        &self.costs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{pitchmarks::PitchmarkTrack, unitfile::UnitFileWriter};

    fn unit_file(dir: &Path) -> UnitFileReader {
        let path = dir.join("units.mry");
        let mut w = UnitFileWriter::create(&path, 16_000).unwrap();
        let track = PitchmarkTrack::new(vec![0.1, 0.2, 0.3]).unwrap();
        w.add_utterance("a", &track, &[0.1, 0.3]).unwrap();
        w.close().unwrap();
        UnitFileReader::open(&path).unwrap()
    }

    #[test]
    fn test_write_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let units = unit_file(dir.path());
        let path = dir.path().join("scost.mry");
        ScostFileWriter::write(&path, &[0.0, 0.5, 1.25, 0.0], &units).unwrap();
        let r = ScostFileReader::open(&path).unwrap();
        assert_eq!(r.costs(), &[0.0, 0.5, 1.25, 0.0]);
        assert_eq!(r.cost(2), Some(1.25));
        assert_eq!(r.cost(4), None);
    }

    #[test]
    fn test_count_mismatch_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let units = unit_file(dir.path());
        let path = dir.path().join("scost.mry");
        let err = ScostFileWriter::write(&path, &[0.0, 0.5, 0.0], &units).unwrap_err();
        assert!(matches!(err, Error::CountMismatch { expected: 4, actual: 3, .. }), "{err}");
        assert!(!path.exists());
    }

    #[test]
    fn test_truncated_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let units = unit_file(dir.path());
        let path = dir.path().join("scost.mry");
        ScostFileWriter::write(&path, &[0.0; 4], &units).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 2]).unwrap();
        assert!(matches!(
            ScostFileReader::open(&path).unwrap_err(),
            Error::CountMismatch { expected: 4, actual: 3, .. }
        ));
    }
}
