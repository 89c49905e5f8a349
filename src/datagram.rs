//! The atomic timeline record: a duration in samples plus an opaque payload.
//!
//! On disk a datagram is `[duration: u64][payload_len: u32][payload]`, so the
//! per-record overhead is [`Datagram::OVERHEAD`] bytes.

use std::io::{Read, Write};
use std::path::Path;

use crate::error::{Error, Result};
use crate::header::{read_u32, read_u64};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    duration: u64,
    payload: Vec<u8>,
}

impl Datagram {
    /// Bytes of framing written before the payload.
    pub const OVERHEAD: u64 = 12;

    pub fn new(duration: u64, payload: Vec<u8>) -> Self {
        Self { duration, payload }
    }

    /// Duration in samples at the sample rate of the timeline it lives in.
    pub fn duration(&self) -> u64 {
        self.duration
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Same payload, different duration (used when rescaling between rates).
    pub(crate) fn with_duration(self, duration: u64) -> Self {
        Self { duration, ..self }
    }

    /// Size of this record on disk.
    pub fn encoded_len(&self) -> u64 {
        Self::OVERHEAD + self.payload.len() as u64
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<u64> {
        let len = u32::try_from(self.payload.len()).map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "datagram payload exceeds 4 GiB")
        })?;
        w.write_all(&self.duration.to_be_bytes())?;
        w.write_all(&len.to_be_bytes())?;
        w.write_all(&self.payload)?;
        Ok(self.encoded_len())
    }

    /// Read one record that must fit in the next `available` bytes.
    pub fn read_from<R: Read>(r: &mut R, path: &Path, available: u64) -> Result<Self> {
        let duration = read_u64(r, path)?;
        let len = read_u32(r, path)?;
        if Self::OVERHEAD + u64::from(len) > available {
            return Err(Error::format(
                path,
                format!("datagram payload of {len} bytes runs past the {available} bytes left"),
            ));
        }
        let len = len as usize;
        let mut payload = vec![0u8; len];
        r.read_exact(&mut payload)
            .map_err(|_| Error::format(path, format!("datagram payload truncated (wanted {len} bytes)")))?;
        Ok(Self { duration, payload })
    }

    /// Read only the framing and skip over the payload; returns
    /// `(duration, bytes consumed)`.
    pub fn skip_from<R: Read>(r: &mut R, path: &Path) -> Result<(u64, u64)> {
        let duration = read_u64(r, path)?;
        let len = read_u32(r, path)? as u64;
        let skipped = std::io::copy(&mut r.by_ref().take(len), &mut std::io::sink())
            .map_err(|e| Error::io(format!("skipping datagram in {}", path.display()), e))?;
        if skipped != len {
            return Err(Error::format(path, "datagram payload truncated while skipping"));
        }
        Ok((duration, Self::OVERHEAD + len))
    }
}

/// Convert a sample count from one rate to another, rounding to nearest.
pub fn rescale(samples: u64, from_rate: u32, to_rate: u32) -> u64 {
    if from_rate == to_rate {
        return samples;
    }
    let num = u128::from(samples) * u128::from(to_rate);
    let den = u128::from(from_rate);
    ((num + den / 2) / den) as u64
}
